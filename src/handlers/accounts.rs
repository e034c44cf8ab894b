use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};

use crate::error::AppError;
use crate::handle::{is_valid_handle, normalize_handle};
use crate::identity::VerifiedIdentity;
use crate::models::account::{
    AccountDocument, AccountResponse, CreditsResponse, HandleAvailability, HistoryResponse,
    InfoResponse, ProfileHints, ProfileRequest, ProfileResponse, Role, SetHandleRequest,
    SetHandleResponse, Settings, SettingsRequest, SettingsResponse, CHAT_SESSION_LIMIT,
    STARTING_BALANCE,
};
use crate::models::chat::{DeleteSessionRequest, SaveSessionRequest, SessionsResponse};
use crate::repository::SetHandleOutcome;
use crate::util::uid_prefix;
use crate::AppState;

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /api/user/sync: create the account on first sight, otherwise fill
/// in a missing display name or avatar. Never overwrites existing values.
pub async fn sync_account(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(body): Json<ProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let uid = identity.uid.as_str();
    tracing::info!(handler = "sync_account", uid = %uid_prefix(uid), "Handler: POST /api/user/sync");

    let from_token = identity.hints();
    let hints = ProfileHints {
        display_name: non_blank(body.display_name).or(from_token.display_name),
        avatar: non_blank(body.avatar).or(from_token.avatar),
    };

    let mut account = state.repo.sync_account(uid, &hints).await?;

    if !account.is_admin() && state.bootstrap_admins.iter().any(|a| a == uid) {
        tracing::info!(handler = "sync_account", uid = %uid_prefix(uid), "Promoting bootstrap administrator");
        if let Some(role) = state.repo.set_role(uid, Role::Administrator).await? {
            account.role = role;
        }
    }

    let history = state.repo.history(uid).await?;
    let chats = state.repo.chat_sessions(uid).await?;
    account.balance = account.balance.max(0);

    tracing::info!(
        handler = "sync_account",
        uid = %uid_prefix(uid),
        balance = account.balance,
        status = 200,
        "Responding: account synced"
    );

    Ok(Json(AccountResponse {
        user: AccountDocument {
            account,
            history,
            chats,
        },
    }))
}

/// POST /api/user/update: overwrite the provided profile fields.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(body): Json<ProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "update_profile",
        uid = %uid_prefix(&identity.uid),
        avatar_bytes = body.avatar.as_ref().map(String::len).unwrap_or(0),
        "Handler: POST /api/user/update"
    );

    let mut account = state.repo.update_profile(&identity.uid, &body.into()).await?;
    account.balance = account.balance.max(0);
    Ok(Json(ProfileResponse { user: account }))
}

/// POST /api/user/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(body): Json<SettingsRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(handler = "update_settings", uid = %uid_prefix(&identity.uid), "Handler: POST /api/user/settings");

    let account = state
        .repo
        .update_settings(&identity.uid, &body.settings)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(SettingsResponse {
        settings: account.settings,
    }))
}

/// POST /api/user/credits/deduct
pub async fn deduct_credit(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(handler = "deduct_credit", uid = %uid_prefix(&identity.uid), "Handler: POST /api/user/credits/deduct");

    let credits = state.ledger.deduct(&identity.uid).await?;
    Ok(Json(CreditsResponse { credits }))
}

/// GET /api/user/history: an unknown account reads as a fresh one.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<impl IntoResponse, AppError> {
    let uid = identity.uid.as_str();
    tracing::info!(handler = "get_history", uid = %uid_prefix(uid), "Handler: GET /api/user/history");

    let response = match state.repo.find_account(uid).await? {
        Some(account) => HistoryResponse {
            history: state.repo.history(uid).await?,
            settings: account.settings,
            credits: account.balance.max(0),
            username: account.handle,
            user_type: account.role,
            display_name: account.display_name,
            photo_url: account.avatar,
        },
        None => HistoryResponse {
            history: Vec::new(),
            settings: Settings::default(),
            credits: STARTING_BALANCE,
            username: None,
            user_type: Role::Standard,
            display_name: None,
            photo_url: None,
        },
    };

    Ok(Json(response))
}

/// GET /api/user/check-username/:username (public)
pub async fn check_handle(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = normalize_handle(&raw);
    let available = is_valid_handle(&handle) && !state.repo.handle_taken(&handle).await?;
    tracing::debug!(handler = "check_handle", handle = %handle, available, "Handle availability checked");
    Ok(Json(HandleAvailability { available }))
}

/// POST /api/user/set-username: one-time assignment.
pub async fn set_handle(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(body): Json<SetHandleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let uid = identity.uid.as_str();
    tracing::info!(handler = "set_handle", uid = %uid_prefix(uid), "Handler: POST /api/user/set-username");

    let account = state
        .repo
        .find_account(uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if account.handle.is_some() {
        return Err(AppError::Conflict(
            "Username already set. It cannot be changed.".into(),
        ));
    }

    let handle = normalize_handle(&body.username);
    if !is_valid_handle(&handle) {
        return Err(AppError::BadRequest(
            "Username must be 3-20 characters, lowercase letters, numbers, and underscores only."
                .into(),
        ));
    }

    match state.repo.set_handle(uid, &handle).await? {
        SetHandleOutcome::Assigned => {
            tracing::info!(handler = "set_handle", uid = %uid_prefix(uid), handle = %handle, status = 200, "Responding: handle assigned");
            Ok(Json(SetHandleResponse { username: handle }))
        }
        SetHandleOutcome::AccountMissing => Err(AppError::NotFound("User not found".into())),
        SetHandleOutcome::AlreadySet => Err(AppError::Conflict(
            "Username already set. It cannot be changed.".into(),
        )),
        SetHandleOutcome::Taken => Err(AppError::Conflict("Username is already taken.".into())),
    }
}

/// GET /api/user/info
pub async fn get_info(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .repo
        .find_account(&identity.uid)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(InfoResponse {
        user_type: account.role,
        username: account.handle,
        is_blocked: account.blocked,
    }))
}

/// POST /api/user/chats/save
pub async fn save_chat_session(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(body): Json<SaveSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "save_chat_session",
        uid = %uid_prefix(&identity.uid),
        session_id = %body.session.id,
        turns = body.session.messages.len(),
        "Handler: POST /api/user/chats/save"
    );

    body.session
        .validate()
        .map_err(|msg| AppError::BadRequest(format!("Invalid session: {msg}")))?;

    let chats = state
        .repo
        .save_chat_session(&identity.uid, &body.session, STARTING_BALANCE, CHAT_SESSION_LIMIT)
        .await?;
    Ok(Json(SessionsResponse { chats }))
}

/// POST /api/user/chats/delete
pub async fn delete_chat_session(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(body): Json<DeleteSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "delete_chat_session",
        uid = %uid_prefix(&identity.uid),
        session_id = %body.session_id,
        "Handler: POST /api/user/chats/delete"
    );

    let chats = state
        .repo
        .delete_chat_session(&identity.uid, &body.session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(SessionsResponse { chats }))
}

/// GET /api/user/chats
pub async fn list_chat_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<impl IntoResponse, AppError> {
    let chats = state.repo.chat_sessions(&identity.uid).await?;
    Ok(Json(SessionsResponse { chats }))
}
