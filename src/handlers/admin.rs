use axum::{extract::State, response::IntoResponse, Extension, Json};

use crate::error::AppError;
use crate::middleware::admin_auth::AdminIdentity;
use crate::models::account::{CreditsResponse, Role};
use crate::models::admin::{
    BlockRequest, BlockResponse, CreditAdjustment, CreditsRequest, DeleteResponse, RoleResponse,
    StatsResponse, TargetRequest, UsersResponse,
};
use crate::util::uid_prefix;
use crate::AppState;

/// GET /api/admin/stats
pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stats = state.repo.stats().await?;
    Ok(Json(StatsResponse { stats }))
}

/// GET /api/admin/users: newest accounts first.
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut users = state.repo.list_accounts().await?;
    for user in &mut users {
        user.balance = user.balance.max(0);
    }
    Ok(Json(UsersResponse { users }))
}

/// POST /api/admin/user/block
pub async fn block_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Json(body): Json<BlockRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "block_user",
        admin = %uid_prefix(&admin.uid),
        target = %uid_prefix(&body.target_uid),
        block = body.block,
        "Handler: POST /api/admin/user/block"
    );

    let is_blocked = state
        .repo
        .set_blocked(&body.target_uid, body.block)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(BlockResponse { is_blocked }))
}

/// POST /api/admin/user/delete: hard delete, history and chats included.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Json(body): Json<TargetRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "delete_user",
        admin = %uid_prefix(&admin.uid),
        target = %uid_prefix(&body.target_uid),
        "Handler: POST /api/admin/user/delete"
    );

    if !state.repo.delete_account(&body.target_uid).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(Json(DeleteResponse { deleted: true }))
}

/// POST /api/admin/user/credits: `add`, `set` or `reset`.
pub async fn adjust_credits(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Json(body): Json<CreditsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let adjustment =
        CreditAdjustment::parse(&body.action, body.amount).map_err(AppError::BadRequest)?;

    tracing::info!(
        handler = "adjust_credits",
        admin = %uid_prefix(&admin.uid),
        target = %uid_prefix(&body.target_uid),
        ?adjustment,
        "Handler: POST /api/admin/user/credits"
    );

    let credits = state
        .repo
        .adjust_credits(&body.target_uid, adjustment)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(CreditsResponse { credits }))
}

/// POST /api/admin/user/promote
pub async fn promote_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Json(body): Json<TargetRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "promote_user",
        admin = %uid_prefix(&admin.uid),
        target = %uid_prefix(&body.target_uid),
        "Handler: POST /api/admin/user/promote"
    );

    let user_type = state
        .repo
        .set_role(&body.target_uid, Role::Administrator)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(RoleResponse { user_type }))
}
