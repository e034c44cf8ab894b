pub mod config;
pub mod db;
pub mod error;
pub mod handle;
pub mod handlers;
pub mod identity;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod sqlite_repo;
pub mod upstream;
pub mod util;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use identity::IdentityVerifier;
use ledger::CreditLedger;
use repository::AccountRepository;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use upstream::{ChatProvider, ImageProvider};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn AccountRepository>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub ledger: CreditLedger,
    pub chat: Arc<dyn ChatProvider>,
    /// Identity keys promoted to administrator when they sync.
    pub bootstrap_admins: Arc<[String]>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        identity: Arc<dyn IdentityVerifier>,
        images: Arc<dyn ImageProvider>,
        chat: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            ledger: CreditLedger::new(repo.clone(), images),
            repo,
            identity,
            chat,
            bootstrap_admins: Arc::from(Vec::new()),
        }
    }

    pub fn with_bootstrap_admins(mut self, uids: Vec<String>) -> Self {
        self.bootstrap_admins = Arc::from(uids);
        self
    }
}

fn user_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/user/sync", post(handlers::accounts::sync_account))
        .route("/api/user/update", post(handlers::accounts::update_profile))
        .route("/api/user/settings", post(handlers::accounts::update_settings))
        .route(
            "/api/user/credits/deduct",
            post(handlers::accounts::deduct_credit),
        )
        .route("/api/user/history", get(handlers::accounts::get_history))
        .route(
            "/api/user/set-username",
            post(handlers::accounts::set_handle),
        )
        .route("/api/user/info", get(handlers::accounts::get_info))
        .route("/api/user/chats", get(handlers::accounts::list_chat_sessions))
        .route(
            "/api/user/chats/save",
            post(handlers::accounts::save_chat_session),
        )
        .route(
            "/api/user/chats/delete",
            post(handlers::accounts::delete_chat_session),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_identity,
        ))
}

fn generation_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/generate", post(handlers::generate::generate))
        .route("/api/chat", post(handlers::chat::chat))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::optional_identity,
        ))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(handlers::health::health_check))
        .route(
            "/api/user/check-username/:username",
            get(handlers::accounts::check_handle),
        )
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/stats", get(handlers::admin::get_stats))
        .route("/api/admin/users", get(handlers::admin::list_users))
        .route("/api/admin/user/block", post(handlers::admin::block_user))
        .route("/api/admin/user/delete", post(handlers::admin::delete_user))
        .route(
            "/api/admin/user/credits",
            post(handlers::admin::adjust_credits),
        )
        .route(
            "/api/admin/user/promote",
            post(handlers::admin::promote_user),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth::require_admin,
        ))
}

/// Build the full application router (used by main and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(user_routes(&state))
        .merge(generation_routes(&state))
        .merge(public_routes())
        .merge(admin_routes(&state))
        .fallback(handlers::not_found)
        .with_state(state)
}

/// Cap request bodies at `max_bytes`, replacing axum's 2 MB extractor default.
pub fn with_body_limit(app: Router, max_bytes: usize) -> Router {
    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_bytes))
}
