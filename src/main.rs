use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use tech_image_server::config::Config;
use tech_image_server::identity::verifier_from_config;
use tech_image_server::sqlite_repo::SqliteRepository;
use tech_image_server::upstream::openrouter::OpenRouterClient;
use tech_image_server::{build_app, db, with_body_limit, AppState};

fn build_cors(config: &Config) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to initialize database");

    tracing::info!("Database initialized at {}", config.database_url);

    let openrouter = Arc::new(
        OpenRouterClient::new(
            config.openrouter_api_key.clone(),
            &config.openrouter_url,
            config.image_model.clone(),
            config.chat_model.clone(),
        )
        .expect("Failed to build upstream client")
        .with_referer(config.public_url.clone()),
    );

    let repo = Arc::new(SqliteRepository::new(pool));
    let state = AppState::new(
        repo,
        Arc::from(verifier_from_config(&config)),
        openrouter.clone(),
        openrouter,
    )
    .with_bootstrap_admins(config.bootstrap_admins.clone());

    let app = with_body_limit(build_app(state), config.max_payload_bytes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_request(trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    trace::DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Millis),
                ),
        )
        .layer(build_cors(&config));

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutting down...");
}
