use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use agendai::config::AppConfig;
use agendai::db;
use agendai::handlers;
use agendai::services::ai::openai::OpenAiProvider;
use agendai::services::ai::{DemoProvider, LlmProvider};
use agendai::services::session::InMemorySessionStore;
use agendai::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let llm: Box<dyn LlmProvider> = if config.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY not set - running with the demo provider");
        Box::new(DemoProvider)
    } else {
        tracing::info!("using OpenAI provider (model: {})", config.openai_model);
        Box::new(OpenAiProvider::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            config.llm_timeout,
        ))
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        llm,
        sessions: Box::new(InMemorySessionStore::new()),
    });

    // Idle booking dialogues are dropped after their TTL.
    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let removed = purge_state
                .sessions
                .purge_expired(chrono::Local::now().naive_local());
            if removed > 0 {
                tracing::info!(removed, "purged expired dialogue sessions");
            }
        }
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/message", post(handlers::webhook::message_webhook))
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/:id/delete",
            post(handlers::admin::delete_booking),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
