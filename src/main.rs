mod app;
mod config;
mod error;
mod extract;
mod geocode;
mod places;
mod state;
mod storage;
mod store;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "placeshare=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;
    tracing::info!(
        in_memory = app_state.config.database_url.is_none(),
        geocode_timeout_ms = app_state.config.geocode.timeout_ms,
        "state ready"
    );

    app::serve(app::build_app(app_state)).await
}
