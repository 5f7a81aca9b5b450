use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use sso_server::auth::handlers;
use sso_server::{health_check, AppState, Settings};
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging, RUST_LOG overrides the default level
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new().context("failed to load configuration")?;
    info!(environment = %config.environment, "Configuration loaded successfully");

    let state = AppState::new(config.clone())
        .await
        .context("failed to initialize application state")?;
    let data = web::Data::new(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting server at {}", addr);

    let result = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/health", web::get().to(health_check))
            .configure(handlers::configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .context("HTTP server terminated with an error");

    info!("Server stopped, closing database connections");
    state.shutdown().await.context("failed to shut down cleanly")?;

    result
}
