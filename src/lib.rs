pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, HttpResponse};
use tracing::info;

pub use error::{AppError, AuthError, SessionError, StorageError};
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, CredentialHasher, SessionManager};
pub use db::{Storage, TokenPair, User};

/// Health check endpoint handler
/// Returns server status, timestamp and database pool usage
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "database": state.storage.get_pool_status(),
    }))
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub storage: Storage,
    pub auth_service: Arc<AuthService<Storage>>,
}

impl AppState {
    /// Opens the database, applies migrations and provisions the configured
    /// applications before building the auth service.
    pub async fn new(config: Settings) -> Result<Self> {
        let storage = Storage::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;

        storage.migrate().await?;

        for app in &config.apps {
            storage.save_app(app).await?;
        }
        info!(apps = config.apps.len(), "Applications provisioned");

        let hasher = CredentialHasher::new(&config.hashing, num_cpus::get())
            .map_err(|e| AppError::ConfigError(format!("invalid hashing parameters: {e}")))?;

        let auth_service =
            AuthService::new(Arc::new(storage.clone()), config.auth.clone(), hasher).await?;

        Ok(Self {
            config: Arc::new(config),
            storage,
            auth_service: Arc::new(auth_service),
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        // Close database connections
        self.storage.close().await;
        Ok(())
    }
}
