use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::models::{App, RefreshSession, User};
use crate::db::traits::{AppProvider, ConsumeOutcome, RefreshSessionStore, UserProvider, UserSaver};
use crate::error::StorageError;

/// SQLite-backed credential store.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn get_pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts or updates a relying-party application. Applications are
    /// provisioned from configuration; the auth flows only ever read them.
    pub async fn save_app(&self, app: &App) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO apps (id, name, secret)
            VALUES (?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, secret = excluded.secret
            "#,
        )
        .bind(app.id)
        .bind(&app.name)
        .bind(&app.secret)
        .execute(&self.pool)
        .await?;

        debug!(app_id = app.id, "Application provisioned");
        Ok(())
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, StorageError> {
    let raw_id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&raw_id)
        .map_err(|e| StorageError::QueryError(format!("malformed user id {raw_id}: {e}")))?;

    Ok(User {
        id,
        email: row.try_get("email")?,
        pass_hash: row.try_get("pass_hash")?,
        is_admin: row.try_get("is_admin")?,
    })
}

#[async_trait]
impl UserSaver for Storage {
    async fn save_user(&self, email: &str, pass_hash: &str) -> Result<Uuid, StorageError> {
        let id = Uuid::new_v4();

        sqlx::query("INSERT INTO users (id, email, pass_hash) VALUES (?, ?, ?)")
            .bind(id.to_string())
            .bind(email)
            .bind(pass_hash)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }
}

#[async_trait]
impl UserProvider for Storage {
    async fn user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let row = sqlx::query("SELECT id, email, pass_hash, is_admin FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;

        user_from_row(&row)
    }

    async fn is_admin(&self, user_id: Uuid) -> Result<bool, StorageError> {
        sqlx::query_scalar::<_, bool>("SELECT is_admin FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl AppProvider for Storage {
    async fn app(&self, app_id: i32) -> Result<App, StorageError> {
        sqlx::query_as::<_, App>("SELECT id, name, secret FROM apps WHERE id = ?")
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl RefreshSessionStore for Storage {
    async fn insert_session(&self, session: &RefreshSession) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO refresh_sessions (token, user_id, expires_at, used) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id.to_string())
        .bind(session.expires_at.timestamp())
        .bind(session.used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_session(
        &self,
        user_id: Uuid,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StorageError> {
        let now = now.timestamp();
        let user_id = user_id.to_string();

        // Check-and-mark in one statement; only the writer that flips the row wins
        let result = sqlx::query(
            r#"
            UPDATE refresh_sessions SET used = 1
            WHERE token = ? AND user_id = ? AND used = 0 AND expires_at > ?
            "#,
        )
        .bind(token)
        .bind(&user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ConsumeOutcome::Consumed);
        }

        // Diagnostic read only: it classifies the failure, never grants success
        let row = sqlx::query_as::<_, (i64, bool)>(
            "SELECT expires_at, used FROM refresh_sessions WHERE token = ? AND user_id = ?",
        )
        .bind(token)
        .bind(&user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => ConsumeOutcome::NotFound,
            Some((expires_at, _)) if now >= expires_at => ConsumeOutcome::Expired,
            Some(_) => ConsumeOutcome::AlreadyUsed,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}
