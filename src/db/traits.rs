//! Storage capabilities the authentication core depends on.
//!
//! Each trait is a narrow slice of persistence so that an alternate backing
//! store (or a mock in tests) can stand in for [`crate::db::Storage`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::models::{App, RefreshSession, User};
use crate::error::StorageError;

#[async_trait]
pub trait UserSaver: Send + Sync {
    /// Fails with [`StorageError::AlreadyExists`] when the email is taken.
    async fn save_user(&self, email: &str, pass_hash: &str) -> Result<Uuid, StorageError>;
}

#[async_trait]
pub trait UserProvider: Send + Sync {
    async fn user_by_email(&self, email: &str) -> Result<User, StorageError>;

    async fn is_admin(&self, user_id: Uuid) -> Result<bool, StorageError>;
}

#[async_trait]
pub trait AppProvider: Send + Sync {
    async fn app(&self, app_id: i32) -> Result<App, StorageError>;
}

/// Result of an attempt to mark a refresh session as used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed,
    NotFound,
    Expired,
    AlreadyUsed,
}

#[async_trait]
pub trait RefreshSessionStore: Send + Sync {
    async fn insert_session(&self, session: &RefreshSession) -> Result<(), StorageError>;

    /// Marks the (user_id, token) session used if it is unused and not
    /// expired at `now`. The check and the mark must be a single atomic step:
    /// two concurrent calls for one token never both return `Consumed`.
    async fn consume_session(
        &self,
        user_id: Uuid,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StorageError>;
}

/// Everything [`crate::auth::AuthService`] needs from a store.
pub trait CredentialStore: UserSaver + UserProvider + AppProvider + RefreshSessionStore {}

impl<T> CredentialStore for T where T: UserSaver + UserProvider + AppProvider + RefreshSessionStore {}
