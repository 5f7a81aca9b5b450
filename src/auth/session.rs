//! Refresh-session lifecycle.
//!
//! A session is created `Valid` and ends in exactly one terminal state:
//! `Used` once consumed, or `Expired` once its TTL has elapsed (noticed lazily
//! on the next consumption attempt). Nothing revives a dead session.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::auth::tokens;
use crate::db::models::RefreshSession;
use crate::db::traits::{ConsumeOutcome, RefreshSessionStore};
use crate::error::{SessionError, StorageError};

pub struct SessionManager<S> {
    store: Arc<S>,
}

impl<S> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RefreshSessionStore> SessionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persists a fresh, unused session holding a newly drawn refresh token.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<RefreshSession, StorageError> {
        let session = RefreshSession::new(user_id, tokens::issue_refresh_token(), ttl);
        self.store.insert_session(&session).await?;

        debug!(%user_id, expires_at = %session.expires_at, "Refresh session created");
        Ok(session)
    }

    /// Spends the session. At most one caller ever succeeds for a given token;
    /// the store performs the check and the mark atomically.
    pub async fn validate_and_consume(&self, user_id: Uuid, token: &str) -> Result<(), SessionError> {
        match self.store.consume_session(user_id, token, Utc::now()).await? {
            ConsumeOutcome::Consumed => Ok(()),
            ConsumeOutcome::NotFound => Err(SessionError::NotFound),
            ConsumeOutcome::Expired => Err(SessionError::Expired),
            ConsumeOutcome::AlreadyUsed => Err(SessionError::AlreadyUsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use mockall::mock;

    mock! {
        pub SessionStore {}

        #[async_trait]
        impl RefreshSessionStore for SessionStore {
            async fn insert_session(&self, session: &RefreshSession) -> Result<(), StorageError>;
            async fn consume_session(
                &self,
                user_id: Uuid,
                token: &str,
                now: DateTime<Utc>,
            ) -> Result<ConsumeOutcome, StorageError>;
        }
    }

    fn manager_returning(outcome: ConsumeOutcome) -> SessionManager<MockSessionStore> {
        let mut store = MockSessionStore::new();
        store
            .expect_consume_session()
            .times(1)
            .returning(move |_, _, _| Ok(outcome));
        SessionManager::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_create_session_persists_unused_row() {
        let mut store = MockSessionStore::new();
        store
            .expect_insert_session()
            .times(1)
            .withf(|session| !session.used && session.token.len() == 43)
            .returning(|_| Ok(()));
        let manager = SessionManager::new(Arc::new(store));

        let user_id = Uuid::new_v4();
        let before = Utc::now();
        let session = manager.create_session(user_id, Duration::hours(1)).await.unwrap();

        assert_eq!(session.user_id, user_id);
        assert!(session.expires_at > before + Duration::minutes(59));
        assert!(session.expires_at <= Utc::now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_create_session_surfaces_storage_failure() {
        let mut store = MockSessionStore::new();
        store
            .expect_insert_session()
            .returning(|_| Err(StorageError::AlreadyExists));
        let manager = SessionManager::new(Arc::new(store));

        let err = manager.create_session(Uuid::new_v4(), Duration::hours(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_consume_outcomes_map_to_session_errors() {
        let user_id = Uuid::new_v4();

        assert!(manager_returning(ConsumeOutcome::Consumed)
            .validate_and_consume(user_id, "t")
            .await
            .is_ok());
        assert!(matches!(
            manager_returning(ConsumeOutcome::NotFound).validate_and_consume(user_id, "t").await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            manager_returning(ConsumeOutcome::Expired).validate_and_consume(user_id, "t").await,
            Err(SessionError::Expired)
        ));
        assert!(matches!(
            manager_returning(ConsumeOutcome::AlreadyUsed).validate_and_consume(user_id, "t").await,
            Err(SessionError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_consume_storage_failure_is_wrapped() {
        let mut store = MockSessionStore::new();
        store
            .expect_consume_session()
            .returning(|_, _, _| Err(StorageError::ConnectionError("pool closed".into())));
        let manager = SessionManager::new(Arc::new(store));

        let err = manager.validate_and_consume(Uuid::new_v4(), "t").await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::ConnectionError(_))));
    }
}
