use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub pass_hash: String,
    pub is_admin: bool,
}

/// A relying party allowed to request tokens. Access tokens for it are
/// signed with `secret`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, FromRow)]
pub struct App {
    pub id: i32,
    pub name: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl RefreshSession {
    /// Sessions are persisted with second precision, so the expiry is truncated
    /// here to keep the in-memory value equal to the stored one.
    pub fn new(user_id: Uuid, token: String, ttl: Duration) -> Self {
        let expires_at = Utc::now() + ttl;
        Self {
            token,
            user_id,
            expires_at: from_unix(expires_at.timestamp()),
            used: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_unused_and_second_aligned() {
        let session = RefreshSession::new(Uuid::new_v4(), "tok".into(), Duration::minutes(5));
        assert!(!session.used);
        assert_eq!(session.expires_at.timestamp_subsec_nanos(), 0);
        assert!(!session.is_expired_at(Utc::now()));
        assert!(session.is_expired_at(session.expires_at));
    }

    #[test]
    fn test_zero_ttl_session_is_already_expired() {
        let session = RefreshSession::new(Uuid::new_v4(), "tok".into(), Duration::zero());
        assert!(session.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_user_serialization_hides_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            pass_hash: "$argon2id$secret".into(),
            is_admin: false,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("pass_hash").is_none());
        assert_eq!(json["email"], "a@x.com");
    }
}
