//! Authentication core.
//!
//! Credential verification, token issuance and refresh-token rotation,
//! plus the HTTP handlers exposing them.

pub mod handlers;
pub mod password;
pub mod service;
pub mod session;
pub mod tokens;

pub use password::CredentialHasher;
pub use service::{parse_user_id, AuthService};
pub use session::SessionManager;
pub use tokens::{issue_access_token, issue_refresh_token, verify_access_token, AccessClaims};
