//! Persistence for users, applications and refresh sessions.
//!
//! The auth core only talks to the capability traits in [`traits`];
//! [`Storage`] is the SQLite implementation used by the server.

pub mod models;
pub mod operations;
pub mod traits;

pub use models::{App, RefreshSession, TokenPair, User};
pub use operations::{DbPoolStatus, Storage};
pub use traits::{
    AppProvider, ConsumeOutcome, CredentialStore, RefreshSessionStore, UserProvider, UserSaver,
};
