use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::CredentialHasher;
use crate::auth::session::SessionManager;
use crate::auth::tokens;
use crate::config::AuthConfig;
use crate::db::models::{App, TokenPair};
use crate::db::traits::CredentialStore;
use crate::error::{AuthError, SessionError, StorageError};

const MAX_EMAIL_LEN: usize = 254;

/// Register, login, refresh and admin checks on top of a credential store.
///
/// Holds no mutable state of its own; any number of instances may share one
/// backing store.
pub struct AuthService<S> {
    store: Arc<S>,
    sessions: SessionManager<S>,
    hasher: CredentialHasher,
    config: AuthConfig,
    // Verified against when the email is unknown, so both login failures cost the same
    dummy_hash: String,
}

impl<S: CredentialStore + 'static> AuthService<S> {
    pub async fn new(
        store: Arc<S>,
        config: AuthConfig,
        hasher: CredentialHasher,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hasher.hash(&tokens::issue_refresh_token()).await?;

        Ok(Self {
            sessions: SessionManager::new(Arc::clone(&store)),
            store,
            hasher,
            config,
            dummy_hash,
        })
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<Uuid, AuthError> {
        let email = validate_email(email)?;
        self.validate_password(password)?;

        let pass_hash = self.hasher.hash(password).await?;

        match self.store.save_user(email, &pass_hash).await {
            Ok(user_id) => {
                info!(%user_id, "User registered");
                Ok(user_id)
            }
            Err(StorageError::AlreadyExists) => {
                warn!("Registration rejected: email already registered");
                Err(AuthError::UserExists)
            }
            Err(e) => Err(AuthError::internal("auth.register", e)),
        }
    }

    pub async fn login(&self, email: &str, password: &str, app_id: i32) -> Result<TokenPair, AuthError> {
        let email = validate_email(email)?;
        self.validate_password(password)?;
        validate_app_id(app_id)?;

        let user = match self.store.user_by_email(email).await {
            Ok(user) => Some(user),
            Err(StorageError::NotFound) => None,
            Err(e) => return Err(AuthError::internal("auth.login", e)),
        };

        // Always pay for one verification so an unknown email is not faster
        let stored_hash = user
            .as_ref()
            .map_or(self.dummy_hash.as_str(), |u| u.pass_hash.as_str());
        let password_ok = self.hasher.verify(password, stored_hash).await?;

        let user = match user {
            Some(user) if password_ok => user,
            _ => {
                info!(app_id, "Login rejected: invalid credentials");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let app = self.app(app_id).await?;
        let pair = self.issue_pair(user.id, &app).await?;

        info!(user_id = %user.id, app_id, "User logged in");
        Ok(pair)
    }

    /// Spends `refresh_token` and hands out a brand-new pair. The spent token
    /// is dead for good, so a leaked token can be replayed at most once.
    pub async fn refresh_token_pair(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        app_id: i32,
    ) -> Result<TokenPair, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidArgument("refresh token is required".into()));
        }
        validate_app_id(app_id)?;

        // Resolve the app first so a bad app id does not burn the token
        let app = self.app(app_id).await?;

        match self.sessions.validate_and_consume(user_id, refresh_token).await {
            Ok(()) => {}
            Err(SessionError::NotFound) => {
                info!(%user_id, "Refresh rejected: token not found");
                return Err(AuthError::RefreshTokenNotFound);
            }
            Err(SessionError::Expired) => {
                info!(%user_id, "Refresh rejected: token expired");
                return Err(AuthError::RefreshTokenDead);
            }
            Err(SessionError::AlreadyUsed) => {
                warn!(%user_id, "Refresh rejected: token already used, possible replay");
                return Err(AuthError::RefreshTokenDead);
            }
            Err(SessionError::Storage(e)) => {
                return Err(AuthError::internal("auth.refresh", e));
            }
        }

        let pair = self.issue_pair(user_id, &app).await?;
        info!(%user_id, app_id, "Token pair rotated");
        Ok(pair)
    }

    pub async fn is_admin(&self, user_id: Uuid) -> Result<bool, AuthError> {
        match self.store.is_admin(user_id).await {
            Ok(is_admin) => Ok(is_admin),
            Err(StorageError::NotFound) => Err(AuthError::UserNotFound),
            Err(e) => Err(AuthError::internal("auth.is_admin", e)),
        }
    }

    async fn app(&self, app_id: i32) -> Result<App, AuthError> {
        match self.store.app(app_id).await {
            Ok(app) => Ok(app),
            Err(StorageError::NotFound) => {
                warn!(app_id, "Unknown application");
                Err(AuthError::AppNotFound)
            }
            Err(e) => Err(AuthError::internal("auth.app", e)),
        }
    }

    async fn issue_pair(&self, user_id: Uuid, app: &App) -> Result<TokenPair, AuthError> {
        let access_token =
            tokens::issue_access_token(user_id, app.id, self.config.access_ttl(), &app.secret)
                .map_err(|e| AuthError::internal("auth.access_token", e))?;

        let session = self
            .sessions
            .create_session(user_id, self.config.refresh_ttl())
            .await
            .map_err(|e| AuthError::internal("auth.create_session", e))?;

        Ok(TokenPair {
            access_token,
            refresh_token: session.token,
        })
    }

    fn validate_password(&self, password: &str) -> Result<(), AuthError> {
        if password.is_empty() {
            return Err(AuthError::InvalidArgument("password is required".into()));
        }
        if password.len() > self.config.password_max_len {
            return Err(AuthError::InvalidArgument("password is too long".into()));
        }
        Ok(())
    }
}

/// Parses a user id received as text from a transport.
pub fn parse_user_id(raw: &str) -> Result<Uuid, AuthError> {
    if raw.trim().is_empty() {
        return Err(AuthError::InvalidArgument("user id is required".into()));
    }
    Uuid::parse_str(raw.trim()).map_err(|_| AuthError::InvalidArgument("user id is malformed".into()))
}

fn validate_email(email: &str) -> Result<&str, AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::InvalidArgument("email is required".into()));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(AuthError::InvalidArgument("email is too long".into()));
    }
    if !email.contains('@') {
        return Err(AuthError::InvalidArgument("email is malformed".into()));
    }
    Ok(email)
}

fn validate_app_id(app_id: i32) -> Result<(), AuthError> {
    if app_id == 0 {
        return Err(AuthError::InvalidArgument("app_id is required".into()));
    }
    Ok(())
}
