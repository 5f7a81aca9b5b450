//! Password hashing and verification.
//!
//! Argon2id is CPU and memory heavy, so every hash and verify runs on the
//! blocking thread pool behind a semaphore sized to the number of cores.
//! Request handlers never block on it directly.

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::HashingConfig;
use crate::error::AuthError;

#[derive(Clone)]
pub struct CredentialHasher {
    argon: Argon2<'static>,
    permits: Arc<Semaphore>,
}

impl CredentialHasher {
    pub fn new(config: &HashingConfig, workers: usize) -> Result<Self, argon2::Error> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)?;

        Ok(Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        })
    }

    /// Produces a salted PHC string (`$argon2id$...`).
    pub async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_owned();

        self.run(move |argon| {
            let salt = SaltString::generate(&mut OsRng);
            argon
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .await?
        .map_err(|e| AuthError::internal("password.hash", e))
    }

    /// Constant-time comparison against a stored PHC string. The cost
    /// parameters are taken from the stored hash itself.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let password = password.to_owned();
        let stored_hash = stored_hash.to_owned();

        self.run(move |argon| match PasswordHash::new(&stored_hash) {
            Ok(parsed) => argon.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                warn!(error = %e, "Stored password hash is malformed");
                false
            }
        })
        .await
    }

    async fn run<T, F>(&self, job: F) -> Result<T, AuthError>
    where
        F: FnOnce(&Argon2<'static>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| AuthError::internal("password.acquire", e))?;

        // The permit travels with the job, so a dropped caller cannot free a
        // slot while its hash is still running
        let argon = self.argon.clone();
        tokio::task::spawn_blocking(move || {
            let output = job(&argon);
            drop(permit);
            output
        })
        .await
        .map_err(|e| AuthError::internal("password.join", e))
    }
}
