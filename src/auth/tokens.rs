//! Access and refresh token issuance.
//!
//! Access tokens are HS256 JWTs signed with the requesting application's
//! secret, so a relying party can verify them without calling back. Refresh
//! tokens are opaque random strings whose state lives in the session store.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entropy per refresh token; encodes to 43 URL-safe characters.
pub const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: Uuid,    // User ID
    pub app_id: i32,
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
}

pub fn issue_access_token(
    user_id: Uuid,
    app_id: i32,
    ttl: Duration,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id,
        app_id,
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Checks signature and expiry; this is what a relying party runs.
pub fn verify_access_token(
    token: &str,
    secret: &str,
) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;

    Ok(data.claims)
}

pub fn issue_refresh_token() -> String {
    let mut buffer = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}
