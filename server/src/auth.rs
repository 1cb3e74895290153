//! Authentication primitives: password hashing, product keys, session tokens.
//!
//! # Overview
//!
//! - Passwords are stored as bcrypt hashes.
//! - A *product key* is the bcrypt hash of `"{email}-{ROLE}-{secret}"`, with
//!   the email exactly as the client sent it. It is handed out of band to
//!   prospective realtors and admins, who present it at signup. Verification
//!   recomputes the input string and checks it against the presented hash.
//! - bcrypt only reads the first [`BCRYPT_MAX_INPUT`] bytes of its input.
//!   Longer passwords and product-key inputs are refused instead of being
//!   silently truncated, which would drop the secret off the end of a
//!   product key.
//! - Session tokens are HS256 JWTs carrying `{name, id, iat, exp}`.
//!
//! Secrets live in [`AuthKeys`], built from [`Config`] and injected into the
//! services that need them. bcrypt work runs on the blocking thread pool.
//!
//! # Example
//!
//! ```rust
//! use realty_server::auth::AuthKeys;
//!
//! let keys = AuthKeys::new("jwt-secret", "product-secret", 3600, 4);
//! let token = keys.issue_token("Jane", 42).unwrap();
//! let claims = keys.verify_token(&token).unwrap();
//! assert_eq!(claims.id, 42);
//! assert_eq!(claims.name, "Jane");
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::ApiError;
use crate::types::UserRole;

/// Number of input bytes bcrypt actually hashes.
pub const BCRYPT_MAX_INPUT: usize = 72;

/// Errors raised by the authentication primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token is malformed or its signature does not verify.
    #[error("invalid token")]
    InvalidToken,

    /// The token verified but its `exp` claim is in the past.
    #[error("token expired")]
    ExpiredToken,

    /// bcrypt failed to hash its input.
    #[error("hashing failed: {0}")]
    Hashing(String),

    /// The token could not be signed.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// The blocking hashing task did not complete.
    #[error("hashing task failed: {0}")]
    Blocking(String),

    /// The named input exceeds what bcrypt can hash without truncation.
    #[error("{0} is too long")]
    InputTooLong(&'static str),
}

impl AuthError {
    /// Returns `true` if the error is the caller's fault (bad or stale token).
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::InvalidToken | Self::ExpiredToken)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_token_error() {
            ApiError::unauthorized(err.to_string())
        } else if let AuthError::InputTooLong(_) = err {
            ApiError::validation(err.to_string())
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

/// Claims carried by a session token.
///
/// This is also the caller identity returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub name: String,
    pub id: i32,
    pub iat: i64,
    pub exp: i64,
}

/// Secrets and cost parameters shared by every auth operation.
#[derive(Clone)]
pub struct AuthKeys {
    inner: Arc<KeysInner>,
}

struct KeysInner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    product_key_secret: Zeroizing<String>,
    token_ttl_secs: u64,
    bcrypt_cost: u32,
}

impl fmt::Debug for AuthKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthKeys")
            .field("token_ttl_secs", &self.inner.token_ttl_secs)
            .field("bcrypt_cost", &self.inner.bcrypt_cost)
            .finish_non_exhaustive()
    }
}

impl AuthKeys {
    /// Builds keys from raw secrets.
    pub fn new(
        jwt_secret: &str,
        product_key_secret: &str,
        token_ttl_secs: u64,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            inner: Arc::new(KeysInner {
                encoding: EncodingKey::from_secret(jwt_secret.as_bytes()),
                decoding: DecodingKey::from_secret(jwt_secret.as_bytes()),
                product_key_secret: Zeroizing::new(product_key_secret.to_string()),
                token_ttl_secs,
                bcrypt_cost,
            }),
        }
    }

    /// Builds keys from the server configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            &config.product_key_secret,
            config.token_ttl_secs,
            config.bcrypt_cost,
        )
    }

    /// Session token lifetime in seconds.
    pub fn token_ttl_secs(&self) -> u64 {
        self.inner.token_ttl_secs
    }

    /// Signs a session token for the given user.
    pub fn issue_token(&self, name: &str, id: i32) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(self.inner.token_ttl_secs)
            .map_err(|_| AuthError::Signing("token lifetime out of range".to_string()))?;
        let claims = Claims {
            name: name.to_string(),
            id,
            iat,
            exp: iat.saturating_add(ttl),
        };
        self.sign_claims(&claims)
    }

    fn sign_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.inner.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }

    /// Verifies a token's signature and expiry and returns its claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.inner.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })
    }

    /// Hashes a password for storage.
    pub async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        ensure_hashable(password, "password")?;
        let password = Zeroizing::new(password.to_string());
        let cost = self.inner.bcrypt_cost;
        run_blocking(move || {
            bcrypt::hash(password.as_bytes(), cost).map_err(|e| AuthError::Hashing(e.to_string()))
        })
        .await
    }

    /// Checks a password against a stored hash.
    ///
    /// A malformed stored hash, or a password too long to have been
    /// hashed in the first place, counts as a mismatch.
    pub async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        if password.len() > BCRYPT_MAX_INPUT {
            return Ok(false);
        }
        let password = Zeroizing::new(password.to_string());
        let hash = hash.to_string();
        run_blocking(move || Ok(bcrypt::verify(password.as_bytes(), &hash).unwrap_or(false))).await
    }

    /// Generates the product key a user with `email` needs to sign up as `role`.
    pub async fn generate_product_key(
        &self,
        email: &str,
        role: UserRole,
    ) -> Result<String, AuthError> {
        let material = self.product_key_material(email, role)?;
        let cost = self.inner.bcrypt_cost;
        run_blocking(move || {
            bcrypt::hash(material.as_bytes(), cost).map_err(|e| AuthError::Hashing(e.to_string()))
        })
        .await
    }

    /// Checks a presented product key for `email` and `role`.
    ///
    /// Keys that are not well-formed bcrypt hashes are rejected. Fails with
    /// [`AuthError::InputTooLong`] when the email is too long for the secret
    /// to fall inside the hashed bytes.
    pub async fn verify_product_key(
        &self,
        email: &str,
        role: UserRole,
        product_key: &str,
    ) -> Result<bool, AuthError> {
        let material = self.product_key_material(email, role)?;
        let product_key = product_key.to_string();
        run_blocking(move || Ok(bcrypt::verify(material.as_bytes(), &product_key).unwrap_or(false)))
            .await
    }

    fn product_key_material(
        &self,
        email: &str,
        role: UserRole,
    ) -> Result<Zeroizing<String>, AuthError> {
        let material = Zeroizing::new(format!(
            "{email}-{role}-{}",
            self.inner.product_key_secret.as_str()
        ));
        ensure_hashable(&material, "email")?;
        Ok(material)
    }
}

fn ensure_hashable(input: &str, what: &'static str) -> Result<(), AuthError> {
    if input.len() > BCRYPT_MAX_INPUT {
        return Err(AuthError::InputTooLong(what));
    }
    Ok(())
}

/// Runs CPU-bound bcrypt work off the async worker threads.
async fn run_blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AuthError::Blocking(err.to_string()))?
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively; an empty token yields `None`.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
