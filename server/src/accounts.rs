//! Account service: signup, signin, product keys and caller identity.
//!
//! Emails are normalized (trimmed, lower-cased) before they are stored or
//! looked up, so `Agent@Example.com` and `agent@example.com` name the same
//! account. Product keys are derived from the email exactly as the client
//! sent it, so a key only matches the spelling it was issued for.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::{AuthKeys, Claims, BCRYPT_MAX_INPUT};
use crate::error::{ApiError, Result};
use crate::store::{Repository, StoreError};
use crate::types::{
    NewUser, ProductKeyRequest, ProductKeyResponse, SigninRequest, SignupRequest, TokenResponse,
    UserRole,
};

/// Shortest password accepted at signup.
pub const MIN_PASSWORD_LEN: usize = 5;

/// Signup, signin and product-key operations over a [`Repository`].
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Repository>,
    keys: AuthKeys,
}

impl fmt::Debug for AccountService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountService")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl AccountService {
    pub fn new(store: Arc<dyn Repository>, keys: AuthKeys) -> Self {
        Self { store, keys }
    }

    /// Registers a user with `role` and returns a session token.
    ///
    /// Non-buyer roles must present the product key issued for their email
    /// and role. Fails with `Conflict` when the email is already registered.
    pub async fn signup(&self, request: SignupRequest, role: UserRole) -> Result<TokenResponse> {
        validate_signup(&request)?;
        let email = normalize_email(&request.email);

        if role.requires_product_key() {
            let Some(product_key) = request.product_key.as_deref() else {
                debug!(role = %role, "Signup rejected: product key missing");
                return Err(ApiError::unauthorized("a product key is required for this role"));
            };
            let valid = self
                .keys
                .verify_product_key(&request.email, role, product_key.trim())
                .await?;
            if !valid {
                debug!(role = %role, "Signup rejected: product key mismatch");
                return Err(ApiError::unauthorized("invalid product key"));
            }
        }

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ApiError::conflict("email already registered"));
        }

        let password_hash = self.keys.hash_password(&request.password).await?;
        let user = self
            .store
            .insert_user(NewUser {
                name: request.name.trim().to_string(),
                email,
                phone: request.phone.trim().to_string(),
                password_hash,
                role,
            })
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => ApiError::conflict("email already registered"),
                other => ApiError::from(other),
            })?;

        info!(
            user_id = user.id,
            role = %user.role,
            expires_in_secs = self.keys.token_ttl_secs(),
            "User signed up"
        );
        let token = self.keys.issue_token(&user.name, user.id)?;
        Ok(TokenResponse { token })
    }

    /// Verifies credentials and returns a session token.
    ///
    /// Unknown emails and wrong passwords both yield
    /// [`ApiError::InvalidCredentials`].
    pub async fn signin(&self, request: SigninRequest) -> Result<TokenResponse> {
        let email = normalize_email(&request.email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            debug!("Signin failed");
            return Err(ApiError::InvalidCredentials);
        };

        if !self
            .keys
            .verify_password(&request.password, &user.password_hash)
            .await?
        {
            debug!("Signin failed");
            return Err(ApiError::InvalidCredentials);
        }

        info!(
            user_id = user.id,
            expires_in_secs = self.keys.token_ttl_secs(),
            "User signed in"
        );
        let token = self.keys.issue_token(&user.name, user.id)?;
        Ok(TokenResponse { token })
    }

    /// Issues the product key `email` must present to sign up as the requested role.
    pub async fn generate_product_key(
        &self,
        request: ProductKeyRequest,
    ) -> Result<ProductKeyResponse> {
        validate_email(&request.email)?;
        let product_key = self
            .keys
            .generate_product_key(&request.email, request.role)
            .await?;
        info!(role = %request.role, "Product key generated");
        Ok(ProductKeyResponse { product_key })
    }

    /// Identity of the caller, as carried by their verified token.
    pub fn me(&self, caller: Claims) -> Claims {
        caller
    }

    /// Role of the user a verified token refers to.
    ///
    /// Fails with `Unauthorized` when that user no longer exists.
    pub async fn caller_role(&self, user_id: i32) -> Result<UserRole> {
        match self.store.find_user_by_id(user_id).await? {
            Some(user) => Ok(user.role),
            None => {
                warn!(user_id, "Token refers to a user that does not exist");
                Err(ApiError::unauthorized("unknown user"))
            }
        }
    }
}

/// Trims and lower-cases an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_signup(request: &SignupRequest) -> Result<()> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if request.phone.trim().is_empty() {
        return Err(ApiError::validation("phone must not be empty"));
    }
    validate_email(&request.email)?;
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if request.password.len() > BCRYPT_MAX_INPUT {
        return Err(ApiError::validation(format!(
            "password must be at most {BCRYPT_MAX_INPUT} bytes"
        )));
    }
    if request
        .product_key
        .as_deref()
        .is_some_and(|key| key.trim().is_empty())
    {
        return Err(ApiError::validation("productKey must not be empty"));
    }
    Ok(())
}

/// Accepts `local@domain.tld`: one `@`, no whitespace, a dotted domain.
fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && domain.split('.').all(|label| !label.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if well_formed {
        Ok(())
    } else {
        Err(ApiError::validation("email must be a valid address"))
    }
}
