//! Error types for the Realty server.
//!
//! This module defines the error hierarchy used throughout the server,
//! providing type-safe error handling with meaningful error messages.
//!
//! # Error Types
//!
//! - [`ConfigError`] - Configuration-related errors (missing values, parse failures)
//! - [`ApiError`] - Request-level errors, each mapped to one HTTP status
//!
//! # Example
//!
//! ```rust
//! use realty_server::error::ApiError;
//!
//! fn find_home(id: i32) -> Result<(), ApiError> {
//!     Err(ApiError::not_found(format!("home {id} not found")))
//! }
//!
//! assert!(matches!(find_home(7), Err(ApiError::NotFound(_))));
//! ```

use std::error::Error;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::error;

/// Message returned for every failed signin, whatever the cause.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid Credentials";

/// Errors that occur during configuration loading and validation.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required configuration value is missing.
    #[error("missing required configuration: {0}")]
    Missing(String),

    /// A configuration value failed to parse or is invalid.
    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid {
        /// The configuration key that has an invalid value.
        key: String,
        /// Description of why the value is invalid.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a new missing configuration error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use realty_server::error::ConfigError;
    ///
    /// let err = ConfigError::missing("REALTY_JWT_SECRET");
    /// assert!(matches!(err, ConfigError::Missing(_)));
    /// ```
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing(key.into())
    }

    /// Creates a new invalid configuration error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use realty_server::error::ConfigError;
    ///
    /// let err = ConfigError::invalid("PORT", "must be a number between 1 and 65535");
    /// assert!(matches!(err, ConfigError::Invalid { .. }));
    /// ```
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error type returned by services and route handlers.
///
/// Every variant maps to exactly one HTTP status code (see
/// [`ApiError::status_code`]). Messages are safe to show to clients, except
/// for [`ApiError::Internal`] and [`ApiError::Config`] whose details are
/// logged and replaced by a generic message in the response.
#[derive(Debug)]
pub enum ApiError {
    /// The requested resource does not exist.
    NotFound(String),

    /// The request collides with existing state, such as a registered email.
    Conflict(String),

    /// Missing or invalid credentials, a role that may not perform the
    /// operation, a bad product key, or a caller that does not own the home.
    Unauthorized(String),

    /// Signin failed.
    ///
    /// Deliberately carries no detail so unknown emails and wrong passwords
    /// produce identical responses.
    InvalidCredentials,

    /// The request payload failed validation.
    Validation(String),

    /// The request body exceeds the configured size limit.
    PayloadTooLarge(String),

    /// Configuration error surfaced at runtime.
    Config(ConfigError),

    /// Unexpected internal server error.
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::InvalidCredentials => f.write_str(INVALID_CREDENTIALS_MESSAGE),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::PayloadTooLarge(msg) => write!(f, "payload too large: {msg}"),
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl ApiError {
    /// Creates a new not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a new conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a new unauthorized error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use realty_server::error::ApiError;
    ///
    /// let err = ApiError::unauthorized("caller does not own this home");
    /// assert!(matches!(err, ApiError::Unauthorized(_)));
    /// ```
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidCredentials | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code included in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Validation(_) => "validation_failed",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Config(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Config(_))
    }

    /// Message exposed to the client.
    fn public_message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Unauthorized(msg)
            | Self::Validation(msg)
            | Self::PayloadTooLarge(msg) => msg.clone(),
            Self::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),
            Self::Config(_) | Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            error!(error = %self, "Request failed with server error");
        }

        let body = ErrorResponse::new(self.public_message()).with_code(self.code());
        (self.status_code(), Json(body)).into_response()
    }
}

/// A specialized Result type for request handling.
pub type Result<T> = std::result::Result<T, ApiError>;
