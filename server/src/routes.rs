//! HTTP route handlers for the Realty server.
//!
//! This module defines the axum router and handlers for:
//! - `/home` - Home listings (public reads, realtor-gated writes)
//! - `/auth/*` - Signup, signin, product keys and caller identity
//! - `/health` - Health check endpoint
//!
//! # Authorization
//!
//! Protected routes extract an [`AuthUser`] from the
//! `Authorization: Bearer <token>` header. Mutations then pass the role gate
//! and, for update and delete, the ownership gate from [`crate::policy`]
//! before any service method runs. Request bodies are parsed only after the
//! gates, so a caller who may not touch a home always gets 401, whatever the
//! payload.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, FromRequestParts, Path, Query, State,
    },
    http::{header, request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::accounts::AccountService;
use crate::auth::{bearer_token, AuthKeys, Claims};
use crate::config::Config;
use crate::error::ApiError;
use crate::homes::HomeService;
use crate::policy::{ensure_home_owner, ensure_role, CREATE_HOME_ROLES, MUTATE_HOME_ROLES};
use crate::store::{MemoryRepository, Repository};
use crate::types::{
    CreateHomeRequest, HomeFilters, HomeResponse, ProductKeyRequest, ProductKeyResponse,
    SigninRequest, SignupRequest, TokenResponse, UpdateHomeRequest, UserRole,
};

/// Maximum request body size (1 MiB).
const MAX_BODY_SIZE: usize = 1024 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cloned into every handler; all fields are reference-counted.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// Storage backend, used directly only by the health check.
    pub store: Arc<dyn Repository>,

    /// Token and product-key secrets.
    pub keys: AuthKeys,

    /// Signup, signin and caller lookups.
    pub accounts: AccountService,

    /// Home listing operations.
    pub homes: HomeService,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state over the given storage backend.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use realty_server::config::Config;
    /// use realty_server::routes::AppState;
    /// use realty_server::store::MemoryRepository;
    ///
    /// let config = Config::from_env().expect("failed to load config");
    /// let state = AppState::new(config, Arc::new(MemoryRepository::new()));
    /// ```
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn Repository>) -> Self {
        let keys = AuthKeys::from_config(&config);
        Self {
            config: Arc::new(config),
            accounts: AccountService::new(store.clone(), keys.clone()),
            homes: HomeService::new(store.clone()),
            store,
            keys,
            start_time: Instant::now(),
        }
    }

    /// Creates application state backed by a fresh in-memory store.
    #[must_use]
    pub fn with_memory_store(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryRepository::new()))
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("storage", &self.config.storage_label())
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the axum router with all routes configured.
///
/// # Routes
///
/// - `GET /home` - List homes, filtered by `city` and `propertyType`
/// - `POST /home` - Create a home (REALTOR or ADMIN)
/// - `GET /home/{id}` - Fetch one home
/// - `PUT /home/{id}` - Update a home (owning REALTOR)
/// - `DELETE /home/{id}` - Delete a home (owning REALTOR)
/// - `POST /auth/signup/{userType}` - Register
/// - `POST /auth/signin` - Exchange credentials for a token
/// - `POST /auth/key` - Generate a product key
/// - `GET /auth/me` - Identity carried by the caller's token
/// - `GET /health` - Health check
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/home", get(get_homes).post(create_home))
        .route(
            "/home/{id}",
            get(get_home).put(update_home).delete(delete_home),
        )
        .route("/auth/signup/{user_type}", post(signup))
        .route("/auth/signin", post(signin))
        .route("/auth/key", post(generate_product_key))
        .route("/auth/me", get(me))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Authentication
// ============================================================================

/// The caller identified by a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header_value) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        else {
            debug!("Request missing Authorization header");
            return Err(ApiError::unauthorized("missing bearer token"));
        };

        let Some(token) = bearer_token(header_value) else {
            debug!("Authorization header is not a bearer token");
            return Err(ApiError::unauthorized("missing bearer token"));
        };

        match state.keys.verify_token(token) {
            Ok(claims) => Ok(Self(claims)),
            Err(err) => {
                warn!(error = %err, "Rejected bearer token");
                Err(err.into())
            }
        }
    }
}

/// Role gate plus ownership gate for updating or deleting `home_id`.
async fn authorize_home_mutation(
    state: &AppState,
    caller: &Claims,
    home_id: i32,
) -> Result<(), ApiError> {
    let role = state.accounts.caller_role(caller.id).await?;
    ensure_role(role, MUTATE_HOME_ROLES)?;
    let realtor = state.homes.get_realtor_by_home_id(home_id).await?;
    ensure_home_owner(caller.id, &realtor)
}

// ============================================================================
// Extraction helpers
// ============================================================================

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!(
                "request body must be at most {MAX_BODY_SIZE} bytes"
            ))
        } else {
            ApiError::validation(rejection.body_text())
        }
    })
}

fn home_id(path: Result<Path<i32>, PathRejection>) -> Result<i32, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::validation("home id must be an integer"))
}

// ============================================================================
// Home handlers
// ============================================================================

/// GET /home - List homes matching the query filters.
async fn get_homes(
    State(state): State<AppState>,
    filters: Result<Query<HomeFilters>, QueryRejection>,
) -> Result<Json<Vec<HomeResponse>>, ApiError> {
    let Query(filters) = filters.map_err(|rejection| ApiError::validation(rejection.body_text()))?;
    Ok(Json(state.homes.get_homes(filters).await?))
}

/// GET /home/{id} - Fetch one home with all its images.
async fn get_home(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<HomeResponse>, ApiError> {
    let id = home_id(path)?;
    Ok(Json(state.homes.get_home_by_id(id).await?))
}

/// POST /home - List a new home owned by the caller.
async fn create_home(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    payload: Result<Json<CreateHomeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<HomeResponse>), ApiError> {
    let role = state.accounts.caller_role(caller.id).await?;
    ensure_role(role, CREATE_HOME_ROLES)?;

    let request = json_body(payload)?;
    let home = state.homes.create_home(request, caller.id).await?;
    Ok((StatusCode::CREATED, Json(home)))
}

/// PUT /home/{id} - Update a home the caller owns.
async fn update_home(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    path: Result<Path<i32>, PathRejection>,
    payload: Result<Json<UpdateHomeRequest>, JsonRejection>,
) -> Result<Json<HomeResponse>, ApiError> {
    let id = home_id(path)?;
    authorize_home_mutation(&state, &caller, id).await?;

    let changes = json_body(payload)?;
    Ok(Json(state.homes.update_home(id, changes).await?))
}

/// DELETE /home/{id} - Delete a home the caller owns.
async fn delete_home(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    path: Result<Path<i32>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = home_id(path)?;
    authorize_home_mutation(&state, &caller, id).await?;

    state.homes.delete_home(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Auth handlers
// ============================================================================

/// POST /auth/signup/{userType} - Register and receive a token.
async fn signup(
    State(state): State<AppState>,
    Path(user_type): Path<String>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let role: UserRole = user_type.parse()?;
    let request = json_body(payload)?;
    let token = state.accounts.signup(request, role).await?;
    Ok((StatusCode::CREATED, Json(token)))
}

/// POST /auth/signin - Exchange credentials for a token.
async fn signin(
    State(state): State<AppState>,
    payload: Result<Json<SigninRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(state.accounts.signin(request).await?))
}

/// POST /auth/key - Generate the product key for an email and role.
async fn generate_product_key(
    State(state): State<AppState>,
    payload: Result<Json<ProductKeyRequest>, JsonRejection>,
) -> Result<Json<ProductKeyResponse>, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(state.accounts.generate_product_key(request).await?))
}

/// GET /auth/me - Claims carried by the caller's token.
async fn me(State(state): State<AppState>, AuthUser(caller): AuthUser) -> Json<Claims> {
    Json(state.accounts.me(caller))
}

// ============================================================================
// Health
// ============================================================================

/// Response body for the health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` when storage answers, `"degraded"` otherwise.
    pub status: String,

    /// Crate version.
    pub version: String,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,

    /// Storage backend in use (`postgres` or `memory`).
    pub storage: String,
}

/// GET /health - Health check endpoint.
///
/// Returns 200 when the storage backend answers a ping, 503 otherwise.
/// No authentication required.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0",
///   "uptimeSeconds": 3600,
///   "storage": "postgres"
/// }
/// ```
async fn get_health(State(state): State<AppState>) -> Response {
    let (status_code, status) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            warn!(error = %err, "Storage health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        storage: state.config.storage_label().to_string(),
    };
    (status_code, Json(body)).into_response()
}

// ============================================================================
// Tests
// ============================================================================
