//! Persistence port and its adapters.
//!
//! Services talk to storage only through the [`Repository`] trait:
//!
//! - [`PgRepository`] stores rows in Postgres through a `sqlx` pool;
//! - [`MemoryRepository`] keeps rows in process, for tests and for running
//!   the server without a database.
//!
//! Listing queries return at most one image URL per home (the oldest);
//! single-home lookups return every image URL in insertion order.

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ApiError;
use crate::types::{HomeFilters, HomeRecord, NewHome, NewUser, Realtor, UpdateHomeRequest, User};

/// Errors raised by repository adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    /// The database driver reported a failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying the embedded schema migrations failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be mapped back into a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The in-memory tables were poisoned by a panicking writer.
    #[error("in-memory store lock poisoned")]
    Poisoned,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => ApiError::conflict(what),
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Storage operations needed by the account and home services.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch a user by email address.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fetch a user by identifier.
    async fn find_user_by_id(&self, id: i32) -> Result<Option<User>, StoreError>;

    /// Insert a user. Fails with [`StoreError::Conflict`] on a duplicate email.
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// List homes matching `filters`, ordered by id, each with at most one image.
    async fn list_homes(&self, filters: &HomeFilters) -> Result<Vec<HomeRecord>, StoreError>;

    /// Fetch one home with all of its images.
    async fn find_home(&self, id: i32) -> Result<Option<HomeRecord>, StoreError>;

    /// Fetch the realtor owning a home.
    async fn find_home_realtor(&self, home_id: i32) -> Result<Option<Realtor>, StoreError>;

    /// Insert a home and its images as one unit.
    async fn create_home(&self, home: NewHome) -> Result<HomeRecord, StoreError>;

    /// Apply the supplied fields to a home. `None` when the home is missing.
    async fn update_home(
        &self,
        id: i32,
        changes: &UpdateHomeRequest,
    ) -> Result<Option<HomeRecord>, StoreError>;

    /// Delete a home's images, then the home. `false` when the home is missing.
    async fn delete_home(&self, id: i32) -> Result<bool, StoreError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
