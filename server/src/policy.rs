//! Authorization predicates shared by the home mutation routes.
//!
//! Two independent gates guard every mutation:
//!
//! - the *role gate* ([`ensure_role`]) decides which account roles may reach
//!   an operation at all;
//! - the *ownership gate* ([`ensure_home_owner`]) decides whether the caller
//!   may touch one specific home.

use tracing::debug;

use crate::error::ApiError;
use crate::types::{Realtor, UserRole};

/// Roles allowed to list a new home.
pub const CREATE_HOME_ROLES: &[UserRole] = &[UserRole::Realtor, UserRole::Admin];

/// Roles allowed to update or delete a home they own.
pub const MUTATE_HOME_ROLES: &[UserRole] = &[UserRole::Realtor];

/// Fails with `Unauthorized` unless `role` is one of `allowed`.
pub fn ensure_role(role: UserRole, allowed: &[UserRole]) -> Result<(), ApiError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        debug!(role = %role, "Role not permitted for operation");
        Err(ApiError::unauthorized("role not permitted for this operation"))
    }
}

/// Fails with `Unauthorized` unless `caller_id` is the home's realtor.
pub fn ensure_home_owner(caller_id: i32, realtor: &Realtor) -> Result<(), ApiError> {
    if realtor.id == caller_id {
        Ok(())
    } else {
        debug!(
            caller_id,
            realtor_id = realtor.id,
            "Caller does not own home"
        );
        Err(ApiError::unauthorized("only the listing realtor may modify this home"))
    }
}
