//! Realty Server - Home listing backend.
//!
//! This crate provides an HTTP API for:
//! - Registering buyers, realtors and admins, and issuing session tokens
//! - Issuing product keys that gate realtor and admin signup
//! - Listing, creating, updating and deleting homes with their images
//!
//! # Architecture
//!
//! Route handlers in [`routes`] verify the caller, apply the gates in
//! [`policy`], then call the [`accounts`] and [`homes`] services. Services
//! reach storage only through the [`store::Repository`] trait, backed by
//! Postgres in production and by an in-memory store in tests or when no
//! database is configured.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod homes;
pub mod policy;
pub mod routes;
pub mod store;
pub mod types;
