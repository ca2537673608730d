//! Maestro API - HTTP handlers and routing
//!
//! This crate provides the Axum-based HTTP API for Maestro:
//! - Workflow revision lifecycle endpoints
//! - Execution submission, inspection, and history endpoints
//! - RFC 7807 problem+json error responses

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
