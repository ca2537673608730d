//! Common utilities for Maestro
//!
//! Provides shared configuration loading and telemetry.

pub mod config;
pub mod telemetry;

pub use config::AppConfig;
pub use telemetry::init_tracing;
