//! # Infra-Common - Shared Infrastructure for OAUTHLY
//!
//! This crate provides the cross-cutting infrastructure shared by the
//! oauthly authorization-server crates: logging configuration built on
//! `tracing`, and error-context helpers used to annotate internal errors
//! with the component and operation that produced them.

pub mod errors;
pub mod logging;

pub use errors::ErrorContext;
pub use logging::{setup_logging, LoggingConfig};
