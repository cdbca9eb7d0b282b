//! Logging configuration for oauthly services
//!
//! Provides a single `setup_logging` entry point built on `tracing` and
//! `tracing-subscriber`, so every server binary and integration test
//! configures logging the same way.

mod setup;

pub use setup::{setup_logging, LoggingConfig};
