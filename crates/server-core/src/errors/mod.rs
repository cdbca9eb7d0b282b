//! Error types for server-core
//!
//! Three families, kept strictly apart:
//! - [`ConfigurationError`]: fatal, raised once at startup by the
//!   configuration validator; the process must not serve traffic.
//! - [`ProtocolRejection`]: an expected Validate/Handle outcome carried as
//!   a value on the stage context and converted into a wire error
//!   response, never into an `Err`.
//! - [`ServerError`]: internal contract breaks (invariant violations,
//!   store failures); aborts the transaction and surfaces a generic
//!   server error without leaking details.

mod config_errors;
mod rejection;
mod server_errors;

pub use config_errors::ConfigurationError;
pub use rejection::ProtocolRejection;
pub use server_errors::{ServerError, ServerResult};
