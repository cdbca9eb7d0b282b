//! Error-context helpers
//!
//! Internal server failures (invariant violations, store errors) are
//! reported with the component and operation that produced them, without
//! leaking those details into client-facing protocol responses.

mod context;

pub use context::ErrorContext;
