//! Handler dispatch engine
//!
//! The heart of the protocol pipeline: immutable [`HandlerDescriptor`]s
//! registered for a [`ContextType`], resolved through the
//! [`HandlerRegistry`], gated by [`HandlerFilter`]s and invoked in order
//! by the [`Dispatcher`] with early-termination semantics.
//!
//! The registry and descriptors are built once at configuration time and
//! are read-only while requests are processed; the dispatcher holds no
//! per-request state and is shared across all concurrent transactions.

mod descriptor;
mod dispatcher;
mod filters;
mod registry;

pub use descriptor::{
    HandlerDescriptor, HandlerLifetime, HandlerProvenance, ScopedHandlerFactory, ServerHandler,
};
pub use dispatcher::Dispatcher;
pub use filters::HandlerFilter;
pub use registry::HandlerRegistry;

use std::fmt;

use crate::transaction::EndpointKind;

/// Stable tag identifying which context variant a handler accepts
///
/// Context variants form an open set: the four lifecycle stages crossed
/// with every endpoint kind, plus the shared authentication and
/// token-validation/generation dispatches nested inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextType {
    Extract(EndpointKind),
    Validate(EndpointKind),
    Handle(EndpointKind),
    ApplyResponse(EndpointKind),
    Authenticate,
    ValidateToken,
    GenerateToken,
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextType::Extract(endpoint) => write!(f, "extract:{endpoint}"),
            ContextType::Validate(endpoint) => write!(f, "validate:{endpoint}"),
            ContextType::Handle(endpoint) => write!(f, "handle:{endpoint}"),
            ContextType::ApplyResponse(endpoint) => write!(f, "apply:{endpoint}"),
            ContextType::Authenticate => f.write_str("authenticate"),
            ContextType::ValidateToken => f.write_str("validate-token"),
            ContextType::GenerateToken => f.write_str("generate-token"),
        }
    }
}
