use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ContextType, Dispatcher, HandlerFilter};
use crate::context::StageContext;
use crate::errors::ServerResult;

/// One unit of protocol logic bound to a context type
///
/// Handlers mutate the stage context and may set exactly one terminal
/// outcome (`handle_request` / `skip_request` / `reject`). Returning an
/// `Err` is reserved for internal failures and aborts the transaction.
#[async_trait]
pub trait ServerHandler: Send + Sync {
    async fn handle(
        &self,
        dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()>;
}

/// Factory for handlers constructed fresh for every dispatch
pub type ScopedHandlerFactory = Arc<dyn Fn() -> Box<dyn ServerHandler> + Send + Sync>;

/// Lifetime category of a handler
#[derive(Clone)]
pub enum HandlerLifetime {
    /// One instance reused across all dispatches. Must be safe for
    /// concurrent invocation across in-flight transactions.
    Singleton(Arc<dyn ServerHandler>),
    /// A fresh instance per dispatch; may hold per-operation state.
    Scoped(ScopedHandlerFactory),
}

impl fmt::Debug for HandlerLifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerLifetime::Singleton(_) => f.write_str("Singleton"),
            HandlerLifetime::Scoped(_) => f.write_str("Scoped"),
        }
    }
}

/// Whether a handler ships with the engine or was supplied by the deployer
///
/// Only used by configuration-time consistency checks; the dispatcher
/// treats both the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerProvenance {
    BuiltIn,
    Custom,
}

/// Immutable metadata describing one registered handler
///
/// Descriptors are frozen once the registry is built; there is no dynamic
/// re-registration at runtime.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    context_type: ContextType,
    filters: Vec<HandlerFilter>,
    order: i32,
    lifetime: HandlerLifetime,
    provenance: HandlerProvenance,
}

impl HandlerDescriptor {
    /// Describe a singleton handler for the given context and order
    pub fn singleton(
        context_type: ContextType,
        order: i32,
        handler: impl ServerHandler + 'static,
    ) -> Self {
        HandlerDescriptor {
            context_type,
            filters: Vec::new(),
            order,
            lifetime: HandlerLifetime::Singleton(Arc::new(handler)),
            provenance: HandlerProvenance::Custom,
        }
    }

    /// Describe a scoped handler constructed per dispatch
    pub fn scoped(
        context_type: ContextType,
        order: i32,
        factory: impl Fn() -> Box<dyn ServerHandler> + Send + Sync + 'static,
    ) -> Self {
        HandlerDescriptor {
            context_type,
            filters: Vec::new(),
            order,
            lifetime: HandlerLifetime::Scoped(Arc::new(factory)),
            provenance: HandlerProvenance::Custom,
        }
    }

    /// Gate the handler behind an applicability filter. All attached
    /// filters must pass for the handler to run.
    pub fn with_filter(mut self, filter: HandlerFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Mark the descriptor as shipped with the engine
    pub fn built_in(mut self) -> Self {
        self.provenance = HandlerProvenance::BuiltIn;
        self
    }

    pub fn context_type(&self) -> ContextType {
        self.context_type
    }

    pub fn filters(&self) -> &[HandlerFilter] {
        &self.filters
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn lifetime(&self) -> &HandlerLifetime {
        &self.lifetime
    }

    pub fn provenance(&self) -> HandlerProvenance {
        self.provenance
    }
}
