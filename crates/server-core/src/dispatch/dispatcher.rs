use std::sync::Arc;

use tracing::{debug, trace};

use super::{HandlerLifetime, HandlerRegistry};
use crate::context::StageContext;
use crate::errors::ServerResult;
use crate::options::ServerOptions;
use crate::stores::ServerServices;

/// Resolves, filters and invokes the handler chain for a context
///
/// The dispatcher holds no per-request state: one instance is shared by
/// every concurrent transaction. Handlers run strictly in order, each one
/// observing the mutations of all prior handlers, and the chain stops as
/// soon as a handler sets a terminal outcome.
pub struct Dispatcher {
    options: Arc<ServerOptions>,
    registry: Arc<HandlerRegistry>,
    services: ServerServices,
}

impl Dispatcher {
    pub fn new(
        options: Arc<ServerOptions>,
        registry: Arc<HandlerRegistry>,
        services: ServerServices,
    ) -> Self {
        Dispatcher {
            options,
            registry,
            services,
        }
    }

    /// The validated server options
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// The storage backends available to handlers
    pub fn services(&self) -> &ServerServices {
        &self.services
    }

    /// Run the handler chain for the context's type
    ///
    /// A dispatch that resolves no handlers at all is a no-op producing an
    /// empty result; whether that is acceptable is decided by the stage
    /// orchestration, not here.
    pub async fn dispatch(&self, context: &mut StageContext<'_>) -> ServerResult<()> {
        let context_type = context.context_type();
        let descriptors = self.registry.resolve(context_type);
        trace!(
            context = %context_type,
            transaction = %context.transaction.id(),
            candidates = descriptors.len(),
            "dispatching context"
        );

        for descriptor in descriptors {
            if context.is_terminal() {
                break;
            }

            // Filters are evaluated per dispatch: some of them read the
            // live options or the current request.
            if !descriptor
                .filters()
                .iter()
                .all(|filter| filter.accepts(&self.options, context))
            {
                trace!(
                    context = %context_type,
                    order = descriptor.order(),
                    "handler excluded by filter"
                );
                continue;
            }

            match descriptor.lifetime() {
                HandlerLifetime::Singleton(handler) => handler.handle(self, context).await?,
                HandlerLifetime::Scoped(factory) => {
                    let handler = factory();
                    handler.handle(self, context).await?;
                }
            }

            if let Some(outcome) = context.outcome() {
                debug!(
                    context = %context_type,
                    transaction = %context.transaction.id(),
                    order = descriptor.order(),
                    outcome = ?outcome,
                    "handler chain terminated early"
                );
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageOutcome;
    use crate::dispatch::{ContextType, HandlerDescriptor, HandlerFilter, ServerHandler};
    use crate::errors::ProtocolRejection;
    use crate::transaction::{EndpointKind, Transaction};
    use crate::wire::constants::errors;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Appends its label to a shared trace so tests can assert ordering
    struct Tracing {
        label: &'static str,
        trace: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ServerHandler for Tracing {
        async fn handle(
            &self,
            _dispatcher: &Dispatcher,
            _context: &mut StageContext<'_>,
        ) -> ServerResult<()> {
            self.trace.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    struct Terminating {
        outcome: StageOutcome,
    }

    #[async_trait]
    impl ServerHandler for Terminating {
        async fn handle(
            &self,
            _dispatcher: &Dispatcher,
            context: &mut StageContext<'_>,
        ) -> ServerResult<()> {
            match &self.outcome {
                StageOutcome::Handled => context.handle_request(),
                StageOutcome::Skipped => context.skip_request(),
                StageOutcome::Rejected(rejection) => context.reject(rejection.clone()),
            }
        }
    }

    fn dispatcher_with(descriptors: Vec<HandlerDescriptor>) -> Dispatcher {
        let registry = HandlerRegistry::from_descriptors(
            descriptors.into_iter().map(Arc::new).collect(),
        )
        .unwrap();
        Dispatcher::new(
            Arc::new(ServerOptions::bare()),
            Arc::new(registry),
            ServerServices::in_memory(),
        )
    }

    #[tokio::test]
    async fn test_handlers_invoked_in_order() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let context_type = ContextType::Validate(EndpointKind::Introspection);

        let dispatcher = dispatcher_with(vec![
            HandlerDescriptor::singleton(
                context_type,
                200,
                Tracing { label: "second", trace: trace.clone() },
            ),
            HandlerDescriptor::singleton(
                context_type,
                100,
                Tracing { label: "first", trace: trace.clone() },
            ),
            HandlerDescriptor::singleton(
                context_type,
                300,
                Tracing { label: "third", trace: trace.clone() },
            ),
        ]);

        let mut transaction = Transaction::new(EndpointKind::Introspection);
        let mut context = StageContext::new(&mut transaction, context_type);
        dispatcher.dispatch(&mut context).await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_rejection_short_circuits_chain() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let context_type = ContextType::Validate(EndpointKind::Introspection);

        let dispatcher = dispatcher_with(vec![
            HandlerDescriptor::singleton(
                context_type,
                100,
                Terminating {
                    outcome: StageOutcome::Rejected(ProtocolRejection::new(
                        errors::INVALID_REQUEST,
                    )),
                },
            ),
            HandlerDescriptor::singleton(
                context_type,
                200,
                Tracing { label: "unreachable", trace: trace.clone() },
            ),
        ]);

        let mut transaction = Transaction::new(EndpointKind::Introspection);
        let mut context = StageContext::new(&mut transaction, context_type);
        dispatcher.dispatch(&mut context).await.unwrap();

        assert!(trace.lock().unwrap().is_empty());
        assert!(matches!(context.outcome(), Some(StageOutcome::Rejected(_))));
    }

    #[tokio::test]
    async fn test_filtered_handler_is_skipped_not_terminated() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let context_type = ContextType::Validate(EndpointKind::Introspection);

        let dispatcher = dispatcher_with(vec![
            HandlerDescriptor::singleton(
                context_type,
                100,
                Tracing { label: "filtered", trace: trace.clone() },
            )
            .with_filter(HandlerFilter::ClientIdPresent),
            HandlerDescriptor::singleton(
                context_type,
                200,
                Tracing { label: "ran", trace: trace.clone() },
            ),
        ]);

        // No request, so ClientIdPresent fails and only the second runs
        let mut transaction = Transaction::new(EndpointKind::Introspection);
        let mut context = StageContext::new(&mut transaction, context_type);
        dispatcher.dispatch(&mut context).await.unwrap();

        assert_eq!(*trace.lock().unwrap(), vec!["ran"]);
        assert!(context.outcome().is_none());
    }

    #[tokio::test]
    async fn test_scoped_handler_constructed_per_dispatch() {
        static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

        struct Counting;

        #[async_trait]
        impl ServerHandler for Counting {
            async fn handle(
                &self,
                _dispatcher: &Dispatcher,
                _context: &mut StageContext<'_>,
            ) -> ServerResult<()> {
                Ok(())
            }
        }

        let context_type = ContextType::Authenticate;
        let dispatcher = dispatcher_with(vec![HandlerDescriptor::scoped(
            context_type,
            100,
            || {
                CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
                Box::new(Counting)
            },
        )]);

        for _ in 0..3 {
            let mut transaction = Transaction::new(EndpointKind::Token);
            let mut context = StageContext::new(&mut transaction, context_type);
            dispatcher.dispatch(&mut context).await.unwrap();
        }

        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_chain_completes_normally() {
        let dispatcher = dispatcher_with(Vec::new());
        let mut transaction = Transaction::new(EndpointKind::Userinfo);
        let mut context =
            StageContext::new(&mut transaction, ContextType::Handle(EndpointKind::Userinfo));
        dispatcher.dispatch(&mut context).await.unwrap();
        assert!(context.outcome().is_none());
    }
}
