use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::{ContextType, HandlerDescriptor, HandlerProvenance};
use crate::errors::ConfigurationError;

/// The frozen, ordered collection of handler descriptors
///
/// Built once from the validated options and read-only afterwards:
/// request processing never registers or removes handlers.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    descriptors: Vec<Arc<HandlerDescriptor>>,
}

impl HandlerRegistry {
    /// Build the registry from the configured descriptors
    ///
    /// Two built-in registrations for the identical context and order are
    /// a configuration error, not a silent merge. The final collection is
    /// stably sorted by order, so ties keep registration order.
    pub fn from_descriptors(
        descriptors: Vec<Arc<HandlerDescriptor>>,
    ) -> Result<Self, ConfigurationError> {
        let mut seen: HashSet<(ContextType, i32)> = HashSet::new();
        for descriptor in &descriptors {
            if descriptor.provenance() == HandlerProvenance::BuiltIn
                && !seen.insert((descriptor.context_type(), descriptor.order()))
            {
                return Err(ConfigurationError::DuplicateHandlerRegistration {
                    context: descriptor.context_type(),
                    order: descriptor.order(),
                });
            }
        }

        let mut descriptors = descriptors;
        descriptors.sort_by_key(|descriptor| descriptor.order());

        debug!(handlers = descriptors.len(), "handler registry built");
        Ok(HandlerRegistry { descriptors })
    }

    /// All descriptors applicable to a context type, sorted by order
    /// ascending, ties preserving registration order
    pub fn resolve(&self, context_type: ContextType) -> Vec<Arc<HandlerDescriptor>> {
        self.descriptors
            .iter()
            .filter(|descriptor| descriptor.context_type() == context_type)
            .cloned()
            .collect()
    }

    /// Every registered descriptor, in dispatch order
    pub fn descriptors(&self) -> &[Arc<HandlerDescriptor>] {
        &self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StageContext;
    use crate::dispatch::{Dispatcher, ServerHandler};
    use crate::errors::ServerResult;
    use crate::transaction::EndpointKind;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl ServerHandler for Noop {
        async fn handle(
            &self,
            _dispatcher: &Dispatcher,
            _context: &mut StageContext<'_>,
        ) -> ServerResult<()> {
            Ok(())
        }
    }

    fn descriptor(context: ContextType, order: i32) -> Arc<HandlerDescriptor> {
        Arc::new(HandlerDescriptor::singleton(context, order, Noop).built_in())
    }

    #[test]
    fn test_resolve_sorted_by_order() {
        let context = ContextType::Validate(EndpointKind::Introspection);
        let registry = HandlerRegistry::from_descriptors(vec![
            descriptor(context, 300),
            descriptor(context, 100),
            descriptor(ContextType::Authenticate, 200),
        ])
        .unwrap();

        let resolved = registry.resolve(context);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].order(), 100);
        assert_eq!(resolved[1].order(), 300);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let context = ContextType::Authenticate;
        let first = Arc::new(HandlerDescriptor::singleton(context, 100, Noop));
        let second = Arc::new(HandlerDescriptor::singleton(context, 100, Noop));
        let first_ptr = Arc::as_ptr(&first);

        // Ties are legal for custom descriptors and resolved stably
        let registry = HandlerRegistry::from_descriptors(vec![first, second]).unwrap();
        let resolved = registry.resolve(context);
        assert_eq!(resolved.len(), 2);
        assert_eq!(Arc::as_ptr(&resolved[0]), first_ptr);
    }

    #[test]
    fn test_duplicate_built_in_rejected() {
        let context = ContextType::Handle(EndpointKind::Introspection);
        let error =
            HandlerRegistry::from_descriptors(vec![descriptor(context, 100), descriptor(context, 100)])
                .unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::DuplicateHandlerRegistration { order: 100, .. }
        ));
    }

    #[test]
    fn test_empty_resolution_is_not_an_error() {
        let registry = HandlerRegistry::from_descriptors(Vec::new()).unwrap();
        assert!(registry.resolve(ContextType::Authenticate).is_empty());
    }
}
