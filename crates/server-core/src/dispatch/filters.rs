use std::fmt;
use std::sync::Arc;

use crate::context::StageContext;
use crate::options::ServerOptions;
use crate::transaction::EndpointKind;

/// A pure predicate deciding whether a handler participates in a dispatch
///
/// Filters are re-evaluated on every dispatch, never cached: several of
/// them depend on the live options or on the current transaction's parsed
/// request. Built-in conditions are tagged variants so the configuration
/// validator can reason about them (the degraded-mode checks must detect
/// `DegradedModeDisabled`); the `Custom` variant keeps the predicate set
/// open for deployers.
#[derive(Clone)]
pub enum HandlerFilter {
    /// Pass only when the degraded mode is not enabled
    DegradedModeDisabled,
    /// Pass only when the degraded mode is enabled
    DegradedModeEnabled,
    /// Pass only when the request carries a `client_id` parameter
    ClientIdPresent,
    /// Pass only when endpoint permission checks are not ignored
    EndpointPermissionsEnabled,
    /// Pass only when token storage is enabled
    TokenStorageEnabled,
    /// Pass only for transactions bound to the given endpoint
    Endpoint(EndpointKind),
    /// Deployer-supplied predicate over the live options and context
    Custom(Arc<dyn Fn(&ServerOptions, &StageContext<'_>) -> bool + Send + Sync>),
}

impl HandlerFilter {
    /// Evaluate the predicate against the live options and context
    pub fn accepts(&self, options: &ServerOptions, context: &StageContext<'_>) -> bool {
        match self {
            HandlerFilter::DegradedModeDisabled => !options.enable_degraded_mode,
            HandlerFilter::DegradedModeEnabled => options.enable_degraded_mode,
            HandlerFilter::ClientIdPresent => context
                .transaction
                .request()
                .and_then(|request| request.client_id())
                .is_some(),
            HandlerFilter::EndpointPermissionsEnabled => !options.ignore_endpoint_permissions,
            HandlerFilter::TokenStorageEnabled => !options.disable_token_storage,
            HandlerFilter::Endpoint(endpoint) => context.transaction.endpoint() == *endpoint,
            HandlerFilter::Custom(predicate) => predicate(options, context),
        }
    }

    /// Whether this filter excludes the handler whenever degraded mode is
    /// active. Used by the configuration validator: a handler hidden
    /// behind such a filter cannot satisfy a degraded-mode requirement.
    pub fn requires_degraded_mode_disabled(&self) -> bool {
        matches!(self, HandlerFilter::DegradedModeDisabled)
    }
}

impl fmt::Debug for HandlerFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFilter::DegradedModeDisabled => f.write_str("DegradedModeDisabled"),
            HandlerFilter::DegradedModeEnabled => f.write_str("DegradedModeEnabled"),
            HandlerFilter::ClientIdPresent => f.write_str("ClientIdPresent"),
            HandlerFilter::EndpointPermissionsEnabled => f.write_str("EndpointPermissionsEnabled"),
            HandlerFilter::TokenStorageEnabled => f.write_str("TokenStorageEnabled"),
            HandlerFilter::Endpoint(endpoint) => write!(f, "Endpoint({endpoint})"),
            HandlerFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
