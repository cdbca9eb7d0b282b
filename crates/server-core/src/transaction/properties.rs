//! Typed wrappers over the transaction property bag
//!
//! The bag itself maps string keys to `Any` values; the rest of the engine
//! only touches it through these wrappers and the key helpers below, so no
//! stage handles raw untyped values directly.

use crate::principal::Principal;
use crate::transaction::EndpointKind;

/// Well-known property keys. Keys follow the context-type naming
/// convention so a stored result can be traced back to the stage that
/// produced it.
pub mod keys {
    use crate::transaction::EndpointKind;

    /// Decoded transport parameters awaiting extraction
    pub const RAW_PARAMETERS: &str = "oauthly:request:parameters";

    /// Result of the generic authentication dispatch
    pub const AUTHENTICATION: &str = "oauthly:authenticate";

    /// Result of an endpoint's Validate stage
    pub fn validation(endpoint: EndpointKind) -> String {
        format!("oauthly:validate:{endpoint}")
    }
}

/// Decoded transport parameters stored by the adapter for the built-in
/// extraction handler
#[derive(Debug, Clone, Default)]
pub struct RawParameters(pub Vec<(String, String)>);

/// The result of an endpoint's Validate stage, stored so later stages can
/// recover the established principal without re-authenticating
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub principal: Option<Principal>,
    pub client_id: Option<String>,
}

/// The result of the generic authentication dispatch
#[derive(Debug, Clone, Default)]
pub struct AuthenticationOutcome {
    pub principal: Option<Principal>,
}

impl super::Transaction {
    /// The decoded transport parameters stored by the adapter, if any
    pub fn raw_parameters(&self) -> Option<&RawParameters> {
        self.property(keys::RAW_PARAMETERS)
    }

    /// Store the Validate stage result for the given endpoint
    pub fn set_validation_outcome(&mut self, endpoint: EndpointKind, outcome: ValidationOutcome) {
        self.set_property(keys::validation(endpoint), outcome);
    }

    /// Retrieve the Validate stage result for the given endpoint
    pub fn validation_outcome(&self, endpoint: EndpointKind) -> Option<&ValidationOutcome> {
        self.property(&keys::validation(endpoint))
    }

    /// Store the generic authentication result
    pub fn set_authentication_outcome(&mut self, outcome: AuthenticationOutcome) {
        self.set_property(keys::AUTHENTICATION, outcome);
    }

    /// Retrieve the generic authentication result
    pub fn authentication_outcome(&self) -> Option<&AuthenticationOutcome> {
        self.property(keys::AUTHENTICATION)
    }
}
