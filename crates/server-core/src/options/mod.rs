//! Server options: everything the deployer declares before startup
//!
//! [`ServerOptions`] is a plain mutable record while the server is being
//! configured. [`validator::validate`] then runs the one-shot consistency
//! pass over it; after that pass succeeds the options are frozen behind an
//! `Arc` and never mutated again.

pub mod validator;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::credentials::{Credential, TokenValidationParameters};
use crate::dispatch::HandlerDescriptor;
use crate::token::TokenHandler;
use crate::transaction::EndpointKind;

/// OAuth 2.0 grant types the engine reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    DeviceCode,
    Implicit,
    Password,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
            GrantType::Implicit => "implicit",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared server configuration
///
/// Fields are public by design: this is the record deployers fill in
/// before handing it to the engine. Consistency is enforced by the
/// validator, not by the setters.
pub struct ServerOptions {
    /// Enabled grant types
    pub grant_types: BTreeSet<GrantType>,
    /// Enabled response types, each a space-separated set of
    /// response-type tokens (e.g. `"code id_token"`)
    pub response_types: BTreeSet<String>,
    /// Declared endpoint addresses, per endpoint kind. An endpoint with
    /// no address is disabled.
    pub endpoint_uris: BTreeMap<EndpointKind, Vec<Url>>,
    /// The issuer advertised in responses and token claims
    pub issuer: Option<Url>,

    /// Storage-less operating mode. Requires deployer-supplied handlers
    /// for every validation point that normally depends on a store.
    pub enable_degraded_mode: bool,
    pub disable_token_storage: bool,
    pub disable_authorization_storage: bool,
    pub disable_rolling_refresh_tokens: bool,
    pub ignore_endpoint_permissions: bool,
    pub ignore_grant_type_permissions: bool,
    pub ignore_response_type_permissions: bool,
    pub ignore_scope_permissions: bool,
    pub use_reference_access_tokens: bool,
    pub use_reference_refresh_tokens: bool,

    /// Signing credentials, ranked by the validator
    pub signing_credentials: Vec<Credential>,
    /// Encryption credentials, ranked by the validator
    pub encryption_credentials: Vec<Credential>,
    /// The component that validates wire tokens into principals
    pub token_handler: Option<Arc<dyn TokenHandler>>,

    /// The full handler catalogue, built-in and deployer-supplied
    pub handlers: Vec<Arc<HandlerDescriptor>>,
    /// Populated by the validator from the ranked credentials
    pub token_validation_parameters: TokenValidationParameters,
}

impl ServerOptions {
    /// Options pre-loaded with the built-in handler chains
    pub fn new() -> Self {
        let mut options = Self::bare();
        options.handlers = crate::protocol::default_handlers();
        options
    }

    /// Completely empty options: no handlers, no flows, nothing enabled
    pub fn bare() -> Self {
        ServerOptions {
            grant_types: BTreeSet::new(),
            response_types: BTreeSet::new(),
            endpoint_uris: BTreeMap::new(),
            issuer: None,
            enable_degraded_mode: false,
            disable_token_storage: false,
            disable_authorization_storage: false,
            disable_rolling_refresh_tokens: false,
            ignore_endpoint_permissions: false,
            ignore_grant_type_permissions: false,
            ignore_response_type_permissions: false,
            ignore_scope_permissions: false,
            use_reference_access_tokens: false,
            use_reference_refresh_tokens: false,
            signing_credentials: Vec::new(),
            encryption_credentials: Vec::new(),
            token_handler: None,
            handlers: Vec::new(),
            token_validation_parameters: TokenValidationParameters::default(),
        }
    }

    /// Declare an address for an endpoint, enabling it
    pub fn enable_endpoint(&mut self, kind: EndpointKind, uri: Url) -> &mut Self {
        self.endpoint_uris.entry(kind).or_default().push(uri);
        self
    }

    /// The addresses declared for an endpoint kind
    pub fn endpoint_uris(&self, kind: EndpointKind) -> &[Url] {
        self.endpoint_uris
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether at least one address is declared for the endpoint
    pub fn is_endpoint_enabled(&self, kind: EndpointKind) -> bool {
        !self.endpoint_uris(kind).is_empty()
    }

    pub fn enable_grant(&mut self, grant: GrantType) -> &mut Self {
        self.grant_types.insert(grant);
        self
    }

    pub fn is_grant_enabled(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Register one handler descriptor
    pub fn add_handler(&mut self, descriptor: HandlerDescriptor) -> &mut Self {
        self.handlers.push(Arc::new(descriptor));
        self
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("grant_types", &self.grant_types)
            .field("response_types", &self.response_types)
            .field("endpoint_uris", &self.endpoint_uris)
            .field("issuer", &self.issuer)
            .field("enable_degraded_mode", &self.enable_degraded_mode)
            .field("disable_token_storage", &self.disable_token_storage)
            .field("handlers", &self.handlers.len())
            .field("signing_credentials", &self.signing_credentials.len())
            .field("encryption_credentials", &self.encryption_credentials.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_enablement_tracks_declared_uris() {
        let mut options = ServerOptions::bare();
        assert!(!options.is_endpoint_enabled(EndpointKind::Introspection));

        let uri = Url::parse("https://auth.example.com/connect/introspect").unwrap();
        options.enable_endpoint(EndpointKind::Introspection, uri.clone());
        assert!(options.is_endpoint_enabled(EndpointKind::Introspection));
        assert_eq!(options.endpoint_uris(EndpointKind::Introspection), [uri]);
        assert!(options.endpoint_uris(EndpointKind::Token).is_empty());
    }

    #[test]
    fn test_grant_type_wire_names() {
        assert_eq!(GrantType::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!(
            GrantType::DeviceCode.as_str(),
            "urn:ietf:params:oauth:grant-type:device_code"
        );
        assert_eq!(GrantType::RefreshToken.to_string(), "refresh_token");
    }

    #[test]
    fn test_new_options_carry_the_built_in_chains() {
        let options = ServerOptions::new();
        assert!(!options.handlers.is_empty());
        assert!(ServerOptions::bare().handlers.is_empty());
    }
}
