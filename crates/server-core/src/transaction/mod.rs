//! Transaction: the unit of work for one inbound protocol operation
//!
//! A [`Transaction`] is created by the transport adapter for each inbound
//! request, driven through the stage sequence by the engine, and destroyed
//! when the processing call returns. It carries the wire request/response
//! (each finalized at most once), an extensible property bag used to hand
//! results from one stage to a later one, and a forward-only state machine
//! mirroring the stage protocol.

mod properties;
mod state;

pub use properties::{AuthenticationOutcome, RawParameters, ValidationOutcome};
pub use state::TransactionState;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use oauthly_infra_common::ErrorContext;
use uuid::Uuid;

use crate::errors::{ServerError, ServerResult};
use crate::wire::{OAuthRequest, OAuthResponse};

/// The protocol endpoint a transaction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointKind {
    Authorization,
    Token,
    Introspection,
    Revocation,
    Device,
    Verification,
    Userinfo,
    Logout,
    Configuration,
    Cryptography,
}

impl EndpointKind {
    /// Every endpoint kind, in declaration order
    pub const ALL: [EndpointKind; 10] = [
        EndpointKind::Authorization,
        EndpointKind::Token,
        EndpointKind::Introspection,
        EndpointKind::Revocation,
        EndpointKind::Device,
        EndpointKind::Verification,
        EndpointKind::Userinfo,
        EndpointKind::Logout,
        EndpointKind::Configuration,
        EndpointKind::Cryptography,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Authorization => "authorization",
            EndpointKind::Token => "token",
            EndpointKind::Introspection => "introspection",
            EndpointKind::Revocation => "revocation",
            EndpointKind::Device => "device",
            EndpointKind::Verification => "verification",
            EndpointKind::Userinfo => "userinfo",
            EndpointKind::Logout => "logout",
            EndpointKind::Configuration => "configuration",
            EndpointKind::Cryptography => "cryptography",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit-of-work object for one protocol operation
pub struct Transaction {
    id: Uuid,
    endpoint: EndpointKind,
    state: TransactionState,
    request: Option<OAuthRequest>,
    response: Option<OAuthResponse>,
    properties: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Transaction {
    /// Create a transaction for the given endpoint
    pub fn new(endpoint: EndpointKind) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            endpoint,
            state: TransactionState::Created,
            request: None,
            response: None,
            properties: HashMap::new(),
        }
    }

    /// Create a transaction carrying the decoded transport parameters,
    /// ready for the built-in extraction handler
    pub fn with_parameters<I, K, V>(endpoint: EndpointKind, parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut transaction = Self::new(endpoint);
        transaction.set_property(
            properties::keys::RAW_PARAMETERS,
            RawParameters(
                parameters
                    .into_iter()
                    .map(|(name, value)| (name.into(), value.into()))
                    .collect(),
            ),
        );
        transaction
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> EndpointKind {
        self.endpoint
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Advance the state machine
    ///
    /// Backward transitions and stage re-entry are contract breaks and
    /// surface as invariant violations.
    pub fn transition(&mut self, to: TransactionState) -> ServerResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(ServerError::invariant(
                ErrorContext::new("transaction", "transition")
                    .with_details(format!("{} -> {} is not a legal transition", self.state, to)),
            ));
        }
        self.state = to;
        Ok(())
    }

    pub fn request(&self) -> Option<&OAuthRequest> {
        self.request.as_ref()
    }

    /// Finalize the parsed request. May only happen once per transaction.
    pub fn set_request(&mut self, request: OAuthRequest) -> ServerResult<()> {
        if self.request.is_some() {
            return Err(ServerError::invariant(
                ErrorContext::new("transaction", "set_request")
                    .with_details("the request has already been finalized"),
            ));
        }
        self.request = Some(request);
        Ok(())
    }

    pub fn response(&self) -> Option<&OAuthResponse> {
        self.response.as_ref()
    }

    /// Mutable access for the Apply chain, which may reshape the
    /// finalized response (e.g. introspection error normalization)
    pub fn response_mut(&mut self) -> Option<&mut OAuthResponse> {
        self.response.as_mut()
    }

    /// Finalize the response. May only happen once per transaction.
    pub fn set_response(&mut self, response: OAuthResponse) -> ServerResult<()> {
        if self.response.is_some() {
            return Err(ServerError::invariant(
                ErrorContext::new("transaction", "set_response")
                    .with_details("the response has already been finalized"),
            ));
        }
        self.response = Some(response);
        Ok(())
    }

    /// Take the finalized response, handing it to the transport adapter
    pub fn take_response(&mut self) -> Option<OAuthResponse> {
        self.response.take()
    }

    /// Store a stage result in the property bag. Last write wins.
    pub fn set_property<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.properties.insert(key.into(), Box::new(value));
    }

    /// Retrieve a stage result. An absent key is a valid, checked state.
    pub fn property<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.properties.get(key).and_then(|value| value.downcast_ref())
    }

    pub fn remove_property(&mut self, key: &str) {
        self.properties.remove(key);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}
