//! Stage contexts: the mutable view a handler chain operates on
//!
//! One [`StageContext`] is created per stage dispatch. It holds a
//! back-reference to the enclosing [`Transaction`], the stage-specific
//! payload, and a single terminal-outcome slot: at most one handler per
//! chain may mark the operation handled, skipped or rejected, and the
//! three outcomes are mutually exclusive by construction.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use oauthly_infra_common::ErrorContext;
use serde_json::Value;
use url::Url;

use crate::dispatch::ContextType;
use crate::errors::{ProtocolRejection, ServerError, ServerResult};
use crate::principal::Principal;
use crate::transaction::Transaction;
use crate::wire::OAuthRequest;

/// Terminal outcome of a stage chain
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// A handler fully answered the operation (it already wrote a
    /// transport-level response); no further stage runs.
    Handled,
    /// A handler intentionally bypassed the operation; the transport
    /// adapter produces its own default response.
    Skipped,
    /// The operation was rejected with a standard protocol error.
    Rejected(ProtocolRejection),
}

/// Stage-specific payload carried by a context
#[derive(Debug, Default)]
pub struct ExtractData {
    /// The parsed request an extraction handler produced
    pub request: Option<OAuthRequest>,
}

#[derive(Debug, Default)]
pub struct ValidateData {
    /// The `client_id` announced by the request, if any
    pub client_id: Option<String>,
    /// The principal established by authentication
    pub principal: Option<Principal>,
}

#[derive(Debug, Default)]
pub struct HandleData {
    pub principal: Option<Principal>,
    pub issuer: Option<Url>,
    pub username: Option<String>,
    pub subject: Option<String>,
    pub token_id: Option<String>,
    pub token_type: Option<String>,
    pub token_usage: Option<String>,
    pub client_id: Option<String>,
    pub scopes: BTreeSet<String>,
    pub audiences: Vec<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Additional claims to emit verbatim in the response
    pub claims: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct ApplyData {}

#[derive(Debug, Default)]
pub struct AuthenticateData {
    /// The wire token to authenticate
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
    /// The principal extracted from the token
    pub principal: Option<Principal>,
}

#[derive(Debug, Default)]
pub struct ValidateTokenData {
    pub token: Option<String>,
    pub principal: Option<Principal>,
}

#[derive(Debug, Default)]
pub struct GenerateTokenData {
    pub principal: Option<Principal>,
    pub token: Option<String>,
}

/// The payload variants, tagged to match [`ContextType`]
#[derive(Debug)]
pub enum StageData {
    Extract(ExtractData),
    Validate(ValidateData),
    Handle(HandleData),
    Apply(ApplyData),
    Authenticate(AuthenticateData),
    ValidateToken(ValidateTokenData),
    GenerateToken(GenerateTokenData),
}

/// A mutable, per-dispatch view over a transaction
pub struct StageContext<'t> {
    /// Back-reference to the enclosing transaction (non-owning)
    pub transaction: &'t mut Transaction,
    context_type: ContextType,
    outcome: Option<StageOutcome>,
    /// Stage-specific fields accumulated by the chain
    pub data: StageData,
}

impl<'t> StageContext<'t> {
    /// Create a context for one stage dispatch, seeding the payload from
    /// the transaction where the stage expects it
    pub fn new(transaction: &'t mut Transaction, context_type: ContextType) -> Self {
        let data = match context_type {
            ContextType::Extract(_) => StageData::Extract(ExtractData::default()),
            ContextType::Validate(_) => StageData::Validate(ValidateData {
                client_id: transaction
                    .request()
                    .and_then(|request| request.client_id())
                    .map(str::to_owned),
                principal: None,
            }),
            ContextType::Handle(_) => StageData::Handle(HandleData::default()),
            ContextType::ApplyResponse(_) => StageData::Apply(ApplyData::default()),
            ContextType::Authenticate => StageData::Authenticate(AuthenticateData::default()),
            ContextType::ValidateToken => StageData::ValidateToken(ValidateTokenData::default()),
            ContextType::GenerateToken => StageData::GenerateToken(GenerateTokenData::default()),
        };

        StageContext {
            transaction,
            context_type,
            outcome: None,
            data,
        }
    }

    pub fn context_type(&self) -> ContextType {
        self.context_type
    }

    pub fn outcome(&self) -> Option<&StageOutcome> {
        self.outcome.as_ref()
    }

    /// Whether a terminal outcome has been set, ending the chain
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Consume the context, releasing the transaction borrow and yielding
    /// the chain outcome and the accumulated stage fields
    pub fn into_parts(self) -> (Option<StageOutcome>, StageData) {
        (self.outcome, self.data)
    }

    /// Mark the operation as fully answered by a handler
    pub fn handle_request(&mut self) -> ServerResult<()> {
        self.set_outcome(StageOutcome::Handled)
    }

    /// Mark the operation as intentionally bypassed
    pub fn skip_request(&mut self) -> ServerResult<()> {
        self.set_outcome(StageOutcome::Skipped)
    }

    /// Reject the operation with a standard protocol error
    pub fn reject(&mut self, rejection: ProtocolRejection) -> ServerResult<()> {
        self.set_outcome(StageOutcome::Rejected(rejection))
    }

    fn set_outcome(&mut self, outcome: StageOutcome) -> ServerResult<()> {
        if self.outcome.is_some() {
            return Err(ServerError::invariant(
                ErrorContext::new("context", "set_outcome")
                    .with_details("a terminal outcome has already been set on this context"),
            ));
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    pub fn extract_mut(&mut self) -> ServerResult<&mut ExtractData> {
        match &mut self.data {
            StageData::Extract(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "extract")),
        }
    }

    pub fn validate(&self) -> ServerResult<&ValidateData> {
        match &self.data {
            StageData::Validate(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "validate")),
        }
    }

    pub fn validate_mut(&mut self) -> ServerResult<&mut ValidateData> {
        match &mut self.data {
            StageData::Validate(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "validate")),
        }
    }

    pub fn handle(&self) -> ServerResult<&HandleData> {
        match &self.data {
            StageData::Handle(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "handle")),
        }
    }

    pub fn handle_mut(&mut self) -> ServerResult<&mut HandleData> {
        match &mut self.data {
            StageData::Handle(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "handle")),
        }
    }

    pub fn authenticate_mut(&mut self) -> ServerResult<&mut AuthenticateData> {
        match &mut self.data {
            StageData::Authenticate(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "authenticate")),
        }
    }

    pub fn validate_token_mut(&mut self) -> ServerResult<&mut ValidateTokenData> {
        match &mut self.data {
            StageData::ValidateToken(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "validate-token")),
        }
    }

    pub fn generate_token_mut(&mut self) -> ServerResult<&mut GenerateTokenData> {
        match &mut self.data {
            StageData::GenerateToken(data) => Ok(data),
            _ => Err(Self::payload_mismatch(self.context_type, "generate-token")),
        }
    }

    fn payload_mismatch(context_type: ContextType, expected: &str) -> ServerError {
        ServerError::invariant(
            ErrorContext::new("context", "payload_access").with_details(format!(
                "expected a {expected} payload but the context is {context_type}"
            )),
        )
    }
}
