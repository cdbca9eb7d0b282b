//! The protocol engine: stage orchestration over the dispatcher
//!
//! [`ServerEngine`] is the entry point a transport adapter talks to. It
//! validates the declared options once, freezes the handler registry and
//! then drives each inbound operation through the fixed stage sequence
//! Extract -> Validate -> Handle -> Apply, with the error path branching
//! to an Apply dispatch over the rejection response.
//!
//! ## Architecture
//!
//! ```text
//! process(endpoint, parameters)
//!      │
//!      ├── Extract ──── built-in parameter extraction per endpoint
//!      ├── Validate ─── endpoint chain, may nest an Authenticate dispatch
//!      ├── Handle ───── endpoint chain populating the response fields
//!      └── Apply ────── response finalization (success and error paths)
//! ```
//!
//! A stage that sets `Handled`/`Skipped` returns control to the adapter
//! immediately; a `Rejected` outcome short-circuits to the error-path
//! Apply dispatch. A non-error Handle stage that produces nothing is a
//! defect, surfaced as an invariant violation rather than a wire error
//! with leaked internals.

pub mod authentication;
pub mod introspection;
pub mod revocation;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use oauthly_infra_common::ErrorContext;
use tracing::{debug, info, warn};

use crate::context::{StageContext, StageData, StageOutcome};
use crate::dispatch::{
    ContextType, Dispatcher, HandlerDescriptor, HandlerRegistry, ServerHandler,
};
use crate::errors::{ProtocolRejection, ServerError, ServerResult};
use crate::options::{validator, ServerOptions};
use crate::stores::ServerServices;
use crate::transaction::{EndpointKind, Transaction, TransactionState, ValidationOutcome};
use crate::wire::{OAuthRequest, OAuthResponse};

/// First order used by built-in chains; subsequent handlers step by
/// [`ORDER_STEP`] so deployers can slot custom handlers in between.
pub(crate) const ORDER_BASE: i32 = i32::MIN + 100_000;
pub(crate) const ORDER_STEP: i32 = 1_000;

/// What the transport adapter should do with a processed operation
#[derive(Debug)]
pub enum ProcessOutcome {
    /// A finalized response to serialize onto the wire
    Responded(OAuthResponse),
    /// A handler already answered at the transport level
    Handled,
    /// The engine intentionally bypassed the operation; the adapter
    /// produces its own default response
    Skipped,
}

/// The validated, immutable protocol engine
pub struct ServerEngine {
    options: Arc<ServerOptions>,
    dispatcher: Arc<Dispatcher>,
}

impl ServerEngine {
    /// Validate the options, freeze the registry and build the engine
    ///
    /// Fails fast on the first configuration inconsistency; a process
    /// whose options fail validation must not accept requests.
    pub fn new(mut options: ServerOptions, services: ServerServices) -> ServerResult<Self> {
        validator::validate(&mut options)?;
        let registry = HandlerRegistry::from_descriptors(options.handlers.clone())?;

        let options = Arc::new(options);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&options),
            Arc::new(registry),
            services,
        ));

        info!("protocol engine ready");
        Ok(ServerEngine {
            options,
            dispatcher,
        })
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Process one inbound operation
    ///
    /// `parameters` are the decoded transport parameters (form or query);
    /// repeated names become array values during extraction.
    pub async fn process<I, K, V>(
        &self,
        endpoint: EndpointKind,
        parameters: I,
    ) -> ServerResult<ProcessOutcome>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut transaction = Transaction::with_parameters(endpoint, parameters);
        debug!(
            transaction = %transaction.id(),
            endpoint = %endpoint,
            "processing inbound operation"
        );
        self.run(&mut transaction).await
    }

    async fn run(&self, transaction: &mut Transaction) -> ServerResult<ProcessOutcome> {
        let endpoint = transaction.endpoint();

        // Extract
        let (outcome, data) = self
            .run_stage(transaction, ContextType::Extract(endpoint))
            .await?;
        match outcome {
            Some(outcome) => return self.short_circuit(transaction, outcome).await,
            None => {
                let request = match data {
                    StageData::Extract(data) => data.request,
                    _ => None,
                };
                let request = request.ok_or_else(|| {
                    ServerError::invariant(
                        ErrorContext::new("engine", "extract")
                            .with_details("the extract stage produced no request"),
                    )
                })?;
                transaction.set_request(request)?;
                transaction.transition(TransactionState::Extracted)?;
            }
        }

        // Validate
        let (outcome, data) = self
            .run_stage(transaction, ContextType::Validate(endpoint))
            .await?;
        match outcome {
            Some(outcome) => return self.short_circuit(transaction, outcome).await,
            None => {
                let outcome = match data {
                    StageData::Validate(data) => ValidationOutcome {
                        principal: data.principal,
                        client_id: data.client_id,
                    },
                    _ => ValidationOutcome::default(),
                };
                transaction.set_validation_outcome(endpoint, outcome);
                transaction.transition(TransactionState::Validated)?;
            }
        }

        // Handle
        let (outcome, data) = self
            .run_stage(transaction, ContextType::Handle(endpoint))
            .await?;
        match outcome {
            Some(outcome) => return self.short_circuit(transaction, outcome).await,
            None => {
                let response = match data {
                    StageData::Handle(data) => assemble_response(endpoint, data)?,
                    _ => {
                        return Err(ServerError::invariant(
                            ErrorContext::new("engine", "handle")
                                .with_details("the handle stage carried a foreign payload"),
                        ))
                    }
                };
                transaction.set_response(response)?;
                transaction.transition(TransactionState::Handled)?;
            }
        }

        // Apply (success path)
        let (outcome, _) = self
            .run_stage(transaction, ContextType::ApplyResponse(endpoint))
            .await?;
        if let Some(outcome) = outcome {
            return self.short_circuit(transaction, outcome).await;
        }
        transaction.transition(TransactionState::Applied)?;

        let response = transaction.take_response().ok_or_else(|| {
            ServerError::invariant(
                ErrorContext::new("engine", "apply")
                    .with_details("the finalized response disappeared before being returned"),
            )
        })?;
        debug!(transaction = %transaction.id(), "operation completed");
        Ok(ProcessOutcome::Responded(response))
    }

    async fn run_stage(
        &self,
        transaction: &mut Transaction,
        context_type: ContextType,
    ) -> ServerResult<(Option<StageOutcome>, StageData)> {
        let mut context = StageContext::new(transaction, context_type);
        self.dispatcher.dispatch(&mut context).await?;
        Ok(context.into_parts())
    }

    async fn short_circuit(
        &self,
        transaction: &mut Transaction,
        outcome: StageOutcome,
    ) -> ServerResult<ProcessOutcome> {
        match outcome {
            StageOutcome::Handled => {
                transaction.transition(TransactionState::ShortCircuited)?;
                debug!(transaction = %transaction.id(), "operation answered by a handler");
                Ok(ProcessOutcome::Handled)
            }
            StageOutcome::Skipped => {
                transaction.transition(TransactionState::ShortCircuited)?;
                debug!(transaction = %transaction.id(), "operation bypassed by a handler");
                Ok(ProcessOutcome::Skipped)
            }
            StageOutcome::Rejected(rejection) => self.apply_error(transaction, rejection).await,
        }
    }

    /// Convert a rejection into a wire error response and run the
    /// error-path Apply dispatch over it
    async fn apply_error(
        &self,
        transaction: &mut Transaction,
        rejection: ProtocolRejection,
    ) -> ServerResult<ProcessOutcome> {
        warn!(
            transaction = %transaction.id(),
            endpoint = %transaction.endpoint(),
            error = %rejection.error,
            "operation rejected"
        );
        transaction.transition(TransactionState::Rejected)?;

        // A rejection raised during the success-path Apply dispatch
        // supersedes the response the Handle stage produced.
        transaction.take_response();

        let mut response = OAuthResponse::new();
        response.set_error(
            &rejection.error,
            rejection.description.as_deref(),
            rejection.uri.as_deref(),
        );
        transaction.set_response(response)?;

        let endpoint = transaction.endpoint();
        let (_, _) = self
            .run_stage(transaction, ContextType::ApplyResponse(endpoint))
            .await?;
        transaction.transition(TransactionState::AppliedError)?;

        let response = transaction.take_response().ok_or_else(|| {
            ServerError::invariant(
                ErrorContext::new("engine", "apply_error")
                    .with_details("the error response disappeared before being returned"),
            )
        })?;
        Ok(ProcessOutcome::Responded(response))
    }
}

impl fmt::Debug for ServerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Build the endpoint's success response from the handle stage output
///
/// Endpoints with no built-in handle chain have no response shape here;
/// reaching this point for one of them means no handler populated a
/// response, which is a defect guard, not a client-facing condition.
fn assemble_response(
    endpoint: EndpointKind,
    data: crate::context::HandleData,
) -> ServerResult<OAuthResponse> {
    match endpoint {
        EndpointKind::Introspection => introspection::build_response(&data),
        EndpointKind::Revocation => revocation::build_response(&data),
        _ => Err(ServerError::invariant(
            ErrorContext::new("engine", "assemble_response").with_details(format!(
                "no response was produced for the {endpoint} handle stage"
            )),
        )),
    }
}

/// Built-in extraction: turn the decoded transport parameters into the
/// parsed request. Registered for every endpoint kind.
struct ExtractRequestParameters;

#[async_trait]
impl ServerHandler for ExtractRequestParameters {
    async fn handle(
        &self,
        _dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let parameters = context
            .transaction
            .raw_parameters()
            .map(|raw| raw.0.clone())
            .unwrap_or_default();
        context.extract_mut()?.request = Some(OAuthRequest::from_parameters(parameters));
        Ok(())
    }
}

fn extraction_handlers() -> Vec<HandlerDescriptor> {
    EndpointKind::ALL
        .into_iter()
        .map(|endpoint| {
            HandlerDescriptor::singleton(
                ContextType::Extract(endpoint),
                ORDER_BASE,
                ExtractRequestParameters,
            )
            .built_in()
        })
        .collect()
}

/// The complete built-in handler catalogue
pub fn default_handlers() -> Vec<Arc<HandlerDescriptor>> {
    let mut handlers = extraction_handlers();
    handlers.extend(authentication::default_handlers());
    handlers.extend(introspection::default_handlers());
    handlers.extend(revocation::default_handlers());
    handlers.into_iter().map(Arc::new).collect()
}
