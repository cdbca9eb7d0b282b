//! The shared authentication chain
//!
//! Endpoint Validate chains do not talk to the token handler directly:
//! they nest a dispatch of the `Authenticate` context, which resolves the
//! wire token and validates it into a principal. Degraded deployments
//! replace this chain with their own handlers.

use async_trait::async_trait;
use oauthly_infra_common::ErrorContext;
use tracing::debug;

use super::{ORDER_BASE, ORDER_STEP};
use crate::context::StageContext;
use crate::dispatch::{ContextType, Dispatcher, HandlerDescriptor, ServerHandler};
use crate::errors::{ProtocolRejection, ServerError, ServerResult};
use crate::wire::constants::errors;

/// Copy the token and hint from the parsed request into the context,
/// unless an enclosing chain already seeded them
struct ResolveTokenFromRequest;

#[async_trait]
impl ServerHandler for ResolveTokenFromRequest {
    async fn handle(
        &self,
        _dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let (token, hint) = {
            let request = context.transaction.request();
            (
                request.and_then(|request| request.token()).map(str::to_owned),
                request
                    .and_then(|request| request.token_type_hint())
                    .map(str::to_owned),
            )
        };

        let data = context.authenticate_mut()?;
        if data.token.is_none() {
            data.token = token;
        }
        if data.token_type_hint.is_none() {
            data.token_type_hint = hint;
        }

        if context.authenticate_mut()?.token.is_none() {
            context.reject(
                ProtocolRejection::new(errors::INVALID_REQUEST)
                    .with_description("the mandatory 'token' parameter is missing"),
            )?;
        }
        Ok(())
    }
}

/// Validate the resolved token through the configured token handler
struct ValidateReceivedToken;

#[async_trait]
impl ServerHandler for ValidateReceivedToken {
    async fn handle(
        &self,
        dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        // An earlier handler (e.g. a degraded-mode replacement) may have
        // authenticated the token already.
        if context.authenticate_mut()?.principal.is_some() {
            return Ok(());
        }

        let token = context.authenticate_mut()?.token.clone();
        let Some(token) = token else {
            // The resolution handler rejects missing tokens; reaching
            // this point without one means the chain was reordered.
            return Err(ServerError::invariant(
                ErrorContext::new("authentication", "validate_token")
                    .with_details("no token was resolved before validation"),
            ));
        };

        let options = dispatcher.options();
        let handler = options.token_handler.clone().ok_or_else(|| {
            ServerError::invariant(
                ErrorContext::new("authentication", "validate_token")
                    .with_details("no token handler survived configuration validation"),
            )
        })?;

        match handler
            .validate_token(&token, &options.token_validation_parameters)
            .await
        {
            Ok(principal) => {
                debug!(
                    transaction = %context.transaction.id(),
                    token_usage = ?principal.token_usage(),
                    "token validated"
                );
                context.authenticate_mut()?.principal = Some(principal);
            }
            Err(rejection) => {
                debug!(
                    transaction = %context.transaction.id(),
                    error = %rejection.error,
                    "token rejected"
                );
                context.reject(rejection)?;
            }
        }
        Ok(())
    }
}

pub(super) fn default_handlers() -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::singleton(ContextType::Authenticate, ORDER_BASE, ResolveTokenFromRequest)
            .built_in(),
        HandlerDescriptor::singleton(
            ContextType::Authenticate,
            ORDER_BASE + ORDER_STEP,
            ValidateReceivedToken,
        )
        .built_in(),
    ]
}
