//! Built-in chains for the revocation endpoint (RFC 7009)
//!
//! Validation mirrors introspection: authenticate the submitted token and
//! check the caller is allowed to revoke it. The handle chain marks the
//! token revoked in the store when token storage is enabled; the success
//! response is an empty object regardless of whether a stored record was
//! found, so callers cannot probe for token existence.

use async_trait::async_trait;
use oauthly_infra_common::ErrorContext;
use tracing::debug;

use super::{ORDER_BASE, ORDER_STEP};
use crate::context::{HandleData, StageContext, StageData, StageOutcome};
use crate::dispatch::{ContextType, Dispatcher, HandlerDescriptor, HandlerFilter, ServerHandler};
use crate::errors::{ProtocolRejection, ServerError, ServerResult};
use crate::transaction::{AuthenticationOutcome, EndpointKind};
use crate::wire::constants::{errors, permissions};
use crate::wire::OAuthResponse;

const ENDPOINT: EndpointKind = EndpointKind::Revocation;

/// The `token` parameter is mandatory
struct ValidateTokenParameter;

#[async_trait]
impl ServerHandler for ValidateTokenParameter {
    async fn handle(
        &self,
        _dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let present = context
            .transaction
            .request()
            .and_then(|request| request.token())
            .is_some();
        if !present {
            context.reject(
                ProtocolRejection::new(errors::INVALID_REQUEST)
                    .with_description("the mandatory 'token' parameter is missing"),
            )?;
        }
        Ok(())
    }
}

/// Authenticate the submitted token through a nested dispatch
struct ValidateAuthentication;

#[async_trait]
impl ServerHandler for ValidateAuthentication {
    async fn handle(
        &self,
        dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let mut nested =
            StageContext::new(&mut *context.transaction, ContextType::Authenticate);
        dispatcher.dispatch(&mut nested).await?;
        let (outcome, data) = nested.into_parts();

        match outcome {
            Some(StageOutcome::Rejected(rejection)) => {
                context.reject(rejection)?;
            }
            Some(StageOutcome::Handled) => {
                context.handle_request()?;
            }
            Some(StageOutcome::Skipped) => {
                context.skip_request()?;
            }
            None => {
                let principal = match data {
                    StageData::Authenticate(data) => data.principal,
                    _ => None,
                };
                context
                    .transaction
                    .set_authentication_outcome(AuthenticationOutcome {
                        principal: principal.clone(),
                    });
                let principal = principal.ok_or_else(|| {
                    ServerError::invariant(
                        ErrorContext::new("revocation", "validate_authentication")
                            .with_details("authentication completed without a principal"),
                    )
                })?;
                context.validate_mut()?.principal = Some(principal);
            }
        }
        Ok(())
    }
}

/// The authenticated client must hold the revocation permission
struct ValidateEndpointPermissions;

#[async_trait]
impl ServerHandler for ValidateEndpointPermissions {
    async fn handle(
        &self,
        dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let Some(client_id) = context.validate()?.client_id.clone() else {
            return Ok(());
        };

        match dispatcher
            .services()
            .applications()
            .find_by_client_id(&client_id)
            .await?
        {
            None => {
                context.reject(
                    ProtocolRejection::new(errors::INVALID_CLIENT)
                        .with_description("the client application was not found"),
                )?;
            }
            Some(application) if !application.has_permission(permissions::ENDPOINT_REVOCATION) => {
                debug!(client_id = %client_id, "revocation permission missing");
                context.reject(
                    ProtocolRejection::new(errors::UNAUTHORIZED_CLIENT).with_description(
                        "this client application is not allowed to use the revocation endpoint",
                    ),
                )?;
            }
            Some(_) => {}
        }
        Ok(())
    }
}

/// Only access and refresh tokens can be revoked through this endpoint
struct ValidateTokenType;

#[async_trait]
impl ServerHandler for ValidateTokenType {
    async fn handle(
        &self,
        _dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let supported = match &context.validate()?.principal {
            Some(principal) => principal.is_access_token() || principal.is_refresh_token(),
            None => true,
        };
        if !supported {
            context.reject(
                ProtocolRejection::new(errors::UNSUPPORTED_TOKEN_TYPE)
                    .with_description("the specified token cannot be revoked"),
            )?;
        }
        Ok(())
    }
}

/// An access token may only be revoked by a party it was issued to (a
/// presenter) or for (an audience); a refresh token only by a party it
/// was issued to. A token carrying no claim of the relevant family is
/// not specific to any application and the check is bypassed. Reported
/// as `invalid_token` to reveal nothing about the token.
struct ValidateAuthorizedParty;

#[async_trait]
impl ServerHandler for ValidateAuthorizedParty {
    async fn handle(
        &self,
        _dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let data = context.validate()?;
        let rejected = match (&data.principal, &data.client_id) {
            (Some(principal), Some(client_id)) => {
                if principal.is_access_token() {
                    !principal.audiences().is_empty()
                        && !principal.has_audience(client_id)
                        && !principal.presenters().is_empty()
                        && !principal.has_presenter(client_id)
                } else if principal.is_refresh_token() {
                    !principal.presenters().is_empty() && !principal.has_presenter(client_id)
                } else {
                    false
                }
            }
            _ => false,
        };
        if rejected {
            context.reject(ProtocolRejection::new(errors::INVALID_TOKEN))?;
        }
        Ok(())
    }
}

/// Recover the principal established during validation
struct AttachPrincipal;

#[async_trait]
impl ServerHandler for AttachPrincipal {
    async fn handle(
        &self,
        _dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let outcome = context
            .transaction
            .validation_outcome(ENDPOINT)
            .cloned()
            .ok_or_else(|| {
                ServerError::invariant(
                    ErrorContext::new("revocation", "attach_principal")
                        .with_details("the validate stage stored no result"),
                )
            })?;
        let principal = outcome.principal.ok_or_else(|| {
            ServerError::invariant(
                ErrorContext::new("revocation", "attach_principal")
                    .with_details("the validate stage stored no principal"),
            )
        })?;

        let data = context.handle_mut()?;
        data.principal = Some(principal);
        data.client_id = outcome.client_id;
        Ok(())
    }
}

/// Mark the token revoked in the store
///
/// A token without a `jti`, or one the store does not know, still yields
/// the empty success response: RFC 7009 treats revoking an unknown token
/// as a success.
struct RevokeToken;

#[async_trait]
impl ServerHandler for RevokeToken {
    async fn handle(
        &self,
        dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let token_id = context
            .handle()?
            .principal
            .as_ref()
            .and_then(|principal| principal.token_id())
            .map(str::to_owned);

        if let Some(token_id) = token_id {
            let found = dispatcher.services().tokens().revoke(&token_id).await?;
            if !found {
                debug!(token_id = %token_id, "no stored token matched the revocation");
            }
        }
        Ok(())
    }
}

/// The revocation success response is an empty object
pub(super) fn build_response(data: &HandleData) -> ServerResult<OAuthResponse> {
    if data.principal.is_none() {
        return Err(ServerError::invariant(
            ErrorContext::new("revocation", "build_response")
                .with_details("the handle stage attached no principal"),
        ));
    }
    Ok(OAuthResponse::new())
}

pub(super) fn default_handlers() -> Vec<HandlerDescriptor> {
    let validate = ContextType::Validate(ENDPOINT);
    let handle = ContextType::Handle(ENDPOINT);

    vec![
        HandlerDescriptor::singleton(validate, ORDER_BASE, ValidateTokenParameter).built_in(),
        HandlerDescriptor::singleton(validate, ORDER_BASE + ORDER_STEP, ValidateAuthentication)
            .built_in(),
        HandlerDescriptor::singleton(
            validate,
            ORDER_BASE + 2 * ORDER_STEP,
            ValidateEndpointPermissions,
        )
        .with_filter(HandlerFilter::EndpointPermissionsEnabled)
        .with_filter(HandlerFilter::ClientIdPresent)
        .built_in(),
        HandlerDescriptor::singleton(validate, ORDER_BASE + 3 * ORDER_STEP, ValidateTokenType)
            .built_in(),
        HandlerDescriptor::singleton(
            validate,
            ORDER_BASE + 4 * ORDER_STEP,
            ValidateAuthorizedParty,
        )
        .built_in(),
        HandlerDescriptor::singleton(handle, ORDER_BASE, AttachPrincipal).built_in(),
        HandlerDescriptor::singleton(handle, ORDER_BASE + ORDER_STEP, RevokeToken)
            .with_filter(HandlerFilter::TokenStorageEnabled)
            .built_in(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Principal;

    #[test]
    fn test_success_response_is_an_empty_object() {
        let mut data = HandleData::default();
        data.principal = Some(Principal::new());
        let response = build_response(&data).unwrap();
        assert_eq!(response.to_json(), serde_json::json!({}));
    }

    #[test]
    fn test_response_without_principal_is_a_defect() {
        let error = build_response(&HandleData::default()).unwrap_err();
        assert!(matches!(error, ServerError::InvariantViolation(_)));
    }
}
