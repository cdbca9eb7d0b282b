//! Built-in chains for the introspection endpoint (RFC 7662)
//!
//! Validation authenticates the submitted token and checks that the
//! caller is allowed to introspect it; the handle chain copies the
//! principal's metadata into the response fields. Per the introspection
//! contract, an `invalid_token` rejection is collapsed into a bare
//! `{"active": false}` response so callers cannot distinguish an expired
//! token from an unknown one.

use async_trait::async_trait;
use oauthly_infra_common::ErrorContext;
use serde_json::Value;
use tracing::debug;

use super::{ORDER_BASE, ORDER_STEP};
use crate::context::{HandleData, StageContext, StageData, StageOutcome};
use crate::dispatch::{ContextType, Dispatcher, HandlerDescriptor, HandlerFilter, ServerHandler};
use crate::errors::{ProtocolRejection, ServerError, ServerResult};
use crate::stores::ClientType;
use crate::transaction::{AuthenticationOutcome, EndpointKind};
use crate::wire::constants::{claims, errors, permissions, token_types};
use crate::wire::OAuthResponse;

const ENDPOINT: EndpointKind = EndpointKind::Introspection;

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
                        ErrorContext::new("introspection", "validate_authentication")
                            .with_details("authentication completed without a principal"),
                    )
                })?;
                context.validate_mut()?.principal = Some(principal);
            }
        }
        Ok(())
    }
}

/// The authenticated client must hold the introspection permission
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
            Some(application)
                if !application.has_permission(permissions::ENDPOINT_INTROSPECTION) =>
            {
                debug!(client_id = %client_id, "introspection permission missing");
                context.reject(
                    ProtocolRejection::new(errors::UNAUTHORIZED_CLIENT).with_description(
                        "this client application is not allowed to use the introspection endpoint",
                    ),
                )?;
            }
            Some(_) => {}
        }
        Ok(())
    }
}

/// Only access and refresh tokens can be introspected
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
                    .with_description("the specified token cannot be introspected"),
            )?;
        }
        Ok(())
    }
}

/// An access token may only be introspected by a party it was issued to
/// (a presenter) or for (an audience); a refresh token only by a party
/// it was issued to. A token carrying no claim of the relevant family is
/// not specific to any application and the check is bypassed. The
/// mismatch is reported as `invalid_token` so it collapses to
/// `active: false` and reveals nothing about the token.
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
                    ErrorContext::new("introspection", "attach_principal")
                        .with_details("the validate stage stored no result"),
                )
            })?;
        let principal = outcome.principal.ok_or_else(|| {
            ServerError::invariant(
                ErrorContext::new("introspection", "attach_principal")
                    .with_details("the validate stage stored no principal"),
            )
        })?;

        let data = context.handle_mut()?;
        data.principal = Some(principal);
        data.client_id = outcome.client_id;
        Ok(())
    }
}

/// Copy the standard token metadata into the response fields
struct AttachMetadataClaims;

#[async_trait]
impl ServerHandler for AttachMetadataClaims {
    async fn handle(
        &self,
        dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let issuer = dispatcher.options().issuer.clone();
        let principal = context.handle()?.principal.clone().ok_or_else(|| {
            ServerError::invariant(
                ErrorContext::new("introspection", "attach_metadata")
                    .with_details("no principal was attached before the metadata handler"),
            )
        })?;

        let data = context.handle_mut()?;
        data.issuer = issuer;
        data.subject = principal.subject().map(str::to_owned);
        data.token_id = principal.token_id().map(str::to_owned);
        data.token_usage = principal.token_usage().map(str::to_owned);
        if principal.is_access_token() {
            data.token_type = Some(token_types::BEARER.to_owned());
        }
        data.client_id = principal
            .client_id()
            .map(str::to_owned)
            .or_else(|| principal.presenters().first().map(|azp| (*azp).to_owned()));
        data.audiences = principal
            .audiences()
            .into_iter()
            .map(str::to_owned)
            .collect();
        data.issued_at = principal.issued_at();
        data.not_before = principal.not_before();
        data.expires_at = principal.expires_at();
        Ok(())
    }
}

/// Release the sensitive application-specific claims of the token
///
/// Scopes, username and custom claims are only disclosed for access
/// tokens, and only to a confidential caller explicitly listed in the
/// token's audience; every other caller gets the bare metadata.
struct AttachApplicationClaims;

impl AttachApplicationClaims {
    fn is_standard_claim(name: &str) -> bool {
        matches!(
            name,
            claims::AUDIENCE
                | claims::AUTHORIZED_PARTY
                | claims::CLIENT_ID
                | claims::EXPIRES_AT
                | claims::ISSUED_AT
                | claims::ISSUER
                | claims::JWT_ID
                | claims::NOT_BEFORE
                | claims::SCOPE
                | claims::SUBJECT
                | claims::TOKEN_TYPE
                | claims::TOKEN_USAGE
                | claims::USERNAME
        )
    }
}

#[async_trait]
impl ServerHandler for AttachApplicationClaims {
    async fn handle(
        &self,
        dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        let principal = context.handle()?.principal.clone().ok_or_else(|| {
            ServerError::invariant(
                ErrorContext::new("introspection", "attach_application_claims")
                    .with_details("no principal was attached before the application handler"),
            )
        })?;
        if !principal.is_access_token() {
            return Ok(());
        }

        let caller = context
            .transaction
            .validation_outcome(ENDPOINT)
            .and_then(|outcome| outcome.client_id.clone());
        let Some(caller) = caller else {
            return Ok(());
        };
        if !principal.has_audience(&caller) {
            debug!(client_id = %caller, "caller is not an audience, sensitive claims withheld");
            return Ok(());
        }

        let application = dispatcher
            .services()
            .applications()
            .find_by_client_id(&caller)
            .await?
            .ok_or_else(|| {
                ServerError::invariant(
                    ErrorContext::new("introspection", "attach_application_claims")
                        .with_details("the authenticated caller vanished from the store"),
                )
            })?;
        if application.client_type == ClientType::Public {
            debug!(client_id = %caller, "public client, sensitive claims withheld");
            return Ok(());
        }

        let data = context.handle_mut()?;
        data.username = principal
            .string_claim(claims::USERNAME)
            .or_else(|| principal.string_claim(claims::NAME))
            .map(str::to_owned);
        data.scopes = principal.scopes();
        for (name, values) in principal.iter() {
            if Self::is_standard_claim(name) || name.starts_with(claims::PRIVATE_PREFIX) {
                continue;
            }
            let value = match values.as_slice() {
                [single] => single.clone(),
                many => Value::Array(many.to_vec()),
            };
            data.claims.insert(name.clone(), value);
        }
        Ok(())
    }
}

/// Collapse `invalid_token` errors into a bare inactive response
struct NormalizeErrorResponse;

#[async_trait]
impl ServerHandler for NormalizeErrorResponse {
    async fn handle(
        &self,
        _dispatcher: &Dispatcher,
        context: &mut StageContext<'_>,
    ) -> ServerResult<()> {
        if let Some(response) = context.transaction.response_mut() {
            if response.error() == Some(errors::INVALID_TOKEN) {
                debug!("normalizing invalid_token rejection into an inactive response");
                let mut normalized = OAuthResponse::new();
                normalized.set(claims::ACTIVE, Value::Bool(false));
                *response = normalized;
            }
        }
        Ok(())
    }
}

/// Assemble the success response from the handle stage output
pub(super) fn build_response(data: &HandleData) -> ServerResult<OAuthResponse> {
    if data.principal.is_none() {
        return Err(ServerError::invariant(
            ErrorContext::new("introspection", "build_response")
                .with_details("the handle stage attached no principal"),
        ));
    }

    let mut response = OAuthResponse::new();
    response.set(claims::ACTIVE, Value::Bool(true));

    if let Some(issuer) = &data.issuer {
        response.set(claims::ISSUER, Value::String(issuer.to_string()));
    }
    if let Some(username) = &data.username {
        response.set(claims::USERNAME, Value::String(username.clone()));
    }
    if let Some(subject) = &data.subject {
        response.set(claims::SUBJECT, Value::String(subject.clone()));
    }
    if !data.scopes.is_empty() {
        let scope = data.scopes.iter().cloned().collect::<Vec<_>>().join(" ");
        response.set(claims::SCOPE, Value::String(scope));
    }
    if let Some(token_id) = &data.token_id {
        response.set(claims::JWT_ID, Value::String(token_id.clone()));
    }
    if let Some(token_type) = &data.token_type {
        response.set(claims::TOKEN_TYPE, Value::String(token_type.clone()));
    }
    if let Some(token_usage) = &data.token_usage {
        response.set(claims::TOKEN_USAGE, Value::String(token_usage.clone()));
    }
    if let Some(client_id) = &data.client_id {
        response.set(claims::CLIENT_ID, Value::String(client_id.clone()));
    }
    if let Some(issued_at) = data.issued_at {
        response.set(claims::ISSUED_AT, Value::from(issued_at.timestamp()));
    }
    if let Some(not_before) = data.not_before {
        response.set(claims::NOT_BEFORE, Value::from(not_before.timestamp()));
    }
    if let Some(expires_at) = data.expires_at {
        response.set(claims::EXPIRES_AT, Value::from(expires_at.timestamp()));
    }
    match data.audiences.len() {
        0 => {}
        1 => response.set(claims::AUDIENCE, Value::String(data.audiences[0].clone())),
        _ => response.set(
            claims::AUDIENCE,
            Value::Array(
                data.audiences
                    .iter()
                    .map(|audience| Value::String(audience.clone()))
                    .collect(),
            ),
        ),
    }

    // Extra claims attached by custom handlers, minus engine-internal ones
    for (name, value) in &data.claims {
        if !name.starts_with(claims::PRIVATE_PREFIX) {
            response.set(name.clone(), value.clone());
        }
    }

    Ok(response)
}

pub(super) fn default_handlers() -> Vec<HandlerDescriptor> {
    let validate = ContextType::Validate(ENDPOINT);
    let handle = ContextType::Handle(ENDPOINT);
    let apply = ContextType::ApplyResponse(ENDPOINT);

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
        HandlerDescriptor::singleton(handle, ORDER_BASE + ORDER_STEP, AttachMetadataClaims)
            .built_in(),
        HandlerDescriptor::singleton(handle, ORDER_BASE + 2 * ORDER_STEP, AttachApplicationClaims)
            .with_filter(HandlerFilter::ClientIdPresent)
            .with_filter(HandlerFilter::DegradedModeDisabled)
            .built_in(),
        HandlerDescriptor::singleton(apply, ORDER_BASE, NormalizeErrorResponse).built_in(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Principal;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_build_response_emits_epoch_seconds_and_single_audience() {
        let mut principal = Principal::new();
        principal.set_claim(claims::SUBJECT, json!("user-1"));

        let mut data = HandleData::default();
        data.principal = Some(principal);
        data.subject = Some("user-1".to_owned());
        data.client_id = Some("caller".to_owned());
        data.token_type = Some(token_types::BEARER.to_owned());
        data.scopes = ["openid", "profile"].iter().map(|s| s.to_string()).collect();
        data.audiences = vec!["caller".to_owned()];
        data.expires_at = Utc.timestamp_opt(1_700_003_600, 0).single();

        let response = build_response(&data).unwrap();
        assert_eq!(response.get(claims::ACTIVE), Some(&Value::Bool(true)));
        assert_eq!(response.get_str(claims::SCOPE), Some("openid profile"));
        assert_eq!(response.get_str(claims::AUDIENCE), Some("caller"));
        assert_eq!(
            response.get(claims::EXPIRES_AT),
            Some(&Value::from(1_700_003_600i64))
        );
        assert_eq!(response.get_str(claims::TOKEN_TYPE), Some(token_types::BEARER));
    }

    #[test]
    fn test_build_response_emits_audience_array() {
        let mut data = HandleData::default();
        data.principal = Some(Principal::new());
        data.audiences = vec!["api".to_owned(), "caller".to_owned()];

        let response = build_response(&data).unwrap();
        assert_eq!(
            response.get(claims::AUDIENCE),
            Some(&json!(["api", "caller"]))
        );
    }

    #[test]
    fn test_build_response_skips_private_claims() {
        let mut data = HandleData::default();
        data.principal = Some(Principal::new());
        data.claims
            .insert("oauthly:internal".to_owned(), json!("secret"));
        data.claims.insert("custom".to_owned(), json!("visible"));

        let response = build_response(&data).unwrap();
        assert!(response.get("oauthly:internal").is_none());
        assert_eq!(response.get_str("custom"), Some("visible"));
    }

    #[test]
    fn test_standard_claims_are_never_copied_as_custom_claims() {
        assert!(AttachApplicationClaims::is_standard_claim(claims::SCOPE));
        assert!(AttachApplicationClaims::is_standard_claim(claims::USERNAME));
        assert!(!AttachApplicationClaims::is_standard_claim("department"));
    }

    #[test]
    fn test_build_response_without_principal_is_a_defect() {
        let error = build_response(&HandleData::default()).unwrap_err();
        assert!(matches!(error, ServerError::InvariantViolation(_)));
    }
}
