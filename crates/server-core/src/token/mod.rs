//! Token validation behind a pluggable interface
//!
//! The engine never runs cryptographic algorithms itself: everything goes
//! through [`TokenHandler`], which turns a wire-level token into a claims
//! [`Principal`] or a protocol rejection. [`JwtTokenHandler`] is the
//! default implementation for HMAC-signed JWT access tokens.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use tracing::debug;

use crate::credentials::TokenValidationParameters;
use crate::errors::{ProtocolRejection, ServerError, ServerResult};
use crate::principal::Principal;
use crate::wire::constants::{errors, token_type_hints};

/// Validates wire tokens into claims principals
///
/// Failures are protocol rejections, not internal errors: an expired or
/// tampered token is an expected outcome the caller converts into the
/// endpoint's error shape.
#[async_trait]
pub trait TokenHandler: Send + Sync {
    async fn validate_token(
        &self,
        token: &str,
        parameters: &TokenValidationParameters,
    ) -> Result<Principal, ProtocolRejection>;
}

/// JWT validation over the ranked symmetric signing credentials
///
/// Tries each symmetric secret in ranked order and accepts the first one
/// that verifies the signature and the registered time claims. Audience
/// checks are left to the endpoint chains, which compare audiences
/// against the authenticated caller themselves.
#[derive(Debug, Default)]
pub struct JwtTokenHandler;

impl JwtTokenHandler {
    pub fn new() -> Self {
        JwtTokenHandler
    }

    /// Sign a claims object with a symmetric secret (HS256)
    pub fn sign(claims: &serde_json::Map<String, Value>, secret: &[u8]) -> ServerResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|error| ServerError::Token(error.to_string()))
    }

    fn validation(parameters: &TokenValidationParameters) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        if let Some(issuer) = &parameters.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        validation
    }
}

#[async_trait]
impl TokenHandler for JwtTokenHandler {
    async fn validate_token(
        &self,
        token: &str,
        parameters: &TokenValidationParameters,
    ) -> Result<Principal, ProtocolRejection> {
        let validation = Self::validation(parameters);

        let mut last_error = None;
        for secret in parameters.symmetric_signing_secrets() {
            match decode::<serde_json::Map<String, Value>>(
                token,
                &DecodingKey::from_secret(secret),
                &validation,
            ) {
                Ok(data) => {
                    let mut principal = Principal::from_claims(data.claims);
                    // Tokens minted before usage hints existed count as
                    // access tokens.
                    if principal.token_usage().is_none() {
                        principal.set_token_usage(token_type_hints::ACCESS_TOKEN);
                    }
                    return Ok(principal);
                }
                Err(error) => last_error = Some(error),
            }
        }

        if let Some(error) = last_error {
            debug!(%error, "token validation failed");
        }
        Err(
            ProtocolRejection::new(errors::INVALID_TOKEN)
                .with_description("the token is invalid or has expired"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use crate::wire::constants::claims;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn parameters(secrets: &[&[u8]]) -> TokenValidationParameters {
        TokenValidationParameters {
            issuer: None,
            issuer_signing_keys: secrets
                .iter()
                .map(|secret| Credential::symmetric(secret.to_vec()))
                .collect(),
            encryption_keys: Vec::new(),
        }
    }

    fn claims_with_exp(offset: Duration) -> serde_json::Map<String, Value> {
        let mut claims = serde_json::Map::new();
        claims.insert("sub".into(), json!("user-1"));
        claims.insert("exp".into(), json!((Utc::now() + offset).timestamp()));
        claims
    }

    #[tokio::test]
    async fn test_valid_token_yields_principal_with_access_token_usage() {
        let secret = b"a-symmetric-secret-of-decent-size";
        let token = JwtTokenHandler::sign(&claims_with_exp(Duration::hours(1)), secret).unwrap();

        let principal = JwtTokenHandler::new()
            .validate_token(&token, &parameters(&[secret]))
            .await
            .unwrap();
        assert_eq!(principal.subject(), Some("user-1"));
        assert!(principal.is_access_token());
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_as_invalid_token() {
        let secret = b"a-symmetric-secret-of-decent-size";
        let token = JwtTokenHandler::sign(&claims_with_exp(-Duration::hours(2)), secret).unwrap();

        let rejection = JwtTokenHandler::new()
            .validate_token(&token, &parameters(&[secret]))
            .await
            .unwrap_err();
        assert_eq!(rejection.error, errors::INVALID_TOKEN);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let token = JwtTokenHandler::sign(&claims_with_exp(Duration::hours(1)), b"signing-secret")
            .unwrap();

        let rejection = JwtTokenHandler::new()
            .validate_token(&token, &parameters(&[b"a-different-secret"]))
            .await
            .unwrap_err();
        assert_eq!(rejection.error, errors::INVALID_TOKEN);
    }

    #[tokio::test]
    async fn test_later_ranked_secret_still_verifies() {
        let active = b"rotated-in-secret";
        let retired = b"rotated-out-secret";
        let token = JwtTokenHandler::sign(&claims_with_exp(Duration::hours(1)), retired).unwrap();

        let principal = JwtTokenHandler::new()
            .validate_token(&token, &parameters(&[active, retired]))
            .await
            .unwrap();
        assert_eq!(principal.subject(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_explicit_token_usage_is_preserved() {
        let secret = b"a-symmetric-secret-of-decent-size";
        let mut claims = claims_with_exp(Duration::hours(1));
        claims.insert(
            claims::TOKEN_USAGE.into(),
            json!(token_type_hints::REFRESH_TOKEN),
        );
        let token = JwtTokenHandler::sign(&claims, secret).unwrap();

        let principal = JwtTokenHandler::new()
            .validate_token(&token, &parameters(&[secret]))
            .await
            .unwrap();
        assert!(principal.is_refresh_token());
        assert!(!principal.is_access_token());
    }
}
