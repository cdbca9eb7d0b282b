//! End-to-end introspection and revocation flows through the engine

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use url::Url;

use oauthly_infra_common::{setup_logging, LoggingConfig};
use oauthly_server_core::wire::constants::{claims, errors, permissions, token_type_hints};
use oauthly_server_core::{
    Application, ClientType, Credential, EndpointKind, GrantType, JwtTokenHandler,
    MemoryApplicationStore, MemoryTokenStore, ProcessOutcome, ServerEngine, ServerOptions,
    ServerServices, TokenRecord, TokenStatus, TokenStore,
};

const SECRET: &[u8] = b"an-integration-test-signing-secret";

fn options() -> ServerOptions {
    let mut options = ServerOptions::new();
    options.token_handler = Some(Arc::new(JwtTokenHandler::new()));
    options.issuer = Some(Url::parse("https://auth.example.com/").unwrap());
    options.enable_grant(GrantType::ClientCredentials);
    options.enable_endpoint(
        EndpointKind::Token,
        Url::parse("https://auth.example.com/connect/token").unwrap(),
    );
    options.enable_endpoint(
        EndpointKind::Introspection,
        Url::parse("https://auth.example.com/connect/introspect").unwrap(),
    );
    options.enable_endpoint(
        EndpointKind::Revocation,
        Url::parse("https://auth.example.com/connect/revoke").unwrap(),
    );
    options.signing_credentials = vec![
        Credential::symmetric(SECRET.to_vec()),
        Credential::rsa(vec![7u8; 32], vec![1, 0, 1]),
    ];
    options.encryption_credentials = vec![Credential::rsa(vec![9u8; 32], vec![1, 0, 1])];
    options
}

struct Harness {
    engine: ServerEngine,
    tokens: Arc<MemoryTokenStore>,
}

fn harness() -> Harness {
    setup_logging(LoggingConfig::default());

    let applications = Arc::new(MemoryApplicationStore::new());
    applications.insert(
        Application::new("resource-server", ClientType::Confidential)
            .with_secret("s3cret")
            .with_permission(permissions::ENDPOINT_INTROSPECTION)
            .with_permission(permissions::ENDPOINT_REVOCATION),
    );
    applications.insert(
        Application::new("spa-client", ClientType::Public)
            .with_permission(permissions::ENDPOINT_INTROSPECTION),
    );
    applications.insert(Application::new("restricted-client", ClientType::Confidential));

    let tokens = Arc::new(MemoryTokenStore::new());
    let services = ServerServices::new(applications, tokens.clone());
    let engine = ServerEngine::new(options(), services).unwrap();
    Harness { engine, tokens }
}

fn signed(token_claims: serde_json::Map<String, Value>) -> String {
    JwtTokenHandler::sign(&token_claims, SECRET).unwrap()
}

fn base_claims(expires_in: Duration) -> serde_json::Map<String, Value> {
    let mut token_claims = serde_json::Map::new();
    token_claims.insert(claims::ISSUER.into(), json!("https://auth.example.com/"));
    token_claims.insert(claims::SUBJECT.into(), json!("user-1"));
    token_claims.insert(claims::JWT_ID.into(), json!("jti-42"));
    token_claims.insert(claims::ISSUED_AT.into(), json!(Utc::now().timestamp()));
    token_claims.insert(
        claims::EXPIRES_AT.into(),
        json!((Utc::now() + expires_in).timestamp()),
    );
    token_claims
}

fn access_token(audience: &str, expires_in: Duration) -> String {
    let mut token_claims = base_claims(expires_in);
    token_claims.insert(claims::AUDIENCE.into(), json!(audience));
    token_claims.insert(claims::AUTHORIZED_PARTY.into(), json!("first-party-app"));
    token_claims.insert(claims::CLIENT_ID.into(), json!("first-party-app"));
    token_claims.insert(claims::USERNAME.into(), json!("alice"));
    token_claims.insert(claims::SCOPE.into(), json!("openid profile"));
    token_claims.insert("department".into(), json!("engineering"));
    signed(token_claims)
}

fn refresh_token(presenter: &str, expires_in: Duration) -> String {
    let mut token_claims = base_claims(expires_in);
    token_claims.insert(claims::AUTHORIZED_PARTY.into(), json!(presenter));
    token_claims.insert(
        claims::TOKEN_USAGE.into(),
        json!(token_type_hints::REFRESH_TOKEN),
    );
    token_claims.insert(claims::SCOPE.into(), json!("openid offline_access"));
    signed(token_claims)
}

fn response_of(outcome: ProcessOutcome) -> oauthly_server_core::wire::OAuthResponse {
    match outcome {
        ProcessOutcome::Responded(response) => response,
        other => panic!("expected a wire response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_token_parameter_yields_invalid_request() {
    let harness = harness();
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [("client_id", "resource-server")],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.error(), Some(errors::INVALID_REQUEST));
}

#[tokio::test]
async fn test_expired_token_yields_bare_inactive_response() {
    let harness = harness();
    let token = access_token("resource-server", -Duration::hours(2));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    // Exactly {"active": false}: no error fields survive normalization
    assert_eq!(response.to_json(), json!({ "active": false }));
}

#[tokio::test]
async fn test_garbage_token_yields_bare_inactive_response() {
    let harness = harness();
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "resource-server"),
                    ("token", "not-a-valid-token"),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.to_json(), json!({ "active": false }));
}

#[tokio::test]
async fn test_valid_token_yields_active_response_with_metadata() {
    let harness = harness();
    let token = access_token("resource-server", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.get(claims::ACTIVE), Some(&Value::Bool(true)));
    assert_eq!(response.get_str(claims::SCOPE), Some("openid profile"));
    assert_eq!(response.get_str(claims::CLIENT_ID), Some("first-party-app"));
    assert_eq!(response.get_str(claims::TOKEN_TYPE), Some("bearer"));
    assert_eq!(response.get_str(claims::SUBJECT), Some("user-1"));
    assert_eq!(response.get_str(claims::USERNAME), Some("alice"));
    assert_eq!(response.get_str(claims::JWT_ID), Some("jti-42"));
    assert_eq!(response.get_str(claims::AUDIENCE), Some("resource-server"));
    assert_eq!(
        response.get_str(claims::ISSUER),
        Some("https://auth.example.com/")
    );

    // Custom token claims flow through for an audience that is a
    // confidential client
    assert_eq!(response.get_str("department"), Some("engineering"));

    // Time fields are integer epoch seconds
    assert!(response.get(claims::ISSUED_AT).unwrap().is_i64());
    assert!(response.get(claims::EXPIRES_AT).unwrap().is_i64());
}

#[tokio::test]
async fn test_refresh_token_of_another_presenter_collapses_to_inactive() {
    let harness = harness();
    let token = refresh_token("someone-else", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.to_json(), json!({ "active": false }));
}

#[tokio::test]
async fn test_refresh_token_is_active_for_its_presenter_without_sensitive_claims() {
    let harness = harness();
    let token = refresh_token("resource-server", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.get(claims::ACTIVE), Some(&Value::Bool(true)));
    assert_eq!(
        response.get_str(claims::TOKEN_USAGE),
        Some(token_type_hints::REFRESH_TOKEN)
    );
    assert_eq!(response.get_str(claims::CLIENT_ID), Some("resource-server"));

    // Scopes, usernames and the bearer marker are only disclosed for
    // access tokens
    assert!(response.get(claims::SCOPE).is_none());
    assert!(response.get(claims::USERNAME).is_none());
    assert!(response.get(claims::TOKEN_TYPE).is_none());
}

#[tokio::test]
async fn test_unconstrained_token_is_not_tied_to_any_caller() {
    let harness = harness();
    let mut token_claims = base_claims(Duration::hours(1));
    token_claims.insert(claims::AUDIENCE.into(), json!("some-other-api"));
    token_claims.insert(claims::SCOPE.into(), json!("openid"));
    let token = signed(token_claims);

    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    // No azp claim on the token: the audience mismatch alone does not
    // reject it, but the caller still only sees the bare metadata
    assert_eq!(response.get(claims::ACTIVE), Some(&Value::Bool(true)));
    assert_eq!(response.get_str(claims::AUDIENCE), Some("some-other-api"));
    assert!(response.get(claims::SCOPE).is_none());
}

#[tokio::test]
async fn test_public_caller_only_sees_bare_metadata() {
    let harness = harness();
    let token = access_token("spa-client", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [("client_id", "spa-client".to_owned()), ("token", token)],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.get(claims::ACTIVE), Some(&Value::Bool(true)));
    assert_eq!(response.get_str(claims::SUBJECT), Some("user-1"));
    assert!(response.get(claims::SCOPE).is_none());
    assert!(response.get(claims::USERNAME).is_none());
    assert!(response.get("department").is_none());
}

#[tokio::test]
async fn test_foreign_audience_collapses_to_inactive() {
    let harness = harness();
    let token = access_token("some-other-api", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.to_json(), json!({ "active": false }));
}

#[tokio::test]
async fn test_client_without_permission_is_rejected() {
    let harness = harness();
    let token = access_token("restricted-client", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [
                    ("client_id", "restricted-client".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.error(), Some(errors::UNAUTHORIZED_CLIENT));
}

#[tokio::test]
async fn test_unknown_client_is_rejected() {
    let harness = harness();
    let token = access_token("nobody", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Introspection,
                [("client_id", "nobody".to_owned()), ("token", token)],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.error(), Some(errors::INVALID_CLIENT));
}

#[tokio::test]
async fn test_revocation_marks_the_stored_token_revoked() {
    let harness = harness();
    harness.tokens.insert(TokenRecord::valid("jti-42"));

    let token = access_token("resource-server", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Revocation,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    // RFC 7009: the success response carries no body parameters
    assert_eq!(response.to_json(), json!({}));

    let record = harness
        .tokens
        .find_by_token_id("jti-42")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, TokenStatus::Revoked);
}

#[tokio::test]
async fn test_revoking_an_unknown_token_still_succeeds() {
    let harness = harness();
    let token = access_token("resource-server", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Revocation,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.to_json(), json!({}));
}

#[tokio::test]
async fn test_revoking_a_foreign_refresh_token_is_rejected() {
    let harness = harness();
    let token = refresh_token("someone-else", Duration::hours(1));
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Revocation,
                [
                    ("client_id", "resource-server".to_owned()),
                    ("token", token),
                ],
            )
            .await
            .unwrap(),
    );

    assert_eq!(response.error(), Some(errors::INVALID_TOKEN));
}

#[tokio::test]
async fn test_revocation_error_is_not_normalized() {
    let harness = harness();
    let response = response_of(
        harness
            .engine
            .process(
                EndpointKind::Revocation,
                [
                    ("client_id", "resource-server"),
                    ("token", "not-a-valid-token"),
                ],
            )
            .await
            .unwrap(),
    );

    // Unlike introspection, revocation reports the error triple as is
    assert_eq!(response.error(), Some(errors::INVALID_TOKEN));
}
