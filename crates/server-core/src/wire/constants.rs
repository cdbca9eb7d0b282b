//! Standard OAuth 2.0 / OpenID Connect protocol constants
//!
//! Parameter names, claim names, error codes and grant-type identifiers as
//! registered by RFC 6749, RFC 7009, RFC 7662 and OpenID Connect Core.

/// Request parameter names
pub mod params {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const CLIENT_ID: &str = "client_id";
    pub const CLIENT_SECRET: &str = "client_secret";
    pub const GRANT_TYPE: &str = "grant_type";
    pub const SCOPE: &str = "scope";
    pub const TOKEN: &str = "token";
    pub const TOKEN_TYPE_HINT: &str = "token_type_hint";
}

/// Claim names used in tokens and introspection responses
pub mod claims {
    pub const ACTIVE: &str = "active";
    pub const AUDIENCE: &str = "aud";
    pub const AUTHORIZED_PARTY: &str = "azp";
    pub const CLIENT_ID: &str = "client_id";
    pub const EXPIRES_AT: &str = "exp";
    pub const ISSUED_AT: &str = "iat";
    pub const ISSUER: &str = "iss";
    pub const JWT_ID: &str = "jti";
    pub const NAME: &str = "name";
    pub const NOT_BEFORE: &str = "nbf";
    pub const SCOPE: &str = "scope";
    pub const SUBJECT: &str = "sub";
    pub const TOKEN_TYPE: &str = "token_type";
    pub const TOKEN_USAGE: &str = "token_usage";
    pub const USERNAME: &str = "username";

    /// Prefix reserved for engine-internal claims, never exposed to clients
    pub const PRIVATE_PREFIX: &str = "oauthly:";
}

/// Standard protocol error codes
pub mod errors {
    pub const ACCESS_DENIED: &str = "access_denied";
    pub const INVALID_CLIENT: &str = "invalid_client";
    pub const INVALID_GRANT: &str = "invalid_grant";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const SERVER_ERROR: &str = "server_error";
    pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
    pub const UNSUPPORTED_TOKEN_TYPE: &str = "unsupported_token_type";
}

/// Error response parameter names
pub mod error_params {
    pub const ERROR: &str = "error";
    pub const ERROR_DESCRIPTION: &str = "error_description";
    pub const ERROR_URI: &str = "error_uri";
}

/// Response type tokens (a declared response type is a space-separated
/// combination of these)
pub mod response_types {
    pub const CODE: &str = "code";
    pub const ID_TOKEN: &str = "id_token";
    pub const NONE: &str = "none";
    pub const TOKEN: &str = "token";
}

/// Token type hints (RFC 7662 §2.1, RFC 8628)
pub mod token_type_hints {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const DEVICE_CODE: &str = "device_code";
    pub const ID_TOKEN: &str = "id_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_CODE: &str = "user_code";
}

/// Token type values returned in responses
pub mod token_types {
    pub const BEARER: &str = "bearer";
}

/// Application permission identifiers checked against the application store
pub mod permissions {
    pub const ENDPOINT_INTROSPECTION: &str = "ept:introspection";
    pub const ENDPOINT_REVOCATION: &str = "ept:revocation";
}
