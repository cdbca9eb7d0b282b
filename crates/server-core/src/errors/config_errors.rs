use thiserror::Error;
use url::Url;

use crate::dispatch::ContextType;
use crate::options::GrantType;
use crate::transaction::EndpointKind;

/// Fatal configuration errors raised by the startup validation pass
///
/// Each check raises immediately with its own variant; the variant name is
/// the stable identifier deployments can match on. A process whose options
/// fail validation must not accept requests.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("no token handler has been configured")]
    MissingTokenHandler,

    #[error("at least one grant type or response type must be enabled")]
    NoFlowsEnabled,

    #[error("the endpoint URI '{0}' is registered for more than one endpoint")]
    DuplicateEndpointUri(Url),

    #[error("the authorization endpoint must be enabled to use the authorization code or implicit grants")]
    AuthorizationEndpointRequired,

    #[error("the device endpoint must be enabled to use the device code grant")]
    DeviceEndpointRequired,

    #[error("the token endpoint must be enabled to use the authorization code, client credentials, device code, password or refresh token grants")]
    TokenEndpointRequired,

    #[error("the verification endpoint must be enabled to use the device code grant")]
    VerificationEndpointRequired,

    #[error("the device code grant must be enabled to use the device endpoint")]
    DeviceGrantRequired,

    #[error("the response type '{response_type}' requires the {grant} grant to be enabled")]
    ResponseTypeRequiresGrant {
        response_type: String,
        grant: GrantType,
    },

    #[error("reference access or refresh tokens cannot be used when token storage is disabled")]
    ReferenceTokensRequireTokenStorage,

    #[error("the device code grant cannot be used when token storage is disabled unless the degraded mode is enabled")]
    DeviceGrantRequiresTokenStorage,

    #[error("at least one encryption credential must be registered")]
    MissingEncryptionCredentials,

    #[error("at least one asymmetric signing credential must be registered")]
    MissingAsymmetricSigningCredentials,

    #[error("none of the registered certificate-backed encryption credentials is currently valid")]
    NoValidEncryptionCertificate,

    #[error("none of the registered certificate-backed signing credentials is currently valid")]
    NoValidSigningCertificate,

    #[error("the degraded mode requires a custom validation handler for the {0} endpoint")]
    MissingDegradedValidationHandler(EndpointKind),

    #[error("the degraded mode requires a custom token validation handler to use the device code grant")]
    MissingDegradedTokenValidationHandler,

    #[error("the degraded mode requires a custom token generation handler to use the device code grant")]
    MissingDegradedTokenGenerationHandler,

    #[error("a built-in handler is already registered for the {context} context with order {order}")]
    DuplicateHandlerRegistration { context: ContextType, order: i32 },
}
