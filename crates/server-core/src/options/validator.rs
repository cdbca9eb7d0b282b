//! One-shot startup validation of the declared server options
//!
//! Runs once when the options are finalized and fails fast: the first
//! inconsistency aborts startup with its own [`ConfigurationError`]
//! variant, and a process whose options fail validation must not serve
//! traffic. On success the pass has normalized the degraded-mode flags,
//! stably ordered the handler catalogue, ranked both credential lists,
//! assigned missing key identifiers and populated the token-validation
//! parameters.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use super::{GrantType, ServerOptions};
use crate::credentials::sort_credentials;
use crate::dispatch::{ContextType, HandlerDescriptor, HandlerProvenance};
use crate::errors::ConfigurationError;
use crate::transaction::EndpointKind;

/// Endpoints whose validation normally depends on a token or
/// authorization store
const STORAGE_BACKED_ENDPOINTS: [EndpointKind; 7] = [
    EndpointKind::Authorization,
    EndpointKind::Device,
    EndpointKind::Introspection,
    EndpointKind::Logout,
    EndpointKind::Revocation,
    EndpointKind::Token,
    EndpointKind::Verification,
];

/// Validate and normalize the options in place
pub fn validate(options: &mut ServerOptions) -> Result<(), ConfigurationError> {
    validate_at(options, Utc::now())
}

/// Validation with an explicit clock, for certificate-window checks
pub fn validate_at(
    options: &mut ServerOptions,
    now: DateTime<Utc>,
) -> Result<(), ConfigurationError> {
    normalize_degraded_mode(options);

    check_token_handler(options)?;
    check_flows_enabled(options)?;
    check_endpoint_uri_uniqueness(options)?;
    check_grant_endpoint_consistency(options)?;
    check_response_type_grants(options)?;
    check_reference_tokens(options)?;
    check_device_grant_storage(options)?;
    check_credentials_present(options)?;
    check_certificate_validity(options, now)?;
    check_degraded_mode_handlers(options)?;

    finalize(options, now);

    info!(
        grant_types = options.grant_types.len(),
        handlers = options.handlers.len(),
        signing_credentials = options.signing_credentials.len(),
        encryption_credentials = options.encryption_credentials.len(),
        degraded = options.enable_degraded_mode,
        "server configuration validated"
    );
    Ok(())
}

/// Degraded mode runs without stores: storage-dependent features are
/// switched off rather than reported as inconsistencies.
fn normalize_degraded_mode(options: &mut ServerOptions) {
    if !options.enable_degraded_mode {
        return;
    }

    warn!("degraded mode enabled, storage-dependent features are disabled");
    options.disable_token_storage = true;
    options.disable_authorization_storage = true;
    options.disable_rolling_refresh_tokens = true;
    options.ignore_endpoint_permissions = true;
    options.ignore_grant_type_permissions = true;
    options.ignore_response_type_permissions = true;
    options.ignore_scope_permissions = true;
    options.use_reference_access_tokens = false;
    options.use_reference_refresh_tokens = false;
}

fn check_token_handler(options: &ServerOptions) -> Result<(), ConfigurationError> {
    if options.token_handler.is_none() {
        return Err(ConfigurationError::MissingTokenHandler);
    }
    Ok(())
}

fn check_flows_enabled(options: &ServerOptions) -> Result<(), ConfigurationError> {
    if options.grant_types.is_empty() && options.response_types.is_empty() {
        return Err(ConfigurationError::NoFlowsEnabled);
    }
    Ok(())
}

fn check_endpoint_uri_uniqueness(options: &ServerOptions) -> Result<(), ConfigurationError> {
    let mut seen: HashSet<&Url> = HashSet::new();
    for uris in options.endpoint_uris.values() {
        for uri in uris {
            if !seen.insert(uri) {
                return Err(ConfigurationError::DuplicateEndpointUri(uri.clone()));
            }
        }
    }
    Ok(())
}

fn check_grant_endpoint_consistency(options: &ServerOptions) -> Result<(), ConfigurationError> {
    if (options.is_grant_enabled(GrantType::AuthorizationCode)
        || options.is_grant_enabled(GrantType::Implicit))
        && !options.is_endpoint_enabled(EndpointKind::Authorization)
    {
        return Err(ConfigurationError::AuthorizationEndpointRequired);
    }

    if options.is_grant_enabled(GrantType::DeviceCode) {
        if !options.is_endpoint_enabled(EndpointKind::Device) {
            return Err(ConfigurationError::DeviceEndpointRequired);
        }
        if !options.is_endpoint_enabled(EndpointKind::Verification) {
            return Err(ConfigurationError::VerificationEndpointRequired);
        }
    }

    if options.is_endpoint_enabled(EndpointKind::Device)
        && !options.is_grant_enabled(GrantType::DeviceCode)
    {
        return Err(ConfigurationError::DeviceGrantRequired);
    }

    let token_endpoint_grants = [
        GrantType::AuthorizationCode,
        GrantType::ClientCredentials,
        GrantType::DeviceCode,
        GrantType::Password,
        GrantType::RefreshToken,
    ];
    if token_endpoint_grants
        .iter()
        .any(|grant| options.is_grant_enabled(*grant))
        && !options.is_endpoint_enabled(EndpointKind::Token)
    {
        return Err(ConfigurationError::TokenEndpointRequired);
    }

    Ok(())
}

fn check_response_type_grants(options: &ServerOptions) -> Result<(), ConfigurationError> {
    use crate::wire::constants::response_types;

    for response_type in &options.response_types {
        for part in response_type.split_whitespace() {
            let required = match part {
                response_types::CODE => Some(GrantType::AuthorizationCode),
                response_types::ID_TOKEN | response_types::TOKEN => Some(GrantType::Implicit),
                _ => None,
            };
            if let Some(grant) = required {
                if !options.is_grant_enabled(grant) {
                    return Err(ConfigurationError::ResponseTypeRequiresGrant {
                        response_type: response_type.clone(),
                        grant,
                    });
                }
            }
        }
    }
    Ok(())
}

fn check_reference_tokens(options: &ServerOptions) -> Result<(), ConfigurationError> {
    if (options.use_reference_access_tokens || options.use_reference_refresh_tokens)
        && options.disable_token_storage
    {
        return Err(ConfigurationError::ReferenceTokensRequireTokenStorage);
    }
    Ok(())
}

fn check_device_grant_storage(options: &ServerOptions) -> Result<(), ConfigurationError> {
    if options.is_grant_enabled(GrantType::DeviceCode)
        && options.disable_token_storage
        && !options.enable_degraded_mode
    {
        return Err(ConfigurationError::DeviceGrantRequiresTokenStorage);
    }
    Ok(())
}

fn check_credentials_present(options: &ServerOptions) -> Result<(), ConfigurationError> {
    if options.encryption_credentials.is_empty() {
        return Err(ConfigurationError::MissingEncryptionCredentials);
    }
    if !options
        .signing_credentials
        .iter()
        .any(|credential| credential.key().is_asymmetric())
    {
        return Err(ConfigurationError::MissingAsymmetricSigningCredentials);
    }
    Ok(())
}

/// When every credential of a list is certificate-backed, at least one
/// certificate must currently be inside its validity window.
fn check_certificate_validity(
    options: &ServerOptions,
    now: DateTime<Utc>,
) -> Result<(), ConfigurationError> {
    fn all_certificates_invalid(
        credentials: &[crate::credentials::Credential],
        now: DateTime<Utc>,
    ) -> bool {
        !credentials.is_empty()
            && credentials
                .iter()
                .all(|credential| credential.certificate().is_some())
            && !credentials.iter().any(|credential| {
                credential
                    .certificate()
                    .is_some_and(|certificate| certificate.is_valid_at(now))
            })
    }

    if all_certificates_invalid(&options.encryption_credentials, now) {
        return Err(ConfigurationError::NoValidEncryptionCertificate);
    }
    if all_certificates_invalid(&options.signing_credentials, now) {
        return Err(ConfigurationError::NoValidSigningCertificate);
    }
    Ok(())
}

/// A handler can only stand in for storage-backed validation if it is
/// deployer-supplied and not hidden behind a filter that excludes it
/// whenever degraded mode is active.
fn is_degraded_capable(descriptor: &HandlerDescriptor, context: ContextType) -> bool {
    descriptor.provenance() == HandlerProvenance::Custom
        && descriptor.context_type() == context
        && !descriptor
            .filters()
            .iter()
            .any(|filter| filter.requires_degraded_mode_disabled())
}

fn check_degraded_mode_handlers(options: &ServerOptions) -> Result<(), ConfigurationError> {
    if !options.enable_degraded_mode {
        return Ok(());
    }

    for endpoint in STORAGE_BACKED_ENDPOINTS {
        if !options.is_endpoint_enabled(endpoint) {
            continue;
        }
        let covered = options.handlers.iter().any(|descriptor| {
            is_degraded_capable(descriptor, ContextType::Validate(endpoint))
                || is_degraded_capable(descriptor, ContextType::Authenticate)
        });
        if !covered {
            return Err(ConfigurationError::MissingDegradedValidationHandler(
                endpoint,
            ));
        }
    }

    if options.is_grant_enabled(GrantType::DeviceCode) {
        if !options
            .handlers
            .iter()
            .any(|descriptor| is_degraded_capable(descriptor, ContextType::ValidateToken))
        {
            return Err(ConfigurationError::MissingDegradedTokenValidationHandler);
        }
        if !options
            .handlers
            .iter()
            .any(|descriptor| is_degraded_capable(descriptor, ContextType::GenerateToken))
        {
            return Err(ConfigurationError::MissingDegradedTokenGenerationHandler);
        }
    }

    Ok(())
}

/// Order the handler catalogue, rank the credentials, assign missing key
/// identifiers and hand the ranked keys to the verification subsystem
fn finalize(options: &mut ServerOptions, now: DateTime<Utc>) {
    options
        .handlers
        .sort_by_key(|descriptor| descriptor.order());

    sort_credentials(&mut options.signing_credentials, now);
    sort_credentials(&mut options.encryption_credentials, now);
    for credential in options
        .signing_credentials
        .iter_mut()
        .chain(options.encryption_credentials.iter_mut())
    {
        credential.ensure_key_id();
    }

    options.token_validation_parameters = crate::credentials::TokenValidationParameters {
        issuer: options.issuer.clone(),
        issuer_signing_keys: options.signing_credentials.clone(),
        encryption_keys: options.encryption_credentials.clone(),
    };

    debug!("handler catalogue ordered and credentials ranked");
}
