//! Signing and encryption credentials
//!
//! A [`Credential`] bundles raw key material with the metadata the engine
//! ranks on: an optional key identifier and, for certificate-backed keys,
//! the certificate validity window and thumbprint. The configuration
//! validator sorts credential lists with [`sort_credentials`], assigns
//! missing key identifiers with [`Credential::ensure_key_id`] and copies
//! the ranked result into [`TokenValidationParameters`].

use std::cmp::Ordering;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};

/// Raw key material, by kind
///
/// The engine never runs the algorithms itself; it only needs enough
/// structure to rank keys and derive identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityKey {
    /// Shared-secret key (HMAC signing, direct encryption)
    Symmetric { secret: Vec<u8> },
    /// RSA public/private key, identified by its modulus
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
    /// Elliptic-curve key, identified by its X coordinate
    EllipticCurve { x: Vec<u8>, y: Vec<u8> },
}

impl SecurityKey {
    pub fn is_symmetric(&self) -> bool {
        matches!(self, SecurityKey::Symmetric { .. })
    }

    pub fn is_asymmetric(&self) -> bool {
        !self.is_symmetric()
    }
}

/// Validity window and thumbprint of the X.509 certificate backing a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Hex-encoded certificate thumbprint
    pub thumbprint: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    /// Whether the certificate is within its validity window at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// A signing or encryption key entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    key: SecurityKey,
    key_id: Option<String>,
    certificate: Option<CertificateInfo>,
}

impl Credential {
    pub fn symmetric(secret: impl Into<Vec<u8>>) -> Self {
        Credential {
            key: SecurityKey::Symmetric {
                secret: secret.into(),
            },
            key_id: None,
            certificate: None,
        }
    }

    pub fn rsa(modulus: impl Into<Vec<u8>>, exponent: impl Into<Vec<u8>>) -> Self {
        Credential {
            key: SecurityKey::Rsa {
                modulus: modulus.into(),
                exponent: exponent.into(),
            },
            key_id: None,
            certificate: None,
        }
    }

    pub fn elliptic_curve(x: impl Into<Vec<u8>>, y: impl Into<Vec<u8>>) -> Self {
        Credential {
            key: SecurityKey::EllipticCurve {
                x: x.into(),
                y: y.into(),
            },
            key_id: None,
            certificate: None,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_certificate(mut self, certificate: CertificateInfo) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn key(&self) -> &SecurityKey {
        &self.key
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn certificate(&self) -> Option<&CertificateInfo> {
        self.certificate.as_ref()
    }

    /// Derive a deterministic key identifier from the key material
    ///
    /// Certificate-backed keys use the certificate thumbprint. RSA keys
    /// use the first 40 characters of the base64url-encoded modulus,
    /// uppercased; elliptic-curve keys do the same over the X coordinate.
    /// Symmetric keys have no applicable rule and yield `None`.
    pub fn derive_key_id(&self) -> Option<String> {
        if let Some(certificate) = &self.certificate {
            return Some(certificate.thumbprint.clone());
        }

        match &self.key {
            SecurityKey::Rsa { modulus, .. } => Some(truncated_identifier(modulus)),
            SecurityKey::EllipticCurve { x, .. } => Some(truncated_identifier(x)),
            SecurityKey::Symmetric { .. } => None,
        }
    }

    /// Assign a derived key identifier if none is set
    ///
    /// Keys with no applicable derivation rule keep `None`; that is an
    /// accepted state, not an error.
    pub fn ensure_key_id(&mut self) {
        if self.key_id.is_none() {
            self.key_id = self.derive_key_id();
        }
    }
}

fn truncated_identifier(bytes: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(bytes).to_uppercase();
    encoded.chars().take(40).collect()
}

/// Ranking rule for credential lists
///
/// Symmetric keys sort before asymmetric ones. Among the rest,
/// certificate-backed keys already within their validity window sort
/// before non-certificate keys and before certificates that are not yet
/// valid; among currently-valid certificates, the furthest expiration
/// sorts first. Equal ranks compare equal, so a stable sort preserves
/// registration order for ties.
pub fn compare_credentials(a: &Credential, b: &Credential, now: DateTime<Utc>) -> Ordering {
    fn rank(credential: &Credential, now: DateTime<Utc>) -> u8 {
        if credential.key().is_symmetric() {
            return 0;
        }
        match credential.certificate() {
            Some(certificate) if certificate.not_before <= now => 1,
            _ => 2,
        }
    }

    let rank_a = rank(a, now);
    let rank_b = rank(b, now);
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    // Within the valid-certificate rank, later expiry wins
    if rank_a == 1 {
        if let (Some(cert_a), Some(cert_b)) = (a.certificate(), b.certificate()) {
            return cert_b.not_after.cmp(&cert_a.not_after);
        }
    }

    Ordering::Equal
}

/// Stable sort of a credential list by [`compare_credentials`]
pub fn sort_credentials(credentials: &mut [Credential], now: DateTime<Utc>) {
    credentials.sort_by(|a, b| compare_credentials(a, b, now));
}

/// The ranked key material handed to the token-verification subsystem
///
/// Populated by the configuration validator after ranking; read-only for
/// the rest of the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct TokenValidationParameters {
    pub issuer: Option<url::Url>,
    pub issuer_signing_keys: Vec<Credential>,
    pub encryption_keys: Vec<Credential>,
}

impl TokenValidationParameters {
    /// The symmetric signing secrets, in ranked order
    pub fn symmetric_signing_secrets(&self) -> impl Iterator<Item = &[u8]> {
        self.issuer_signing_keys
            .iter()
            .filter_map(|credential| match credential.key() {
                SecurityKey::Symmetric { secret } => Some(secret.as_slice()),
                _ => None,
            })
    }
}
