//! Storage interfaces for applications and tokens
//!
//! The engine never assumes a storage technology: handlers reach
//! applications and token state only through the [`ApplicationStore`] and
//! [`TokenStore`] traits. The dashmap-backed in-memory implementations
//! serve tests and embedded deployments.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::errors::{ServerError, ServerResult};

/// Confidentiality class of a registered client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// Can keep a secret (server-side application)
    Confidential,
    /// Cannot keep a secret (native or browser application)
    Public,
}

/// A registered client application
#[derive(Debug, Clone)]
pub struct Application {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub client_type: ClientType,
    pub display_name: Option<String>,
    /// Permission strings, e.g. `ept:introspection`
    pub permissions: Vec<String>,
}

impl Application {
    pub fn new(client_id: impl Into<String>, client_type: ClientType) -> Self {
        Application {
            client_id: client_id.into(),
            client_secret: None,
            client_type,
            display_name: None,
            permissions: Vec::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|held| held == permission)
    }
}

/// Lifecycle status of a stored token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Revoked,
}

/// Server-side state of an issued token, keyed by its `jti`
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub token_id: String,
    pub status: TokenStatus,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn valid(token_id: impl Into<String>) -> Self {
        TokenRecord {
            token_id: token_id.into(),
            status: TokenStatus::Valid,
            revoked_at: None,
        }
    }
}

/// Lookup interface over registered client applications
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn find_by_client_id(&self, client_id: &str) -> ServerResult<Option<Application>>;
}

/// State interface over issued tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_by_token_id(&self, token_id: &str) -> ServerResult<Option<TokenRecord>>;

    /// Mark a token revoked. Returns whether a record was found.
    /// Revoking an already-revoked token succeeds and changes nothing.
    async fn revoke(&self, token_id: &str) -> ServerResult<bool>;
}

/// In-memory application registry
#[derive(Debug, Default)]
pub struct MemoryApplicationStore {
    applications: DashMap<String, Application>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, application: Application) {
        self.applications
            .insert(application.client_id.clone(), application);
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn find_by_client_id(&self, client_id: &str) -> ServerResult<Option<Application>> {
        Ok(self
            .applications
            .get(client_id)
            .map(|entry| entry.value().clone()))
    }
}

/// In-memory token state
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<String, TokenRecord>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: TokenRecord) {
        self.tokens.insert(record.token_id.clone(), record);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find_by_token_id(&self, token_id: &str) -> ServerResult<Option<TokenRecord>> {
        Ok(self.tokens.get(token_id).map(|entry| entry.value().clone()))
    }

    async fn revoke(&self, token_id: &str) -> ServerResult<bool> {
        match self.tokens.get_mut(token_id) {
            Some(mut entry) => {
                let record = entry.value_mut();
                if record.status != TokenStatus::Revoked {
                    record.status = TokenStatus::Revoked;
                    record.revoked_at = Some(Utc::now());
                    debug!(token_id = %token_id, "token revoked");
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// The storage backends shared with every handler
///
/// Cheap to clone; the dispatcher hands a reference to scoped and
/// singleton handlers alike.
#[derive(Clone)]
pub struct ServerServices {
    applications: Arc<dyn ApplicationStore>,
    tokens: Arc<dyn TokenStore>,
}

impl ServerServices {
    pub fn new(applications: Arc<dyn ApplicationStore>, tokens: Arc<dyn TokenStore>) -> Self {
        ServerServices {
            applications,
            tokens,
        }
    }

    /// Dashmap-backed stores, for tests and embedded deployments
    pub fn in_memory() -> Self {
        ServerServices::new(
            Arc::new(MemoryApplicationStore::new()),
            Arc::new(MemoryTokenStore::new()),
        )
    }

    pub fn applications(&self) -> &dyn ApplicationStore {
        self.applications.as_ref()
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    /// Look up an application, treating a missing record as a
    /// [`ServerError::Store`] failure
    pub async fn require_application(&self, client_id: &str) -> ServerResult<Application> {
        self.applications
            .find_by_client_id(client_id)
            .await?
            .ok_or_else(|| {
                ServerError::Store(format!("no application registered for '{client_id}'"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::constants::permissions;

    #[tokio::test]
    async fn test_application_lookup_and_permissions() {
        let store = MemoryApplicationStore::new();
        store.insert(
            Application::new("resource-server", ClientType::Confidential)
                .with_secret("s3cret")
                .with_permission(permissions::ENDPOINT_INTROSPECTION),
        );

        let found = store
            .find_by_client_id("resource-server")
            .await
            .unwrap()
            .unwrap();
        assert!(found.has_permission(permissions::ENDPOINT_INTROSPECTION));
        assert!(!found.has_permission(permissions::ENDPOINT_REVOCATION));

        assert!(store.find_by_client_id("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revocation_is_idempotent() {
        let store = MemoryTokenStore::new();
        store.insert(TokenRecord::valid("jti-1"));

        assert!(store.revoke("jti-1").await.unwrap());
        let record = store.find_by_token_id("jti-1").await.unwrap().unwrap();
        assert_eq!(record.status, TokenStatus::Revoked);
        let first_revocation = record.revoked_at;

        assert!(store.revoke("jti-1").await.unwrap());
        let record = store.find_by_token_id("jti-1").await.unwrap().unwrap();
        assert_eq!(record.revoked_at, first_revocation);

        assert!(!store.revoke("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_require_application_reports_missing_record() {
        let services = ServerServices::in_memory();
        let error = services.require_application("ghost").await.unwrap_err();
        assert!(matches!(error, ServerError::Store(_)));
    }
}
