//! # Server-Core - OAuth 2.0 / OpenID Connect Protocol Engine for OAUTHLY
//!
//! This crate implements the request-processing pipeline of an OAuth 2.0 /
//! OpenID Connect authorization server: an ordered, filterable handler
//! dispatch engine that drives every endpoint through the same
//! extract -> validate -> handle -> apply lifecycle, together with the
//! startup configuration validator that checks grant/response/endpoint
//! consistency and ranks the signing/encryption credentials.
//!
//! ## Architecture
//!
//! ```text
//! ServerEngine
//!      │
//!      ├── ServerOptions ──── options::validator (one-shot startup pass)
//!      │        └── Credential ranking + key id assignment
//!      ├── HandlerRegistry ── ordered HandlerDescriptor collection
//!      └── Dispatcher ─────── ordered, filtered, short-circuiting chains
//!               │
//!               └── StageContext over a per-request Transaction
//! ```
//!
//! Transport adapters and persistence backends live outside this crate:
//! the engine only talks to them through the [`stores`] traits and the
//! wire-level [`wire::OAuthRequest`] / [`wire::OAuthResponse`] models.

pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod errors;
pub mod options;
pub mod principal;
pub mod protocol;
pub mod stores;
pub mod token;
pub mod transaction;
pub mod wire;

pub use context::{StageContext, StageData, StageOutcome};
pub use credentials::{CertificateInfo, Credential, SecurityKey, TokenValidationParameters};
pub use dispatch::{
    ContextType, Dispatcher, HandlerDescriptor, HandlerFilter, HandlerProvenance, HandlerRegistry,
    ServerHandler,
};
pub use errors::{ConfigurationError, ProtocolRejection, ServerError, ServerResult};
pub use options::{GrantType, ServerOptions};
pub use principal::Principal;
pub use protocol::{ProcessOutcome, ServerEngine};
pub use stores::{
    Application, ApplicationStore, ClientType, MemoryApplicationStore, MemoryTokenStore,
    ServerServices, TokenRecord, TokenStatus, TokenStore,
};
pub use token::{JwtTokenHandler, TokenHandler};
pub use transaction::{EndpointKind, Transaction, TransactionState};
