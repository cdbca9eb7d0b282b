//! Wire-level request/response models
//!
//! OAuth requests and responses are flat maps from parameter name to JSON
//! value. Both models keep the raw map for boundary flexibility and expose
//! typed accessors for the well-known parameters so the engine never pokes
//! at raw values directly.

pub mod constants;

mod request;
mod response;

pub use request::OAuthRequest;
pub use response::OAuthResponse;
