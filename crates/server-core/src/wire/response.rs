use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::error_params;

/// A protocol response: a flat map from parameter name to JSON value
///
/// Assembled by the Handle stage (success path) or from a
/// [`crate::errors::ProtocolRejection`] (error path), then finalized on the
/// transaction and optionally reshaped by the Apply chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OAuthResponse {
    parameters: BTreeMap<String, Value>,
}

impl OAuthResponse {
    /// Create an empty response
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a raw parameter value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Get a parameter as a non-empty string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.parameters.get(name) {
            Some(Value::String(value)) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    /// Set a parameter, replacing any previous value. Null values remove
    /// the parameter instead of serializing an explicit null.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if value.is_null() {
            self.parameters.remove(&name);
        } else {
            self.parameters.insert(name, value);
        }
    }

    /// Remove a parameter
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.parameters.remove(name)
    }

    /// Whether the response carries an `error` parameter
    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.get_str(error_params::ERROR)
    }

    pub fn error_description(&self) -> Option<&str> {
        self.get_str(error_params::ERROR_DESCRIPTION)
    }

    pub fn error_uri(&self) -> Option<&str> {
        self.get_str(error_params::ERROR_URI)
    }

    /// Set the standard error triple
    pub fn set_error(&mut self, error: &str, description: Option<&str>, uri: Option<&str>) {
        self.set(error_params::ERROR, Value::String(error.to_owned()));
        if let Some(description) = description {
            self.set(
                error_params::ERROR_DESCRIPTION,
                Value::String(description.to_owned()),
            );
        }
        if let Some(uri) = uri {
            self.set(error_params::ERROR_URI, Value::String(uri.to_owned()));
        }
    }

    /// Remove the standard error triple
    pub fn clear_error(&mut self) {
        self.parameters.remove(error_params::ERROR);
        self.parameters.remove(error_params::ERROR_DESCRIPTION);
        self.parameters.remove(error_params::ERROR_URI);
    }

    /// Iterate over all parameters
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.parameters.iter()
    }

    /// Serialize the response body as a JSON value
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
