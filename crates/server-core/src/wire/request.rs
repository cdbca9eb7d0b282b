use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::params;

/// A parsed protocol request: a flat map from parameter name to JSON value
///
/// Produced by the Extract stage from the transport payload. Parameters
/// received multiple times are represented as JSON arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OAuthRequest {
    parameters: BTreeMap<String, Value>,
}

impl OAuthRequest {
    /// Create an empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a request from decoded form/query parameters
    ///
    /// A parameter seen more than once is collapsed into a JSON array,
    /// preserving the order the values were received in.
    pub fn from_parameters<I, K, V>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::new();
        for (name, value) in parameters {
            let name = name.into();
            let value = Value::String(value.into());
            match request.parameters.get_mut(&name) {
                None => {
                    request.parameters.insert(name, value);
                }
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
        request
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

    /// Set a parameter, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    /// Iterate over all parameters
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.parameters.iter()
    }

    pub fn token(&self) -> Option<&str> {
        self.get_str(params::TOKEN)
    }

    pub fn token_type_hint(&self) -> Option<&str> {
        self.get_str(params::TOKEN_TYPE_HINT)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.get_str(params::ACCESS_TOKEN)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.get_str(params::CLIENT_ID)
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.get_str(params::CLIENT_SECRET)
    }

    pub fn grant_type(&self) -> Option<&str> {
        self.get_str(params::GRANT_TYPE)
    }

    pub fn scope(&self) -> Option<&str> {
        self.get_str(params::SCOPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let request = OAuthRequest::from_parameters([
            ("token", "abc"),
            ("token_type_hint", "access_token"),
            ("client_id", "resource-server"),
        ]);

        assert_eq!(request.token(), Some("abc"));
        assert_eq!(request.token_type_hint(), Some("access_token"));
        assert_eq!(request.client_id(), Some("resource-server"));
        assert_eq!(request.client_secret(), None);
    }

    #[test]
    fn test_empty_parameter_is_absent() {
        let request = OAuthRequest::from_parameters([("token", "")]);
        assert_eq!(request.token(), None);
        // The raw value is still observable
        assert_eq!(request.get("token"), Some(&Value::String(String::new())));
    }

    #[test]
    fn test_repeated_parameter_becomes_array() {
        let request = OAuthRequest::from_parameters([("scope", "openid"), ("scope", "email")]);
        assert_eq!(
            request.get("scope"),
            Some(&serde_json::json!(["openid", "email"]))
        );
        // get_str only matches single string values
        assert_eq!(request.scope(), None);
    }
}
