//! Security principal extracted from a validated token
//!
//! A [`Principal`] is the claims-bearing identity the Validate stage
//! establishes and later stages consume. Claims are multi-valued; helpers
//! cover the audience/presenter/scope/date lookups the endpoint handlers
//! need.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::wire::constants::{claims, token_type_hints};

/// The claims-bearing identity carried by a validated token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Principal {
    claims: BTreeMap<String, Vec<Value>>,
}

impl Principal {
    /// Create an empty principal
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a principal from a decoded JSON claim set
    ///
    /// Array-valued claims are expanded into multi-valued entries; all
    /// other values are stored as single-valued claims.
    pub fn from_claims(claims: serde_json::Map<String, Value>) -> Self {
        let mut principal = Self::new();
        for (name, value) in claims {
            match value {
                Value::Array(values) => {
                    for value in values {
                        principal.add_claim(&name, value);
                    }
                }
                value => principal.add_claim(&name, value),
            }
        }
        principal
    }

    /// Replace the values of a claim
    pub fn set_claim(&mut self, name: impl Into<String>, value: Value) {
        self.claims.insert(name.into(), vec![value]);
    }

    /// Append a value to a claim
    pub fn add_claim(&mut self, name: impl Into<String>, value: Value) {
        self.claims.entry(name.into()).or_default().push(value);
    }

    /// First value of a claim
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name).and_then(|values| values.first())
    }

    /// All values of a claim
    pub fn claims_of(&self, name: &str) -> &[Value] {
        self.claims.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of a claim, as a string
    pub fn string_claim(&self, name: &str) -> Option<&str> {
        match self.claim(name) {
            Some(Value::String(value)) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    pub fn has_claim(&self, name: &str) -> bool {
        self.claims.get(name).is_some_and(|values| !values.is_empty())
    }

    /// Iterate over every claim name and its values
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Value>)> {
        self.claims.iter()
    }

    /// The token usage recorded when the token was produced
    /// (`access_token`, `refresh_token`, `device_code`, ...)
    pub fn token_usage(&self) -> Option<&str> {
        self.string_claim(claims::TOKEN_USAGE)
    }

    pub fn set_token_usage(&mut self, usage: &str) {
        self.set_claim(claims::TOKEN_USAGE, Value::String(usage.to_owned()));
    }

    /// Whether the token usage matches the given token type hint
    pub fn has_token_type(&self, hint: &str) -> bool {
        self.token_usage() == Some(hint)
    }

    pub fn is_access_token(&self) -> bool {
        self.has_token_type(token_type_hints::ACCESS_TOKEN)
    }

    pub fn is_refresh_token(&self) -> bool {
        self.has_token_type(token_type_hints::REFRESH_TOKEN)
    }

    /// The audiences the token was issued for (`aud` claim)
    pub fn audiences(&self) -> Vec<&str> {
        self.claims_of(claims::AUDIENCE)
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    pub fn has_audience(&self, audience: &str) -> bool {
        self.audiences().contains(&audience)
    }

    /// The parties the token was issued to (`azp` claim)
    pub fn presenters(&self) -> Vec<&str> {
        self.claims_of(claims::AUTHORIZED_PARTY)
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    pub fn has_presenter(&self, presenter: &str) -> bool {
        self.presenters().contains(&presenter)
    }

    /// Granted scopes, from the space-separated `scope` claim
    pub fn scopes(&self) -> BTreeSet<String> {
        self.string_claim(claims::SCOPE)
            .map(|scope| scope.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn subject(&self) -> Option<&str> {
        self.string_claim(claims::SUBJECT)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.string_claim(claims::CLIENT_ID)
    }

    pub fn token_id(&self) -> Option<&str> {
        self.string_claim(claims::JWT_ID)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.date_claim(claims::ISSUED_AT)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.date_claim(claims::NOT_BEFORE)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.date_claim(claims::EXPIRES_AT)
    }

    fn date_claim(&self, name: &str) -> Option<DateTime<Utc>> {
        let seconds = self.claim(name)?.as_i64()?;
        Utc.timestamp_opt(seconds, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Principal {
        let claims = match json!({
            "sub": "user-1",
            "jti": "token-42",
            "aud": ["api", "resource-server"],
            "azp": "console",
            "scope": "openid profile",
            "token_usage": "access_token",
            "iat": 1_700_000_000,
            "exp": 1_700_003_600,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        Principal::from_claims(claims)
    }

    #[test]
    fn test_audiences_and_presenters() {
        let principal = sample();
        assert!(principal.has_audience("resource-server"));
        assert!(!principal.has_audience("other"));
        assert!(principal.has_presenter("console"));
        assert_eq!(principal.audiences(), vec!["api", "resource-server"]);
    }

    #[test]
    fn test_scopes_split_on_whitespace() {
        let principal = sample();
        let scopes = principal.scopes();
        assert!(scopes.contains("openid"));
        assert!(scopes.contains("profile"));
        assert_eq!(scopes.len(), 2);
    }

    #[test]
    fn test_token_type_checks() {
        let principal = sample();
        assert!(principal.is_access_token());
        assert!(!principal.is_refresh_token());
    }

    #[test]
    fn test_date_claims() {
        let principal = sample();
        assert_eq!(principal.issued_at().unwrap().timestamp(), 1_700_000_000);
        assert_eq!(principal.expires_at().unwrap().timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_multi_valued_claim() {
        let mut principal = Principal::new();
        principal.add_claim("roles", json!("admin"));
        principal.add_claim("roles", json!("auditor"));
        assert_eq!(principal.claims_of("roles").len(), 2);
        assert_eq!(principal.claim("roles"), Some(&json!("admin")));
    }
}
