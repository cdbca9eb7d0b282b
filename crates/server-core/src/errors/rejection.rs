use crate::wire::constants::errors;

/// A structured protocol rejection: the standard error triple
///
/// Rejections are values set on a stage context, not `Err` results: the
/// dispatcher stops the chain and the engine converts the triple into a
/// wire error response on the error-path Apply dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRejection {
    /// Standard error code (`invalid_request`, `invalid_token`, ...)
    pub error: String,
    /// Optional human-readable description
    pub description: Option<String>,
    /// Optional documentation URI
    pub uri: Option<String>,
}

impl ProtocolRejection {
    pub fn new(error: impl Into<String>) -> Self {
        ProtocolRejection {
            error: error.into(),
            description: None,
            uri: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// The fallback rejection used when a nested dispatch rejected the
    /// operation without specifying an error code
    pub fn invalid_request() -> Self {
        Self::new(errors::INVALID_REQUEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let rejection = ProtocolRejection::new("invalid_token")
            .with_description("the token has expired")
            .with_uri("https://example.com/errors#invalid_token");
        assert_eq!(rejection.error, "invalid_token");
        assert_eq!(rejection.description.as_deref(), Some("the token has expired"));
        assert!(rejection.uri.is_some());
    }
}
