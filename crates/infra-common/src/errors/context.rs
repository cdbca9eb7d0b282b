use std::fmt;

/// Context information attached to an internal error
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    /// Add details to the context
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in component '{}' during operation '{}'",
            self.component, self.operation
        )?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_details() {
        let ctx = ErrorContext::new("dispatcher", "resolve_handlers");
        assert_eq!(
            ctx.to_string(),
            "in component 'dispatcher' during operation 'resolve_handlers'"
        );
    }

    #[test]
    fn test_display_with_details() {
        let ctx = ErrorContext::new("engine", "handle_stage").with_details("no response produced");
        assert!(ctx.to_string().ends_with("(no response produced)"));
    }
}
