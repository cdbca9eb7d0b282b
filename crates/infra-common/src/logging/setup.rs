use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log span enter/exit events
    pub log_spans: bool,
    /// Service name to include in logs
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            service_name: "oauthly".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: Level, service_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Set up the logging system with the provided configuration
///
/// Safe to call multiple times: only the first call installs the global
/// subscriber, subsequent calls are no-ops. This keeps integration tests
/// that each try to initialize logging from panicking.
pub fn setup_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive(config.level.into());

        let span_events = if config.log_spans {
            FmtSpan::ACTIVE
        } else {
            FmtSpan::NONE
        };

        let builder = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_span_events(span_events)
            .with_file(config.file_info)
            .with_line_number(config.file_info);

        if config.json {
            let _ = builder.json().try_init();
        } else {
            let _ = builder.try_init();
        }
    });
}
