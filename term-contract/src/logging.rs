//! Logging configuration for checks.
//!
//! Checks emit `tracing` spans and events. [`LogConfig`] decides how much of the
//! generated SQL and of the violation payloads ends up in those events, and
//! [`setup::init_logging`] installs a `tracing-subscriber` stack for applications
//! that don't configure one themselves.

use tracing::Level;

/// Logging configuration carried by every check session.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level for check events
    pub base_level: Level,
    /// Whether to log the SQL compiled for each check
    pub log_queries: bool,
    /// Whether to log violation messages as warnings when a check fails
    pub log_violations: bool,
    /// Maximum length for logged field values
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_level: Level::INFO,
            log_queries: false,
            log_violations: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Logs everything, including generated SQL.
    pub fn verbose() -> Self {
        Self {
            base_level: Level::DEBUG,
            log_queries: true,
            log_violations: true,
            max_field_length: 4096,
        }
    }

    /// Minimal overhead: only warnings from the check chain.
    pub fn production() -> Self {
        Self {
            base_level: Level::WARN,
            log_queries: false,
            log_violations: false,
            max_field_length: 128,
        }
    }

    pub fn balanced() -> Self {
        Self::default()
    }
}

/// Logs the SQL of a check when query logging is enabled.
#[macro_export]
macro_rules! log_query {
    ($config:expr, $sql:expr) => {
        if $config.log_queries {
            tracing::debug!(
                sql = %$crate::logging::truncate_field($sql, $config.max_field_length),
                "compiled check query"
            );
        }
    };
}

/// Logs a violation message when violation logging is enabled.
#[macro_export]
macro_rules! log_violation {
    ($config:expr, $check:expr, $message:expr) => {
        if $config.log_violations {
            tracing::warn!(
                check = %$check,
                message = %$crate::logging::truncate_field($message, $config.max_field_length),
                "check failed"
            );
        }
    };
}

/// Truncates a string to at most `max_length` bytes, on a character boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Subscriber setup for binaries and tests.
pub mod setup {
    use crate::error::{Result, TermError};
    use tracing::Level;

    /// Configuration for [`init_logging`].
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for the application
        pub level: Level,
        /// Log level for this crate
        pub crate_level: Level,
        /// Whether to use JSON output format
        pub json_format: bool,
        /// Environment filter override
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                crate_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// JSON output, warnings for dependencies, info for checks.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                crate_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        pub fn development() -> Self {
            Self {
                level: Level::DEBUG,
                crate_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }

        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn with_crate_level(mut self, level: Level) -> Self {
            self.crate_level = level;
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Builds the environment filter directive.
        pub fn env_filter(&self) -> String {
            match &self.env_filter {
                Some(filter) => filter.clone(),
                None => format!(
                    "{},term_contract={}",
                    self.level.as_str().to_lowercase(),
                    self.crate_level.as_str().to_lowercase()
                ),
            }
        }
    }

    /// Installs a global subscriber with an env filter and a text or JSON layer.
    ///
    /// `RUST_LOG` takes precedence over the configured filter.
    ///
    /// ```rust,no_run
    /// use term_contract::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TermError::Internal(format!("failed to install subscriber: {e}")))
    }
}
