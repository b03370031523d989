//! Logging for ingestion runs.
//!
//! Logging is configured at two levels. [`LogConfig`] travels with the
//! gateways, the processor and the orchestrator and decides whether
//! per-partition and per-object events are emitted at all, which keeps a
//! large backlog from flooding the log. [`setup::SubscriberConfig`] installs
//! the process-wide `tracing-subscriber` pipeline. Both are normally derived
//! from a [`LogPreset`] named in the job configuration.

use serde::{Deserialize, Serialize};

/// Named starting points for logging settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPreset {
    /// Partition progress at `info`, storage calls silent.
    #[default]
    Standard,
    /// JSON lines; warnings from dependencies, run summaries from the engine.
    Production,
    /// Everything at `debug`, including every storage call.
    Development,
}

/// Which engine events are emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Manifest sizes, row counts and state transitions per partition
    pub log_partition_details: bool,
    /// One event per list/get/put against a store
    pub log_storage_operations: bool,
    /// Longest value logged for a single field before truncation
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::for_preset(LogPreset::Standard)
    }
}

impl LogConfig {
    pub fn for_preset(preset: LogPreset) -> Self {
        let (log_partition_details, log_storage_operations, max_field_length) = match preset {
            LogPreset::Standard => (true, false, 256),
            LogPreset::Production => (false, false, 128),
            LogPreset::Development => (true, true, 1024),
        };
        Self {
            log_partition_details,
            log_storage_operations,
            max_field_length,
        }
    }
}

/// Logs a storage call when `log_storage_operations` is set.
#[macro_export]
macro_rules! log_storage_op {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_storage_operations {
            tracing::info!($($arg)*);
        }
    };
}

/// Logs a partition event when `log_partition_details` is set.
#[macro_export]
macro_rules! log_partition {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_partition_details {
            tracing::info!($($arg)*);
        }
    };
}

/// Cuts `value` to at most `max_length` bytes on a char boundary.
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

/// Process-wide subscriber installation.
pub mod setup {
    use tracing::Level;

    use super::LogPreset;
    use crate::error::{IngestError, Result};

    /// Filter and output format of the global subscriber.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SubscriberConfig {
        /// Level for targets outside this crate
        pub level: Level,
        /// Level for `term_ingest` targets
        pub ingest_level: Level,
        /// Emit JSON lines instead of human-readable output
        pub json: bool,
        /// Complete `EnvFilter` directive, replacing both levels
        pub directive: Option<String>,
    }

    impl Default for SubscriberConfig {
        fn default() -> Self {
            Self::for_preset(LogPreset::Standard)
        }
    }

    impl SubscriberConfig {
        pub fn for_preset(preset: LogPreset) -> Self {
            let (level, ingest_level, json) = match preset {
                LogPreset::Standard => (Level::INFO, Level::INFO, false),
                LogPreset::Production => (Level::WARN, Level::INFO, true),
                LogPreset::Development => (Level::DEBUG, Level::DEBUG, false),
            };
            Self {
                level,
                ingest_level,
                json,
                directive: None,
            }
        }

        /// Uses `level` for every target.
        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self.ingest_level = level;
            self
        }

        pub fn with_json(mut self, json: bool) -> Self {
            self.json = json;
            self
        }

        pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
            self.directive = Some(directive.into());
            self
        }

        /// The `EnvFilter` directive this configuration stands for.
        pub fn filter(&self) -> String {
            match &self.directive {
                Some(directive) => directive.clone(),
                None => format!(
                    "{},term_ingest={}",
                    self.level.as_str().to_lowercase(),
                    self.ingest_level.as_str().to_lowercase()
                ),
            }
        }
    }

    /// Installs the global subscriber. `RUST_LOG` wins over the configured
    /// filter when set.
    ///
    /// ```rust,no_run
    /// use term_ingest::logging::setup::{init_logging, SubscriberConfig};
    /// use term_ingest::logging::LogPreset;
    ///
    /// init_logging(SubscriberConfig::for_preset(LogPreset::Production)).unwrap();
    /// ```
    pub fn init_logging(config: SubscriberConfig) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.filter()));
        let output = if config.json {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(output)
            .try_init()
            .map_err(|e| IngestError::Configuration(format!("cannot install logging: {e}")))
    }
}
