//! YAML configuration for ingestion jobs.
//!
//! A configuration file describes the source and destination stores, the
//! pipeline knobs and logging:
//!
//! ```yaml
//! source:
//!   type: s3
//!   bucket: epl-raw
//!   region: eu-west-2
//!   access_key_env: AWS_ACCESS_KEY_ID
//!   secret_key_env: AWS_SECRET_ACCESS_KEY
//! destination:
//!   type: local
//!   path: /var/lib/epl/processed
//! pipeline:
//!   partition_prefix: football
//!   output_format: parquet
//!   commit_mode: per_partition
//! logging:
//!   preset: production
//!   partition_details: true
//! ```
//!
//! Every pipeline and logging field has a default, so only the stores are
//! required.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, Level};

use crate::codec::TableFormat;
use crate::error::{IngestError, Result};
use crate::logging::setup::SubscriberConfig;
use crate::logging::{LogConfig, LogPreset};
use crate::orchestrator::{CommitMode, Orchestrator};
use crate::partition::{PartitionCatalog, PartitionNaming};
use crate::processor::{OutputLayout, PartitionProcessor, DEFAULT_OUTPUT_PREFIX};
use crate::storage::{ObjectStoreGateway, StorageGateway, DEFAULT_REQUEST_TIMEOUT};
use crate::transform::{FlagColumn, SqlTransform, TransformChain, DEFAULT_FLAG_COLUMN};
use crate::watermark::{WatermarkStore, DEFAULT_WATERMARK_KEY};

/// Top-level job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    pub source: StoreConfig,
    pub destination: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Location of an object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// A process-local store, mostly for tests and demos.
    Memory,
    /// A directory on the local file system.
    Local { path: PathBuf },
    /// An S3 bucket. Credentials are read from the named environment
    /// variables when both are given, otherwise from the instance.
    S3 {
        bucket: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key_env: Option<String>,
        #[serde(default)]
        secret_key_env: Option<String>,
    },
}

/// Which store holds the watermark artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkLocation {
    #[default]
    Source,
    Destination,
}

/// Pipeline behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Literal prefix of partition folders, e.g. `football`.
    pub partition_prefix: String,
    /// Separator between the prefix and the partition id.
    pub partition_separator: String,
    /// Regex partition ids must match; `None` accepts any valid key segment.
    pub partition_pattern: Option<String>,
    pub watermark_key: String,
    pub watermark_location: WatermarkLocation,
    pub output_prefix: String,
    pub output_format: TableFormat,
    /// Column flagging processed rows; `None` disables the flag.
    pub flag_column: Option<String>,
    /// Optional query run before the flag column is added. The combined
    /// partition is available as `partition_data`.
    pub sql: Option<String>,
    pub commit_mode: CommitMode,
    /// Concurrent fetches per partition; defaults to the number of CPUs.
    pub fetch_concurrency: Option<usize>,
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partition_prefix: "football".to_string(),
            partition_separator: "-".to_string(),
            partition_pattern: Some(r"^\d{4}-\d{2}-\d{2}$".to_string()),
            watermark_key: DEFAULT_WATERMARK_KEY.to_string(),
            watermark_location: WatermarkLocation::default(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            output_format: TableFormat::Csv,
            flag_column: Some(DEFAULT_FLAG_COLUMN.to_string()),
            sql: None,
            commit_mode: CommitMode::default(),
            fetch_concurrency: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn with_partition_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.partition_prefix = prefix.into();
        self
    }

    pub fn with_partition_pattern(mut self, pattern: Option<String>) -> Self {
        self.partition_pattern = pattern;
        self
    }

    pub fn with_watermark_key(mut self, key: impl Into<String>) -> Self {
        self.watermark_key = key.into();
        self
    }

    pub fn with_watermark_location(mut self, location: WatermarkLocation) -> Self {
        self.watermark_location = location;
        self
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    pub fn with_output_format(mut self, format: TableFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_flag_column(mut self, column: Option<String>) -> Self {
        self.flag_column = column;
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = Some(concurrency);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Builds the partition naming convention.
    pub fn naming(&self) -> Result<PartitionNaming> {
        let naming = PartitionNaming::new(&self.partition_prefix, &self.partition_separator)?;
        match &self.partition_pattern {
            Some(pattern) => naming.with_id_pattern(pattern),
            None => Ok(naming.with_any_id()),
        }
    }

    /// Builds the transform: the optional SQL query, then the flag column.
    pub fn transform(&self) -> TransformChain {
        let mut chain = TransformChain::new();
        if let Some(sql) = &self.sql {
            chain = chain.then(SqlTransform::new(sql.clone()));
        }
        if let Some(column) = &self.flag_column {
            chain = chain.then(FlagColumn::new(column.clone()));
        }
        chain
    }
}

/// Logging section of the configuration file.
///
/// `preset` picks the baseline; every other field overrides one part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub preset: LogPreset,
    /// Global level: `trace`, `debug`, `info`, `warn` or `error`.
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output.
    pub json: Option<bool>,
    /// Full `EnvFilter` directive, overriding `level`.
    pub filter: Option<String>,
    pub partition_details: Option<bool>,
    pub storage_operations: Option<bool>,
}

impl LoggingSection {
    fn parsed_level(&self) -> Result<Option<Level>> {
        self.level
            .as_deref()
            .map(|level| {
                Level::from_str(level).map_err(|_| {
                    IngestError::Configuration(format!("Unknown log level '{level}'"))
                })
            })
            .transpose()
    }

    /// Subscriber settings for [`crate::logging::setup::init_logging`].
    pub fn subscriber_config(&self) -> Result<SubscriberConfig> {
        let mut config = SubscriberConfig::for_preset(self.preset);
        if let Some(level) = self.parsed_level()? {
            config = config.with_level(level);
        }
        if let Some(json) = self.json {
            config = config.with_json(json);
        }
        if let Some(filter) = &self.filter {
            config = config.with_directive(filter);
        }
        Ok(config)
    }

    /// Per-run verbosity settings.
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::for_preset(self.preset);
        if let Some(enabled) = self.partition_details {
            config.log_partition_details = enabled;
        }
        if let Some(enabled) = self.storage_operations {
            config.log_storage_operations = enabled;
        }
        config
    }
}

impl StoreConfig {
    /// Opens the store this configuration points at.
    pub fn build(&self, timeout: Duration, log_config: &LogConfig) -> Result<Arc<dyn StorageGateway>> {
        let gateway = match self {
            Self::Memory => ObjectStoreGateway::in_memory(),
            Self::Local { path } => {
                std::fs::create_dir_all(path)?;
                ObjectStoreGateway::local(path)?
            }
            Self::S3 {
                bucket,
                region,
                endpoint,
                access_key_env,
                secret_key_env,
            } => Self::s3_gateway(bucket, region, endpoint, access_key_env, secret_key_env)?,
        };
        debug!(store = %gateway.description(), "Opened store");
        Ok(Arc::new(
            gateway
                .with_timeout(timeout)
                .with_log_config(log_config.clone()),
        ))
    }

    #[cfg(feature = "s3")]
    fn s3_gateway(
        bucket: &str,
        region: &Option<String>,
        endpoint: &Option<String>,
        access_key_env: &Option<String>,
        secret_key_env: &Option<String>,
    ) -> Result<ObjectStoreGateway> {
        use crate::storage::{S3Auth, S3Config};

        let mut config = S3Config::new(bucket);
        if let Some(region) = region {
            config = config.with_region(region);
        }
        if let Some(endpoint) = endpoint {
            config = config.with_endpoint(endpoint);
        }
        if let (Some(access_key_var), Some(secret_key_var)) = (access_key_env, secret_key_env) {
            config = config.with_auth(S3Auth::Environment {
                access_key_var: access_key_var.clone(),
                secret_key_var: secret_key_var.clone(),
            });
        }
        Ok(ObjectStoreGateway::s3(&config)?)
    }

    #[cfg(not(feature = "s3"))]
    fn s3_gateway(
        bucket: &str,
        _region: &Option<String>,
        _endpoint: &Option<String>,
        _access_key_env: &Option<String>,
        _secret_key_env: &Option<String>,
    ) -> Result<ObjectStoreGateway> {
        Err(IngestError::Configuration(format!(
            "Bucket '{bucket}' needs S3 support; rebuild with the `s3` feature"
        )))
    }

    fn validate(&self, role: &str) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::Local { path } if path.as_os_str().is_empty() => Err(
                IngestError::Configuration(format!("{role} path cannot be empty")),
            ),
            Self::Local { .. } => Ok(()),
            Self::S3 { bucket, .. } if bucket.trim().is_empty() => Err(
                IngestError::Configuration(format!("{role} bucket cannot be empty")),
            ),
            Self::S3 {
                access_key_env,
                secret_key_env,
                ..
            } if access_key_env.is_some() != secret_key_env.is_some() => {
                Err(IngestError::Configuration(format!(
                    "{role} needs both access_key_env and secret_key_env, or neither"
                )))
            }
            Self::S3 { .. } => Ok(()),
        }
    }
}

impl IngestConfig {
    pub fn new(source: StoreConfig, destination: StoreConfig) -> Self {
        Self {
            source,
            destination,
            pipeline: PipelineConfig::default(),
            logging: LoggingSection::default(),
        }
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_logging(mut self, logging: LoggingSection) -> Self {
        self.logging = logging;
        self
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| IngestError::Configuration(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Configuration(format!("Cannot read '{}': {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;
        self.logging.parsed_level()?;

        let pipeline = &self.pipeline;
        pipeline.naming()?;
        if pipeline.watermark_key.trim().is_empty() {
            return Err(IngestError::Configuration(
                "watermark_key cannot be empty".to_string(),
            ));
        }
        if TableFormat::from_key(&pipeline.watermark_key).is_none() {
            return Err(IngestError::Configuration(format!(
                "watermark_key '{}' must have a .csv or .parquet extension so it is never \
                 mistaken for a partition",
                pipeline.watermark_key
            )));
        }
        if pipeline.fetch_concurrency == Some(0) {
            return Err(IngestError::Configuration(
                "fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if pipeline.request_timeout_secs == 0 {
            return Err(IngestError::Configuration(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if let Some(column) = &pipeline.flag_column {
            if column.is_empty() {
                return Err(IngestError::Configuration(
                    "flag_column cannot be empty; omit it to disable the flag".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Opens both stores and wires an orchestrator.
    pub fn build_orchestrator(&self) -> Result<Orchestrator> {
        let timeout = self.pipeline.request_timeout();
        let log_config = self.logging.log_config();
        let source = self.source.build(timeout, &log_config)?;
        let destination = self.destination.build(timeout, &log_config)?;
        self.wire(source, destination)
    }

    /// Wires an orchestrator over already opened stores.
    pub fn wire(
        &self,
        source: Arc<dyn StorageGateway>,
        destination: Arc<dyn StorageGateway>,
    ) -> Result<Orchestrator> {
        let pipeline = &self.pipeline;
        let log_config = self.logging.log_config();

        let watermark_gateway = match pipeline.watermark_location {
            WatermarkLocation::Source => source.clone(),
            WatermarkLocation::Destination => destination.clone(),
        };
        let mut catalog = PartitionCatalog::new(source.clone(), pipeline.naming()?);
        if pipeline.watermark_location == WatermarkLocation::Source {
            catalog = catalog.with_reserved_key(&pipeline.watermark_key);
        }

        let mut processor = PartitionProcessor::new(source, destination)
            .with_transform(Arc::new(pipeline.transform()))
            .with_layout(OutputLayout::new(
                &pipeline.output_prefix,
                pipeline.output_format,
            ))
            .with_log_config(log_config.clone());
        if let Some(concurrency) = pipeline.fetch_concurrency {
            processor = processor.with_fetch_concurrency(concurrency);
        }

        Ok(Orchestrator::new(
            catalog,
            WatermarkStore::new(watermark_gateway, &pipeline.watermark_key),
            processor,
        )
        .with_commit_mode(pipeline.commit_mode)
        .with_log_config(log_config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::RunOptions;
    use crate::test_utils::{read_text, seeded_store};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const FULL: &str = r#"
source:
  type: s3
  bucket: epl-raw
  region: eu-west-2
  access_key_env: AWS_ACCESS_KEY_ID
  secret_key_env: AWS_SECRET_ACCESS_KEY
destination:
  type: local
  path: /tmp/epl-processed
pipeline:
  partition_prefix: football
  output_format: parquet
  output_prefix: processed/
  commit_mode: per_partition
  fetch_concurrency: 4
  sql: SELECT * FROM partition_data WHERE "Data1" > 0
logging:
  preset: production
  level: debug
  storage_operations: true
"#;

    #[test]
    fn test_parse_full_config() {
        let config = IngestConfig::from_yaml_str(FULL).unwrap();

        assert_eq!(
            config.source,
            StoreConfig::S3 {
                bucket: "epl-raw".to_string(),
                region: Some("eu-west-2".to_string()),
                endpoint: None,
                access_key_env: Some("AWS_ACCESS_KEY_ID".to_string()),
                secret_key_env: Some("AWS_SECRET_ACCESS_KEY".to_string()),
            }
        );
        assert_eq!(
            config.destination,
            StoreConfig::Local {
                path: PathBuf::from("/tmp/epl-processed")
            }
        );
        assert_eq!(config.pipeline.output_format, TableFormat::Parquet);
        assert_eq!(config.pipeline.commit_mode, CommitMode::PerPartition);
        assert_eq!(config.pipeline.fetch_concurrency, Some(4));
        assert_eq!(config.pipeline.watermark_key, DEFAULT_WATERMARK_KEY);
        assert_eq!(config.pipeline.transform().len(), 2);
        assert_eq!(config.logging.preset, LogPreset::Production);

        let subscriber = config.logging.subscriber_config().unwrap();
        assert!(subscriber.json);
        assert_eq!(subscriber.filter(), "debug,term_ingest=debug");

        let log_config = config.logging.log_config();
        assert!(log_config.log_storage_operations);
        assert!(!log_config.log_partition_details);
    }

    #[test]
    fn test_defaults_apply() {
        let config = IngestConfig::from_yaml_str(
            "source:\n  type: memory\ndestination:\n  type: memory\n",
        )
        .unwrap();
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.logging, LoggingSection::default());
        assert_eq!(config.pipeline.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_values() {
        let unknown = "source:\n  type: memory\ndestination:\n  type: memory\npipeline:\n  colour: blue\n";
        assert!(IngestConfig::from_yaml_str(unknown).is_err());

        let config = IngestConfig::new(StoreConfig::Memory, StoreConfig::Memory);
        let bad_key = config
            .clone()
            .with_pipeline(PipelineConfig::default().with_watermark_key("watermark"));
        assert!(bad_key.validate().is_err());

        let bad_pattern = config
            .clone()
            .with_pipeline(PipelineConfig::default().with_partition_pattern(Some("(".to_string())));
        assert!(bad_pattern.validate().is_err());

        let half_credentials = IngestConfig::new(
            StoreConfig::S3 {
                bucket: "b".to_string(),
                region: None,
                endpoint: None,
                access_key_env: Some("KEY".to_string()),
                secret_key_env: None,
            },
            StoreConfig::Memory,
        );
        assert!(half_credentials.validate().is_err());

        let bad_level = config.with_logging(LoggingSection {
            level: Some("loud".to_string()),
            ..LoggingSection::default()
        });
        let err = bad_level.validate().unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_wire_runs_pipeline() {
        let source = seeded_store(&[("sales-2023-03-19/data.csv", "col1\nx\n")]).await;
        let destination = seeded_store(&[]).await;
        let config = IngestConfig::new(StoreConfig::Memory, StoreConfig::Memory).with_pipeline(
            PipelineConfig::default()
                .with_partition_prefix("sales")
                .with_flag_column(Some("Is processed".to_string()))
                .with_watermark_location(WatermarkLocation::Destination),
        );

        let report = config
            .wire(source.clone(), destination.clone())
            .unwrap()
            .run(RunOptions::default().with_at(Utc.with_ymd_and_hms(2023, 3, 20, 0, 0, 0).unwrap()))
            .await;

        assert!(report.is_success());
        assert_eq!(
            read_text(destination.as_ref(), "data/processed-data-2023-03-19.csv")
                .await
                .unwrap(),
            "col1,Is processed\nx,true\n"
        );
        assert!(read_text(destination.as_ref(), DEFAULT_WATERMARK_KEY)
            .await
            .unwrap()
            .starts_with("partition_id,processed_at\n2023-03-19,"));
        assert!(source.get(DEFAULT_WATERMARK_KEY).await.is_err());
    }

    #[test]
    fn test_local_store_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out");
        let store = StoreConfig::Local { path: path.clone() }
            .build(Duration::from_secs(5), &LogConfig::default())
            .unwrap();
        assert!(path.is_dir());
        assert!(store.description().starts_with("file://"));
    }

    #[cfg(not(feature = "s3"))]
    #[test]
    fn test_s3_requires_feature() {
        let store = StoreConfig::S3 {
            bucket: "epl-raw".to_string(),
            region: None,
            endpoint: None,
            access_key_env: None,
            secret_key_env: None,
        };
        assert!(store
            .build(DEFAULT_REQUEST_TIMEOUT, &LogConfig::default())
            .is_err());
    }
}
