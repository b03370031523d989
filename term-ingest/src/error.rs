//! Error types for the Term ingestion engine.
//!
//! This module provides the error handling strategy using `thiserror` for
//! automatic error trait implementations. Every failure the engine can
//! report is represented by the `IngestError` enum.
//!
//! The variants fall into three groups:
//!
//! - **Run-fatal**: [`IngestError::Discovery`] and [`IngestError::WatermarkCorrupt`]
//!   abort a run before any partition is touched.
//! - **Partition-scoped**: [`IngestError::Combine`], [`IngestError::Transform`]
//!   and [`IngestError::Write`] halt draining at one partition; the prefix of
//!   earlier successes is still committed.
//! - **Collaborator**: storage, codec, configuration and library errors that
//!   the core wraps into one of the above before reporting them.

use thiserror::Error;

use crate::partition::PartitionId;
use crate::storage::StorageError;

/// The main error type for the Term ingestion engine.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Listing the source store failed, so the pending set is unknown.
    #[error("Partition discovery failed: {message}")]
    Discovery {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The watermark artifact exists but cannot be parsed.
    #[error("Watermark artifact '{key}' is corrupt: {message}")]
    WatermarkCorrupt {
        /// Key of the watermark artifact
        key: String,
        /// What was wrong with it
        message: String,
    },

    /// The files of a partition could not be fetched, decoded or concatenated.
    #[error("Combining partition '{partition}' failed: {message}")]
    Combine {
        partition: PartitionId,
        message: String,
    },

    /// The transformation raised for a partition.
    #[error("Transforming partition '{partition}' failed: {message}")]
    Transform {
        partition: PartitionId,
        message: String,
    },

    /// Encoding or writing a partition's output failed.
    #[error("Writing partition '{partition}' to '{key}' failed: {message}")]
    Write {
        partition: PartitionId,
        key: String,
        message: String,
    },

    /// Error from the storage gateway.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error from the table codec.
    #[error("Codec error ({format}): {message}")]
    Codec {
        /// Table format being encoded or decoded
        format: String,
        /// Detailed error message
        message: String,
    },

    /// Two tables could not be concatenated because their schemas differ.
    #[error("Schema mismatch: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from Parquet operations.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, IngestError>`.
///
/// This is the standard `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// Creates a new discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new discovery error with a source error.
    pub fn discovery_with_source(
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Discovery {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new corrupt-watermark error.
    pub fn watermark_corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WatermarkCorrupt {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new codec error.
    pub fn codec(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Codec {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Returns a stable, snake_case name for the kind of error.
    ///
    /// Used in run reports so that callers can match on the failure kind
    /// without parsing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discovery { .. } => "discovery_error",
            Self::WatermarkCorrupt { .. } => "watermark_corrupt_error",
            Self::Combine { .. } => "combine_error",
            Self::Transform { .. } => "transform_error",
            Self::Write { .. } => "write_error",
            Self::Storage(_) => "storage_error",
            Self::Codec { .. } => "codec_error",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::Configuration(_) => "configuration_error",
            Self::Arrow(_) => "arrow_error",
            Self::Parquet(_) => "parquet_error",
            Self::DataFusion(_) => "datafusion_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns the partition this error is scoped to, if any.
    pub fn partition(&self) -> Option<&PartitionId> {
        match self {
            Self::Combine { partition, .. }
            | Self::Transform { partition, .. }
            | Self::Write { partition, .. } => Some(partition),
            _ => None,
        }
    }

    /// Returns true if the error aborts the whole run rather than one partition.
    pub fn is_run_fatal(&self) -> bool {
        self.partition().is_none()
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<IngestError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            match base_error {
                IngestError::Internal(inner) => IngestError::Internal(format!("{msg}: {inner}")),
                other => IngestError::Internal(format!("{msg}: {other}")),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            let base_error = e.into();
            match base_error {
                IngestError::Internal(inner) => IngestError::Internal(format!("{msg}: {inner}")),
                other => IngestError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}
