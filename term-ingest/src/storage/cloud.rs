//! Amazon S3 connector.
//!
//! Builds an [`ObjectStoreGateway`] over `object_store`'s S3 client with the
//! retry policy used for all cloud access.

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::RetryConfig;
use tracing::{info, instrument};

use super::{ObjectStoreGateway, StorageError, StorageResult};
use crate::security::SecureString;

/// S3 authentication configuration.
#[derive(Debug, Clone)]
pub enum S3Auth {
    /// Use IAM instance credentials
    InstanceCredentials,
    /// Use access key and secret
    AccessKey {
        access_key_id: String,
        secret_access_key: SecureString,
        session_token: Option<SecureString>,
    },
    /// Read the key pair from the named environment variables
    Environment {
        access_key_var: String,
        secret_key_var: String,
    },
}

/// Configuration for one S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region (optional, will be auto-detected if not specified)
    pub region: Option<String>,
    /// Authentication method
    pub auth: S3Auth,
    /// Custom endpoint (for S3-compatible services)
    pub endpoint: Option<String>,
    /// Maximum retries performed by the client itself
    pub max_retries: usize,
}

impl S3Config {
    /// Creates a configuration for `bucket` using instance credentials.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            auth: S3Auth::InstanceCredentials,
            endpoint: None,
            max_retries: 3,
        }
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the authentication method.
    pub fn with_auth(mut self, auth: S3Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

fn read_env(var: &str) -> StorageResult<SecureString> {
    std::env::var(var)
        .map(SecureString::new)
        .map_err(|_| StorageError::Backend {
            operation: "connect",
            key: var.to_string(),
            message: format!("environment variable '{var}' is not set"),
        })
}

impl ObjectStoreGateway {
    /// Creates a gateway for an S3 bucket.
    #[instrument(skip(config), fields(bucket = %config.bucket))]
    pub fn s3(config: &S3Config) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_retry(RetryConfig {
                max_retries: config.max_retries,
                retry_timeout: std::time::Duration::from_secs(30),
                ..Default::default()
            });

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        match &config.auth {
            S3Auth::InstanceCredentials => {
                // IAM instance credentials will be auto-detected
            }
            S3Auth::AccessKey {
                access_key_id,
                secret_access_key,
                session_token,
            } => {
                builder = builder
                    .with_access_key_id(access_key_id)
                    .with_secret_access_key(secret_access_key.expose());

                if let Some(token) = session_token {
                    builder = builder.with_token(token.expose());
                }
            }
            S3Auth::Environment {
                access_key_var,
                secret_key_var,
            } => {
                let access_key = read_env(access_key_var)?;
                let secret_key = read_env(secret_key_var)?;
                builder = builder
                    .with_access_key_id(access_key.expose())
                    .with_secret_access_key(secret_key.expose());
            }
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::from_object_store("connect", &config.bucket, e))?;

        info!(bucket = %config.bucket, "Connected S3 gateway");
        Ok(Self::new(Arc::new(store), format!("s3://{}", config.bucket)))
    }
}
