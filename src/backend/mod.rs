//! Storage backend capability and provider dispatch.

use std::{fmt, sync::Arc};

use bytes::Bytes;

use crate::{BackendConfig, BackendError, ConfigError};

/// Provider constructors backed by `object_store`.
pub mod providers;
/// Generic `object_store` adapter.
pub mod store;

pub use store::ObjectBackend;

/// Supported object storage providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Provider {
    /// Amazon S3 or an S3-compatible service.
    S3,
    /// Google Cloud Storage.
    Gcs,
    /// Azure Blob Storage.
    Azure,
    /// Process-local in-memory store.
    Memory,
}

impl Provider {
    /// Returns the short lowercase provider tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Gcs => "gcs",
            Self::Azure => "azure",
            Self::Memory => "memory",
        }
    }

    /// Returns `true` if the provider needs a credential bundle.
    pub fn requires_credentials(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object operations every provider exposes.
///
/// Implementations are shared read-only across requests; they hold the
/// provider client and credentials and never carry per-request state.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Provider tag used in logs and errors.
    fn provider(&self) -> Provider;

    /// Writes `body` under `key` and returns the object location.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<String, BackendError>;

    /// Removes the object stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// Returns whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, BackendError>;

    /// Derives the location of `key` without touching the network.
    fn location_of(&self, key: &str) -> String;
}

/// Builds the backend selected by `config`.
///
/// Provider dispatch happens once here; callers hold the returned handle
/// for the lifetime of the configuration.
pub fn connect(config: &BackendConfig) -> Result<Arc<dyn StorageBackend>, ConfigError> {
    config.validate()?;
    let backend: Arc<dyn StorageBackend> = match config.provider {
        Provider::S3 => Arc::new(providers::s3(config)?),
        Provider::Gcs => Arc::new(providers::gcs(config)?),
        Provider::Azure => Arc::new(providers::azure(config)?),
        Provider::Memory => Arc::new(providers::memory(config)),
    };
    tracing::debug!(
        provider = %config.provider,
        bucket = %config.bucket,
        "storage backend configured"
    );
    Ok(backend)
}
