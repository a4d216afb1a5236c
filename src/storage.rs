//! Normalized object operations over one configured backend.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
    backend::{self, Provider},
    BackendConfig, BackendError, ConfigError, StorageBackend, UploadConfig, UploadError,
    Uploader,
};

/// Upload, delete and get-URL against the configured provider.
///
/// Cheap to clone; clones share the backend client.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    backend: Arc<dyn StorageBackend>,
}

impl ObjectStorage {
    /// Validates `config` and connects to its provider.
    pub fn connect(config: &BackendConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            backend: backend::connect(config)?,
        })
    }

    /// Wraps an existing backend.
    pub fn from_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Shared backend handle.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Provider behind this storage.
    pub fn provider(&self) -> Provider {
        self.backend.provider()
    }

    /// Writes `body` under `key` and returns its location.
    pub async fn upload(
        &self,
        key: &str,
        body: impl Into<Bytes>,
        content_type: Option<&str>,
    ) -> Result<String, UploadError> {
        Ok(self.backend.put(key, body.into(), content_type).await?)
    }

    /// Removes the object under `key`.
    ///
    /// Fails with [`UploadError::FileNotFound`] when nothing is stored there.
    pub async fn delete(&self, key: &str) -> Result<(), UploadError> {
        self.ensure_exists(key).await?;
        self.backend
            .delete(key)
            .await
            .map_err(|err| not_found_to_missing(err, key))
    }

    /// Returns the location of the object under `key`.
    ///
    /// Fails with [`UploadError::FileNotFound`] when nothing is stored there.
    pub async fn url(&self, key: &str) -> Result<String, UploadError> {
        self.ensure_exists(key).await?;
        Ok(self.backend.location_of(key))
    }

    /// Returns whether an object exists under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool, UploadError> {
        Ok(self.backend.exists(key).await?)
    }

    /// Creates an uploader writing to this storage.
    pub fn uploader(&self, config: UploadConfig) -> Result<Uploader, ConfigError> {
        Uploader::new(Arc::clone(&self.backend), config)
    }

    async fn ensure_exists(&self, key: &str) -> Result<(), UploadError> {
        let exists = self
            .backend
            .exists(key)
            .await
            .map_err(|err| not_found_to_missing(err, key))?;
        if exists {
            Ok(())
        } else {
            Err(UploadError::FileNotFound {
                key: key.to_owned(),
            })
        }
    }
}

fn not_found_to_missing(err: BackendError, key: &str) -> UploadError {
    if err.is_not_found() {
        UploadError::FileNotFound {
            key: key.to_owned(),
        }
    } else {
        UploadError::Backend(err)
    }
}
