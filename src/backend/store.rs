use std::time::Instant;

use bytes::Bytes;
use object_store::{
    path::Path, Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
};

use crate::{
    backend::{Provider, StorageBackend},
    error::Operation,
    BackendError,
};

/// [`StorageBackend`] over any `object_store` implementation.
///
/// Locations are derived from a fixed base URL, so `location_of` never
/// performs I/O.
#[derive(Debug)]
pub struct ObjectBackend<S> {
    store: S,
    provider: Provider,
    base_url: String,
}

impl<S> ObjectBackend<S> {
    /// Wraps `store`, deriving object locations from `base_url`.
    pub fn new(store: S, provider: Provider, base_url: impl Into<String>) -> Self {
        Self {
            store,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Returns the underlying store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Returns the location base without a trailing separator.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_error(&self, operation: Operation, key: &str, err: object_store::Error) -> BackendError {
        match err {
            object_store::Error::NotFound { .. } => BackendError::NotFound {
                provider: self.provider,
                key: key.to_owned(),
            },
            other => BackendError::failed(self.provider, operation, key, other),
        }
    }
}

#[async_trait::async_trait]
impl<S> StorageBackend for ObjectBackend<S>
where
    S: ObjectStore,
{
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<String, BackendError> {
        let start = Instant::now();
        let size = body.len();
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_owned().into());
        }
        let options = PutOptions {
            attributes,
            ..PutOptions::default()
        };

        self.store
            .put_opts(&Path::from(key), PutPayload::from(body), options)
            .await
            .map_err(|err| {
                tracing::error!(
                    error = %err,
                    provider = %self.provider,
                    key = %key,
                    size_bytes = size,
                    "object upload failed"
                );
                self.map_error(Operation::Put, key, err)
            })?;

        tracing::info!(
            provider = %self.provider,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "object uploaded"
        );
        Ok(self.location_of(key))
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.store
            .delete(&Path::from(key))
            .await
            .map_err(|err| self.map_error(Operation::Delete, key, err))?;
        tracing::info!(provider = %self.provider, key = %key, "object deleted");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        match self.store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(self.map_error(Operation::Head, key, err)),
        }
    }

    fn location_of(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}
