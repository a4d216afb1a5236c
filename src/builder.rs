use std::sync::Arc;

use crate::{
    limits::Limits, multipart::SpoolMode, ConfigError, ContentFilter, FieldPolicy, FileMeta,
    FilterDecision, KeyGenerator, RequestContext, StorageBackend, UnknownFieldPolicy,
    UploadConfig, UploadField, Uploader,
};

/// Builder for configuring an [`Uploader`].
///
/// Policy setters (`allowed_extensions`, `max_file_size`, ...) change the
/// global defaults; per-field overrides go through [`UploaderBuilder::field`].
#[derive(Debug, Clone, Default)]
pub struct UploaderBuilder {
    config: UploadConfig,
    backend: Option<Arc<dyn StorageBackend>>,
}

impl UploaderBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current builder configuration snapshot.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Declares a single-file field.
    pub fn single(self, name: impl Into<String>) -> Self {
        self.field(UploadField::single(name))
    }

    /// Declares a field accepting up to `max_count` files.
    pub fn array(self, name: impl Into<String>, max_count: usize) -> Self {
        self.field(UploadField::array(name, max_count))
    }

    /// Declares a field accepting any number of files.
    pub fn unbounded(self, name: impl Into<String>) -> Self {
        self.field(UploadField::unbounded(name))
    }

    /// Declares a field, including its policy overrides.
    pub fn field(mut self, field: UploadField) -> Self {
        self.config.fields.push(field);
        self
    }

    /// Sets the default extension allow-list.
    pub fn allowed_extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        self.config.defaults = self.config.defaults.with_allowed_extensions(extensions);
        self
    }

    /// Sets the default per-file size limit in bytes.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.defaults = self.config.defaults.with_max_file_size(bytes);
        self
    }

    /// Sets the default key prefix.
    pub fn destination(mut self, prefix: impl Into<String>) -> Self {
        self.config.defaults = self.config.defaults.with_destination(prefix);
        self
    }

    /// Sets the default key generator.
    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RequestContext, &FileMeta) -> String + Send + Sync + 'static,
    {
        self.config.defaults = self
            .config
            .defaults
            .with_key_generator(KeyGenerator::new(generator));
        self
    }

    /// Sets the default content filter.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RequestContext, &FileMeta) -> FilterDecision + Send + Sync + 'static,
    {
        self.config.defaults = self
            .config
            .defaults
            .with_content_filter(ContentFilter::new(filter));
        self
    }

    /// Replaces the global default policy.
    pub fn defaults(mut self, defaults: FieldPolicy) -> Self {
        self.config.defaults = defaults;
        self
    }

    /// Sets handling of files for undeclared fields.
    pub fn unknown_field_policy(mut self, policy: UnknownFieldPolicy) -> Self {
        self.config.unknown_field_policy = policy;
        self
    }

    /// Sets the maximum number of backend writes in flight.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// Sets raw body intake limits.
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Sets where raw body file parts are staged.
    pub fn spool(mut self, spool: SpoolMode) -> Self {
        self.config.spool = spool;
        self
    }

    /// Sets the storage backend.
    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Validates the configuration and builds the uploader.
    pub fn build(self) -> Result<Uploader, ConfigError> {
        let backend = self.backend.ok_or(ConfigError::MissingBackend)?;
        Uploader::new(backend, self.config)
    }
}
