use std::{collections::HashSet, fmt};

use crate::{
    backend::Provider, limits::Limits, multipart::SpoolMode, ConfigError, FieldPolicy,
    UploadField,
};

/// Provider-specific credential bundle.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(tag = "provider", rename_all = "lowercase")
)]
pub enum Credentials {
    /// Static S3 access keys.
    S3 {
        /// Access key id.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Optional STS session token.
        session_token: Option<String>,
    },
    /// GCS service account key, as the raw JSON document.
    Gcs {
        /// Service account JSON.
        service_account_key: String,
    },
    /// Azure storage account shared key.
    Azure {
        /// Storage account name.
        account: String,
        /// Shared access key.
        access_key: String,
    },
}

impl Credentials {
    /// Provider these credentials authenticate against.
    pub fn provider(&self) -> Provider {
        match self {
            Self::S3 { .. } => Provider::S3,
            Self::Gcs { .. } => Provider::Gcs,
            Self::Azure { .. } => Provider::Azure,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { access_key_id, .. } => f
                .debug_struct("S3")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish_non_exhaustive(),
            Self::Gcs { .. } => f
                .debug_struct("Gcs")
                .field("service_account_key", &"<redacted>")
                .finish(),
            Self::Azure { account, .. } => f
                .debug_struct("Azure")
                .field("account", account)
                .field("access_key", &"<redacted>")
                .finish(),
        }
    }
}

/// Connection settings for one storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct BackendConfig {
    /// Target provider.
    pub provider: Provider,
    /// Bucket (S3, GCS) or container (Azure) name.
    pub bucket: String,
    /// Provider region hint.
    #[cfg_attr(feature = "serde", serde(default))]
    pub region: Option<String>,
    /// Custom S3-compatible endpoint.
    #[cfg_attr(feature = "serde", serde(default))]
    pub endpoint: Option<String>,
    /// Base URL used for object locations instead of the provider default.
    #[cfg_attr(feature = "serde", serde(default))]
    pub public_url: Option<String>,
    /// Provider credentials.
    #[cfg_attr(feature = "serde", serde(default))]
    pub credentials: Option<Credentials>,
}

impl BackendConfig {
    /// Creates a config for `provider` targeting `bucket`.
    pub fn new(provider: Provider, bucket: impl Into<String>) -> Self {
        Self {
            provider,
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            public_url: None,
            credentials: None,
        }
    }

    /// Creates a config for the in-memory provider.
    pub fn memory(bucket: impl Into<String>) -> Self {
        Self::new(Provider::Memory, bucket)
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the public location base.
    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = Some(public_url.into());
        self
    }

    /// Sets the credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Validates the configuration without contacting the provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }

        if self.provider.requires_credentials() {
            let Some(credentials) = &self.credentials else {
                return Err(ConfigError::MissingCredentials {
                    provider: self.provider,
                });
            };
            if credentials.provider() != self.provider {
                return Err(ConfigError::CredentialsMismatch {
                    provider: self.provider,
                });
            }
        }

        if self.provider == Provider::S3 && self.region.is_none() && self.endpoint.is_none() {
            return Err(ConfigError::MissingRegion);
        }

        Ok(())
    }
}

/// Behavior when a file arrives for an undeclared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum UnknownFieldPolicy {
    /// Fail the request with [`crate::ValidationError::UnexpectedField`].
    #[default]
    Reject,
    /// Drop the file and continue.
    Ignore,
}

/// Route-level upload configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Declared fields, in processing order.
    pub fields: Vec<UploadField>,
    /// Global policy every field starts from.
    pub defaults: FieldPolicy,
    /// Handling of files for undeclared fields.
    pub unknown_field_policy: UnknownFieldPolicy,
    /// Maximum number of backend writes in flight per request.
    pub concurrency: usize,
    /// Limits applied while reading a raw multipart body.
    pub limits: Limits,
    /// Where file parts are staged while a raw body is parsed.
    pub spool: SpoolMode,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            defaults: FieldPolicy::default(),
            unknown_field_policy: UnknownFieldPolicy::default(),
            concurrency: 1,
            limits: Limits::default(),
            spool: SpoolMode::default(),
        }
    }
}

impl UploadConfig {
    /// Validates field declarations and concurrency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.cardinality().max_count() == Some(0) {
                return Err(ConfigError::InvalidMaxCount {
                    field: field.name().to_owned(),
                });
            }
            if !seen.insert(field.name()) {
                return Err(ConfigError::DuplicateField {
                    field: field.name().to_owned(),
                });
            }
        }

        Ok(())
    }

    /// Returns the declared field called `name`.
    pub fn field(&self, name: &str) -> Option<&UploadField> {
        self.fields.iter().find(|field| field.name() == name)
    }
}
