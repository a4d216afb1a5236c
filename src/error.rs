use std::{fmt, io};

use thiserror::Error;

use crate::backend::Provider;

/// Boxed error type carried by backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type returned by the upload pipeline and the storage facade.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Invalid backend or uploader configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A file failed field validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A file grew past the size limit of its field.
    #[error("file in field `{field}` exceeds the size limit of {limit} bytes")]
    SizeLimitExceeded {
        /// Field that received the oversized file.
        field: String,
        /// Effective limit in bytes.
        limit: u64,
    },
    /// The storage provider rejected an operation.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// No object exists under the requested key.
    #[error("object `{key}` not found")]
    FileNotFound {
        /// Object key that was looked up.
        key: String,
    },
    /// Reading the byte source of a file failed.
    #[error("failed to read file for field `{field}`: {source}")]
    Source {
        /// Field the file belongs to.
        field: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Malformed multipart input.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The multipart body exceeded the configured size.
    #[error("request body exceeds the size limit of {limit} bytes")]
    BodySizeLimitExceeded {
        /// Configured body limit in bytes.
        limit: u64,
    },
    /// More multipart parts arrived than allowed.
    #[error("request carries more than {limit} parts of this kind")]
    PartsLimitExceeded {
        /// Configured part limit.
        limit: usize,
    },
    /// The request was cancelled before all files were uploaded.
    #[error("upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Returns `true` for errors raised before any backend call is made.
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation(_))
    }
}

/// Configuration error surfaced before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Bucket or container name is empty.
    #[error("bucket or container name is required")]
    MissingBucket,
    /// No credentials were given for a provider that needs them.
    #[error("credentials are required for the {provider} provider")]
    MissingCredentials {
        /// Provider being configured.
        provider: Provider,
    },
    /// Credentials belong to a different provider.
    #[error("credentials do not match the {provider} provider")]
    CredentialsMismatch {
        /// Provider being configured.
        provider: Provider,
    },
    /// S3 needs either a region or a custom endpoint.
    #[error("region is required for the s3 provider unless an endpoint is set")]
    MissingRegion,
    /// The provider was not compiled into this build.
    #[error("the {provider} provider is not enabled in this build")]
    ProviderDisabled {
        /// Provider that was requested.
        provider: Provider,
    },
    /// The provider SDK rejected the configuration.
    #[error("invalid {provider} configuration: {message}")]
    Provider {
        /// Provider being configured.
        provider: Provider,
        /// Message reported by the SDK builder.
        message: String,
    },
    /// Two upload fields share a name.
    #[error("field `{field}` is declared more than once")]
    DuplicateField {
        /// Duplicated field name.
        field: String,
    },
    /// A bounded field was declared with a zero maximum.
    #[error("field `{field}` must allow at least one file")]
    InvalidMaxCount {
        /// Offending field name.
        field: String,
    },
    /// Upload concurrency must be at least one.
    #[error("upload concurrency must be at least 1")]
    InvalidConcurrency,
    /// The uploader builder was finished without a backend.
    #[error("no storage backend configured")]
    MissingBackend,
}

/// Field validation failure. Aborts the whole request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The file extension is not in the allow-list of its field.
    #[error(
        "file `{file_name}` in field `{field}` has a disallowed extension (allowed: {})",
        .allowed.join(", ")
    )]
    ExtensionNotAllowed {
        /// Field that received the file.
        field: String,
        /// Original file name.
        file_name: String,
        /// Extensions accepted by the field.
        allowed: Vec<String>,
    },
    /// A content filter rejected the file.
    #[error("file in field `{field}` was rejected: {reason}")]
    Rejected {
        /// Field that received the file.
        field: String,
        /// Reason reported by the filter.
        reason: String,
    },
    /// A file arrived for a field that is not declared.
    #[error("unexpected field `{field}`")]
    UnexpectedField {
        /// Undeclared field name.
        field: String,
    },
    /// A field received more files than it accepts.
    #[error("field `{field}` accepts at most {max_count} file(s)")]
    TooManyFiles {
        /// Field name.
        field: String,
        /// Maximum accepted count.
        max_count: usize,
    },
}

impl ValidationError {
    /// Returns the field this error is about.
    pub fn field(&self) -> &str {
        match self {
            Self::ExtensionNotAllowed { field, .. }
            | Self::Rejected { field, .. }
            | Self::UnexpectedField { field }
            | Self::TooManyFiles { field, .. } => field,
        }
    }
}

/// Backend operation tag attached to failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Object write.
    Put,
    /// Object removal.
    Delete,
    /// Metadata lookup.
    Head,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Head => "head",
        })
    }
}

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The object does not exist.
    #[error("{provider}: object `{key}` not found")]
    NotFound {
        /// Provider that answered.
        provider: Provider,
        /// Object key.
        key: String,
    },
    /// Any other provider failure (network, auth, quota, ...).
    #[error("{provider} {operation} failed for `{key}`: {source}")]
    Failed {
        /// Provider that failed.
        provider: Provider,
        /// Operation that failed.
        operation: Operation,
        /// Object key.
        key: String,
        /// Provider error.
        #[source]
        source: BoxError,
    },
}

impl BackendError {
    /// Builds a generic failure from any error value.
    pub fn failed(
        provider: Provider,
        operation: Operation,
        key: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Failed {
            provider,
            operation,
            key: key.into(),
            source: source.into(),
        }
    }

    /// Returns `true` when the object was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the key the failing operation targeted.
    pub fn key(&self) -> &str {
        match self {
            Self::NotFound { key, .. } | Self::Failed { key, .. } => key,
        }
    }
}

/// Multipart parsing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    /// Creates a parse error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}
