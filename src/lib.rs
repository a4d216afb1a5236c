#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core crate surface for `cloudgear`.
//!
//! `cloudgear` puts S3, GCS and Azure Blob storage behind one
//! [`StorageBackend`] contract and streams request file uploads straight
//! to the configured provider.
//!
//! * [`ObjectStorage`] offers upload, delete and get-URL over one backend.
//! * [`Uploader`] applies per-field policies to the files of a request,
//!   writes them to the backend and returns an [`UploadOutcome`] keyed by
//!   field name.

/// Storage backend contract and provider adapters.
pub mod backend;
/// Fluent builder API.
pub mod builder;
/// Temporary artifact cleanup.
pub mod cleanup;
/// Backend and upload configuration.
pub mod config;
/// Request and file metadata visible to policies.
pub mod context;
/// Error types exposed by this crate.
pub mod error;
/// Declared upload fields.
pub mod field;
/// Object key derivation helpers.
pub mod key;
/// Intake limits and size-limited streams.
pub mod limits;
/// Raw multipart intake.
pub mod multipart;
/// Low-level parser components.
pub mod parser;
/// Field policies and their resolution.
pub mod policy;
/// Runtime selector engine.
pub mod selector;
/// Incoming file byte sources.
pub mod source;
/// Normalized storage facade.
pub mod storage;
/// Upload orchestration.
pub mod upload;

#[cfg(feature = "actix")]
pub mod actix;
#[cfg(feature = "axum")]
pub mod axum;

pub use backend::{connect, ObjectBackend, Provider, StorageBackend};
pub use builder::UploaderBuilder;
pub use cleanup::{ArtifactId, CleanupCoordinator, TempArtifact};
pub use config::{BackendConfig, Credentials, UnknownFieldPolicy, UploadConfig};
pub use context::{FileMeta, RequestContext};
pub use error::{
    BackendError, BoxError, ConfigError, Operation, ParseError, UploadError, ValidationError,
};
pub use field::{Cardinality, UploadField};
pub use limits::{Limits, SizeLimited};
pub use multipart::{CollectedParts, Intake, SpoolMode};
pub use policy::{ContentFilter, FieldPolicy, FilterDecision, KeyGenerator};
pub use selector::{SelectorAction, SelectorEngine};
pub use source::{ByteSource, ChunkStream, IncomingFile};
pub use storage::ObjectStorage;
pub use upload::{UploadOutcome, UploadResult, UploadedValue, Uploader};

/// Re-exported so callers can cancel uploads without a direct dependency.
pub use tokio_util::sync::CancellationToken;
