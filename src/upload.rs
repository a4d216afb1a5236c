//! Upload orchestration.
//!
//! [`Uploader::process`] runs in two phases. The planning phase matches
//! every file to its declared field, applies content filters, extension
//! allow-lists and declared-size checks; any failure there aborts the
//! request before a single backend call. The transfer phase reads each
//! accepted file under its size ceiling and writes it to the backend,
//! with at most `concurrency` writes in flight. Results are assembled by
//! declared field order, then arrival order, whatever order the writes
//! complete in.
//!
//! Objects written before a failure are left in place: a failed request
//! does not issue compensating deletes.

use std::{collections::HashMap, sync::Arc, time::Instant};

use bytes::{Bytes, BytesMut};
use futures::{stream::FuturesUnordered, Stream, StreamExt};
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::{
    cleanup::{ArtifactId, CleanupCoordinator},
    limits::{ReadError, SizeLimited},
    multipart::Intake,
    policy::resolve,
    selector::{SelectorAction, SelectorEngine},
    source::ChunkStream,
    ByteSource, ConfigError, FieldPolicy, FileMeta, FilterDecision, IncomingFile, ParseError,
    RequestContext, StorageBackend, UploadConfig, UploadError, UploaderBuilder, ValidationError,
};

/// Outcome of one successfully uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Field the file was uploaded through.
    pub field_name: String,
    /// File name supplied by the client.
    pub original_name: String,
    /// Object key the file was stored under.
    pub key: String,
    /// Object location reported by the backend.
    pub location: String,
    /// Bytes written.
    pub size: u64,
    /// Declared content type.
    pub content_type: mime::Mime,
}

/// Results of one field: scalar for single fields, a sequence otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadedValue {
    /// Result of a single-file field.
    Single(UploadResult),
    /// Results of a multi-file field, in arrival order.
    Multiple(Vec<UploadResult>),
}

impl UploadedValue {
    /// Location of a single-file field.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Single(result) => Some(&result.location),
            Self::Multiple(_) => None,
        }
    }

    /// Every location of the field, in order.
    pub fn locations(&self) -> Vec<&str> {
        self.results()
            .iter()
            .map(|result| result.location.as_str())
            .collect()
    }

    /// Every result of the field, in order.
    pub fn results(&self) -> &[UploadResult] {
        match self {
            Self::Single(result) => std::slice::from_ref(result),
            Self::Multiple(results) => results,
        }
    }
}

/// Per-request aggregate of upload results, keyed by field name.
///
/// Fields appear in declaration order; fields without an uploaded file
/// are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    entries: Vec<(String, UploadedValue)>,
}

impl UploadOutcome {
    /// Value recorded for `field`.
    pub fn get(&self, field: &str) -> Option<&UploadedValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Scalar location of a single-file field.
    pub fn location(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(UploadedValue::location)
    }

    /// Locations of `field`, in order.
    pub fn locations(&self, field: &str) -> Option<Vec<&str>> {
        self.get(field).map(UploadedValue::locations)
    }

    /// Iterates fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UploadedValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Iterates every uploaded file.
    pub fn files(&self) -> impl Iterator<Item = &UploadResult> {
        self.entries
            .iter()
            .flat_map(|(_, value)| value.results().iter())
    }

    /// Number of fields with at least one upload.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing was uploaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for UploadOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            match value {
                UploadedValue::Single(result) => map.serialize_entry(name, &result.location)?,
                UploadedValue::Multiple(_) => map.serialize_entry(name, &value.locations())?,
            }
        }
        map.end()
    }
}

struct Job {
    slot: usize,
    file: IncomingFile,
    artifact: Option<ArtifactId>,
}

/// Streams request files to a storage backend according to field policies.
#[derive(Debug, Clone)]
pub struct Uploader {
    backend: Arc<dyn StorageBackend>,
    config: UploadConfig,
    overrides: HashMap<String, FieldPolicy>,
}

impl Uploader {
    /// Creates an uploader after validating `config`.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        config: UploadConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let overrides = config
            .fields
            .iter()
            .map(|field| (field.name().to_owned(), field.overrides().clone()))
            .collect();
        Ok(Self {
            backend,
            config,
            overrides,
        })
    }

    /// Creates a fluent builder.
    pub fn builder() -> UploaderBuilder {
        UploaderBuilder::default()
    }

    /// Active configuration.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Shared backend handle.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Effective policy of `field_name`.
    pub fn policy_for(&self, field_name: &str) -> FieldPolicy {
        resolve(field_name, &self.config.defaults, &self.overrides)
    }

    /// Uploads `files` and returns the per-field outcome.
    pub async fn process(
        &self,
        ctx: &RequestContext,
        files: Vec<IncomingFile>,
    ) -> Result<UploadOutcome, UploadError> {
        self.process_with_cancel(ctx, files, &CancellationToken::new())
            .await
    }

    /// Like [`Uploader::process`], stopping new backend writes once
    /// `cancel` fires.
    pub async fn process_with_cancel(
        &self,
        ctx: &RequestContext,
        files: Vec<IncomingFile>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let mut cleanup = CleanupCoordinator::new();
        self.process_with(ctx, files, &mut cleanup, cancel).await
    }

    /// Runs the pipeline with a caller-owned cleanup coordinator.
    ///
    /// Every artifact attached to `files` is tracked by `cleanup` and has
    /// been released when this returns, on success and on failure.
    pub async fn process_with(
        &self,
        ctx: &RequestContext,
        files: Vec<IncomingFile>,
        cleanup: &mut CleanupCoordinator,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let start = Instant::now();
        let staged: Vec<_> = files
            .into_iter()
            .map(|mut file| {
                let artifact = file.take_artifact().map(|artifact| cleanup.track(artifact));
                (file, artifact)
            })
            .collect();

        let result = self.run(ctx, staged, cleanup, cancel).await;
        cleanup.sweep().await;

        match &result {
            Ok(outcome) => tracing::debug!(
                provider = %self.backend.provider(),
                files = outcome.files().count(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "upload request completed"
            ),
            Err(err) => tracing::debug!(
                provider = %self.backend.provider(),
                error = %err,
                "upload request failed"
            ),
        }
        result
    }

    /// Parses a raw multipart body and uploads its files.
    ///
    /// Text parts become text fields of the request context.
    pub async fn handle<S>(
        &self,
        headers: &HeaderMap,
        body: S,
    ) -> Result<UploadOutcome, UploadError>
    where
        S: Stream<Item = Result<Bytes, ParseError>> + Unpin,
    {
        self.handle_with_cancel(headers, body, &CancellationToken::new())
            .await
    }

    /// Like [`Uploader::handle`], observing `cancel`.
    pub async fn handle_with_cancel<S>(
        &self,
        headers: &HeaderMap,
        body: S,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError>
    where
        S: Stream<Item = Result<Bytes, ParseError>> + Unpin,
    {
        let content_type = crate::multipart::content_type_from_headers(headers)?;
        let boundary = crate::parser::extract_multipart_boundary(content_type)?;
        let collected = self.intake().collect(boundary, body).await?;

        let mut ctx = RequestContext::with_headers(headers.clone());
        for (name, value) in collected.text_fields {
            ctx.push_text_field(name, value);
        }
        self.process_with_cancel(&ctx, collected.files, cancel).await
    }

    /// Intake that caps every file part at its field's size limit while
    /// the body is still being read.
    fn intake(&self) -> Intake {
        let intake = Intake::new(self.config.spool.clone(), self.config.limits)
            .with_default_file_ceiling(self.config.defaults.max_file_size);
        self.config.fields.iter().fold(intake, |intake, field| {
            match self.policy_for(field.name()).max_file_size {
                Some(limit) => intake.with_file_ceiling(field.name(), limit),
                None => intake,
            }
        })
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        staged: Vec<(IncomingFile, Option<ArtifactId>)>,
        cleanup: &mut CleanupCoordinator,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let fields = &self.config.fields;
        let policies: Vec<FieldPolicy> = fields
            .iter()
            .map(|field| self.policy_for(field.name()))
            .collect();

        let mut selector = SelectorEngine::new(fields, self.config.unknown_field_policy);
        let mut slots: Vec<Vec<(IncomingFile, Option<ArtifactId>)>> =
            fields.iter().map(|_| Vec::new()).collect();
        for (file, artifact) in staged {
            match selector.evaluate(file.field_name())? {
                SelectorAction::Accept(slot) => slots[slot].push((file, artifact)),
                SelectorAction::Ignore => {
                    tracing::warn!(
                        field = %file.field_name(),
                        "ignoring file for undeclared field"
                    );
                    if let Some(id) = artifact {
                        cleanup.release(id).await;
                    }
                }
            }
        }

        let mut jobs = Vec::new();
        for (slot, files) in slots.into_iter().enumerate() {
            let policy = &policies[slot];
            for (file, artifact) in files {
                let meta = file.meta();
                match policy.filter(ctx, meta) {
                    FilterDecision::Accept => {}
                    FilterDecision::Skip => {
                        tracing::warn!(
                            field = %meta.field_name,
                            file = %meta.original_name,
                            "file omitted by content filter"
                        );
                        if let Some(id) = artifact {
                            cleanup.release(id).await;
                        }
                        continue;
                    }
                    FilterDecision::Reject(reason) => {
                        return Err(ValidationError::Rejected {
                            field: meta.field_name.clone(),
                            reason,
                        }
                        .into());
                    }
                }

                policy.check_extension(meta)?;
                if let (Some(limit), Some(size)) = (policy.max_file_size, meta.size) {
                    if size > limit {
                        return Err(UploadError::SizeLimitExceeded {
                            field: meta.field_name.clone(),
                            limit,
                        });
                    }
                }
                jobs.push(Job {
                    slot,
                    file,
                    artifact,
                });
            }
        }

        let job_slots: Vec<usize> = jobs.iter().map(|job| job.slot).collect();
        let mut results: Vec<Option<UploadResult>> = job_slots.iter().map(|_| None).collect();
        let mut queue = jobs.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<UploadError> = None;

        loop {
            while failure.is_none() && in_flight.len() < self.config.concurrency {
                let Some((position, job)) = queue.next() else {
                    break;
                };
                if cancel.is_cancelled() {
                    failure = Some(UploadError::Cancelled);
                    break;
                }
                let policy = &policies[job.slot];
                in_flight.push(async move {
                    let outcome = self.transfer(ctx, policy, job.file, cancel).await;
                    (position, job.artifact, outcome)
                });
            }

            let finished = tokio::select! {
                biased;
                finished = in_flight.next() => finished,
                _ = cancel.cancelled(), if failure.is_none() => {
                    tracing::debug!("upload cancelled, draining in-flight writes");
                    failure = Some(UploadError::Cancelled);
                    continue;
                }
            };
            let Some((position, artifact, outcome)) = finished else {
                break;
            };

            if let Some(id) = artifact {
                cleanup.release(id).await;
            }
            match outcome {
                Ok(result) if failure.is_none() => results[position] = Some(result),
                Ok(result) => tracing::debug!(
                    key = %result.key,
                    "discarding upload completed after request failure"
                ),
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    } else {
                        tracing::debug!(error = %err, "additional upload failure after abort");
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let mut grouped: Vec<Vec<UploadResult>> = fields.iter().map(|_| Vec::new()).collect();
        for (slot, result) in job_slots.into_iter().zip(results) {
            if let Some(result) = result {
                grouped[slot].push(result);
            }
        }

        let mut entries = Vec::new();
        for (field, results) in fields.iter().zip(grouped) {
            if results.is_empty() {
                continue;
            }
            let value = if field.cardinality().is_single() {
                match results.into_iter().next() {
                    Some(result) => UploadedValue::Single(result),
                    None => continue,
                }
            } else {
                UploadedValue::Multiple(results)
            };
            entries.push((field.name().to_owned(), value));
        }

        Ok(UploadOutcome { entries })
    }

    async fn transfer(
        &self,
        ctx: &RequestContext,
        policy: &FieldPolicy,
        file: IncomingFile,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, UploadError> {
        let (meta, source) = file.into_parts();
        tracing::debug!(
            field = %meta.field_name,
            file = %meta.original_name,
            "reading upload"
        );

        let body = match source {
            ByteSource::Memory(bytes) => {
                if let Some(limit) = policy.max_file_size {
                    if bytes.len() as u64 > limit {
                        return Err(UploadError::SizeLimitExceeded {
                            field: meta.field_name,
                            limit,
                        });
                    }
                }
                bytes
            }
            other => {
                let chunks = other
                    .into_chunks()
                    .await
                    .map_err(|source| UploadError::Source {
                        field: meta.field_name.clone(),
                        source,
                    })?;
                read_limited(&meta, chunks, policy.max_file_size).await?
            }
        };

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let key = policy.object_key(ctx, &meta);
        let size = body.len() as u64;
        let location = self
            .backend
            .put(&key, body, Some(meta.content_type.as_ref()))
            .await?;

        Ok(UploadResult {
            field_name: meta.field_name,
            original_name: meta.original_name,
            key,
            location,
            size,
            content_type: meta.content_type,
        })
    }
}

async fn read_limited(
    meta: &FileMeta,
    chunks: ChunkStream,
    limit: Option<u64>,
) -> Result<Bytes, UploadError> {
    let mut limited = SizeLimited::new(chunks, limit);
    let mut buffer = BytesMut::new();
    while let Some(chunk) = limited.next().await {
        match chunk {
            Ok(chunk) => buffer.extend_from_slice(&chunk),
            Err(ReadError::LimitExceeded { limit, received }) => {
                tracing::debug!(
                    field = %meta.field_name,
                    limit,
                    received,
                    "upload aborted at size limit"
                );
                return Err(UploadError::SizeLimitExceeded {
                    field: meta.field_name.clone(),
                    limit,
                });
            }
            Err(ReadError::Io(source)) => {
                return Err(UploadError::Source {
                    field: meta.field_name.clone(),
                    source,
                });
            }
        }
    }
    Ok(buffer.freeze())
}
