//! Raw multipart intake.
//!
//! [`Intake`] turns a `multipart/form-data` body into [`IncomingFile`]s and
//! text fields. File parts are staged in memory or spooled to disk chunk by
//! chunk, under the size ceiling of their field, so an oversized part stops
//! the read as soon as it crosses the ceiling. A failed intake removes
//! whatever it already spooled before returning.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::{header, HeaderMap};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{
    cleanup::{CleanupCoordinator, TempArtifact},
    limits::Limits,
    parser::{MultipartStream, ParsedPartHeaders, PartEvent},
    IncomingFile, ParseError, UploadError,
};

/// Where file parts are staged while a raw body is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum SpoolMode {
    /// Keep part bodies in memory.
    #[default]
    Memory,
    /// Write each file part to `<dir>/<uuid>.part`.
    Disk(PathBuf),
}

/// Files and text fields read from one multipart body.
#[derive(Debug, Default)]
pub struct CollectedParts {
    /// File parts, in arrival order.
    pub files: Vec<IncomingFile>,
    /// Text parts, in arrival order.
    pub text_fields: Vec<(String, String)>,
}

/// Reads a multipart body into staged files.
#[derive(Debug, Clone, Default)]
pub struct Intake {
    spool: SpoolMode,
    limits: Limits,
    file_ceilings: HashMap<String, u64>,
    default_file_ceiling: Option<u64>,
}

impl Intake {
    /// Creates an intake with the given staging mode and limits.
    pub fn new(spool: SpoolMode, limits: Limits) -> Self {
        Self {
            spool,
            limits,
            ..Self::default()
        }
    }

    /// Caps file parts of `field` at `bytes` while they are read.
    pub fn with_file_ceiling(mut self, field: impl Into<String>, bytes: u64) -> Self {
        self.file_ceilings.insert(field.into(), bytes);
        self
    }

    /// Caps file parts of every field without a ceiling of its own.
    pub fn with_default_file_ceiling(mut self, bytes: Option<u64>) -> Self {
        self.default_file_ceiling = bytes;
        self
    }

    /// Byte ceiling applied to a part while it streams in.
    fn ceiling_for(&self, headers: &ParsedPartHeaders) -> Option<u64> {
        let field = if headers.is_file() {
            self.file_ceilings
                .get(&headers.field_name)
                .copied()
                .or(self.default_file_ceiling)
        } else {
            None
        };
        match (field, self.limits.max_part_size) {
            (Some(field), Some(part)) => Some(field.min(part)),
            (field, part) => field.or(part),
        }
    }

    /// Parses `body` and stages every file part.
    pub async fn collect<S>(
        &self,
        boundary: impl Into<String>,
        body: S,
    ) -> Result<CollectedParts, UploadError>
    where
        S: Stream<Item = Result<Bytes, ParseError>> + Unpin,
    {
        let mut events =
            MultipartStream::new(boundary, body)?.with_max_body_size(self.limits.max_body_size);
        let mut collected = CollectedParts::default();
        let mut open = None;

        if let Err(err) = self.read_parts(&mut events, &mut collected, &mut open).await {
            let mut cleanup = CleanupCoordinator::new();
            if let Some(part) = open {
                if let Some(artifact) = part.artifact() {
                    cleanup.track(artifact);
                }
            }
            for file in &collected.files {
                if let Some(artifact) = file.artifact() {
                    cleanup.track(artifact.clone());
                }
            }
            cleanup.sweep().await;
            return Err(err);
        }

        tracing::debug!(
            files = collected.files.len(),
            fields = collected.text_fields.len(),
            body_bytes = events.received(),
            "multipart body collected"
        );
        Ok(collected)
    }

    async fn read_parts<S>(
        &self,
        events: &mut MultipartStream<S>,
        collected: &mut CollectedParts,
        open: &mut Option<OpenPart>,
    ) -> Result<(), UploadError>
    where
        S: Stream<Item = Result<Bytes, ParseError>> + Unpin,
    {
        while let Some(event) = events.next().await {
            match event? {
                PartEvent::Headers(headers) => {
                    if headers.is_unselected_file() {
                        tracing::debug!(
                            field = %headers.field_name,
                            "skipping empty file input"
                        );
                        *open = None;
                        continue;
                    }
                    self.check_counts(&headers, collected)?;
                    *open = Some(self.open_part(headers).await?);
                }
                PartEvent::Data(chunk) => {
                    if let Some(part) = open.as_mut() {
                        part.write(chunk).await?;
                    }
                }
                PartEvent::End => {
                    if let Some(part) = open.take() {
                        match part.finish().await? {
                            Staged::File(file) => collected.files.push(file),
                            Staged::Text(name, value) => collected.text_fields.push((name, value)),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_counts(
        &self,
        headers: &ParsedPartHeaders,
        collected: &CollectedParts,
    ) -> Result<(), UploadError> {
        let (limit, seen) = if headers.is_file() {
            (self.limits.max_files, collected.files.len())
        } else {
            (self.limits.max_fields, collected.text_fields.len())
        };
        match limit {
            Some(limit) if seen >= limit => Err(UploadError::PartsLimitExceeded { limit }),
            _ => Ok(()),
        }
    }

    async fn open_part(&self, headers: ParsedPartHeaders) -> Result<OpenPart, UploadError> {
        let ceiling = self.ceiling_for(&headers);
        let sink = match (&self.spool, headers.is_file()) {
            (SpoolMode::Disk(dir), true) => {
                let path = dir.join(format!("{}.part", Uuid::new_v4()));
                let file = create_spool(dir, &path)
                    .await
                    .map_err(|source| UploadError::Source {
                        field: headers.field_name.clone(),
                        source,
                    })?;
                Sink::Disk { path, file }
            }
            _ => Sink::Memory(BytesMut::new()),
        };

        Ok(OpenPart {
            headers,
            ceiling,
            received: 0,
            sink,
        })
    }
}

async fn create_spool(dir: &Path, path: &Path) -> io::Result<tokio::fs::File> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::File::create(path).await
}

enum Staged {
    File(IncomingFile),
    Text(String, String),
}

enum Sink {
    Memory(BytesMut),
    Disk {
        path: PathBuf,
        file: tokio::fs::File,
    },
}

/// A part whose body is still arriving.
struct OpenPart {
    headers: ParsedPartHeaders,
    ceiling: Option<u64>,
    received: u64,
    sink: Sink,
}

impl OpenPart {
    async fn write(&mut self, chunk: Bytes) -> Result<(), UploadError> {
        self.received = self.received.saturating_add(chunk.len() as u64);
        if let Some(limit) = self.ceiling {
            if self.received > limit {
                tracing::debug!(
                    field = %self.headers.field_name,
                    limit,
                    received = self.received,
                    "multipart part aborted at size limit"
                );
                return Err(UploadError::SizeLimitExceeded {
                    field: self.headers.field_name.clone(),
                    limit,
                });
            }
        }

        match &mut self.sink {
            Sink::Memory(buffer) => buffer.extend_from_slice(&chunk),
            Sink::Disk { file, .. } => {
                file.write_all(&chunk)
                    .await
                    .map_err(|source| UploadError::Source {
                        field: self.headers.field_name.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Spool file to remove if the part never completes.
    fn artifact(&self) -> Option<TempArtifact> {
        match &self.sink {
            Sink::Disk { path, .. } => Some(TempArtifact::Disk(path.clone())),
            Sink::Memory(_) => None,
        }
    }

    async fn finish(self) -> Result<Staged, UploadError> {
        let Self {
            headers,
            received,
            sink,
            ..
        } = self;

        if !headers.is_file() {
            let Sink::Memory(buffer) = sink else {
                return Err(ParseError::new("text part was spooled to disk").into());
            };
            let value = String::from_utf8(buffer.to_vec()).map_err(|_| {
                ParseError::new(format!("text field `{}` must be UTF-8", headers.field_name))
            })?;
            return Ok(Staged::Text(headers.field_name, value));
        }

        let file_name = headers.file_name.unwrap_or_default();
        let file = match sink {
            Sink::Memory(buffer) => IncomingFile::from_bytes(
                headers.field_name,
                file_name,
                headers.content_type,
                buffer.freeze(),
            )
            .with_artifact(TempArtifact::Memory { size: received }),
            Sink::Disk { path, mut file } => {
                if let Err(source) = file.flush().await {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(UploadError::Source {
                        field: headers.field_name,
                        source,
                    });
                }
                tracing::debug!(
                    field = %headers.field_name,
                    path = %path.display(),
                    size_bytes = received,
                    "spooled file part to disk"
                );
                IncomingFile::from_path(
                    headers.field_name,
                    file_name,
                    headers.content_type,
                    path.clone(),
                    Some(received),
                )
                .with_artifact(TempArtifact::Disk(path))
            }
        };
        Ok(Staged::File(file))
    }
}

/// Extracts the raw `Content-Type` header value.
pub fn content_type_from_headers(headers: &HeaderMap) -> Result<&str, ParseError> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .ok_or_else(|| ParseError::new("missing Content-Type header"))?;
    value
        .to_str()
        .map_err(|_| ParseError::new("Content-Type header must be ASCII"))
}
