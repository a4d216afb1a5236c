use std::{fmt, io, path::PathBuf};

use bytes::Bytes;
use futures::{stream, stream::BoxStream, StreamExt};
use tokio_util::io::ReaderStream;

use crate::{cleanup::TempArtifact, FileMeta};

/// Chunked byte stream handed to the pipeline.
pub type ChunkStream = BoxStream<'static, io::Result<Bytes>>;

/// Where the bytes of an incoming file come from.
pub enum ByteSource {
    /// Chunks arriving from a live stream.
    Stream(ChunkStream),
    /// A buffer already held in memory.
    Memory(Bytes),
    /// A file on the local filesystem.
    Path(PathBuf),
}

impl ByteSource {
    /// Opens the source as a chunk stream.
    pub async fn into_chunks(self) -> io::Result<ChunkStream> {
        match self {
            Self::Stream(chunks) => Ok(chunks),
            Self::Memory(bytes) => Ok(stream::once(async move { Ok(bytes) }).boxed()),
            Self::Path(path) => {
                let file = tokio::fs::File::open(&path).await?;
                Ok(ReaderStream::new(file).boxed())
            }
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Memory(bytes) => f.debug_tuple("Memory").field(&bytes.len()).finish(),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// One uploaded file of one request.
#[derive(Debug)]
pub struct IncomingFile {
    meta: FileMeta,
    source: ByteSource,
    artifact: Option<TempArtifact>,
}

impl IncomingFile {
    /// Creates a file from explicit parts.
    pub fn new(meta: FileMeta, source: ByteSource) -> Self {
        Self {
            meta,
            source,
            artifact: None,
        }
    }

    /// Creates a memory-backed file; its size is known up front.
    pub fn from_bytes(
        field_name: impl Into<String>,
        original_name: impl Into<String>,
        content_type: mime::Mime,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        let meta = FileMeta {
            field_name: field_name.into(),
            original_name: original_name.into(),
            content_type,
            size: Some(bytes.len() as u64),
        };
        Self::new(meta, ByteSource::Memory(bytes))
    }

    /// Creates a stream-backed file of unknown size.
    pub fn from_stream(
        field_name: impl Into<String>,
        original_name: impl Into<String>,
        content_type: mime::Mime,
        chunks: ChunkStream,
    ) -> Self {
        let meta = FileMeta {
            field_name: field_name.into(),
            original_name: original_name.into(),
            content_type,
            size: None,
        };
        Self::new(meta, ByteSource::Stream(chunks))
    }

    /// Creates a file read from `path`.
    pub fn from_path(
        field_name: impl Into<String>,
        original_name: impl Into<String>,
        content_type: mime::Mime,
        path: impl Into<PathBuf>,
        size: Option<u64>,
    ) -> Self {
        let meta = FileMeta {
            field_name: field_name.into(),
            original_name: original_name.into(),
            content_type,
            size,
        };
        Self::new(meta, ByteSource::Path(path.into()))
    }

    /// Attaches a temporary artifact the pipeline must release.
    pub fn with_artifact(mut self, artifact: TempArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// File metadata.
    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    /// Multipart field name.
    pub fn field_name(&self) -> &str {
        &self.meta.field_name
    }

    /// Temporary artifact owned by this file, if any.
    pub fn artifact(&self) -> Option<&TempArtifact> {
        self.artifact.as_ref()
    }

    pub(crate) fn take_artifact(&mut self) -> Option<TempArtifact> {
        self.artifact.take()
    }

    /// Splits the file into its metadata and byte source.
    pub fn into_parts(self) -> (FileMeta, ByteSource) {
        (self.meta, self.source)
    }
}
