#![allow(dead_code)]

use std::{
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use cloudgear::{
    BackendError, CancellationToken, ChunkStream, Operation, ParseError, Provider,
    StorageBackend,
};
use futures::{stream, StreamExt};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutCall {
    pub key: String,
    pub size: usize,
    pub content_type: Option<String>,
}

/// Backend double that records every write.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    puts: Mutex<Vec<PutCall>>,
    fail_when_key_contains: Option<String>,
    slow_when_key_contains: Option<(String, Duration)>,
    cancel_on_put: Option<CancellationToken>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.fail_when_key_contains = Some(fragment.to_owned());
        self
    }

    pub fn slow_on(mut self, fragment: &str, delay: Duration) -> Self {
        self.slow_when_key_contains = Some((fragment.to_owned(), delay));
        self
    }

    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_put = Some(token);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn puts(&self) -> Vec<PutCall> {
        self.puts.lock().expect("lock puts").clone()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().expect("lock puts").len()
    }
}

#[async_trait::async_trait]
impl StorageBackend for RecordingBackend {
    fn provider(&self) -> Provider {
        Provider::Memory
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<String, BackendError> {
        if let Some((fragment, delay)) = &self.slow_when_key_contains {
            if key.contains(fragment.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        if let Some(fragment) = &self.fail_when_key_contains {
            if key.contains(fragment.as_str()) {
                return Err(BackendError::failed(
                    Provider::Memory,
                    Operation::Put,
                    key,
                    io::Error::new(io::ErrorKind::Other, "simulated outage"),
                ));
            }
        }

        self.puts.lock().expect("lock puts").push(PutCall {
            key: key.to_owned(),
            size: body.len(),
            content_type: content_type.map(ToOwned::to_owned),
        });
        if let Some(token) = &self.cancel_on_put {
            token.cancel();
        }
        Ok(self.location_of(key))
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut puts = self.puts.lock().expect("lock puts");
        let before = puts.len();
        puts.retain(|call| call.key != key);
        if puts.len() == before {
            return Err(BackendError::NotFound {
                provider: Provider::Memory,
                key: key.to_owned(),
            });
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self
            .puts
            .lock()
            .expect("lock puts")
            .iter()
            .any(|call| call.key == key))
    }

    fn location_of(&self, key: &str) -> String {
        format!("mock://uploads/{key}")
    }
}

/// Stream of `chunks` chunks of `chunk_size` bytes; `pulled` counts chunks
/// actually read.
pub fn counting_stream(chunks: usize, chunk_size: usize, pulled: Arc<AtomicUsize>) -> ChunkStream {
    stream::iter(0..chunks)
        .map(move |_| {
            pulled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(Bytes::from(vec![b'x'; chunk_size]))
        })
        .boxed()
}

pub fn multipart_body(parts: &[(&str, Option<&str>, Option<&str>, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, file_name, content_type, body) in parts {
        out.extend_from_slice(b"--BOUND\r\n");
        let disposition = match file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
            ),
            None => format!("Content-Disposition: form-data; name=\"{name}\"\r\n"),
        };
        out.extend_from_slice(disposition.as_bytes());
        if let Some(content_type) = content_type {
            out.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"--BOUND--\r\n");
    out
}

pub fn bytes_stream(
    body: Vec<u8>,
) -> impl futures::Stream<Item = Result<Bytes, ParseError>> + Unpin {
    stream::iter([Ok(Bytes::from(body))])
}

pub fn multipart_headers() -> http::HeaderMap {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("multipart/form-data; boundary=BOUND"),
    );
    headers
}

pub fn temp_root() -> PathBuf {
    std::env::temp_dir().join(format!("cloudgear-test-{}", Uuid::new_v4()))
}

pub async fn remove_root(root: PathBuf) {
    let _ = tokio::fs::remove_dir_all(root).await;
}

pub async fn entries_in(root: &PathBuf) -> usize {
    let Ok(mut dir) = tokio::fs::read_dir(root).await else {
        return 0;
    };
    let mut count = 0;
    while let Ok(Some(_)) = dir.next_entry().await {
        count += 1;
    }
    count
}

/// Multipart body carrying one file part of `chunks` chunks of `chunk_size`
/// bytes, each chunk its own stream item. `pulled` counts items read,
/// including the framing chunks.
pub fn counting_multipart(
    field: &str,
    file_name: &str,
    chunks: usize,
    chunk_size: usize,
    pulled: Arc<AtomicUsize>,
) -> impl futures::Stream<Item = Result<Bytes, ParseError>> + Unpin {
    let head = format!(
        "--BOUND\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\r\n"
    );
    let mut items = vec![Bytes::from(head)];
    items.extend((0..chunks).map(|_| Bytes::from(vec![b'x'; chunk_size])));
    items.push(Bytes::from_static(b"\r\n--BOUND--\r\n"));

    stream::iter(items).map(move |chunk| {
        pulled.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ParseError>(chunk)
    })
}
