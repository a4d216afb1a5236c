use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use pin_project::pin_project;

/// Limits applied while reading a raw multipart body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct Limits {
    /// Maximum request body size in bytes.
    pub max_body_size: Option<u64>,
    /// Maximum size of any single part in bytes.
    pub max_part_size: Option<u64>,
    /// Maximum number of file parts.
    pub max_files: Option<usize>,
    /// Maximum number of text parts.
    pub max_fields: Option<usize>,
}

/// Error yielded by [`SizeLimited`].
#[derive(Debug)]
pub enum ReadError {
    /// The wrapped stream failed.
    Io(io::Error),
    /// The running total passed the limit.
    LimitExceeded {
        /// Configured limit.
        limit: u64,
        /// Bytes seen when the limit was crossed.
        received: u64,
    },
}

/// Chunk stream adapter enforcing a byte ceiling as chunks arrive.
///
/// The first chunk that pushes the running total past the limit is not
/// yielded; the stream reports [`ReadError::LimitExceeded`] and ends,
/// leaving the rest of the inner stream unread.
#[pin_project]
#[derive(Debug)]
pub struct SizeLimited<S> {
    #[pin]
    inner: S,
    limit: Option<u64>,
    received: u64,
    done: bool,
}

impl<S> SizeLimited<S> {
    /// Wraps `inner`; `None` disables the ceiling.
    pub fn new(inner: S, limit: Option<u64>) -> Self {
        Self {
            inner,
            limit,
            received: 0,
            done: false,
        }
    }

    /// Bytes accepted so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

impl<S> Stream for SizeLimited<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = Result<Bytes, ReadError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let next = this.received.saturating_add(chunk.len() as u64);
                if let Some(limit) = *this.limit {
                    if next > limit {
                        *this.done = true;
                        return Poll::Ready(Some(Err(ReadError::LimitExceeded {
                            limit,
                            received: next,
                        })));
                    }
                }
                *this.received = next;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                *this.done = true;
                Poll::Ready(Some(Err(ReadError::Io(err))))
            }
            Poll::Ready(None) => {
                *this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt};

    use super::*;

    fn chunks(sizes: &[usize]) -> impl Stream<Item = io::Result<Bytes>> {
        let items: Vec<io::Result<Bytes>> = sizes
            .iter()
            .map(|size| Ok(Bytes::from(vec![0u8; *size])))
            .collect();
        stream::iter(items)
    }

    #[tokio::test]
    async fn passes_through_under_limit() {
        let mut limited = SizeLimited::new(chunks(&[4, 4]), Some(8));
        while let Some(item) = limited.next().await {
            item.expect("chunk under limit");
        }
        assert_eq!(limited.received(), 8);
    }

    #[tokio::test]
    async fn stops_on_first_chunk_over_limit() {
        let mut limited = SizeLimited::new(chunks(&[4, 4, 4, 4]), Some(6));
        assert!(limited.next().await.expect("first chunk").is_ok());
        let err = limited.next().await.expect("second item");
        assert!(matches!(
            err,
            Err(ReadError::LimitExceeded {
                limit: 6,
                received: 8
            })
        ));
        assert!(limited.next().await.is_none());
    }
}
