//! Incremental `multipart/form-data` reader.
//!
//! [`MultipartStream`] turns a chunked request body into [`PartEvent`]s:
//! the headers of a part, its body as it arrives, then the end of the
//! part. Body bytes are released as soon as they can no longer be the
//! start of a delimiter, so at most one delimiter length of a part is
//! held back at any time.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{
    parser::{
        boundary::check_boundary,
        headers::{parse_part_headers, ParsedPartHeaders},
    },
    ParseError, UploadError,
};

/// Largest header block accepted for one part.
const MAX_HEADER_BLOCK: usize = 16 * 1024;

/// One step through a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartEvent {
    /// A new part starts.
    Headers(ParsedPartHeaders),
    /// Body bytes of the current part, in order.
    Data(Bytes),
    /// The current part is complete.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preamble,
    Headers,
    Body,
    Closed,
}

enum Step {
    Event(PartEvent),
    NeedMore,
    Finished,
}

/// Streaming multipart reader over a chunked body.
///
/// Only pulls from the body when the buffered bytes cannot produce the
/// next event, so a consumer that stops polling stops the read.
#[derive(Debug)]
pub struct MultipartStream<S> {
    body: S,
    pending: BytesMut,
    dash_boundary: Bytes,
    delimiter: Bytes,
    phase: Phase,
    max_body_size: Option<u64>,
    received: u64,
    exhausted: bool,
    failed: bool,
}

impl<S> MultipartStream<S> {
    /// Creates a reader for parts separated by `boundary`.
    pub fn new(boundary: impl Into<String>, body: S) -> Result<Self, ParseError> {
        let boundary = boundary.into();
        check_boundary(&boundary)?;

        Ok(Self {
            body,
            pending: BytesMut::new(),
            dash_boundary: Bytes::from(format!("--{boundary}")),
            delimiter: Bytes::from(format!("\r\n--{boundary}")),
            phase: Phase::Preamble,
            max_body_size: None,
            received: 0,
            exhausted: false,
            failed: false,
        })
    }

    /// Fails the stream once more than `limit` body bytes were received.
    pub fn with_max_body_size(mut self, limit: Option<u64>) -> Self {
        self.max_body_size = limit;
        self
    }

    /// Body bytes pulled from the underlying stream so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    fn fail(&mut self, err: UploadError) -> Poll<Option<Result<PartEvent, UploadError>>> {
        self.failed = true;
        self.phase = Phase::Closed;
        Poll::Ready(Some(Err(err)))
    }

    fn step(&mut self) -> Result<Step, ParseError> {
        loop {
            match self.phase {
                Phase::Preamble => {
                    let Some(eol) = find(&self.pending, b"\r\n") else {
                        if self.pending.len() > MAX_HEADER_BLOCK {
                            return Err(ParseError::new("missing opening boundary"));
                        }
                        return Ok(Step::NeedMore);
                    };
                    let line = self.pending.split_to(eol + 2);
                    let line = line[..eol].trim_ascii_end();
                    match line.strip_prefix(&self.dash_boundary[..]) {
                        Some(b"") => self.phase = Phase::Headers,
                        Some(b"--") => self.phase = Phase::Closed,
                        // Anything before the first boundary is preamble.
                        _ => {}
                    }
                }
                Phase::Headers => {
                    if self.pending.starts_with(b"\r\n") {
                        return Err(ParseError::new("missing Content-Disposition header"));
                    }
                    let Some(end) = find(&self.pending, b"\r\n\r\n") else {
                        if self.pending.len() > MAX_HEADER_BLOCK {
                            return Err(ParseError::new("part header block is too large"));
                        }
                        return Ok(Step::NeedMore);
                    };
                    let block = self.pending.split_to(end + 4);
                    let headers = parse_part_headers(&header_map(&block[..end])?)?;
                    self.phase = Phase::Body;
                    return Ok(Step::Event(PartEvent::Headers(headers)));
                }
                Phase::Body => return self.body_step(),
                Phase::Closed => return Ok(Step::Finished),
            }
        }
    }

    fn body_step(&mut self) -> Result<Step, ParseError> {
        match find(&self.pending, &self.delimiter) {
            Some(0) => {
                let after = self.delimiter.len();
                let suffix = &self.pending[after..];
                if suffix.starts_with(b"--") {
                    // The epilogue after the closing delimiter is ignored.
                    self.pending.clear();
                    self.phase = Phase::Closed;
                } else if let Some(eol) = find(suffix, b"\r\n") {
                    if !is_padding(&suffix[..eol]) {
                        return Err(ParseError::new("malformed multipart boundary"));
                    }
                    self.pending.advance(after + eol + 2);
                    self.phase = Phase::Headers;
                } else if suffix == b"-" || is_padding(suffix.strip_suffix(b"\r").unwrap_or(suffix))
                {
                    return Ok(Step::NeedMore);
                } else {
                    return Err(ParseError::new("malformed multipart boundary"));
                }
                Ok(Step::Event(PartEvent::End))
            }
            Some(split) => Ok(Step::Event(PartEvent::Data(
                self.pending.split_to(split).freeze(),
            ))),
            None => {
                let held = self.delimiter.len() - 1;
                if self.pending.len() > held {
                    let ready = self.pending.len() - held;
                    Ok(Step::Event(PartEvent::Data(
                        self.pending.split_to(ready).freeze(),
                    )))
                } else {
                    Ok(Step::NeedMore)
                }
            }
        }
    }
}

impl<S> Stream for MultipartStream<S>
where
    S: Stream<Item = Result<Bytes, ParseError>> + Unpin,
{
    type Item = Result<PartEvent, UploadError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.failed {
            return Poll::Ready(None);
        }

        loop {
            match this.step() {
                Ok(Step::Event(event)) => return Poll::Ready(Some(Ok(event))),
                Ok(Step::Finished) => return Poll::Ready(None),
                Ok(Step::NeedMore) => {}
                Err(err) => return this.fail(err.into()),
            }

            if this.exhausted {
                return this.fail(
                    ParseError::new("multipart body ended before the closing boundary").into(),
                );
            }

            match Pin::new(&mut this.body).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.received = this.received.saturating_add(chunk.len() as u64);
                    if let Some(limit) = this.max_body_size {
                        if this.received > limit {
                            return this.fail(UploadError::BodySizeLimitExceeded { limit });
                        }
                    }
                    this.pending.extend_from_slice(&chunk);
                }
                Poll::Ready(Some(Err(err))) => return this.fail(err.into()),
                Poll::Ready(None) => this.exhausted = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn header_map(block: &[u8]) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::new();
    for line in block.split(|byte| *byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let colon = line
            .iter()
            .position(|byte| *byte == b':')
            .ok_or_else(|| ParseError::new("invalid part header line"))?;
        let name = HeaderName::from_bytes(line[..colon].trim_ascii())
            .map_err(|_| ParseError::new("invalid part header name"))?;
        let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii())
            .map_err(|_| ParseError::new("invalid part header value"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn is_padding(bytes: &[u8]) -> bool {
    bytes.iter().all(|byte| matches!(byte, b' ' | b'\t'))
}
