//! Axum integration helpers.

use axum::{
    body::Bytes,
    http::{Extensions, HeaderMap},
};
use futures::{Stream, StreamExt};

use crate::{ParseError, UploadError, UploadOutcome, Uploader};

pub use crate::multipart::content_type_from_headers;

/// Axum body stream mapped into parser chunk errors.
pub type AxumBodyStream<S> =
    futures::stream::Map<S, fn(Result<Bytes, axum::Error>) -> Result<Bytes, ParseError>>;

/// Maps an Axum body stream into the stream shape expected by the parser.
pub fn map_body_stream<S>(stream: S) -> AxumBodyStream<S>
where
    S: Stream<Item = Result<Bytes, axum::Error>>,
{
    stream.map(axum_item_to_chunk as fn(_) -> _)
}

/// Runs the upload pipeline over an Axum request body.
pub async fn upload_from_request<B>(
    uploader: &Uploader,
    headers: &HeaderMap,
    body: B,
) -> Result<UploadOutcome, UploadError>
where
    B: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    uploader.handle(headers, map_body_stream(body)).await
}

/// Stores `outcome` in request extensions for later handlers.
pub fn attach_outcome(extensions: &mut Extensions, outcome: UploadOutcome) {
    extensions.insert(outcome);
}

fn axum_item_to_chunk(item: Result<Bytes, axum::Error>) -> Result<Bytes, ParseError> {
    item.map_err(|err| ParseError::new(format!("axum body stream error: {err}")))
}
