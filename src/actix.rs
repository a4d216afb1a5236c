//! Actix integration helpers.

use actix_web::{
    error::PayloadError,
    http::header,
    web::{self, Bytes},
    HttpMessage, HttpRequest,
};
use futures::{Stream, StreamExt};

use crate::{ParseError, UploadError, UploadOutcome, Uploader};

/// Actix body stream mapped into parser chunk errors.
pub type ActixBodyStream<S> =
    futures::stream::Map<S, fn(Result<Bytes, PayloadError>) -> Result<Bytes, ParseError>>;

/// Extracts the raw `Content-Type` header from an Actix request.
pub fn content_type_from_request(request: &HttpRequest) -> Result<&str, ParseError> {
    let value = request
        .headers()
        .get(header::CONTENT_TYPE)
        .ok_or_else(|| ParseError::new("missing Content-Type header"))?;
    value
        .to_str()
        .map_err(|_| ParseError::new("Content-Type header must be ASCII"))
}

/// Maps an Actix payload stream into the stream shape expected by the parser.
pub fn map_payload_stream<S>(stream: S) -> ActixBodyStream<S>
where
    S: Stream<Item = Result<Bytes, PayloadError>>,
{
    stream.map(actix_item_to_chunk as fn(_) -> _)
}

/// Copies every request header into an [`http::HeaderMap`].
///
/// Actix carries its own `http` types, so names and values are converted
/// byte for byte. Headers that fail conversion are dropped.
pub fn request_headers(request: &HttpRequest) -> http::HeaderMap {
    let mut headers = http::HeaderMap::with_capacity(request.headers().len());
    for (name, value) in request.headers() {
        let name = http::HeaderName::from_bytes(name.as_str().as_bytes());
        let value = http::HeaderValue::from_bytes(value.as_bytes());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!("skipping request header that does not convert"),
        }
    }
    headers
}

/// Runs the upload pipeline over an Actix request payload.
///
/// Key generators and filters see the full request headers.
pub async fn upload_from_request(
    uploader: &Uploader,
    request: &HttpRequest,
    payload: web::Payload,
) -> Result<UploadOutcome, UploadError> {
    content_type_from_request(request)?;
    uploader
        .handle(&request_headers(request), map_payload_stream(payload))
        .await
}

/// Stores `outcome` in request extensions for later handlers.
pub fn attach_outcome(request: &HttpRequest, outcome: UploadOutcome) {
    request.extensions_mut().insert(outcome);
}

fn actix_item_to_chunk(item: Result<Bytes, PayloadError>) -> Result<Bytes, ParseError> {
    item.map_err(|err| ParseError::new(format!("actix body stream error: {err}")))
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn request_headers_keeps_every_header() {
        let request = TestRequest::default()
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=B"))
            .insert_header(("x-tenant", "acme"))
            .insert_header((header::AUTHORIZATION, "Bearer t"))
            .to_http_request();

        let headers = request_headers(&request);

        assert_eq!(headers.len(), 3);
        assert_eq!(
            headers.get("x-tenant").and_then(|v| v.to_str().ok()),
            Some("acme")
        );
        assert_eq!(
            headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("multipart/form-data; boundary=B")
        );
    }
}
