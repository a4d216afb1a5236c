#![allow(missing_docs)]

use bytes::Bytes;
use cloudgear::{
    parser::{
        boundary::extract_multipart_boundary, MultipartStream, ParsedPartHeaders, PartEvent,
    },
    ParseError, UploadError,
};
use futures::{channel::mpsc, stream, StreamExt};

#[test]
fn extracts_boundary_from_content_type() {
    let boundary = extract_multipart_boundary("multipart/form-data; boundary=abc123")
        .expect("boundary should parse");
    assert_eq!(boundary, "abc123");
}

#[test]
fn extracts_quoted_boundary() {
    let boundary = extract_multipart_boundary("multipart/form-data; boundary=\"my-boundary\"")
        .expect("quoted boundary should parse");
    assert_eq!(boundary, "my-boundary");
}

#[test]
fn rejects_non_multipart_content_type() {
    let err = extract_multipart_boundary("application/json").expect_err("must fail");
    assert_err_contains(&err.to_string(), "multipart/form-data");
}

#[test]
fn rejects_missing_boundary_parameter() {
    let err = extract_multipart_boundary("multipart/form-data").expect_err("must fail");
    assert_err_contains(&err.to_string(), "missing multipart boundary");
}

#[test]
fn rejects_invalid_boundary_characters() {
    let err = extract_multipart_boundary("multipart/form-data; boundary=abc@123")
        .expect_err("must fail");
    assert_err_contains(&err.to_string(), "invalid");
}

#[test]
fn rejects_boundary_that_is_too_long() {
    let long_boundary = "a".repeat(71);
    let header = format!("multipart/form-data; boundary={long_boundary}");
    let err = extract_multipart_boundary(&header).expect_err("must fail");
    assert_err_contains(&err.to_string(), "cannot exceed 70");
}

#[tokio::test]
async fn parses_parts_split_across_chunks() {
    let body = b"--BOUND\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--BOUND\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello world\r\n--BOUND--\r\n";
    let (tx, rx) = mpsc::unbounded::<Result<Bytes, ParseError>>();
    for chunk in body.chunks(7) {
        tx.unbounded_send(Ok(Bytes::copy_from_slice(chunk)))
            .expect("send chunk");
    }
    drop(tx);

    let events = collect_events(MultipartStream::new("BOUND", rx).expect("valid boundary")).await;
    let parts = assemble(events.into_iter().map(|event| event.expect("event")));

    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].0.field_name, "note");
    assert!(!parts[0].0.is_file());
    assert_eq!(parts[0].1, b"hi");
    assert_eq!(parts[1].0.file_name.as_deref(), Some("a.txt"));
    assert_eq!(parts[1].0.content_type, mime::TEXT_PLAIN);
    assert_eq!(parts[1].1, b"hello world");
}

#[tokio::test]
async fn part_body_is_released_before_the_part_ends() {
    let head = b"--BOUND\r\nContent-Disposition: form-data; name=\"f\"; filename=\"big.bin\"\r\n\r\n";
    let chunks: [Result<Bytes, ParseError>; 3] = [
        Ok(Bytes::from_static(head)),
        Ok(Bytes::from(vec![b'x'; 4096])),
        Ok(Bytes::from(vec![b'x'; 4096])),
    ];
    let mut events = MultipartStream::new("BOUND", stream::iter(chunks)).expect("valid boundary");

    assert!(matches!(events.next().await, Some(Ok(PartEvent::Headers(_)))));
    let Some(Ok(PartEvent::Data(data))) = events.next().await else {
        panic!("expected body bytes before the closing delimiter");
    };
    assert!(!data.is_empty());
    assert!(events.received() <= (head.len() + 4096) as u64);
}

#[tokio::test]
async fn truncated_body_is_a_parse_error() {
    let body = b"--BOUND\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi".to_vec();
    let events = collect_events(
        MultipartStream::new("BOUND", stream::iter([Ok(Bytes::from(body))]))
            .expect("valid boundary"),
    )
    .await;

    assert!(matches!(
        events.last(),
        Some(Err(UploadError::Parse(err))) if err.to_string().contains("closing boundary")
    ));
}

#[tokio::test]
async fn missing_content_disposition_is_rejected() {
    let body = b"--BOUND\r\nContent-Type: text/plain\r\n\r\nhi\r\n--BOUND--\r\n".to_vec();
    let events = collect_events(
        MultipartStream::new("BOUND", stream::iter([Ok(Bytes::from(body))]))
            .expect("valid boundary"),
    )
    .await;

    let err = events[0].as_ref().expect_err("must fail");
    assert_err_contains(&err.to_string(), "Content-Disposition");
}

#[tokio::test]
async fn body_size_limit_stops_the_read() {
    let body = b"--BOUND\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--BOUND--\r\n";
    let chunks: Vec<Result<Bytes, ParseError>> = body
        .chunks(16)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    let events = collect_events(
        MultipartStream::new("BOUND", stream::iter(chunks))
            .expect("valid boundary")
            .with_max_body_size(Some(32)),
    )
    .await;

    assert!(matches!(
        events.last(),
        Some(Err(UploadError::BodySizeLimitExceeded { limit: 32 }))
    ));
}

async fn collect_events<S>(mut events: MultipartStream<S>) -> Vec<Result<PartEvent, UploadError>>
where
    S: futures::Stream<Item = Result<Bytes, ParseError>> + Unpin,
{
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event);
    }
    out
}

fn assemble(events: impl Iterator<Item = PartEvent>) -> Vec<(ParsedPartHeaders, Vec<u8>)> {
    let mut parts = Vec::new();
    for event in events {
        match event {
            PartEvent::Headers(headers) => parts.push((headers, Vec::new())),
            PartEvent::Data(data) => {
                if let Some((_, body)) = parts.last_mut() {
                    body.extend_from_slice(&data);
                }
            }
            PartEvent::End => {}
        }
    }
    parts
}

fn assert_err_contains(actual: &str, expected_fragment: &str) {
    assert!(
        actual.contains(expected_fragment),
        "expected `{actual}` to contain `{expected_fragment}`"
    );
}
