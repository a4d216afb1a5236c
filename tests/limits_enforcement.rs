#![allow(missing_docs)]

mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use cloudgear::{
    ByteSource, FileMeta, IncomingFile, Intake, Limits, RequestContext, SpoolMode,
    UploadError, UploadField, Uploader,
};
use common::{
    bytes_stream, counting_multipart, counting_stream, entries_in, multipart_body,
    multipart_headers, remove_root, temp_root, RecordingBackend,
};

#[tokio::test]
async fn streaming_file_over_limit_aborts_without_put() {
    let backend = RecordingBackend::new().shared();
    let uploader = Uploader::builder()
        .single("video")
        .max_file_size(4096)
        .backend(backend.clone())
        .build()
        .expect("uploader should build");

    let pulled = Arc::new(AtomicUsize::new(0));
    let file = IncomingFile::from_stream(
        "video",
        "clip.mp4",
        "video/mp4".parse().expect("valid mime"),
        counting_stream(8, 1024, pulled.clone()),
    );

    let err = uploader
        .process(&RequestContext::new(), vec![file])
        .await
        .expect_err("file twice the limit must fail");
    assert!(matches!(
        err,
        UploadError::SizeLimitExceeded { ref field, limit: 4096 } if field == "video"
    ));
    assert_eq!(backend.put_count(), 0);
    // Reading stops at the chunk that crosses the limit.
    assert_eq!(pulled.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn declared_size_over_limit_fails_without_reading() {
    let backend = RecordingBackend::new().shared();
    let uploader = Uploader::builder()
        .single("video")
        .max_file_size(100)
        .backend(backend.clone())
        .build()
        .expect("uploader should build");

    let pulled = Arc::new(AtomicUsize::new(0));
    let meta = FileMeta {
        field_name: "video".to_owned(),
        original_name: "clip.mp4".to_owned(),
        content_type: "video/mp4".parse().expect("valid mime"),
        size: Some(8 * 1024),
    };
    let file = IncomingFile::new(
        meta,
        ByteSource::Stream(counting_stream(8, 1024, pulled.clone())),
    );

    let err = uploader
        .process(&RequestContext::new(), vec![file])
        .await
        .expect_err("declared size is over the limit");
    assert!(matches!(err, UploadError::SizeLimitExceeded { limit: 100, .. }));
    assert_eq!(pulled.load(Ordering::SeqCst), 0);
    assert_eq!(backend.put_count(), 0);
}

#[tokio::test]
async fn field_limit_overrides_global_limit() {
    let backend = RecordingBackend::new().shared();
    let uploader = Uploader::builder()
        .max_file_size(2)
        .field(UploadField::single("big").max_file_size(1024))
        .single("small")
        .backend(backend.clone())
        .build()
        .expect("uploader should build");

    let outcome = uploader
        .process(
            &RequestContext::new(),
            vec![IncomingFile::from_bytes(
                "big",
                "data.bin",
                mime::APPLICATION_OCTET_STREAM,
                vec![0u8; 512],
            )],
        )
        .await
        .expect("field override raises the limit");
    assert!(outcome.location("big").is_some());

    let err = uploader
        .process(
            &RequestContext::new(),
            vec![IncomingFile::from_bytes(
                "small",
                "data.bin",
                mime::APPLICATION_OCTET_STREAM,
                vec![0u8; 3],
            )],
        )
        .await
        .expect_err("global limit still applies elsewhere");
    assert!(matches!(err, UploadError::SizeLimitExceeded { limit: 2, .. }));
}

#[tokio::test]
async fn file_exactly_at_limit_is_accepted() {
    let backend = RecordingBackend::new().shared();
    let uploader = Uploader::builder()
        .single("video")
        .max_file_size(4096)
        .backend(backend.clone())
        .build()
        .expect("uploader should build");

    let pulled = Arc::new(AtomicUsize::new(0));
    let file = IncomingFile::from_stream(
        "video",
        "clip.mp4",
        "video/mp4".parse().expect("valid mime"),
        counting_stream(4, 1024, pulled),
    );
    uploader
        .process(&RequestContext::new(), vec![file])
        .await
        .expect("file at the limit passes");
    assert_eq!(backend.puts()[0].size, 4096);
}

#[tokio::test]
async fn intake_enforces_max_files() {
    let intake = Intake::new(
        SpoolMode::Memory,
        Limits {
            max_files: Some(1),
            ..Limits::default()
        },
    );
    let body = multipart_body(&[
        ("a", Some("a.bin"), Some("application/octet-stream"), "one"),
        ("b", Some("b.bin"), Some("application/octet-stream"), "two"),
    ]);

    let err = intake
        .collect("BOUND", bytes_stream(body))
        .await
        .expect_err("second file exceeds limit");
    assert!(matches!(err, UploadError::PartsLimitExceeded { limit: 1 }));
}

#[tokio::test]
async fn intake_enforces_max_fields() {
    let intake = Intake::new(
        SpoolMode::Memory,
        Limits {
            max_fields: Some(1),
            ..Limits::default()
        },
    );
    let body = multipart_body(&[("a", None, None, "one"), ("b", None, None, "two")]);

    let err = intake
        .collect("BOUND", bytes_stream(body))
        .await
        .expect_err("second field exceeds limit");
    assert!(matches!(err, UploadError::PartsLimitExceeded { limit: 1 }));
}

#[tokio::test]
async fn intake_enforces_max_part_size() {
    let intake = Intake::new(
        SpoolMode::Memory,
        Limits {
            max_part_size: Some(3),
            ..Limits::default()
        },
    );
    let body = multipart_body(&[("upload", Some("a.bin"), None, "hello")]);

    let err = intake
        .collect("BOUND", bytes_stream(body))
        .await
        .expect_err("part exceeds limit");
    assert!(matches!(
        err,
        UploadError::SizeLimitExceeded { ref field, limit: 3 } if field == "upload"
    ));
}

#[tokio::test]
async fn intake_enforces_max_body_size() {
    let intake = Intake::new(
        SpoolMode::Memory,
        Limits {
            max_body_size: Some(16),
            ..Limits::default()
        },
    );
    let body = multipart_body(&[("upload", Some("a.bin"), None, "hello")]);

    let err = intake
        .collect("BOUND", bytes_stream(body))
        .await
        .expect_err("body exceeds limit");
    assert!(matches!(err, UploadError::BodySizeLimitExceeded { limit: 16 }));
}

#[tokio::test]
async fn raw_body_part_over_field_limit_stops_reading() {
    let backend = RecordingBackend::new().shared();
    let uploader = Uploader::builder()
        .single("video")
        .max_file_size(1024)
        .backend(backend.clone())
        .build()
        .expect("uploader should build");

    let pulled = Arc::new(AtomicUsize::new(0));
    let body = counting_multipart("video", "clip.mp4", 64, 1024, pulled.clone());

    let err = uploader
        .handle(&multipart_headers(), body)
        .await
        .expect_err("part over the field limit must fail");
    assert!(matches!(
        err,
        UploadError::SizeLimitExceeded { ref field, limit: 1024 } if field == "video"
    ));
    assert_eq!(backend.put_count(), 0);
    // Framing chunk plus the two body chunks that cross 1 KiB.
    assert_eq!(pulled.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn raw_body_field_override_raises_intake_ceiling() {
    let backend = RecordingBackend::new().shared();
    let uploader = Uploader::builder()
        .max_file_size(1024)
        .field(UploadField::single("video").max_file_size(8 * 1024))
        .backend(backend.clone())
        .build()
        .expect("uploader should build");

    let pulled = Arc::new(AtomicUsize::new(0));
    let body = counting_multipart("video", "clip.mp4", 4, 1024, pulled);

    let outcome = uploader
        .handle(&multipart_headers(), body)
        .await
        .expect("field override admits the part");
    assert!(outcome.location("video").is_some());
    assert_eq!(backend.puts()[0].size, 4096);
}

#[tokio::test]
async fn disk_spool_stops_at_field_limit_and_leaves_nothing() {
    let root = temp_root();
    let backend = RecordingBackend::new().shared();
    let uploader = Uploader::builder()
        .single("video")
        .max_file_size(1024)
        .spool(SpoolMode::Disk(root.clone()))
        .backend(backend.clone())
        .build()
        .expect("uploader should build");

    let pulled = Arc::new(AtomicUsize::new(0));
    let body = counting_multipart("video", "clip.mp4", 64, 1024, pulled.clone());

    let err = uploader
        .handle(&multipart_headers(), body)
        .await
        .expect_err("part over the field limit must fail");
    assert!(matches!(err, UploadError::SizeLimitExceeded { limit: 1024, .. }));
    assert_eq!(pulled.load(Ordering::SeqCst), 3);
    assert_eq!(backend.put_count(), 0);
    assert_eq!(entries_in(&root).await, 0);

    remove_root(root).await;
}
