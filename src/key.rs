//! Object key derivation.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use uuid::Uuid;

const SEPARATOR: char = '/';

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Joins a prefix and a name with exactly one separator.
pub fn join_key(prefix: Option<&str>, name: &str) -> String {
    let name = name.trim_start_matches(SEPARATOR);
    match prefix.map(|value| value.trim_end_matches(SEPARATOR)) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}{SEPARATOR}{name}"),
        _ => name.to_owned(),
    }
}

/// Default key: `<prefix>/<millis>-<sanitized original name>`.
pub fn timestamped_key(prefix: Option<&str>, original_name: &str) -> String {
    let name = format!("{}-{}", next_timestamp(), sanitize_file_name(original_name));
    join_key(prefix, &name)
}

/// Random uuid file name that keeps the extension of `original_name`.
pub fn random_name(original_name: &str) -> String {
    let id = Uuid::new_v4();
    match extension(original_name) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

/// Millisecond timestamp that strictly increases across calls in this
/// process, so two keys generated in the same millisecond still differ.
pub fn next_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();

    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(observed) => last = observed,
        }
    }
}

/// Reduces a client-supplied file name to a single safe key segment.
pub fn sanitize_file_name(input: &str) -> String {
    let base = input
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .replace("..", "");

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '%' => '_',
            c => c,
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "file".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn extension(name: &str) -> Option<String> {
    std::path::Path::new(&sanitize_file_name(name))
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}
