//! Field policy model and resolution.
//!
//! A [`FieldPolicy`] is used twice: as the global default rule set and as
//! the sparse per-field override. [`resolve`] overlays the override onto
//! the defaults property by property.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{key, FileMeta, RequestContext, ValidationError};

/// Outcome of a content filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Upload the file.
    Accept,
    /// Drop the file silently; the request continues.
    Skip,
    /// Abort the request with a validation error.
    Reject(String),
}

type KeyFn = dyn Fn(&RequestContext, &FileMeta) -> String + Send + Sync;
type FilterFn = dyn Fn(&RequestContext, &FileMeta) -> FilterDecision + Send + Sync;

/// Produces the object key for a file.
#[derive(Clone)]
pub struct KeyGenerator(Arc<KeyFn>);

impl KeyGenerator {
    /// Wraps a key function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RequestContext, &FileMeta) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Random uuid keys that keep the original extension.
    pub fn random() -> Self {
        Self::new(|_, meta| key::random_name(&meta.original_name))
    }

    /// Computes the key for `meta`.
    pub fn generate(&self, ctx: &RequestContext, meta: &FileMeta) -> String {
        (self.0)(ctx, meta)
    }
}

impl fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyGenerator(..)")
    }
}

impl PartialEq for KeyGenerator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Decides whether a file is uploaded.
#[derive(Clone)]
pub struct ContentFilter(Arc<FilterFn>);

impl ContentFilter {
    /// Wraps a filter function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&RequestContext, &FileMeta) -> FilterDecision + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Applies the filter to `meta`.
    pub fn check(&self, ctx: &RequestContext, meta: &FileMeta) -> FilterDecision {
        (self.0)(ctx, meta)
    }
}

impl fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentFilter(..)")
    }
}

impl PartialEq for ContentFilter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Validation and key rules for a field.
///
/// Every property is optional; an absent property means no restriction
/// (or the default key scheme).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPolicy {
    /// Accepted extensions, lowercase and without the leading dot.
    pub allowed_extensions: Option<Vec<String>>,
    /// Maximum file size in bytes.
    pub max_file_size: Option<u64>,
    /// Key prefix for generated keys.
    pub destination: Option<String>,
    /// Custom key generator.
    pub key_generator: Option<KeyGenerator>,
    /// Custom content filter.
    pub content_filter: Option<ContentFilter>,
}

impl FieldPolicy {
    /// Creates an unrestricted policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts accepted extensions. Accepts `"jpg"` or `".JPG"` forms.
    pub fn with_allowed_extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        self.allowed_extensions = Some(
            extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        );
        self
    }

    /// Sets the size limit in bytes.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Sets the key prefix.
    pub fn with_destination(mut self, prefix: impl Into<String>) -> Self {
        self.destination = Some(prefix.into());
        self
    }

    /// Sets a custom key generator.
    pub fn with_key_generator(mut self, generator: KeyGenerator) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// Sets a content filter.
    pub fn with_content_filter(mut self, filter: ContentFilter) -> Self {
        self.content_filter = Some(filter);
        self
    }

    /// Overlays every property present in `overrides` onto `self`.
    pub fn overlay(mut self, overrides: &FieldPolicy) -> Self {
        if let Some(extensions) = &overrides.allowed_extensions {
            self.allowed_extensions = Some(extensions.clone());
        }
        if let Some(bytes) = overrides.max_file_size {
            self.max_file_size = Some(bytes);
        }
        if let Some(prefix) = &overrides.destination {
            self.destination = Some(prefix.clone());
        }
        if let Some(generator) = &overrides.key_generator {
            self.key_generator = Some(generator.clone());
        }
        if let Some(filter) = &overrides.content_filter {
            self.content_filter = Some(filter.clone());
        }
        self
    }

    /// Checks the extension of `meta.original_name` against the allow-list.
    pub fn check_extension(&self, meta: &FileMeta) -> Result<(), ValidationError> {
        let Some(allowed) = &self.allowed_extensions else {
            return Ok(());
        };

        let accepted = meta
            .extension()
            .is_some_and(|ext| allowed.iter().any(|candidate| *candidate == ext));
        if accepted {
            Ok(())
        } else {
            Err(ValidationError::ExtensionNotAllowed {
                field: meta.field_name.clone(),
                file_name: meta.original_name.clone(),
                allowed: allowed.iter().map(|ext| format!(".{ext}")).collect(),
            })
        }
    }

    /// Applies the content filter, accepting when none is set.
    pub fn filter(&self, ctx: &RequestContext, meta: &FileMeta) -> FilterDecision {
        match &self.content_filter {
            Some(filter) => filter.check(ctx, meta),
            None => FilterDecision::Accept,
        }
    }

    /// Computes the object key for `meta`.
    pub fn object_key(&self, ctx: &RequestContext, meta: &FileMeta) -> String {
        match &self.key_generator {
            Some(generator) => generator.generate(ctx, meta),
            None => key::timestamped_key(self.destination.as_deref(), &meta.original_name),
        }
    }
}

/// Computes the effective policy of `field_name`.
///
/// Starts from `defaults` and overlays each property present in the
/// field's override. Pure and deterministic.
pub fn resolve(
    field_name: &str,
    defaults: &FieldPolicy,
    overrides: &HashMap<String, FieldPolicy>,
) -> FieldPolicy {
    match overrides.get(field_name) {
        Some(field_overrides) => defaults.clone().overlay(field_overrides),
        None => defaults.clone(),
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> FileMeta {
        FileMeta {
            field_name: "avatar".to_owned(),
            original_name: name.to_owned(),
            content_type: mime::APPLICATION_OCTET_STREAM,
            size: None,
        }
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let policy = FieldPolicy::new().with_allowed_extensions([".jpg", "PNG"]);
        assert!(policy.check_extension(&meta("me.JPG")).is_ok());
        assert!(policy.check_extension(&meta("me.png")).is_ok());
    }

    #[test]
    fn missing_extension_fails_allow_list() {
        let policy = FieldPolicy::new().with_allowed_extensions(["jpg"]);
        let err = policy
            .check_extension(&meta("README"))
            .expect_err("no extension must fail");
        assert!(matches!(
            err,
            ValidationError::ExtensionNotAllowed { ref allowed, .. }
                if allowed == &vec![".jpg".to_owned()]
        ));
    }

    #[test]
    fn no_allow_list_accepts_anything() {
        assert!(FieldPolicy::new().check_extension(&meta("tool.exe")).is_ok());
    }

    #[test]
    fn resolve_without_override_returns_defaults() {
        let defaults = FieldPolicy::new()
            .with_allowed_extensions(["png"])
            .with_max_file_size(512)
            .with_destination("media")
            .with_key_generator(KeyGenerator::random())
            .with_content_filter(ContentFilter::new(|_, _| FilterDecision::Accept));
        let mut overrides = HashMap::new();
        overrides.insert(
            "documents".to_owned(),
            FieldPolicy::new().with_max_file_size(1),
        );

        assert_eq!(resolve("avatar", &defaults, &overrides), defaults);
        assert_eq!(resolve("avatar", &defaults, &HashMap::new()), defaults);
        assert_eq!(
            resolve("documents", &defaults, &overrides).max_file_size,
            Some(1)
        );
    }

    #[test]
    fn overlay_keeps_properties_the_override_omits() {
        let defaults = FieldPolicy::new()
            .with_allowed_extensions(["pdf"])
            .with_max_file_size(10)
            .with_destination("docs");
        let merged = defaults
            .clone()
            .overlay(&FieldPolicy::new().with_max_file_size(99));

        assert_eq!(merged.allowed_extensions, defaults.allowed_extensions);
        assert_eq!(merged.destination.as_deref(), Some("docs"));
        assert_eq!(merged.max_file_size, Some(99));
    }
}
