use crate::FieldPolicy;

/// How many files a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one file; results are scalar.
    Single,
    /// Up to `max_count` files; results are sequences.
    Bounded(usize),
    /// Any number of files; results are sequences.
    Unbounded,
}

impl Cardinality {
    /// Maximum number of files accepted, if bounded.
    pub fn max_count(&self) -> Option<usize> {
        match self {
            Self::Single => Some(1),
            Self::Bounded(max_count) => Some(*max_count),
            Self::Unbounded => None,
        }
    }

    /// Returns `true` when results for the field are reported as a scalar.
    ///
    /// A bounded field with `max_count == 1` is singular.
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single | Self::Bounded(1))
    }
}

/// One named upload slot of a route.
///
/// Declared once per route and reused across requests.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadField {
    name: String,
    cardinality: Cardinality,
    overrides: FieldPolicy,
}

impl UploadField {
    /// Declares a field with explicit cardinality.
    pub fn new(name: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            cardinality,
            overrides: FieldPolicy::default(),
        }
    }

    /// Declares a field accepting one file.
    pub fn single(name: impl Into<String>) -> Self {
        Self::new(name, Cardinality::Single)
    }

    /// Declares a field accepting up to `max_count` files.
    pub fn array(name: impl Into<String>, max_count: usize) -> Self {
        Self::new(name, Cardinality::Bounded(max_count))
    }

    /// Declares a field accepting any number of files.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, Cardinality::Unbounded)
    }

    /// Replaces the per-field policy overrides.
    pub fn with_policy(mut self, overrides: FieldPolicy) -> Self {
        self.overrides = overrides;
        self
    }

    /// Overrides the allowed extensions for this field.
    pub fn allowed_extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        self.overrides = self.overrides.with_allowed_extensions(extensions);
        self
    }

    /// Overrides the size limit for this field.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.overrides = self.overrides.with_max_file_size(bytes);
        self
    }

    /// Overrides the key prefix for this field.
    pub fn destination(mut self, prefix: impl Into<String>) -> Self {
        self.overrides = self.overrides.with_destination(prefix);
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field cardinality.
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Per-field policy overrides.
    pub fn overrides(&self) -> &FieldPolicy {
        &self.overrides
    }
}
