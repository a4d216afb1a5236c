use http::HeaderMap;

/// Request data visible to key generators and content filters.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    text_fields: Vec<(String, String)>,
}

impl RequestContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context carrying the request headers.
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            text_fields: Vec::new(),
        }
    }

    /// Adds a non-file form field.
    pub fn push_text_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.text_fields.push((name.into(), value.into()));
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of the first text field called `name`.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.text_fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// All text fields, in arrival order.
    pub fn text_fields(&self) -> &[(String, String)] {
        &self.text_fields
    }
}

/// Metadata of an uploaded file, as seen by policy callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Multipart field name.
    pub field_name: String,
    /// File name supplied by the client.
    pub original_name: String,
    /// Declared content type.
    pub content_type: mime::Mime,
    /// Declared or observed size, when known up front.
    pub size: Option<u64>,
}

impl FileMeta {
    /// Lowercased extension of the original name, without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}
