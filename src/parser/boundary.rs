use crate::error::ParseError;

/// Longest boundary RFC 2046 allows.
const MAX_BOUNDARY_LEN: usize = 70;

/// Extracts and validates the `boundary` parameter from a `Content-Type` value.
pub fn extract_multipart_boundary(content_type: &str) -> Result<String, ParseError> {
    let mime: mime::Mime = content_type
        .parse()
        .map_err(|_| ParseError::new("invalid Content-Type header"))?;

    if mime.type_() != mime::MULTIPART || mime.subtype() != mime::FORM_DATA {
        return Err(ParseError::new("Content-Type must be multipart/form-data"));
    }

    let boundary = mime
        .get_param(mime::BOUNDARY)
        .ok_or_else(|| ParseError::new("missing multipart boundary parameter"))?;
    check_boundary(boundary.as_str())?;
    Ok(boundary.as_str().to_owned())
}

/// Rejects boundaries a conforming client could not have produced.
pub(crate) fn check_boundary(boundary: &str) -> Result<(), ParseError> {
    let problem = if boundary.is_empty() {
        "multipart boundary cannot be empty"
    } else if boundary.len() > MAX_BOUNDARY_LEN {
        "multipart boundary cannot exceed 70 characters"
    } else if boundary.ends_with(' ') {
        "multipart boundary cannot end with whitespace"
    } else if !boundary.bytes().all(is_bchar) {
        "multipart boundary contains invalid characters"
    } else {
        return Ok(());
    };
    Err(ParseError::new(problem))
}

fn is_bchar(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"'()+_,-./:=? ".contains(&byte)
}
