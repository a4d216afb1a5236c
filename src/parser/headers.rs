use http::{header, HeaderMap, HeaderValue};
use percent_encoding::percent_decode_str;

use crate::ParseError;

/// Parsed `Content-Disposition` of one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Form field name.
    pub name: String,
    /// Client file name, present for file parts.
    ///
    /// An RFC 5987 `filename*` parameter takes precedence over `filename`.
    pub filename: Option<String>,
}

/// Headers of one multipart part, reduced to what intake needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPartHeaders {
    /// Form field name.
    pub field_name: String,
    /// Client file name, present for file parts.
    pub file_name: Option<String>,
    /// Declared part content type.
    pub content_type: mime::Mime,
    /// Raw part headers.
    pub headers: HeaderMap,
}

impl ParsedPartHeaders {
    /// Returns `true` for file parts.
    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }

    /// Returns `true` for a file input submitted without a file.
    ///
    /// Browsers send these as `filename=""` with an empty body.
    pub fn is_unselected_file(&self) -> bool {
        self.file_name.as_deref() == Some("")
    }
}

/// Parses a `Content-Disposition: form-data` value.
pub fn parse_content_disposition(value: &str) -> Result<ContentDisposition, ParseError> {
    let mut segments = split_params(value).into_iter();
    let kind = segments
        .next()
        .map(|segment| segment.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if kind != "form-data" {
        return Err(ParseError::new("Content-Disposition must be form-data"));
    }

    let mut name = None;
    let mut filename = None;
    let mut extended_filename = None;
    for segment in segments {
        let Some((key, raw)) = segment.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(unquote(raw.trim())?),
            "filename" => filename = Some(unquote(raw.trim())?),
            "filename*" => extended_filename = decode_ext_value(raw.trim()),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| ParseError::new("Content-Disposition is missing a name"))?;
    Ok(ContentDisposition {
        name,
        filename: extended_filename.or(filename),
    })
}

/// Parses a part `Content-Type`, defaulting by part kind when absent.
pub fn parse_part_content_type(
    value: Option<&HeaderValue>,
    is_file: bool,
) -> Result<mime::Mime, ParseError> {
    let Some(value) = value else {
        return Ok(if is_file {
            mime::APPLICATION_OCTET_STREAM
        } else {
            mime::TEXT_PLAIN
        });
    };

    value
        .to_str()
        .map_err(|_| ParseError::new("part Content-Type must be ASCII"))?
        .parse::<mime::Mime>()
        .map_err(|_| ParseError::new("invalid part Content-Type"))
}

/// Extracts field name, file name and content type from part headers.
pub fn parse_part_headers(headers: &HeaderMap) -> Result<ParsedPartHeaders, ParseError> {
    let disposition = headers
        .get(header::CONTENT_DISPOSITION)
        .ok_or_else(|| ParseError::new("missing Content-Disposition header"))?
        .to_str()
        .map_err(|_| ParseError::new("Content-Disposition must be ASCII"))?;
    let disposition = parse_content_disposition(disposition)?;
    let content_type = parse_part_content_type(
        headers.get(header::CONTENT_TYPE),
        disposition.filename.is_some(),
    )?;

    Ok(ParsedPartHeaders {
        field_name: disposition.name,
        file_name: disposition.filename,
        content_type,
        headers: headers.clone(),
    })
}

fn split_params(value: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (index, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                segments.push(&value[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    segments.push(&value[start..]);
    segments
}

/// Decodes an RFC 5987 `charset'language'value`. Only UTF-8 is supported;
/// anything else falls back to the plain `filename` parameter.
fn decode_ext_value(raw: &str) -> Option<String> {
    let mut pieces = raw.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

fn unquote(raw: &str) -> Result<String, ParseError> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Ok(raw.to_owned());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| ParseError::new("unterminated quoted parameter"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}
