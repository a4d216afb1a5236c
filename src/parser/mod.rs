/// Multipart boundary parsing helpers.
pub mod boundary;
/// Multipart part header parsing helpers.
pub mod headers;
/// Event-based streaming multipart reader.
pub mod stream;

pub use boundary::extract_multipart_boundary;
pub use headers::{
    parse_content_disposition, parse_part_content_type, parse_part_headers, ContentDisposition,
    ParsedPartHeaders,
};
pub use stream::{MultipartStream, PartEvent};
