//! MIME message parsing
//!
//! Header block reading and normalization, address and content-type parsing,
//! transfer decoding, multipart traversal and body classification.

pub mod address;
pub mod content_type;
pub mod decode;
pub mod fields;
pub mod headers;
pub mod multipart;
pub mod parser;

pub use address::{parse_email_user, parse_email_users};
pub use content_type::HeaderContentType;
pub use decode::{decode_data, TransferEncoding};
pub use fields::{parse_content_header, parse_mime_headers, EmailContentHeader, MimeHeaders};
pub use headers::{canonical_header_key, read_header_block, Headers, RawHeaders};
pub use multipart::{MultipartWalker, Part};
pub use parser::{MessageParser, ParsedBody};
