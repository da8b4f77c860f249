//! getmail Core - inbound mail parsing and verification
//!
//! Turns the raw bytes of a received message into a structured [`Email`]:
//! header normalization, address and content-type parsing, transfer
//! decoding, multipart traversal, body classification and on-demand SPF
//! verification. The [`smtp`] module plugs all of it into `mailin-embedded`.

pub mod diagnostics;
pub mod email;
pub mod email_auth;
pub mod id;
pub mod mime;
pub mod smtp;

pub use diagnostics::{tracing_observer, Observer, RecordingObserver, TracingObserver};
pub use email::{Email, EmailContent, EmailListener};
pub use email_auth::{DnsTxtLookup, SpfRecord, SpfResolver, StaticTxtLookup, TxtLookup};
pub use id::UuidV7;
pub use mime::{EmailContentHeader, HeaderContentType, Headers, MessageParser, MimeHeaders};
pub use smtp::{Session, SmtpHandler, SmtpServer};
