//! Error types for getmail

use thiserror::Error;

/// Main error type for getmail
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unparseable address: {0}")]
    Address(String),

    #[error("Domain '{0}' is not a trusted domain")]
    UntrustedDomain(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Header error: {0}")]
    Header(String),

    #[error("Invalid content type: {0}")]
    ContentType(String),

    #[error("Multipart content type missing boundary parameter")]
    MissingBoundary,

    #[error("Unhandled singlepart content type: {0}")]
    UnsupportedBody(String),

    #[error("Multipart error: {0}")]
    Multipart(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("SPF error: {0}")]
    Spf(String),

    #[error("Email listener failed: {0}")]
    Listener(String),

    #[error("Message exceeds maximum size of {0} bytes")]
    MessageTooLarge(usize),

    #[error("Too many recipients (maximum {0})")]
    TooManyRecipients(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for getmail
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the SMTP reply code used when this error ends a command
    pub fn smtp_code(&self) -> u16 {
        match self {
            Error::Address(_) => 501,
            Error::UntrustedDomain(_) => 550,
            Error::TooManyRecipients(_) => 452,
            Error::MessageTooLarge(_) => 552,
            Error::MalformedMessage(_)
            | Error::Header(_)
            | Error::ContentType(_)
            | Error::MissingBoundary
            | Error::UnsupportedBody(_)
            | Error::Multipart(_)
            | Error::Decode(_) => 554,
            Error::Dns(_)
            | Error::Spf(_)
            | Error::Listener(_)
            | Error::Config(_)
            | Error::Internal(_)
            | Error::Other(_) => 451,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Address(_) => "ADDRESS_ERROR",
            Error::UntrustedDomain(_) => "UNTRUSTED_DOMAIN",
            Error::MalformedMessage(_) => "MALFORMED_MESSAGE",
            Error::Header(_) => "HEADER_ERROR",
            Error::ContentType(_) => "CONTENT_TYPE_ERROR",
            Error::MissingBoundary => "MISSING_BOUNDARY",
            Error::UnsupportedBody(_) => "UNSUPPORTED_BODY",
            Error::Multipart(_) => "MULTIPART_ERROR",
            Error::Decode(_) => "DECODE_ERROR",
            Error::Dns(_) => "DNS_ERROR",
            Error::Spf(_) => "SPF_ERROR",
            Error::Listener(_) => "LISTENER_ERROR",
            Error::MessageTooLarge(_) => "MESSAGE_TOO_LARGE",
            Error::TooManyRecipients(_) => "TOO_MANY_RECIPIENTS",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error rejects a single message rather than the session
    pub fn is_message_fatal(&self) -> bool {
        self.smtp_code() == 554
    }
}
