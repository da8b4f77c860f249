//! Structured views of message and part headers

use super::address::{parse_email_user, parse_email_users};
use super::content_type::HeaderContentType;
use super::headers::{Headers, RawHeaders};
use crate::diagnostics::Observer;
use getmail_common::{EmailUser, Error, Result};
use serde::Serialize;

/// Top-level message headers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MimeHeaders {
    #[serde(rename = "MIME-Version", skip_serializing_if = "String::is_empty")]
    pub mime_version: String,

    #[serde(rename = "Date", skip_serializing_if = "String::is_empty")]
    pub date: String,

    #[serde(rename = "Subject", skip_serializing_if = "String::is_empty")]
    pub subject: String,

    #[serde(rename = "From", skip_serializing_if = "EmailUser::is_empty")]
    pub from: EmailUser,

    #[serde(rename = "To", skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<EmailUser>,

    #[serde(rename = "Cc", skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<EmailUser>,

    #[serde(rename = "Content-Type", skip_serializing_if = "HeaderContentType::is_empty")]
    pub content_type: HeaderContentType,

    #[serde(
        rename = "Content-Transfer-Encoding",
        skip_serializing_if = "String::is_empty"
    )]
    pub content_transfer_encoding: String,

    /// Every header without a dedicated field
    #[serde(rename = "Extra", skip_serializing_if = "Headers::is_empty")]
    pub extra: Headers,
}

/// Headers of a single body part
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailContentHeader {
    #[serde(rename = "MIME-Version", skip_serializing_if = "String::is_empty")]
    pub mime_version: String,

    #[serde(rename = "Content-Type", skip_serializing_if = "HeaderContentType::is_empty")]
    pub content_type: HeaderContentType,

    #[serde(
        rename = "Content-Transfer-Encoding",
        skip_serializing_if = "String::is_empty"
    )]
    pub content_transfer_encoding: String,

    #[serde(rename = "Extra", skip_serializing_if = "Headers::is_empty")]
    pub extra: Headers,
}

impl EmailContentHeader {
    pub fn is_empty(&self) -> bool {
        self.mime_version.is_empty()
            && self.content_type.is_empty()
            && self.content_transfer_encoding.is_empty()
            && self.extra.is_empty()
    }
}

/// Parse a part's header block.
///
/// Never fails: a malformed `Content-Type` is reported and left empty.
pub fn parse_content_header(raw: &RawHeaders, observer: &dyn Observer) -> EmailContentHeader {
    let mut headers = EmailContentHeader::default();

    for (name, values) in raw.iter() {
        let value = values.join("; ");
        let value = value.trim();

        match name.as_str() {
            "Content-Transfer-Encoding" => headers.content_transfer_encoding = value.to_string(),
            "Content-Type" => match HeaderContentType::parse(value, observer) {
                Ok(ct) => headers.content_type = ct,
                Err(_) => observer.info(
                    "parse_content_header",
                    &format!("Skipping malformed Content-Type header: {}", value),
                ),
            },
            "Mime-Version" => headers.mime_version = value.to_string(),
            _ => headers.extra.insert(name, value),
        }
    }

    headers
}

/// Parse the top-level header block.
///
/// Fails when `From`, `To` or `Cc` cannot be parsed. A malformed
/// `Content-Type` is reported and left empty.
pub fn parse_mime_headers(raw: &RawHeaders, observer: &dyn Observer) -> Result<MimeHeaders> {
    let mut headers = MimeHeaders::default();

    for (name, values) in raw.iter() {
        let value = values.join("; ");
        let value = value.trim();

        match name.as_str() {
            "Mime-Version" => headers.mime_version = value.to_string(),
            "Date" => headers.date = value.to_string(),
            "Subject" => headers.subject = value.to_string(),
            "From" => {
                headers.from = parse_email_user(value)
                    .map_err(|e| Error::Header(format!("error parsing From header: {}", e)))?;
            }
            "To" => {
                headers.to = parse_email_users(value)
                    .map_err(|e| Error::Header(format!("error parsing To header: {}", e)))?;
            }
            "Cc" => {
                headers.cc = parse_email_users(value)
                    .map_err(|e| Error::Header(format!("error parsing Cc header: {}", e)))?;
            }
            "Content-Transfer-Encoding" => headers.content_transfer_encoding = value.to_string(),
            "Content-Type" => match HeaderContentType::parse(value, observer) {
                Ok(ct) => headers.content_type = ct,
                Err(_) => observer.info(
                    "parse_mime_headers",
                    &format!("Skipping malformed Content-Type header: {}", value),
                ),
            },
            _ => headers.extra.insert(name, value),
        }
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingObserver;
    use pretty_assertions::assert_eq;

    fn raw(pairs: &[(&str, &str)]) -> RawHeaders {
        let mut raw = RawHeaders::new();
        for (name, value) in pairs {
            raw.add(name, *value);
        }
        raw
    }

    #[test]
    fn test_parse_mime_headers() {
        let observer = RecordingObserver::new();
        let raw = raw(&[
            ("MIME-Version", "1.0"),
            ("Subject", "Quarterly report"),
            ("From", "\"Jane Doe\" <jane@x.com>"),
            ("To", "bob@y.org, Carol <carol@z.net>"),
            ("Cc", "<dave@x.com>"),
            ("Content-Type", "text/plain; charset=utf-8"),
            ("X-Mailer", "test"),
        ]);

        let headers = parse_mime_headers(&raw, &observer).unwrap();

        assert_eq!(headers.mime_version, "1.0");
        assert_eq!(headers.subject, "Quarterly report");
        assert_eq!(headers.from, EmailUser::new("Jane Doe", "jane@x.com"));
        assert_eq!(
            headers.to,
            vec![
                EmailUser::new("", "bob@y.org"),
                EmailUser::new("Carol", "carol@z.net"),
            ]
        );
        assert_eq!(headers.cc, vec![EmailUser::new("", "dave@x.com")]);
        assert!(headers.content_type.is("text", "plain"));
        assert_eq!(headers.extra.value("X-Mailer"), "test");
        assert_eq!(headers.extra.len(), 1);
    }

    #[test]
    fn test_bad_from_fails() {
        let observer = RecordingObserver::new();
        let err = parse_mime_headers(&raw(&[("From", "nobody")]), &observer).unwrap_err();
        assert_eq!(err.code(), "HEADER_ERROR");
        assert!(err.to_string().contains("From"));
    }

    #[test]
    fn test_bad_cc_fails() {
        let observer = RecordingObserver::new();
        let raw = raw(&[("From", "a@x.com"), ("Cc", "b@x.com, not an address")]);
        assert!(parse_mime_headers(&raw, &observer).is_err());
    }

    #[test]
    fn test_malformed_content_type_is_skipped() {
        let observer = RecordingObserver::new();
        let raw = raw(&[("Content-Type", "garbage"), ("Subject", "hi")]);

        let headers = parse_mime_headers(&raw, &observer).unwrap();

        assert!(headers.content_type.is_empty());
        assert!(observer.contains("Skipping malformed Content-Type"));
    }

    #[test]
    fn test_parse_content_header() {
        let observer = RecordingObserver::new();
        let raw = raw(&[
            ("content-type", "application/pdf; name=\"report.pdf\""),
            ("content-transfer-encoding", "base64"),
            ("Content-Disposition", "attachment; filename=\"report.pdf\""),
        ]);

        let headers = parse_content_header(&raw, &observer);

        assert!(headers.content_type.is("application", "pdf"));
        assert_eq!(headers.content_type.param("name"), Some("report.pdf"));
        assert_eq!(headers.content_transfer_encoding, "base64");
        assert_eq!(
            headers.extra.param("Content-Disposition", "filename"),
            Some("report.pdf")
        );
        assert!(parse_content_header(&RawHeaders::new(), &observer).is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let observer = RecordingObserver::new();
        let raw = raw(&[
            ("MIME-Version", "1.0"),
            ("From", "jane@x.com"),
            ("Content-Type", "text/plain"),
        ]);

        let json = serde_json::to_value(parse_mime_headers(&raw, &observer).unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "MIME-Version": "1.0",
                "From": { "Email": "jane@x.com" },
                "Content-Type": { "Media-Type": "text", "Sub-Type": "plain" },
            })
        );
    }
}
