//! Raw message to [`Email`]

use super::content_type::HeaderContentType;
use super::decode::decode_data;
use super::fields::{parse_content_header, parse_mime_headers, EmailContentHeader, MimeHeaders};
use super::headers::{read_header_block, RawHeaders};
use super::multipart::MultipartWalker;
use crate::diagnostics::Observer;
use crate::email::{Email, EmailContent};
use getmail_common::{Error, Result};
use std::sync::Arc;

/// Classified body of a message
#[derive(Debug, Default)]
pub struct ParsedBody {
    pub text: Option<EmailContent>,
    pub html: Option<EmailContent>,
    pub attachments: Vec<EmailContent>,
}

/// Parses raw messages, reporting recoverable problems to an [`Observer`]
#[derive(Clone)]
pub struct MessageParser {
    observer: Arc<dyn Observer>,
}

impl MessageParser {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    pub fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    /// Parse a complete message.
    ///
    /// Fails when the input has no header block, when `From`, `To` or `Cc`
    /// cannot be parsed, or when the body cannot be classified.
    pub fn parse_email(&self, raw: &[u8]) -> Result<Email> {
        if raw.is_empty() {
            return Err(Error::MalformedMessage("empty message".to_string()));
        }

        let (raw_headers, body_offset) = read_header_block(raw, self.observer());
        if raw_headers.is_empty() {
            return Err(Error::MalformedMessage("message has no header block".to_string()));
        }
        let body = &raw[body_offset..];

        let headers = self.parse_mime_headers(&raw_headers)?;
        let parsed = self.parse_body(&headers.content_type, body)?;

        let mut email = Email::new()?;
        email.from = headers.from.clone();
        email.rcpt_to = headers.cc.iter().chain(headers.to.iter()).cloned().collect();
        email.subject = headers.subject.clone();
        email.headers = headers;
        email.raw = raw.to_vec();
        email.body = body.to_vec();
        email.body_text = parsed.text;
        email.body_html = parsed.html;
        email.attachments = parsed.attachments;

        Ok(email)
    }

    pub fn parse_mime_headers(&self, raw: &RawHeaders) -> Result<MimeHeaders> {
        parse_mime_headers(raw, self.observer())
    }

    pub fn parse_content_header(&self, raw: &RawHeaders) -> EmailContentHeader {
        parse_content_header(raw, self.observer())
    }

    /// Classify a body under its top-level content type.
    ///
    /// A singlepart body must be `text/plain` or `text/html`; a missing or
    /// malformed type is refused like any other.
    pub fn parse_body(&self, content_type: &HeaderContentType, body: &[u8]) -> Result<ParsedBody> {
        if content_type.is_multipart() {
            let boundary = content_type
                .param("boundary")
                .filter(|b| !b.is_empty())
                .ok_or(Error::MissingBoundary)?;
            return Ok(self.parse_multipart(body, boundary));
        }

        let mut parsed = ParsedBody::default();
        let content = EmailContent::new(body.to_vec(), EmailContentHeader::default());

        if content_type.is("text", "plain") {
            parsed.text = Some(content);
        } else if content_type.is("text", "html") {
            parsed.html = Some(content);
        } else {
            let mime_type = content_type.mime_type();
            self.observer.info(
                "parse_body",
                &format!("Unhandled singlepart content type: {}", mime_type),
            );
            return Err(Error::UnsupportedBody(mime_type));
        }

        Ok(parsed)
    }

    fn parse_multipart(&self, body: &[u8], boundary: &str) -> ParsedBody {
        let mut parsed = ParsedBody::default();

        for item in MultipartWalker::new(body, boundary, self.observer()) {
            let part = match item {
                Ok(part) => part,
                Err(e) => {
                    self.observer
                        .info("parse_body", &format!("error iterating multipart: {}", e));
                    break;
                }
            };

            if part.headers.is_empty() {
                self.observer
                    .info("parse_body", "skipping part with empty headers");
                continue;
            }

            let headers = self.parse_content_header(&part.headers);

            let data = if headers.content_transfer_encoding.is_empty() {
                part.body.to_vec()
            } else {
                match decode_data(part.body, &headers.content_transfer_encoding, self.observer()) {
                    Ok(data) => data,
                    Err(e) => {
                        self.observer
                            .info("parse_body", &format!("error decoding part data: {}", e));
                        continue;
                    }
                }
            };

            let is_text = headers.content_type.is("text", "plain");
            let is_html = headers.content_type.is("text", "html");
            let content = EmailContent::new(data, headers);

            if is_text {
                parsed.text = Some(content);
            } else if is_html {
                parsed.html = Some(content);
            } else {
                parsed.attachments.push(content);
            }
        }

        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingObserver;
    use getmail_common::EmailUser;
    use pretty_assertions::assert_eq;

    fn parser() -> (MessageParser, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        (MessageParser::new(observer.clone()), observer)
    }

    #[test]
    fn test_singlepart_plain() {
        let (parser, _) = parser();
        let raw = b"From: a@x.com\r\nTo: b@y.com\r\nSubject: Hi\r\nContent-Type: text/plain\r\n\r\nhello";

        let email = parser.parse_email(raw).unwrap();

        assert_eq!(email.from, EmailUser::new("", "a@x.com"));
        assert_eq!(email.rcpt_to, vec![EmailUser::new("", "b@y.com")]);
        assert_eq!(email.subject, "Hi");

        let text = email.body_text.as_ref().unwrap();
        assert_eq!(text.as_bytes(), b"hello");
        assert_eq!(text.size, 5);
        assert!(text.headers.is_empty());
        assert!(email.body_html.is_none());
        assert!(email.attachments.is_empty());
        assert_eq!(email.raw, raw.to_vec());
        assert_eq!(email.body, b"hello");
    }

    #[test]
    fn test_singlepart_is_not_decoded() {
        let (parser, _) = parser();
        let raw = b"From: a@x.com\r\nContent-Type: text/html\r\nContent-Transfer-Encoding: base64\r\n\r\nPGI+aGk8L2I+";

        let email = parser.parse_email(raw).unwrap();

        assert_eq!(email.body_html.unwrap().as_bytes(), b"PGI+aGk8L2I+");
    }

    #[test]
    fn test_missing_or_malformed_content_type_fails() {
        let (parser, observer) = parser();

        let missing = parser.parse_email(b"From: a@x.com\r\n\r\nbody").unwrap_err();
        assert_eq!(missing.code(), "UNSUPPORTED_BODY");
        assert!(observer.contains("Unhandled singlepart content type: /"));

        let malformed = parser
            .parse_email(b"From: a@x.com\r\nContent-Type: garbage\r\n\r\nbody")
            .unwrap_err();
        assert_eq!(malformed.code(), "UNSUPPORTED_BODY");
    }

    #[test]
    fn test_multipart_classification() {
        let (parser, _) = parser();
        let raw = b"From: \"Jane\" <jane@x.com>\r\n\
To: bob@y.com\r\n\
Cc: carol@z.com\r\n\
Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
hi\r\n\
--XYZ\r\n\
Content-Type: text/html\r\n\
\r\n\
<b>hi</b>\r\n\
--XYZ\r\n\
Content-Type: application/pdf\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Disposition: attachment; filename=\"r.pdf\"\r\n\
\r\n\
JVBERi0=\r\n\
--XYZ--\r\n";

        let email = parser.parse_email(raw).unwrap();

        assert_eq!(email.body_text.as_ref().unwrap().as_bytes(), b"hi");
        assert_eq!(email.body_html.as_ref().unwrap().as_bytes(), b"<b>hi</b>");
        assert_eq!(email.attachments.len(), 1);

        let pdf = &email.attachments[0];
        assert_eq!(pdf.as_bytes(), b"%PDF-");
        assert_eq!(pdf.size, 5);
        assert_eq!(pdf.filename(), Some("r.pdf"));
        assert_eq!(pdf.content_type(), "application/pdf");

        // Cc comes before To
        assert_eq!(
            email.rcpt_to,
            vec![EmailUser::new("", "carol@z.com"), EmailUser::new("", "bob@y.com")]
        );
    }

    #[test]
    fn test_multipart_last_text_wins_and_order_kept() {
        let (parser, _) = parser();
        let body = b"--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
first\r\n\
--b\r\n\
Content-Type: image/png\r\n\
\r\n\
png\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
second\r\n\
--b\r\n\
Content-Type: application/zip\r\n\
\r\n\
zip\r\n\
--b--\r\n";
        let content_type = HeaderContentType::parse("multipart/mixed; boundary=b", parser.observer()).unwrap();

        let parsed = parser.parse_body(&content_type, body).unwrap();

        assert_eq!(parsed.text.unwrap().as_bytes(), b"second");
        let kinds: Vec<String> = parsed.attachments.iter().map(EmailContent::content_type).collect();
        assert_eq!(kinds, vec!["image/png".to_string(), "application/zip".to_string()]);
    }

    #[test]
    fn test_type_matching_ignores_case() {
        let (parser, _) = parser();

        let email = parser
            .parse_email(b"From: a@x.com\r\nContent-Type: Text/HTML\r\n\r\n<b>hi</b>")
            .unwrap();
        assert_eq!(email.body_html.unwrap().as_bytes(), b"<b>hi</b>");

        let body = b"--outer\r\n\
Content-Type: MULTIPART/Alternative; boundary=inner\r\n\
\r\n\
--inner\r\n\
Content-Type: TEXT/plain\r\n\
\r\n\
plain\r\n\
--inner\r\n\
Content-Type: text/Html\r\n\
\r\n\
<p>html</p>\r\n\
--inner--\r\n\
--outer--\r\n";
        let content_type =
            HeaderContentType::parse("Multipart/Mixed; boundary=outer", parser.observer()).unwrap();

        let parsed = parser.parse_body(&content_type, body).unwrap();

        assert_eq!(parsed.text.unwrap().as_bytes(), b"plain");
        assert_eq!(parsed.html.unwrap().as_bytes(), b"<p>html</p>");
        assert!(parsed.attachments.is_empty());
    }

    #[test]
    fn test_multipart_skips_bad_parts() {
        let (parser, observer) = parser();
        let body = b"--b\r\n\
\r\n\
no headers\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
!!!not base64!!!\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
caf=C3=A9\r\n\
--b--\r\n";
        let content_type = HeaderContentType::parse("multipart/mixed; boundary=b", parser.observer()).unwrap();

        let parsed = parser.parse_body(&content_type, body).unwrap();

        assert!(parsed.attachments.is_empty());
        assert_eq!(parsed.text.unwrap().as_bytes(), "café".as_bytes());
        assert!(observer.contains("empty headers"));
        assert!(observer.contains("error decoding part data"));
    }

    #[test]
    fn test_multipart_keeps_parts_before_walker_error() {
        let (parser, observer) = parser();
        let body = b"--b\r\nContent-Type: text/plain\r\n\r\nkept\r\n--b\r\nContent-Type: text/html\r\n\r\ntruncated";
        let content_type = HeaderContentType::parse("multipart/alternative; boundary=b", parser.observer()).unwrap();

        let parsed = parser.parse_body(&content_type, body).unwrap();

        assert_eq!(parsed.text.unwrap().as_bytes(), b"kept");
        assert!(parsed.html.is_none());
        assert!(observer.contains("error iterating multipart"));
    }

    #[test]
    fn test_multipart_without_boundary_fails() {
        let (parser, _) = parser();
        let raw = b"From: a@x.com\r\nContent-Type: multipart/mixed\r\n\r\n--b\r\n";

        let err = parser.parse_email(raw).unwrap_err();
        assert_eq!(err.code(), "MISSING_BOUNDARY");
    }

    #[test]
    fn test_unsupported_singlepart_fails() {
        let (parser, observer) = parser();
        let raw = b"From: a@x.com\r\nContent-Type: application/pdf\r\n\r\n%PDF";

        let err = parser.parse_email(raw).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_BODY");
        assert!(observer.contains("application/pdf"));
    }

    #[test]
    fn test_malformed_input() {
        let (parser, _) = parser();

        assert_eq!(parser.parse_email(b"").unwrap_err().code(), "MALFORMED_MESSAGE");
        assert_eq!(
            parser.parse_email(b"\r\njust a body").unwrap_err().code(),
            "MALFORMED_MESSAGE"
        );
        assert_eq!(
            parser.parse_email(b"From: not an address\r\n\r\nbody").unwrap_err().code(),
            "HEADER_ERROR"
        );
    }

    #[test]
    fn test_each_email_gets_new_id() {
        let (parser, _) = parser();
        let raw = b"From: a@x.com\r\nContent-Type: text/plain\r\n\r\nbody";

        let first = parser.parse_email(raw).unwrap();
        let second = parser.parse_email(raw).unwrap();

        assert_ne!(first.id, second.id);
    }
}
