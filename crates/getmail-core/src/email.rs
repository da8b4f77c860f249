//! The structured email entity and its consumer interface

use crate::email_auth::spf::{SpfResolver, TxtLookup};
use crate::id::UuidV7;
use crate::mime::{EmailContentHeader, MimeHeaders};
use chrono::{DateTime, Utc};
use getmail_common::{EmailUser, Error, Result};
use serde::Serialize;
use std::io::Cursor;
use std::net::IpAddr;

/// A received message after parsing
#[derive(Debug, Clone, Serialize)]
pub struct Email {
    #[serde(rename = "ID")]
    pub id: UuidV7,

    #[serde(rename = "ReceivedAt")]
    pub received_at: DateTime<Utc>,

    #[serde(rename = "ClientIP", skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,

    #[serde(rename = "From")]
    pub from: EmailUser,

    /// Envelope recipients when the session accepted any, otherwise `Cc` then `To`
    #[serde(rename = "RcptTo")]
    pub rcpt_to: Vec<EmailUser>,

    #[serde(rename = "Subject")]
    pub subject: String,

    #[serde(rename = "Headers")]
    pub headers: MimeHeaders,

    /// The message exactly as received
    #[serde(skip)]
    pub raw: Vec<u8>,

    /// Everything after the top-level header block, undecoded
    #[serde(skip)]
    pub body: Vec<u8>,

    #[serde(rename = "BodyText", skip_serializing_if = "Option::is_none")]
    pub body_text: Option<EmailContent>,

    #[serde(rename = "BodyHTML", skip_serializing_if = "Option::is_none")]
    pub body_html: Option<EmailContent>,

    #[serde(rename = "Attachments", skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<EmailContent>,

    #[serde(rename = "SPF")]
    pub spf: bool,

    #[serde(rename = "DKIM")]
    pub dkim: bool,

    #[serde(rename = "DMARC")]
    pub dmarc: bool,
}

impl Email {
    /// Empty email with a fresh identifier, received now
    pub fn new() -> Result<Self> {
        Ok(Self {
            id: UuidV7::new()?,
            received_at: Utc::now(),
            client_ip: None,
            from: EmailUser::default(),
            rcpt_to: Vec::new(),
            subject: String::new(),
            headers: MimeHeaders::default(),
            raw: Vec::new(),
            body: Vec::new(),
            body_text: None,
            body_html: None,
            attachments: Vec::new(),
            spf: false,
            dkim: false,
            dmarc: false,
        })
    }

    /// Check the client IP against the sender domain's SPF ranges.
    ///
    /// A positive result is remembered and returned without further lookups.
    /// Without a client IP or a sender domain the answer is `false`.
    pub async fn verify_spf<L: TxtLookup>(&mut self, resolver: &SpfResolver<L>) -> Result<bool> {
        if self.spf {
            return Ok(true);
        }

        let (Some(ip), Some(domain)) = (self.client_ip, self.from.domain()) else {
            return Ok(false);
        };
        let domain = domain.to_string();

        let allowed = resolver.check_spf(&domain, ip).await?;
        if allowed {
            self.spf = true;
        }
        Ok(allowed)
    }
}

/// One decoded body part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailContent {
    #[serde(skip)]
    data: Vec<u8>,

    #[serde(rename = "Headers", skip_serializing_if = "EmailContentHeader::is_empty")]
    pub headers: EmailContentHeader,

    #[serde(rename = "Size")]
    pub size: usize,
}

impl EmailContent {
    pub fn new(data: Vec<u8>, headers: EmailContentHeader) -> Self {
        Self {
            size: data.len(),
            data,
            headers,
        }
    }

    /// Fresh reader over the content
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.data.as_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// `filename` parameter of the part's `Content-Disposition`
    pub fn filename(&self) -> Option<&str> {
        self.headers
            .extra
            .param("Content-Disposition", "filename")
            .filter(|name| !name.is_empty())
    }

    /// `media/sub` of the part
    pub fn content_type(&self) -> String {
        self.headers.content_type.mime_type()
    }
}

/// Consumer of ingestion results
pub trait EmailListener: Send + Sync {
    /// Called once for every message that was parsed successfully
    fn on_email_received(&self, email: Email);

    /// Called once for every message that failed, or whose delivery faulted
    fn on_email_failed(&self, from: &EmailUser, recipients: &[EmailUser], raw: &[u8], error: &Error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingObserver;
    use crate::email_auth::spf::StaticTxtLookup;
    use crate::mime::HeaderContentType;
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use std::sync::Arc;

    fn spf_resolver() -> SpfResolver<StaticTxtLookup> {
        let lookup = StaticTxtLookup::new().with_record("example.com", "v=spf1 ip4:192.0.2.0/24 -all");
        SpfResolver::new(lookup, Arc::new(RecordingObserver::new()))
    }

    #[test]
    fn test_email_content_helpers() {
        let mut headers = EmailContentHeader::default();
        headers.content_type = HeaderContentType {
            media_type: "application".to_string(),
            sub_type: "pdf".to_string(),
            ..Default::default()
        };
        headers
            .extra
            .insert("Content-Disposition", "attachment; filename=\"report.pdf\"");

        let content = EmailContent::new(b"%PDF-1.4".to_vec(), headers);

        assert_eq!(content.size, 8);
        assert_eq!(content.filename(), Some("report.pdf"));
        assert_eq!(content.content_type(), "application/pdf");

        let mut read = Vec::new();
        content.reader().read_to_end(&mut read).unwrap();
        assert_eq!(read, b"%PDF-1.4");

        // Each reader starts from the beginning
        let mut again = String::new();
        content.reader().read_to_string(&mut again).unwrap();
        assert_eq!(again, "%PDF-1.4");
    }

    #[test]
    fn test_filename_absent() {
        let content = EmailContent::new(Vec::new(), EmailContentHeader::default());
        assert_eq!(content.filename(), None);
        assert_eq!(content.size, 0);
    }

    #[test]
    fn test_json_contract() {
        let mut email = Email::new().unwrap();
        email.from = EmailUser::new("Jane", "jane@example.com");
        email.subject = "Hi".to_string();
        email.raw = b"Subject: Hi\r\n\r\nhello".to_vec();
        email.body_text = Some(EmailContent::new(b"hello".to_vec(), EmailContentHeader::default()));

        let json = serde_json::to_value(&email).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object["ID"], serde_json::json!(email.id.to_string()));
        assert_eq!(object["From"], serde_json::json!({ "Name": "Jane", "Email": "jane@example.com" }));
        assert_eq!(object["BodyText"], serde_json::json!({ "Size": 5 }));
        assert_eq!(object["SPF"], serde_json::json!(false));
        assert!(object.contains_key("ReceivedAt"));
        assert!(!object.contains_key("ClientIP"));
        assert!(!object.contains_key("BodyHTML"));
        assert!(!object.contains_key("Attachments"));
        assert!(!object.contains_key("raw"));
        assert!(!object.contains_key("body"));
    }

    #[tokio::test]
    async fn test_verify_spf_memoizes_pass() {
        let resolver = spf_resolver();
        let mut email = Email::new().unwrap();
        email.from = EmailUser::new("", "jane@example.com");
        email.client_ip = Some("192.0.2.10".parse().unwrap());

        assert!(email.verify_spf(&resolver).await.unwrap());
        assert!(email.spf);
        assert!(email.verify_spf(&resolver).await.unwrap());
        assert_eq!(resolver.lookup().lookups(), 1);
    }

    #[tokio::test]
    async fn test_verify_spf_does_not_memoize_fail() {
        let resolver = spf_resolver();
        let mut email = Email::new().unwrap();
        email.from = EmailUser::new("", "jane@example.com");
        email.client_ip = Some("203.0.113.1".parse().unwrap());

        assert!(!email.verify_spf(&resolver).await.unwrap());
        assert!(!email.verify_spf(&resolver).await.unwrap());
        assert_eq!(resolver.lookup().lookups(), 2);
        assert!(!email.spf);
    }

    #[tokio::test]
    async fn test_verify_spf_without_ip_or_sender() {
        let resolver = spf_resolver();

        let mut no_ip = Email::new().unwrap();
        no_ip.from = EmailUser::new("", "jane@example.com");
        assert!(!no_ip.verify_spf(&resolver).await.unwrap());

        let mut no_sender = Email::new().unwrap();
        no_sender.client_ip = Some("192.0.2.10".parse().unwrap());
        assert!(!no_sender.verify_spf(&resolver).await.unwrap());

        assert_eq!(resolver.lookup().lookups(), 0);
    }

    #[tokio::test]
    async fn test_verify_spf_lookup_failure() {
        let resolver = SpfResolver::new(StaticTxtLookup::new(), Arc::new(RecordingObserver::new()));
        let mut email = Email::new().unwrap();
        email.from = EmailUser::new("", "jane@unknown.example");
        email.client_ip = Some("192.0.2.10".parse().unwrap());

        assert!(email.verify_spf(&resolver).await.is_err());
        assert!(!email.spf);
    }
}
