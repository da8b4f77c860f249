//! Reference consumer: logs every received email

use getmail_common::{EmailUser, Error};
use getmail_core::{DnsTxtLookup, Email, EmailContent, EmailListener, SpfResolver, TxtLookup};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Bytes of each body shown in the log
const PREVIEW_LEN: usize = 100;

/// Logs metadata, SPF verdict, headers and body previews of received mail
pub struct LoggingService<L = DnsTxtLookup> {
    resolver: Option<SpfResolver<L>>,
    runtime: Handle,
    spf_timeout: Duration,
}

impl<L: TxtLookup> LoggingService<L> {
    /// `resolver` of `None` disables SPF verification.
    ///
    /// Callbacks arrive on listener worker threads, so SPF lookups are driven
    /// on `runtime`.
    pub fn new(resolver: Option<SpfResolver<L>>, runtime: Handle, spf_timeout: Duration) -> Self {
        Self {
            resolver,
            runtime,
            spf_timeout,
        }
    }

    fn log_metadata(&self, email: &Email) {
        info!(
            id = %email.id,
            client_ip = ?email.client_ip,
            from = %email.from,
            to = %join_users(&email.rcpt_to),
            subject = %email.subject,
            has_text = email.body_text.is_some(),
            has_html = email.body_html.is_some(),
            attachments = email.attachments.len(),
            "Email received"
        );
    }

    /// Verdict of the SPF check, `None` when it could not be decided
    fn verify_spf(&self, email: &mut Email) -> Option<bool> {
        let resolver = self.resolver.as_ref()?;

        let timeout = self.spf_timeout;
        let id = email.id;
        // The timer must be created inside the runtime
        let check = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, email.verify_spf(resolver)).await });
        match check {
            Ok(Ok(verified)) => Some(verified),
            Ok(Err(e)) => {
                warn!(id = %id, "SPF verification failed: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    id = %id,
                    timeout_secs = self.spf_timeout.as_secs(),
                    "SPF verification timed out"
                );
                None
            }
        }
    }

    fn log_headers(&self, email: &Email) {
        let headers = &email.headers;
        let content_type = &headers.content_type;
        let params = content_type
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");

        debug!(
            id = %email.id,
            mime_version = %headers.mime_version,
            date = %headers.date,
            subject = %headers.subject,
            from = %headers.from,
            to = %join_users(&headers.to),
            cc = %join_users(&headers.cc),
            rcpt_to = %join_users(&email.rcpt_to),
            content_type = %content_type.mime_type(),
            content_type_params = %params,
            content_transfer_encoding = %headers.content_transfer_encoding,
            "Email headers"
        );
    }

    fn log_bodies(&self, email: &Email) {
        if let Some(text) = &email.body_text {
            debug!(id = %email.id, size = text.size, "Text body: {}", text_preview(text.as_bytes()));
        }
        if let Some(html) = &email.body_html {
            debug!(id = %email.id, size = html.size, "HTML body: {}", html_preview(html.as_bytes()));
        }
        for attachment in &email.attachments {
            log_attachment(email, attachment);
        }
    }
}

impl<L: TxtLookup> EmailListener for LoggingService<L> {
    fn on_email_received(&self, mut email: Email) {
        self.log_metadata(&email);

        match self.verify_spf(&mut email) {
            Some(true) => info!(id = %email.id, "SPF verified"),
            Some(false) => warn!(id = %email.id, from = %email.from, "SPF verification failed"),
            None => {}
        }

        self.log_headers(&email);
        self.log_bodies(&email);
    }

    fn on_email_failed(&self, from: &EmailUser, recipients: &[EmailUser], raw: &[u8], err: &Error) {
        error!(
            code = err.code(),
            size = raw.len(),
            "Failed to process email from {} to {} recipients: {}",
            from,
            recipients.len(),
            err
        );
    }
}

fn log_attachment(email: &Email, attachment: &EmailContent) {
    info!(
        id = %email.id,
        filename = attachment.filename().unwrap_or("(unnamed)"),
        content_type = %attachment.content_type(),
        size = attachment.size,
        "Attachment"
    );
}

fn join_users(users: &[EmailUser]) -> String {
    users
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// First bytes of a body as text
pub fn text_preview(data: &[u8]) -> String {
    let end = data.len().min(PREVIEW_LEN);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// First bytes of an HTML body with markup reduced to readable text
pub fn html_preview(data: &[u8]) -> String {
    let raw = text_preview(data);
    match htmd::convert(&raw) {
        Ok(text) => text.trim().to_string(),
        Err(_) => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use getmail_core::{EmailContentHeader, RecordingObserver, StaticTxtLookup};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::runtime::Runtime;

    struct SlowLookup;

    #[async_trait]
    impl TxtLookup for SlowLookup {
        async fn lookup_txt(&self, _domain: &str) -> getmail_common::Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn email(ip: &str) -> Email {
        let mut email = Email::new().unwrap();
        email.from = EmailUser::new("Jane", "jane@example.com");
        email.client_ip = Some(ip.parse().unwrap());
        email
    }

    fn service(runtime: &Runtime) -> LoggingService<StaticTxtLookup> {
        let lookup = StaticTxtLookup::new().with_record("example.com", "v=spf1 ip4:192.0.2.0/24 -all");
        let resolver = SpfResolver::new(lookup, Arc::new(RecordingObserver::new()));
        LoggingService::new(Some(resolver), runtime.handle().clone(), Duration::from_secs(5))
    }

    #[test]
    fn test_text_preview_truncates() {
        let body = "x".repeat(250);
        assert_eq!(text_preview(body.as_bytes()).len(), PREVIEW_LEN);
        assert_eq!(text_preview(b"short"), "short");
    }

    #[test]
    fn test_text_preview_split_character() {
        let mut body = "a".repeat(PREVIEW_LEN - 1).into_bytes();
        body.extend_from_slice("é".as_bytes());

        let preview = text_preview(&body);
        assert!(preview.starts_with(&"a".repeat(PREVIEW_LEN - 1)));
        assert!(preview.ends_with('\u{FFFD}'));
    }

    #[test]
    fn test_html_preview_unescapes() {
        let preview = html_preview(b"<p>Fish &amp; chips</p>");
        assert_eq!(preview, "Fish & chips");
    }

    #[test]
    fn test_spf_verdicts() {
        let runtime = Runtime::new().unwrap();
        let service = service(&runtime);

        let mut allowed = email("192.0.2.44");
        assert_eq!(service.verify_spf(&mut allowed), Some(true));
        assert!(allowed.spf);

        let mut refused = email("203.0.113.9");
        assert_eq!(service.verify_spf(&mut refused), Some(false));

        let mut unknown = email("192.0.2.44");
        unknown.from = EmailUser::new("", "someone@unknown.example");
        assert_eq!(service.verify_spf(&mut unknown), None);
    }

    #[test]
    fn test_spf_from_listener_thread() {
        let runtime = Runtime::new().unwrap();
        let service = Arc::new(service(&runtime));

        let worker = {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                let mut email = email("192.0.2.44");
                let verdict = service.verify_spf(&mut email);
                service.on_email_received(email);
                verdict
            })
        };

        assert_eq!(worker.join().unwrap(), Some(true));
    }

    #[test]
    fn test_spf_timeout() {
        let runtime = Runtime::new().unwrap();
        let resolver = SpfResolver::new(SlowLookup, Arc::new(RecordingObserver::new()));
        let service = LoggingService::new(
            Some(resolver),
            runtime.handle().clone(),
            Duration::from_millis(20),
        );

        let mut email = email("192.0.2.44");
        assert_eq!(service.verify_spf(&mut email), None);
        assert!(!email.spf);
    }

    #[test]
    fn test_spf_disabled() {
        let runtime = Runtime::new().unwrap();
        let service: LoggingService<StaticTxtLookup> =
            LoggingService::new(None, runtime.handle().clone(), Duration::from_secs(5));

        let mut email = email("192.0.2.44");
        assert_eq!(service.verify_spf(&mut email), None);
        assert!(!email.spf);
    }

    #[test]
    fn test_callbacks_do_not_panic() {
        let runtime = Runtime::new().unwrap();
        let service = service(&runtime);

        let mut email = email("192.0.2.44");
        email.subject = "Hi".to_string();
        email.rcpt_to = vec![EmailUser::new("", "bob@example.org")];
        email.body_text = Some(EmailContent::new(b"hello".to_vec(), EmailContentHeader::default()));
        email.body_html = Some(EmailContent::new(b"<b>hello</b>".to_vec(), EmailContentHeader::default()));
        email.attachments = vec![EmailContent::new(vec![0u8; 32], EmailContentHeader::default())];

        service.on_email_received(email);
        service.on_email_failed(
            &EmailUser::new("", "jane@example.com"),
            &[],
            b"raw",
            &Error::MalformedMessage("no headers".to_string()),
        );
    }
}
