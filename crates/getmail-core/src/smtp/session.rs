//! One SMTP mail transaction

use crate::email::{Email, EmailListener};
use crate::mime::{parse_email_user, MessageParser};
use getmail_common::{EmailUser, Error, Result};
use std::any::Any;
use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Envelope and parse state of a single transaction
#[derive(Clone)]
pub struct Session {
    trusted_domains: Arc<Vec<String>>,
    client_ip: Option<IpAddr>,
    from: EmailUser,
    rcpt_to: Vec<EmailUser>,
    email: Option<Email>,
    parser: MessageParser,
    listener: Arc<dyn EmailListener>,
}

impl Session {
    pub fn new(
        parser: MessageParser,
        listener: Arc<dyn EmailListener>,
        trusted_domains: Arc<Vec<String>>,
        client_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            trusted_domains,
            client_ip,
            from: EmailUser::default(),
            rcpt_to: Vec::new(),
            email: None,
            parser,
            listener,
        }
    }

    /// Envelope sender accepted so far
    pub fn from(&self) -> &EmailUser {
        &self.from
    }

    /// Envelope recipients accepted so far
    pub fn recipients(&self) -> &[EmailUser] {
        &self.rcpt_to
    }

    /// Parsed email waiting for [`Session::logout`]
    pub fn email(&self) -> Option<&Email> {
        self.email.as_ref()
    }

    /// `MAIL FROM`
    pub fn mail(&mut self, from: &str) -> Result<()> {
        self.from = parse_email_user(from)
            .map_err(|e| Error::Address(format!("failed to parse sender '{}': {}", from, e)))?;
        Ok(())
    }

    /// `RCPT TO`; with a trusted-domain list, other domains are refused
    pub fn rcpt(&mut self, to: &str) -> Result<()> {
        let user = parse_email_user(to)
            .map_err(|e| Error::Address(format!("failed to parse recipient '{}': {}", to, e)))?;

        if !self.trusted_domains.is_empty() {
            let (domain, trusted) = user.has_domain(self.trusted_domains.as_slice());
            if !trusted {
                return Err(Error::UntrustedDomain(domain));
            }
        }

        self.rcpt_to.push(user);
        Ok(())
    }

    /// Message content after `DATA`.
    ///
    /// A parse failure is reported to the listener before it is returned.
    pub fn data(&mut self, raw: &[u8]) -> Result<()> {
        let mut email = match self.parser.parse_email(raw) {
            Ok(email) => email,
            Err(e) => {
                self.parser
                    .observer()
                    .warning("session_data", &format!("error parsing email: {}", e));
                self.report_failure(raw, &e);
                return Err(e);
            }
        };

        email.client_ip = self.client_ip;
        if !self.rcpt_to.is_empty() {
            email.rcpt_to = self.rcpt_to.clone();
        }
        self.email = Some(email);
        Ok(())
    }

    /// `RSET`; nothing is kept between transactions
    pub fn reset(&mut self) {}

    /// Hand the parsed email to the listener.
    ///
    /// A panic in the listener is caught and reported through
    /// `on_email_failed` instead.
    pub fn logout(&mut self) {
        let Some(email) = self.email.take() else {
            return;
        };
        let raw = email.raw.clone();
        let listener = Arc::clone(&self.listener);

        let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener.on_email_received(email)));

        if let Err(payload) = delivered {
            let err = Error::Listener(format!(
                "panic in on_email_received: {}",
                panic_message(payload.as_ref())
            ));
            self.parser.observer().error("session_logout", &err.to_string());
            self.report_failure(&raw, &err);
        }
    }

    /// Tell the listener this transaction failed
    pub fn report_failure(&self, raw: &[u8], err: &Error) {
        let listener = Arc::clone(&self.listener);
        let reported = panic::catch_unwind(AssertUnwindSafe(|| {
            listener.on_email_failed(&self.from, &self.rcpt_to, raw, err)
        }));

        if reported.is_err() {
            self.parser
                .observer()
                .error("session_report_failure", "panic in on_email_failed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
