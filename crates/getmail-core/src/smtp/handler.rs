//! `mailin-embedded` callbacks mapped onto [`Session`]

use super::session::Session;
use crate::email::EmailListener;
use crate::mime::MessageParser;
use getmail_common::config::SmtpConfig;
use getmail_common::{Error, Result};
use mailin_embedded::response::OK;
use mailin_embedded::{Handler, Response};
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-connection SMTP handler.
///
/// The embedded server clones a prototype for every connection; the prototype
/// itself never holds a session.
#[derive(Clone)]
pub struct SmtpHandler {
    parser: MessageParser,
    listener: Arc<dyn EmailListener>,
    trusted_domains: Arc<Vec<String>>,
    max_message_size: usize,
    max_recipients: usize,
    session: Option<Session>,
    buffer: Vec<u8>,
    oversized: bool,
}

impl SmtpHandler {
    pub fn new(config: &SmtpConfig, parser: MessageParser, listener: Arc<dyn EmailListener>) -> Self {
        Self {
            parser,
            listener,
            trusted_domains: Arc::new(config.trusted_domains.clone()),
            max_message_size: config.max_message_size,
            max_recipients: config.max_recipients,
            session: None,
            buffer: Vec::new(),
            oversized: false,
        }
    }

    /// Transaction in progress, if any
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

impl Handler for SmtpHandler {
    fn mail(&mut self, ip: IpAddr, domain: &str, from: &str) -> Response {
        debug!(client_ip = %ip, helo = %domain, from = %from, "MAIL FROM");

        let mut session = Session::new(
            self.parser.clone(),
            Arc::clone(&self.listener),
            Arc::clone(&self.trusted_domains),
            Some(ip),
        );
        let result = session.mail(from);
        self.session = if result.is_ok() { Some(session) } else { None };
        reply(result)
    }

    fn rcpt(&mut self, to: &str) -> Response {
        let Some(session) = self.session.as_mut() else {
            return bad_sequence();
        };

        if session.recipients().len() >= self.max_recipients {
            return reply(Err(Error::TooManyRecipients(self.max_recipients)));
        }

        debug!(to = %to, "RCPT TO");
        reply(session.rcpt(to))
    }

    fn data_start(&mut self, _domain: &str, _from: &str, _is8bit: bool, _to: &[String]) -> Response {
        if self.session.is_none() {
            return bad_sequence();
        }

        self.buffer.clear();
        self.oversized = false;
        OK
    }

    fn data(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.oversized {
            return Ok(());
        }

        if self.buffer.len() + buf.len() > self.max_message_size {
            // Keep reading to the end of DATA, refuse at data_end
            self.oversized = true;
            self.buffer = Vec::new();
            return Ok(());
        }

        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    fn data_end(&mut self) -> Response {
        let raw = std::mem::take(&mut self.buffer);
        let Some(mut session) = self.session.take() else {
            return bad_sequence();
        };

        if self.oversized {
            self.oversized = false;
            let err = Error::MessageTooLarge(self.max_message_size);
            session.report_failure(&raw, &err);
            return reply(Err(err));
        }

        let size = raw.len();
        let result = session.data(&raw);
        if result.is_ok() {
            info!(
                from = %session.from(),
                recipients = session.recipients().len(),
                size,
                "Message accepted"
            );
            session.logout();
        }
        reply(result)
    }
}

/// SMTP reply for the outcome of a callback
fn reply(result: Result<()>) -> Response {
    match result {
        Ok(()) => OK,
        Err(e) => {
            warn!(code = e.code(), "SMTP command rejected: {}", e);
            Response::custom(e.smtp_code(), e.to_string())
        }
    }
}

fn bad_sequence() -> Response {
    Response::custom(503, "Bad sequence of commands".to_string())
}
