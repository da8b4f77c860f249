//! SMTP listener built on `mailin-embedded`

use crate::smtp::SmtpHandler;
use anyhow::{anyhow, Result};
use getmail_common::config::{Config, TlsConfig};
use mailin_embedded::{Server, SslConfig};
use tracing::{info, warn};

/// SMTP Server
pub struct SmtpServer {
    config: Config,
    handler: SmtpHandler,
}

impl SmtpServer {
    /// Create a new SMTP server; `handler` is cloned for every connection
    pub fn new(config: Config, handler: SmtpHandler) -> Self {
        Self { config, handler }
    }

    /// Accept connections until the listener fails. Blocks the calling thread.
    pub fn serve(self) -> Result<()> {
        let addr = self.config.smtp.bind_address();
        let tls = ssl_config(self.config.tls.as_ref());
        let tls_status = match tls {
            SslConfig::None => "STARTTLS disabled",
            _ => "STARTTLS enabled",
        };

        let mut server = Server::new(self.handler);
        server
            .with_name(self.config.server.hostname.clone())
            .with_ssl(tls)
            .map_err(|e| anyhow!("Failed to initialize TLS: {}", e))?
            .with_num_threads(self.config.smtp.num_threads)
            .with_addr(addr.as_str())
            .map_err(|e| anyhow!("Invalid listen address {}: {}", addr, e))?;

        info!(
            "SMTP server listening on {} ({}, {} worker threads)",
            addr, tls_status, self.config.smtp.num_threads
        );

        server
            .serve()
            .map_err(|e| anyhow!("SMTP server error: {}", e))
    }
}

/// Certificate settings handed to the embedded server
pub fn ssl_config(tls: Option<&TlsConfig>) -> SslConfig {
    match tls {
        Some(tls) if tls.is_configured() => SslConfig::SelfSigned {
            cert_path: tls.cert_path.to_string_lossy().into_owned(),
            key_path: tls.key_path.to_string_lossy().into_owned(),
        },
        Some(tls) => {
            warn!(
                cert = %tls.cert_path.display(),
                key = %tls.key_path.display(),
                "TLS certificate or key not found. STARTTLS will be disabled."
            );
            SslConfig::None
        }
        None => SslConfig::None,
    }
}
