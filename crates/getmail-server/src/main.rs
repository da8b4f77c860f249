//! getmail - inbound SMTP receiver entry point

mod service;

use anyhow::{anyhow, Result};
use getmail_common::config::{Config, LoggingConfig};
use getmail_core::{tracing_observer, DnsTxtLookup, MessageParser, SmtpHandler, SmtpServer, SpfResolver};
use service::LoggingService;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting getmail SMTP receiver...");

    let observer = tracing_observer();

    // SPF verification runs on this runtime from the listener threads
    let resolver = if config.spf.enabled {
        Some(SpfResolver::new(DnsTxtLookup::new(), Arc::clone(&observer)))
    } else {
        info!("SPF verification disabled");
        None
    };
    let service = LoggingService::new(
        resolver,
        Handle::current(),
        Duration::from_secs(config.spf.timeout_secs),
    );

    let handler = SmtpHandler::new(&config.smtp, MessageParser::new(observer), Arc::new(service));
    let server = SmtpServer::new(config.clone(), handler);

    // The listener blocks its thread; it is not joined on shutdown
    let (done_tx, done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("smtp-listener".to_string())
        .spawn(move || {
            let _ = done_tx.send(server.serve());
        })?;

    info!("getmail started successfully");

    tokio::select! {
        result = done_rx => {
            let result = result.map_err(|_| anyhow!("SMTP listener thread exited unexpectedly"))?;
            if let Err(e) = &result {
                error!("SMTP server error: {}", e);
            }
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
        }
    }

    info!("getmail shutdown complete");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_level(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .init();
    }
}
