//! SMTP ingestion: transaction state, `mailin-embedded` handler and listener

mod handler;
mod server;
pub mod session;

pub use handler::SmtpHandler;
pub use server::{ssl_config, SmtpServer};
pub use session::Session;
