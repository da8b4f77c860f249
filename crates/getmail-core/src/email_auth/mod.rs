//! Email Authentication Module
//!
//! Sender verification for incoming mail. Only SPF is evaluated; the DKIM and
//! DMARC flags on [`crate::Email`] are never set.

pub mod spf;

pub use spf::{DnsTxtLookup, SpfRecord, SpfResolver, StaticTxtLookup, TxtLookup};
