//! SPF (Sender Policy Framework) range resolution
//!
//! Collects the `ip4:` and `ip6:` ranges a domain publishes, following
//! `include:` and `redirect=` transitively, and tests a client address
//! against the union.

use crate::diagnostics::Observer;
use async_trait::async_trait;
use getmail_common::{Error, Result};
use ipnet::{Ipv4Net, Ipv6Net};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Source of DNS TXT records
#[async_trait]
pub trait TxtLookup: Send + Sync {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>>;
}

/// TXT lookups through the system DNS resolver
pub struct DnsTxtLookup {
    resolver: TokioAsyncResolver,
}

impl DnsTxtLookup {
    /// Lookup backed by a resolver with default settings
    pub fn new() -> Self {
        Self::with_resolver(TokioAsyncResolver::tokio(
            ResolverConfig::default(),
            ResolverOpts::default(),
        ))
    }

    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

impl Default for DnsTxtLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxtLookup for DnsTxtLookup {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>> {
        let lookup = self
            .resolver
            .txt_lookup(domain)
            .await
            .map_err(|e| Error::Dns(format!("TXT lookup failed for {}: {}", domain, e)))?;

        Ok(lookup
            .iter()
            .map(|record| {
                record
                    .txt_data()
                    .iter()
                    .map(|d| String::from_utf8_lossy(d))
                    .collect::<String>()
            })
            .collect())
    }
}

/// Fixed TXT records held in memory; unknown domains fail like NXDOMAIN
#[derive(Debug, Default)]
pub struct StaticTxtLookup {
    records: HashMap<String, Vec<String>>,
    lookups: AtomicUsize,
}

impl StaticTxtLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a TXT record for `domain`
    pub fn with_record(mut self, domain: &str, txt: &str) -> Self {
        self.records
            .entry(normalize_domain(domain))
            .or_default()
            .push(txt.to_string());
        self
    }

    /// Number of lookups served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TxtLookup for StaticTxtLookup {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.records
            .get(&normalize_domain(domain))
            .cloned()
            .ok_or_else(|| Error::Dns(format!("no such domain: {}", domain)))
    }
}

/// Address ranges authorized for a domain, across all followed records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpfRecord {
    pub domain: String,
    ipv4: BTreeSet<String>,
    ipv6: BTreeSet<String>,
}

impl SpfRecord {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Merge ranges into the record; duplicates collapse
    pub fn add<I, J>(&mut self, ipv4: I, ipv6: J)
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        self.ipv4.extend(ipv4);
        self.ipv6.extend(ipv6);
    }

    pub fn ipv4(&self) -> &BTreeSet<String> {
        &self.ipv4
    }

    pub fn ipv6(&self) -> &BTreeSet<String> {
        &self.ipv6
    }

    /// Whether `ip` falls in any collected range.
    ///
    /// IPv4-mapped IPv6 addresses are checked against the IPv4 ranges. Entries
    /// without a prefix length match a single host; unparseable entries never
    /// match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => self
                .ipv4
                .iter()
                .filter_map(|entry| parse_ipv4_range(entry))
                .any(|net| net.contains(&v4)),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.contains(IpAddr::V4(v4)),
                None => self
                    .ipv6
                    .iter()
                    .filter_map(|entry| parse_ipv6_range(entry))
                    .any(|net| net.contains(&v6)),
            },
        }
    }
}

fn parse_ipv4_range(entry: &str) -> Option<Ipv4Net> {
    entry
        .parse::<Ipv4Net>()
        .ok()
        .or_else(|| entry.parse::<Ipv4Addr>().ok().map(Ipv4Net::from))
}

fn parse_ipv6_range(entry: &str) -> Option<Ipv6Net> {
    entry
        .parse::<Ipv6Net>()
        .ok()
        .or_else(|| entry.parse::<Ipv6Addr>().ok().map(Ipv6Net::from))
}

/// Terms of one `v=spf1` record that affect the range set
#[derive(Debug, Default, PartialEq, Eq)]
struct SpfTerms {
    ipv4: Vec<String>,
    ipv6: Vec<String>,
    includes: Vec<String>,
    redirects: Vec<String>,
}

/// Resolves SPF ranges through a [`TxtLookup`]
pub struct SpfResolver<L> {
    lookup: L,
    observer: Arc<dyn Observer>,
}

impl<L: TxtLookup> SpfResolver<L> {
    pub fn new(lookup: L, observer: Arc<dyn Observer>) -> Self {
        Self { lookup, observer }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Whether `ip` is authorized to send for `domain`.
    ///
    /// Fails only when the domain's own TXT lookup fails.
    pub async fn check_spf(&self, domain: &str, ip: IpAddr) -> Result<bool> {
        let record = self
            .resolve(domain)
            .await
            .map_err(|e| Error::Spf(format!("error fetching SPF records: {}", e)))?;

        let allowed = record.contains(ip);
        debug!(
            domain = %domain,
            ip = %ip,
            ipv4_ranges = record.ipv4.len(),
            ipv6_ranges = record.ipv6.len(),
            allowed,
            "SPF check complete"
        );
        Ok(allowed)
    }

    /// Collect every range published for `domain`
    pub async fn resolve(&self, domain: &str) -> Result<SpfRecord> {
        let mut record = SpfRecord::new(domain);
        let mut visited = HashSet::new();
        self.fetch_networks(domain, &mut record, &mut visited)
            .await?;
        Ok(record)
    }

    /// Recursive fetch; each domain is looked up at most once per resolution
    fn fetch_networks<'a>(
        &'a self,
        domain: &'a str,
        record: &'a mut SpfRecord,
        visited: &'a mut HashSet<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if !visited.insert(normalize_domain(domain)) {
                return Ok(());
            }

            let txt_records = self.lookup.lookup_txt(domain).await?;

            for txt in txt_records.iter().filter(|txt| is_spf_record(txt)) {
                let terms = parse_spf_record(txt);
                record.add(terms.ipv4, terms.ipv6);

                for include in &terms.includes {
                    if let Err(e) = self.fetch_networks(include, &mut *record, &mut *visited).await {
                        self.observer
                            .warning("spf", &format!("Include failed for {}: {}", include, e));
                    }
                }

                for redirect in &terms.redirects {
                    if let Err(e) = self.fetch_networks(redirect, &mut *record, &mut *visited).await {
                        self.observer
                            .warning("spf", &format!("Redirect failed for {}: {}", redirect, e));
                    }
                }
            }

            Ok(())
        })
    }
}

/// Lowercase, without the trailing root dot
fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn is_spf_record(txt: &str) -> bool {
    txt.strip_prefix("v=spf1")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Drop the version tag and one terminal `all` mechanism
fn normalize_spf(record: &str) -> &str {
    let mut terms = record.strip_prefix("v=spf1").unwrap_or(record).trim();
    for all in ["~all", "-all", "+all", "?all"] {
        if let Some(rest) = terms.strip_suffix(all) {
            terms = rest;
            break;
        }
    }
    terms.trim()
}

fn parse_spf_record(record: &str) -> SpfTerms {
    let mut terms = SpfTerms::default();

    for term in normalize_spf(record).split_whitespace() {
        if let Some(range) = term.strip_prefix("ip4:") {
            terms.ipv4.push(range.to_string());
        } else if let Some(range) = term.strip_prefix("ip6:") {
            terms.ipv6.push(range.to_string());
        } else if let Some(domain) = term.strip_prefix("include:") {
            terms.includes.push(domain.to_string());
        } else if let Some(domain) = term.strip_prefix("redirect=") {
            terms.redirects.push(domain.to_string());
        }
    }

    terms
}
