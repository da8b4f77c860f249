//! Common types for getmail

use serde::{Deserialize, Serialize};

/// A mailbox as written in an address field: optional display name plus address
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailUser {
    #[serde(rename = "Name", default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(rename = "Email", default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

impl EmailUser {
    /// Create a new email user
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Domain part of the address, if it has one
    pub fn domain(&self) -> Option<&str> {
        self.email
            .split_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }

    /// Check the address domain against an allowlist (case-insensitive).
    ///
    /// Returns the domain (empty when the address has none) and whether it matched.
    pub fn has_domain<S: AsRef<str>>(&self, domains: &[S]) -> (String, bool) {
        let Some(domain) = self.domain() else {
            return (String::new(), false);
        };
        let matched = domains
            .iter()
            .any(|d| d.as_ref().eq_ignore_ascii_case(domain));
        (domain.to_string(), matched)
    }

    /// Whether neither a name nor an address is set
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.email.is_empty()
    }
}

impl std::fmt::Display for EmailUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.email)
        } else {
            write!(f, "\"{}\" <{}>", self.name, self.email)
        }
    }
}
