//! Header block reading and normalization

use crate::diagnostics::Observer;
use serde::Serialize;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Header values as they appeared in a header block, keyed by canonical name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeaders {
    entries: BTreeMap<String, Vec<String>>,
}

impl RawHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value; the name is canonicalized first
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(canonical_header_key(name))
            .or_default()
            .push(value.into());
    }

    /// All values for a header (case-insensitive name)
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&canonical_header_key(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Values of one header joined with `"; "`
    pub fn joined(&self, name: &str) -> Option<String> {
        let values = self.get_all(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join("; "))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.entries.iter()
    }

    fn append_to_last(&mut self, name: &str, continuation: &str) {
        if let Some(last) = self
            .entries
            .get_mut(name)
            .and_then(|values| values.last_mut())
        {
            if !last.is_empty() {
                last.push(' ');
            }
            last.push_str(continuation);
        }
    }
}

/// Canonical MIME header capitalization: `content-type` becomes `Content-Type`.
///
/// Names containing anything but ASCII letters, digits and `-` are returned
/// unchanged.
pub fn canonical_header_key(name: &str) -> String {
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Read a header block up to the first empty line.
///
/// Returns the headers and the offset at which the body starts. Folded lines
/// are unfolded; lines without a `:` are reported and dropped. Input that ends
/// before an empty line is all headers and the body offset is `input.len()`.
pub fn read_header_block(input: &[u8], observer: &dyn Observer) -> (RawHeaders, usize) {
    let mut headers = RawHeaders::new();
    let mut last_name: Option<String> = None;
    let mut pos = 0;

    while pos < input.len() {
        let (line, next) = match input[pos..].iter().position(|&b| b == b'\n') {
            Some(i) => (&input[pos..pos + i], pos + i + 1),
            None => (&input[pos..], input.len()),
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        pos = next;

        if line.is_empty() {
            return (headers, pos);
        }

        let text = String::from_utf8_lossy(line);

        if line[0] == b' ' || line[0] == b'\t' {
            match &last_name {
                Some(name) => headers.append_to_last(name, text.trim()),
                None => observer.info(
                    "read_header_block",
                    &format!("Skipping continuation line without a header: {}", text.trim()),
                ),
            }
            continue;
        }

        match text.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                let name = canonical_header_key(name.trim());
                headers.add(&name, value.trim());
                last_name = Some(name);
            }
            _ => {
                observer.info(
                    "read_header_block",
                    &format!("Skipping malformed header line: {}", text),
                );
                last_name = None;
            }
        }
    }

    (headers, input.len())
}

/// Normalized header values: canonical name to `"; "`-joined value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten raw headers.
    ///
    /// Several occurrences are joined with `"; "`. A single occurrence is split
    /// on `;`, each segment trimmed, then rejoined, which normalizes parameter
    /// spacing.
    pub fn from_raw(raw: &RawHeaders) -> Self {
        let mut headers = Self::new();
        for (name, values) in raw.iter() {
            let joined = match values.as_slice() {
                [] => continue,
                [single] => split_and_trim(single, ';').join("; "),
                many => many.join("; "),
            };
            headers.0.insert(name.clone(), joined);
        }
        headers
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(canonical_header_key(name), value.into());
    }

    /// Whole value of a header, empty when absent
    pub fn value(&self, name: &str) -> &str {
        self.0
            .get(&canonical_header_key(name))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// First `;`-delimited segment of a header, trimmed
    pub fn first(&self, name: &str) -> &str {
        self.value(name).split(';').next().unwrap_or("").trim()
    }

    /// Named `key=value` parameter inside a `;`-delimited header, unquoted
    pub fn param(&self, name: &str, key: &str) -> Option<&str> {
        self.0.get(&canonical_header_key(name))?.split(';').find_map(|segment| {
            let (k, v) = segment.split_once('=')?;
            if k.trim() == key {
                Some(v.trim().trim_matches('"'))
            } else {
                None
            }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&canonical_header_key(name))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

fn split_and_trim(value: &str, sep: char) -> Vec<&str> {
    value.split(sep).map(str::trim).collect()
}
