//! Content-Type header parsing

use crate::diagnostics::Observer;
use getmail_common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Parsed `Content-Type`: media type, subtype and parameters.
///
/// Type names keep the case they were written in; comparisons ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderContentType {
    #[serde(rename = "Media-Type", skip_serializing_if = "String::is_empty")]
    pub media_type: String,

    #[serde(rename = "Sub-Type", skip_serializing_if = "String::is_empty")]
    pub sub_type: String,

    #[serde(rename = "Params", skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl HeaderContentType {
    /// Parse a value such as `multipart/mixed; boundary="abc123"`.
    ///
    /// The media type must contain a `/`; everything after the first one is
    /// the subtype. Parameters without `=` are reported and skipped.
    pub fn parse(value: &str, observer: &dyn Observer) -> Result<Self> {
        let mut segments = value.split(';');
        let media = segments.next().unwrap_or("").trim();

        let (media_type, sub_type) = media
            .split_once('/')
            .ok_or_else(|| Error::ContentType(format!("invalid media type: {}", value)))?;

        let mut params = BTreeMap::new();
        for param in segments {
            match param.split_once('=') {
                Some((key, val)) => {
                    params.insert(
                        key.trim().to_string(),
                        val.trim().trim_matches('"').to_string(),
                    );
                }
                None => observer.info(
                    "parse_content_type",
                    &format!("malformed parameter in header: {:?}", param),
                ),
            }
        }

        Ok(Self {
            media_type: media_type.trim().to_string(),
            sub_type: sub_type.trim().to_string(),
            params,
        })
    }

    /// Whether neither type nor parameters were set
    pub fn is_empty(&self) -> bool {
        self.media_type.is_empty() && self.sub_type.is_empty() && self.params.is_empty()
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type
            .get(..9)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart"))
    }

    /// Case-insensitive match on media type and subtype
    pub fn is(&self, media_type: &str, sub_type: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type)
            && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Parameter value, looked up case-insensitively
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `media/sub` form
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.media_type, self.sub_type)
    }
}
