//! Content-Transfer-Encoding decoding

use crate::diagnostics::Observer;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use getmail_common::{Error, Result};

/// Transfer encodings understood by [`decode_data`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    Base64,
    QuotedPrintable,
    /// `7bit`, `8bit`, `binary` or no value
    Identity,
    /// Anything else; content is passed through untouched
    Unknown(String),
}

impl TransferEncoding {
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "7bit" | "8bit" | "binary" | "" => Self::Identity,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

/// Decode `data` according to the named transfer encoding.
///
/// Unknown encodings are reported as a warning and returned as-is.
pub fn decode_data(data: &[u8], encoding: &str, observer: &dyn Observer) -> Result<Vec<u8>> {
    match TransferEncoding::parse(encoding) {
        TransferEncoding::Base64 => decode_base64(data),
        TransferEncoding::QuotedPrintable => decode_quoted_printable(data),
        TransferEncoding::Identity => Ok(data.to_vec()),
        TransferEncoding::Unknown(name) => {
            observer.warning(
                "decode_data",
                &format!("Unknown encoding {}, returning raw data", name),
            );
            Ok(data.to_vec())
        }
    }
}

/// Standard base64; line breaks and other ASCII whitespace are ignored
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Decode(format!("base64: {}", e)))
}

/// Quoted-printable (RFC 2045 section 6.7)
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());

    let mut lines = data.split(|&b| b == b'\n').peekable();
    while let Some(raw_line) = lines.next() {
        let has_newline = lines.peek().is_some();
        let had_cr = raw_line.ends_with(b"\r");
        let line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);

        // Trailing whitespace is transport padding.
        let end = line
            .iter()
            .rposition(|&b| b != b' ' && b != b'\t')
            .map_or(0, |i| i + 1);
        let line = &line[..end];

        let soft_break = line.last() == Some(&b'=');
        let content = if soft_break {
            &line[..line.len() - 1]
        } else {
            line
        };

        let mut i = 0;
        while i < content.len() {
            if content[i] == b'=' {
                let hex = content
                    .get(i + 1..i + 3)
                    .ok_or_else(|| Error::Decode("quoted-printable: incomplete escape".to_string()))?;
                out.push(hex_byte(hex)?);
                i += 3;
            } else {
                out.push(content[i]);
                i += 1;
            }
        }

        if has_newline && !soft_break {
            if had_cr {
                out.push(b'\r');
            }
            out.push(b'\n');
        }
    }

    Ok(out)
}

fn hex_byte(hex: &[u8]) -> Result<u8> {
    std::str::from_utf8(hex)
        .ok()
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .ok_or_else(|| {
            Error::Decode(format!(
                "quoted-printable: invalid hex byte {:?}",
                String::from_utf8_lossy(hex)
            ))
        })
}
