//! Address field parsing (`From`, `To`, `Cc` and SMTP envelope paths)

use getmail_common::{EmailUser, Error, Result};
use regex::Regex;
use std::sync::OnceLock;

struct AddressPatterns {
    /// `"Name" <local@domain>` or `Name <local@domain>`
    named: Regex,
    /// `<local@domain>`
    bracketed: Regex,
    /// `local@domain`
    bare: Regex,
}

fn patterns() -> &'static AddressPatterns {
    static PATTERNS: OnceLock<AddressPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| AddressPatterns {
        named: Regex::new(r#"^"?([^"<@]+)?"?\s*<([^<>@\s]+@[^<>@\s]+)>$"#)
            .expect("valid address pattern"),
        bracketed: Regex::new(r"^<([^<>@\s]+@[^<>@\s]+)>$").expect("valid address pattern"),
        bare: Regex::new(r"^([^<>@\s]+@[^<>@\s]+)$").expect("valid address pattern"),
    })
}

/// Parse one address.
///
/// Accepts `"Jane Doe" <jane@example.com>`, `Jane Doe <jane@example.com>`,
/// `<jane@example.com>` and `jane@example.com`, with an optional leading
/// `TO:`.
pub fn parse_email_user(input: &str) -> Result<EmailUser> {
    let mut input = input.trim();
    if input.is_empty() {
        return Err(Error::Address("input cannot be empty".to_string()));
    }

    if input
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("TO:"))
    {
        input = input[3..].trim();
    }

    let patterns = patterns();

    if let Some(caps) = patterns.named.captures(input) {
        let name = caps
            .get(1)
            .map(|m| m.as_str().trim_matches(|c| c == '"' || c == ' '))
            .unwrap_or("");
        return Ok(EmailUser::new(name, caps[2].trim()));
    }

    if let Some(caps) = patterns.bracketed.captures(input) {
        return Ok(EmailUser::new("", caps[1].trim()));
    }

    if let Some(caps) = patterns.bare.captures(input) {
        return Ok(EmailUser::new("", caps[1].trim()));
    }

    Err(Error::Address(format!("could not parse email line: {}", input)))
}

/// Parse a comma-separated address list; any bad entry fails the whole list
pub fn parse_email_users(input: &str) -> Result<Vec<EmailUser>> {
    input.split(',').map(parse_email_user).collect()
}
