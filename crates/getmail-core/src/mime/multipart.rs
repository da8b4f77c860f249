//! Depth-first traversal of multipart bodies

use super::headers::{read_header_block, Headers, RawHeaders};
use crate::diagnostics::Observer;
use getmail_common::{Error, Result};
use std::iter::FusedIterator;

/// One leaf part: its header block and the undecoded body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part<'a> {
    pub headers: RawHeaders,
    pub body: &'a [u8],
}

/// Position of a delimiter line inside the body being split
struct Delimiter {
    start: usize,
    end: usize,
    close: bool,
}

/// Splits one multipart body on its boundary
struct BoundaryReader<'a> {
    input: &'a [u8],
    boundary: String,
    pos: usize,
    started: bool,
    finished: bool,
}

impl<'a> BoundaryReader<'a> {
    fn new(input: &'a [u8], boundary: impl Into<String>) -> Self {
        Self {
            input,
            boundary: boundary.into(),
            pos: 0,
            started: false,
            finished: false,
        }
    }

    /// Raw bytes of the next part, headers included
    fn next_part(&mut self) -> Option<Result<&'a [u8]>> {
        if self.finished {
            return None;
        }

        if !self.started {
            // Skip the preamble
            match self.find_delimiter(self.pos) {
                Some(delim) if delim.close => {
                    self.finished = true;
                    return None;
                }
                Some(delim) => {
                    self.started = true;
                    self.pos = delim.end;
                }
                None => {
                    self.finished = true;
                    return Some(Err(Error::Multipart(format!(
                        "no delimiter found for boundary {:?}",
                        self.boundary
                    ))));
                }
            }
        }

        let start = self.pos;
        match self.find_delimiter(start) {
            Some(delim) => {
                // The line break before a delimiter is part of the delimiter
                let mut end = delim.start;
                if end > start && self.input[end - 1] == b'\n' {
                    end -= 1;
                    if end > start && self.input[end - 1] == b'\r' {
                        end -= 1;
                    }
                }

                self.pos = delim.end;
                self.finished = delim.close;
                Some(Ok(&self.input[start..end]))
            }
            None => {
                self.finished = true;
                Some(Err(Error::Multipart(format!(
                    "unexpected end of body: missing close delimiter for boundary {:?}",
                    self.boundary
                ))))
            }
        }
    }

    /// Scan line by line from `from`, which must be at the start of a line
    fn find_delimiter(&self, from: usize) -> Option<Delimiter> {
        let mut line_start = from;

        while line_start < self.input.len() {
            let rest = &self.input[line_start..];
            let (line, next) = match rest.iter().position(|&b| b == b'\n') {
                Some(i) => (&rest[..i], line_start + i + 1),
                None => (rest, self.input.len()),
            };
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if let Some(close) = self.classify(line) {
                return Some(Delimiter {
                    start: line_start,
                    end: next,
                    close,
                });
            }
            line_start = next;
        }

        None
    }

    /// `Some(false)` for `--boundary`, `Some(true)` for `--boundary--`
    fn classify(&self, line: &[u8]) -> Option<bool> {
        let rest = line
            .strip_prefix(b"--")?
            .strip_prefix(self.boundary.as_bytes())?;

        let (close, rest) = match rest.strip_prefix(b"--") {
            Some(rest) => (true, rest),
            None => (false, rest),
        };

        if rest.iter().all(|&b| b == b' ' || b == b'\t') {
            Some(close)
        } else {
            None
        }
    }
}

/// Lazy, flattened sequence of the leaf parts of a multipart body.
///
/// Nested multipart containers are replaced by their own leaves, in order, at
/// any depth. The first error ends the whole walk; after that, or after the
/// outer close delimiter, the walker only yields `None`.
pub struct MultipartWalker<'a> {
    stack: Vec<BoundaryReader<'a>>,
    observer: &'a dyn Observer,
}

impl<'a> MultipartWalker<'a> {
    pub fn new(body: &'a [u8], boundary: &str, observer: &'a dyn Observer) -> Self {
        Self {
            stack: vec![BoundaryReader::new(body, boundary)],
            observer,
        }
    }
}

impl<'a> Iterator for MultipartWalker<'a> {
    type Item = Result<Part<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.stack.last_mut()?;

            match reader.next_part() {
                None => {
                    self.stack.pop();
                }
                Some(Err(e)) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
                Some(Ok(raw)) => {
                    let (headers, offset) = read_header_block(raw, self.observer);
                    let body = &raw[offset..];

                    match nested_boundary(&headers) {
                        Some(boundary) => self.stack.push(BoundaryReader::new(body, boundary)),
                        None => return Some(Ok(Part { headers, body })),
                    }
                }
            }
        }
    }
}

impl FusedIterator for MultipartWalker<'_> {}

fn nested_boundary(raw: &RawHeaders) -> Option<String> {
    let headers = Headers::from_raw(raw);
    if !headers
        .value("Content-Type")
        .to_ascii_lowercase()
        .contains("multipart")
    {
        return None;
    }

    headers
        .param("Content-Type", "boundary")
        .filter(|b| !b.is_empty())
        .map(str::to_string)
}
