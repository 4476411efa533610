//! The response model: whatever the server sent before closing the connection

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    body: String,
    host: String,
    port: u16,
    query: String,
}

impl Response {
    pub fn new(
        body: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        query: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            host: host.into(),
            port,
            query: query.into(),
        }
    }

    /// Build a response from raw bytes read off the wire
    ///
    /// Bytes outside the ASCII range each become U+FFFD; decoding never fails.
    pub fn from_bytes(
        bytes: &[u8],
        host: impl Into<String>,
        port: u16,
        query: impl Into<String>,
    ) -> Self {
        Self::new(decode_ascii_lossy(bytes), host, port, query)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The wire query that produced this response
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The body split into lines on `\r\n`, `\n` or `\r`
    ///
    /// A final terminator doesn't produce a trailing empty line, but blank lines in the middle
    /// are kept.
    pub fn lines(&self) -> Vec<&str> {
        split_lines(&self.body)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

fn decode_ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}

fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        match rest.find(['\r', '\n']) {
            Some(end) => {
                lines.push(&rest[..end]);
                let terminator = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[end + terminator..];
            }
            None => {
                lines.push(rest);
                break;
            }
        }
    }

    lines
}
