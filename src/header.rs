//! An ordered, case-insensitive multimap of message headers, with the
//! status-line semantics NATS overlays onto the header block (`NATS/1.0
//! [status] [description]`).

use std::fmt;

/// A single header value. Kept as a thin wrapper so additional value kinds
/// (binary-safe in the future) don't require a public API break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValue(pub String);

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue(s)
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Header name. Equality and hashing are case-insensitive; the original
/// casing is preserved for serialization.
#[derive(Debug, Clone)]
pub struct HeaderName(pub String);

impl From<&str> for HeaderName {
    fn from(s: &str) -> Self {
        HeaderName(s.to_string())
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}
impl Eq for HeaderName {}

/// Well-known NATS status codes carried on the header status line.
pub mod status {
    pub const NO_MESSAGES: u16 = 404;
    pub const TIMEOUT: u16 = 408;
    pub const NO_RESPONDERS: u16 = 503;
}

/// An ordered, case-insensitive multimap of headers plus an optional status
/// line (`status`, `description`). Preserves insertion order and duplicate
/// names on round-trip; JSON encoding elsewhere in this crate necessarily
/// collapses duplicates, which is documented there, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    pub status: Option<u16>,
    pub description: Option<String>,
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, preserving any existing entries with the same name.
    pub fn insert(&mut self, name: impl Into<HeaderName>, value: impl Into<HeaderValue>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the first value for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        let target = HeaderName::from(name);
        self.entries
            .iter()
            .find(|(n, _)| *n == target)
            .map(|(_, v)| v)
    }

    /// Returns every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HeaderValue> {
        let target = HeaderName::from(name);
        self.entries
            .iter()
            .filter(move |(n, _)| *n == target)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.status.is_none()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Serializes the header block exactly as sent on the wire, without the
    /// trailing CRLF that terminates the block (callers append it).
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"NATS/1.0");
        if let Some(status) = self.status {
            out.extend_from_slice(format!(" {status}").as_bytes());
            if let Some(desc) = &self.description {
                out.push(b' ');
                out.extend_from_slice(desc.as_bytes());
            }
        }
        out.extend_from_slice(b"\r\n");
        for (name, value) in &self.entries {
            out.extend_from_slice(name.0.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.0.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// Parses a header block (as delivered inside HMSG, sans the trailing
    /// payload). Returns `Err` if the block does not begin with `NATS/1.0`.
    pub fn parse(block: &[u8]) -> Result<HeaderMap, crate::error::ProtocolError> {
        let text = std::str::from_utf8(block).map_err(|_| crate::error::ProtocolError::InvalidHeader {
            reason: "header block is not valid UTF-8".to_string(),
        })?;

        let mut lines = text.split("\r\n");
        let status_line = lines.next().unwrap_or("");
        if !status_line.starts_with("NATS/1.0") {
            return Err(crate::error::ProtocolError::InvalidHeader {
                reason: "header block does not start with NATS/1.0".to_string(),
            });
        }

        let mut map = HeaderMap::new();
        let remainder = status_line["NATS/1.0".len()..].trim();
        if !remainder.is_empty() {
            let mut parts = remainder.splitn(2, ' ');
            if let Some(code) = parts.next() {
                match code.parse::<u16>() {
                    Ok(code) => map.status = Some(code),
                    Err(_) => {
                        return Err(crate::error::ProtocolError::InvalidHeader {
                            reason: format!("invalid status code: {code}"),
                        })
                    }
                }
            }
            if let Some(desc) = parts.next() {
                if !desc.is_empty() {
                    map.description = Some(desc.to_string());
                }
            }
        }

        for line in lines {
            if line.is_empty() {
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                let value = value.trim();
                if name.is_empty() {
                    continue;
                }
                map.insert(name, value);
            }
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_order_and_duplicates() {
        let mut map = HeaderMap::new();
        map.insert("Nats-Msg-Id", "1");
        map.insert("X-Custom", "a");
        map.insert("X-Custom", "b");
        let wire = map.to_wire();
        let parsed = HeaderMap::parse(&wire[..wire.len() - 2]).unwrap();
        assert_eq!(
            parsed.get_all("x-custom").map(|v| v.0.clone()).collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(parsed.get("nats-msg-id").unwrap().0, "1");
    }

    #[test]
    fn parses_status_and_description() {
        let parsed = HeaderMap::parse(b"NATS/1.0 503 No Responders\r\n\r\n").unwrap();
        assert_eq!(parsed.status, Some(503));
        assert_eq!(parsed.description.as_deref(), Some("No Responders"));
    }

    #[test]
    fn rejects_block_without_nats_prefix() {
        assert!(HeaderMap::parse(b"X: y\r\n\r\n").is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert("Content-Type", "text/plain");
        assert!(map.get("content-type").is_some());
        assert!(map.get("CONTENT-TYPE").is_some());
    }
}
