//! The inbound message type delivered to subscribers.

use bytes::Bytes;

use crate::header::HeaderMap;

/// A message received on a subject, delivered via a subscription or as a
/// request reply.
///
/// The payload is `Bytes`-backed so it can be sliced out of the
/// connection's read buffer without copying.
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub reply: Option<String>,
    pub payload: Bytes,
    pub headers: Option<HeaderMap>,
}

impl Message {
    pub fn status(&self) -> Option<u16> {
        self.headers.as_ref().and_then(|h| h.status)
    }
}
