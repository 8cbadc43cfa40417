//! Per-publish options that attach JetStream de-duplication and
//! optimistic-concurrency headers.

use crate::header::HeaderMap;

pub const HEADER_MSG_ID: &str = "Nats-Msg-Id";
pub const HEADER_EXPECTED_STREAM: &str = "Nats-Expected-Stream";
pub const HEADER_EXPECTED_LAST_MSG_ID: &str = "Nats-Expected-Last-Msg-Id";
pub const HEADER_EXPECTED_LAST_SEQUENCE: &str = "Nats-Expected-Last-Sequence";
pub const HEADER_EXPECTED_LAST_SUBJECT_SEQUENCE: &str = "Nats-Expected-Last-Subject-Sequence";

/// Options controlling a JetStream-aware publish: message deduplication and
/// optimistic-concurrency expectations, each surfaced as a header.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub msg_id: Option<String>,
    pub expected_stream: Option<String>,
    pub expected_last_msg_id: Option<String>,
    pub expected_last_sequence: Option<u64>,
    pub expected_last_subject_sequence: Option<u64>,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn msg_id(mut self, id: impl Into<String>) -> Self {
        self.msg_id = Some(id.into());
        self
    }

    pub fn expected_stream(mut self, name: impl Into<String>) -> Self {
        self.expected_stream = Some(name.into());
        self
    }

    pub fn expected_last_msg_id(mut self, id: impl Into<String>) -> Self {
        self.expected_last_msg_id = Some(id.into());
        self
    }

    pub fn expected_last_sequence(mut self, seq: u64) -> Self {
        self.expected_last_sequence = Some(seq);
        self
    }

    pub fn expected_last_subject_sequence(mut self, seq: u64) -> Self {
        self.expected_last_subject_sequence = Some(seq);
        self
    }

    /// Whether any option is set; an empty `PublishOptions` needs no
    /// header block at all.
    pub fn is_empty(&self) -> bool {
        self.msg_id.is_none()
            && self.expected_stream.is_none()
            && self.expected_last_msg_id.is_none()
            && self.expected_last_sequence.is_none()
            && self.expected_last_subject_sequence.is_none()
    }

    pub(crate) fn into_headers(self) -> Option<HeaderMap> {
        if self.is_empty() {
            return None;
        }
        let mut headers = HeaderMap::new();
        if let Some(id) = self.msg_id {
            headers.insert(HEADER_MSG_ID, id);
        }
        if let Some(stream) = self.expected_stream {
            headers.insert(HEADER_EXPECTED_STREAM, stream);
        }
        if let Some(id) = self.expected_last_msg_id {
            headers.insert(HEADER_EXPECTED_LAST_MSG_ID, id);
        }
        if let Some(seq) = self.expected_last_sequence {
            headers.insert(HEADER_EXPECTED_LAST_SEQUENCE, seq.to_string());
        }
        if let Some(seq) = self.expected_last_subject_sequence {
            headers.insert(HEADER_EXPECTED_LAST_SUBJECT_SEQUENCE, seq.to_string());
        }
        Some(headers)
    }
}
