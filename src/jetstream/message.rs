//! A JetStream-delivered message: the underlying [`crate::Message`] plus
//! metadata parsed from its ack subject, and the ack operations.

use bytes::Bytes;

use crate::client::Client;
use crate::error::JetStreamError;
use crate::message::Message;

/// Metadata parsed from a JetStream ack subject of the form
/// `$JS.ACK.<stream>.<consumer>.<num_delivered>.<stream_seq>.<consumer_seq>.<timestamp_ns>.<num_pending>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub stream: String,
    pub consumer: String,
    pub num_delivered: u64,
    pub stream_seq: u64,
    pub consumer_seq: u64,
    pub timestamp_ns: i128,
    pub num_pending: u64,
}

/// Parses an ack subject into [`Metadata`]. Subjects that don't begin with
/// `$JS.ACK` or don't carry at least 9 dot-separated tokens are not
/// JetStream ack subjects and yield `None`.
pub fn parse_ack_subject(subject: &str) -> Option<Metadata> {
    let tokens: Vec<&str> = subject.split('.').collect();
    if tokens.len() < 9 || tokens[0] != "$JS" || tokens[1] != "ACK" {
        return None;
    }

    let tail = &tokens[tokens.len() - 7..];
    let stream = tail[0].to_string();
    let consumer = tail[1].to_string();
    let num_delivered = tail[2].parse().ok()?;
    let stream_seq = tail[3].parse().ok()?;
    let consumer_seq = tail[4].parse().ok()?;
    let timestamp_ns = tail[5].parse().ok()?;
    let num_pending = tail[6].parse().ok()?;

    Some(Metadata {
        stream,
        consumer,
        num_delivered,
        stream_seq,
        consumer_seq,
        timestamp_ns,
        num_pending,
    })
}

/// A message delivered by a pull consumer, carrying the parsed ack-subject
/// metadata alongside the underlying message.
pub struct JetStreamMessage {
    pub message: Message,
    pub metadata: Metadata,
    client: Client,
}

impl JetStreamMessage {
    pub(crate) fn new(message: Message, metadata: Metadata, client: Client) -> Self {
        JetStreamMessage { message, metadata, client }
    }

    pub fn payload(&self) -> &Bytes {
        &self.message.payload
    }

    pub fn subject(&self) -> &str {
        &self.message.subject
    }

    async fn ack_reply(&self, body: Bytes) -> Result<(), JetStreamError> {
        let reply = self
            .message
            .reply
            .as_ref()
            .ok_or_else(|| JetStreamError::InvalidAck {
                reason: "no reply subject".to_string(),
            })?;
        self.client
            .publish(reply.clone(), body)
            .await
            .map_err(|err| JetStreamError::AckFailed(err.to_string()))
    }

    /// Acknowledges the message: it will not be redelivered.
    pub async fn ack(&self) -> Result<(), JetStreamError> {
        self.ack_reply(Bytes::from_static(b"+ACK")).await
    }

    /// Signals the message was not processed and should be redelivered,
    /// optionally after `delay`.
    pub async fn nak(&self, delay: Option<std::time::Duration>) -> Result<(), JetStreamError> {
        let body = match delay {
            Some(delay) => Bytes::from(format!("-NAK {{\"delay\": {}}}", delay.as_nanos())),
            None => Bytes::from_static(b"-NAK"),
        };
        self.ack_reply(body).await
    }

    /// Signals that processing is ongoing, extending the ack-wait window by
    /// another period.
    pub async fn in_progress(&self) -> Result<(), JetStreamError> {
        self.ack_reply(Bytes::from_static(b"+WPI")).await
    }

    /// Instructs the server to stop redelivering the message without
    /// marking it successfully processed.
    pub async fn term(&self) -> Result<(), JetStreamError> {
        self.ack_reply(Bytes::from_static(b"+TERM")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ack_subject() {
        let subject = "$JS.ACK.events.pull-consumer.1.42.7.1690000000000000000.3";
        let metadata = parse_ack_subject(subject).unwrap();
        assert_eq!(metadata.stream, "events");
        assert_eq!(metadata.consumer, "pull-consumer");
        assert_eq!(metadata.num_delivered, 1);
        assert_eq!(metadata.stream_seq, 42);
        assert_eq!(metadata.consumer_seq, 7);
        assert_eq!(metadata.num_pending, 3);
    }

    #[test]
    fn rejects_subjects_without_js_ack_prefix() {
        assert!(parse_ack_subject("foo.bar.baz.qux.1.2.3.4.5").is_none());
    }

    #[test]
    fn rejects_too_few_tokens() {
        assert!(parse_ack_subject("$JS.ACK.events.consumer").is_none());
    }

    #[test]
    fn tolerates_extra_leading_tokens_from_domain_hashing() {
        let subject = "$JS.ACK.hub.abcd1234.events.pull-consumer.1.42.7.1690000000000000000.3";
        let metadata = parse_ack_subject(subject).unwrap();
        assert_eq!(metadata.stream, "events");
        assert_eq!(metadata.consumer, "pull-consumer");
    }
}
