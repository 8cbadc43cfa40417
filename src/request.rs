//! The request/reply broker: mints per-request inbox subjects, tracks
//! pending completions keyed by that exact subject, and races each against
//! a per-call timeout.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::RequestError;
use crate::message::Message;

/// A single in-flight request's completion slot.
struct Pending {
    sender: oneshot::Sender<Result<Message, RequestError>>,
}

#[derive(Default)]
pub struct RequestBroker {
    pending: HashMap<String, Pending>,
}

impl RequestBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request keyed by `reply_subject`, to be
    /// completed through `sender` (owned by the caller, who races it
    /// against a per-call timeout).
    pub fn register(&mut self, reply_subject: String, sender: oneshot::Sender<Result<Message, RequestError>>) {
        self.pending.insert(reply_subject, Pending { sender });
    }

    /// Claims and completes the pending entry for `reply_subject`, if any.
    /// Returns `true` if an entry was found (regardless of whether the
    /// receiver was already dropped).
    pub fn complete(&mut self, reply_subject: &str, result: Result<Message, RequestError>) -> bool {
        if let Some(pending) = self.pending.remove(reply_subject) {
            let _ = pending.sender.send(result);
            true
        } else {
            false
        }
    }

    /// Removes a pending entry without completing it (used by timeout and
    /// cancellation paths, which complete/drop the receiver themselves).
    pub fn remove(&mut self, reply_subject: &str) {
        self.pending.remove(reply_subject);
    }

    pub fn contains(&self, reply_subject: &str) -> bool {
        self.pending.contains_key(reply_subject)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fails every pending request with `Closed` (used by `Client::close`).
    pub fn fail_all_closed(&mut self) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.sender.send(Err(RequestError::Closed));
        }
    }

    /// Whether `subject` falls under the inbox prefix and could be a reply.
    pub fn is_inbox_subject(subject: &str, inbox_prefix: &str) -> bool {
        subject.starts_with(inbox_prefix) && subject[inbox_prefix.len()..].starts_with('.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn msg(subject: &str) -> Message {
        Message {
            subject: subject.to_string(),
            reply: None,
            payload: Bytes::new(),
            headers: None,
        }
    }

    #[tokio::test]
    async fn completes_pending_on_matching_reply() {
        let mut broker = RequestBroker::new();
        let (tx, rx) = oneshot::channel();
        broker.register("_INBOX.abc".to_string(), tx);
        assert!(broker.complete("_INBOX.abc", Ok(msg("_INBOX.abc"))));
        let result = rx.await.unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn remove_drops_without_completing() {
        let mut broker = RequestBroker::new();
        let (tx, _rx) = oneshot::channel();
        broker.register("_INBOX.abc".to_string(), tx);
        broker.remove("_INBOX.abc");
        assert!(!broker.contains("_INBOX.abc"));
    }

    #[tokio::test]
    async fn fail_all_closed_completes_every_pending() {
        let mut broker = RequestBroker::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        broker.register("_INBOX.1".to_string(), tx1);
        broker.register("_INBOX.2".to_string(), tx2);
        broker.fail_all_closed();
        assert_eq!(rx1.await.unwrap().unwrap_err(), RequestError::Closed);
        assert_eq!(rx2.await.unwrap().unwrap_err(), RequestError::Closed);
    }

    #[test]
    fn inbox_subject_detection() {
        assert!(RequestBroker::is_inbox_subject("_INBOX.abc.def", "_INBOX"));
        assert!(!RequestBroker::is_inbox_subject("_INBOXFOO.abc", "_INBOX"));
        assert!(!RequestBroker::is_inbox_subject("other.subject", "_INBOX"));
    }
}
