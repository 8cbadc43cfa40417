//! The subscription multiplexer: SID allocation, inbound-message routing,
//! draining, and auto-unsubscribe accounting.
//!
//! Owned exclusively by the client actor; external code never touches the
//! tables directly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::message::Message;

const DRAIN_WINDOW: std::time::Duration = std::time::Duration::from_millis(500);

pub struct SubState {
    pub subject: String,
    pub queue_group: Option<String>,
    pub sink: mpsc::Sender<Message>,
    pub message_count: u64,
    pub max_messages: Option<u64>,
}

/// Whether a sid was recognized by the multiplexer, for logging purposes
/// only — delivery outcome for draining/unknown sids is always "drop".
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// sid is draining or the manager is closed: dropped, but this was an
    /// expected/known sid.
    KnownDrop,
    /// sid was never registered.
    Unknown,
}

pub struct Multiplexer {
    subs: HashMap<String, SubState>,
    draining: HashSet<String>,
    next_sid: AtomicU64,
    closed: bool,
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplexer {
    pub fn new() -> Self {
        Multiplexer {
            subs: HashMap::new(),
            draining: HashSet::new(),
            next_sid: AtomicU64::new(1),
            closed: false,
        }
    }

    pub fn generate_sid(&self) -> String {
        self.next_sid.fetch_add(1, Ordering::Relaxed).to_string()
    }

    pub fn register(
        &mut self,
        sid: String,
        subject: String,
        queue_group: Option<String>,
        sink: mpsc::Sender<Message>,
    ) {
        self.draining.remove(&sid);
        self.subs.insert(
            sid,
            SubState {
                subject,
                queue_group,
                sink,
                message_count: 0,
                max_messages: None,
            },
        );
    }

    /// Marks `sid` as draining: the channel is dropped (causing the
    /// subscriber stream to end once buffered messages are consumed), the
    /// sid moves to the draining set, and is scheduled for removal from
    /// that set after the drain window so later UNKNOWN lookups don't spam
    /// warnings for genuinely stale sids forever.
    pub fn unregister(&mut self, sid: &str) {
        if self.subs.remove(sid).is_some() {
            self.draining.insert(sid.to_string());
        }
    }

    /// The drain window duration: how long an unregistered sid is kept in
    /// the draining set to silently absorb in-flight frames.
    pub fn drain_window() -> std::time::Duration {
        DRAIN_WINDOW
    }

    /// Removes `sid` from the draining set. Called once the drain window
    /// elapses (the actor schedules this via a self-addressed, delayed
    /// command so the multiplexer itself stays single-owner).
    pub fn expire_draining(&mut self, sid: &str) {
        self.draining.remove(sid);
    }

    pub fn set_auto_unsubscribe(&mut self, sid: &str, max: u64) {
        if let Some(state) = self.subs.get_mut(sid) {
            state.max_messages = Some(max);
        }
    }

    /// Routes `msg` to `sid`. Returns the outcome for logging; callers
    /// should not treat `KnownDrop`/`Unknown` as errors.
    pub async fn deliver(&mut self, sid: &str, msg: Message) -> DeliveryOutcome {
        if self.closed {
            return DeliveryOutcome::KnownDrop;
        }
        if self.draining.contains(sid) {
            return DeliveryOutcome::KnownDrop;
        }

        let finish = {
            let state = match self.subs.get_mut(sid) {
                Some(state) => state,
                None => return DeliveryOutcome::Unknown,
            };
            state.message_count += 1;
            let reached_max = state
                .max_messages
                .map(|max| state.message_count >= max)
                .unwrap_or(false);
            let _ = state.sink.send(msg).await;
            reached_max
        };

        if finish {
            self.unregister(sid);
        }

        DeliveryOutcome::Delivered
    }

    /// Every non-draining subscription, in insertion order, for
    /// post-reconnect resubscription. Sids are monotonically increasing
    /// integers assigned in registration order and never reused, so sorting
    /// numerically reconstructs insertion order without a separate index.
    pub fn active_subscriptions(&self) -> Vec<(String, String, Option<String>)> {
        let mut subs: Vec<(String, String, Option<String>)> = self
            .subs
            .iter()
            .map(|(sid, state)| (sid.clone(), state.subject.clone(), state.queue_group.clone()))
            .collect();
        subs.sort_by_key(|(sid, _, _)| sid.parse::<u64>().unwrap_or(u64::MAX));
        subs
    }

    pub fn finish_all(&mut self) {
        let sids: Vec<String> = self.subs.keys().cloned().collect();
        self.subs.clear();
        self.draining.extend(sids);
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(subject: &str) -> Message {
        Message {
            subject: subject.to_string(),
            reply: None,
            payload: bytes::Bytes::new(),
            headers: None,
        }
    }

    #[tokio::test]
    async fn deliver_routes_and_counts() {
        let mut mux = Multiplexer::new();
        let (tx, mut rx) = mpsc::channel(4);
        let sid = mux.generate_sid();
        mux.register(sid.clone(), "foo".into(), None, tx);

        assert_eq!(mux.deliver(&sid, msg("foo")).await, DeliveryOutcome::Delivered);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unregister_then_deliver_is_known_drop() {
        let mut mux = Multiplexer::new();
        let (tx, _rx) = mpsc::channel(4);
        let sid = mux.generate_sid();
        mux.register(sid.clone(), "foo".into(), None, tx);
        mux.unregister(&sid);

        assert_eq!(mux.deliver(&sid, msg("foo")).await, DeliveryOutcome::KnownDrop);
    }

    #[tokio::test]
    async fn unknown_sid_reports_unknown() {
        let mut mux = Multiplexer::new();
        assert_eq!(mux.deliver("999", msg("foo")).await, DeliveryOutcome::Unknown);
    }

    #[tokio::test]
    async fn auto_unsubscribe_finishes_after_max() {
        let mut mux = Multiplexer::new();
        let (tx, mut rx) = mpsc::channel(8);
        let sid = mux.generate_sid();
        mux.register(sid.clone(), "foo".into(), None, tx);
        mux.set_auto_unsubscribe(&sid, 2);

        assert_eq!(mux.deliver(&sid, msg("foo")).await, DeliveryOutcome::Delivered);
        assert_eq!(mux.deliver(&sid, msg("foo")).await, DeliveryOutcome::Delivered);
        // third delivery: sid has already been unregistered internally.
        assert_eq!(mux.deliver(&sid, msg("foo")).await, DeliveryOutcome::KnownDrop);

        drop(mux);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn finish_all_drops_everything_afterward() {
        let mut mux = Multiplexer::new();
        let (tx, _rx) = mpsc::channel(4);
        let sid = mux.generate_sid();
        mux.register(sid.clone(), "foo".into(), None, tx);

        mux.finish_all();
        assert!(mux.is_closed());
        assert_eq!(mux.deliver(&sid, msg("foo")).await, DeliveryOutcome::KnownDrop);
    }

    #[test]
    fn sids_are_monotonically_increasing_decimal_strings() {
        let mux = Multiplexer::new();
        assert_eq!(mux.generate_sid(), "1");
        assert_eq!(mux.generate_sid(), "2");
        assert_eq!(mux.generate_sid(), "3");
    }
}
