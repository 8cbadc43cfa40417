//! The cold, cancellable message stream returned by `Client::subscribe`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::client::Command;
use crate::message::Message;

/// A handle to a live subscription. Implements [`Stream`] for ergonomic
/// `while let Some(msg) = subscriber.next().await` consumption.
pub struct Subscriber {
    sid: String,
    receiver: mpsc::Receiver<Message>,
    commands: mpsc::Sender<Command>,
    unsubscribed: bool,
}

impl Subscriber {
    pub(crate) fn new(sid: String, receiver: mpsc::Receiver<Message>, commands: mpsc::Sender<Command>) -> Self {
        Subscriber {
            sid,
            receiver,
            commands,
            unsubscribed: false,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Unsubscribes immediately, draining any already-buffered messages
    /// from the stream before it ends.
    pub async fn unsubscribe(&mut self) {
        if self.unsubscribed {
            return;
        }
        self.unsubscribed = true;
        let _ = self
            .commands
            .send(Command::Unsubscribe {
                sid: self.sid.clone(),
                max_messages: None,
            })
            .await;
    }

    /// Unsubscribes after `after` more messages have been delivered.
    pub async fn unsubscribe_after(&mut self, after: u64) {
        if self.unsubscribed {
            return;
        }
        let _ = self
            .commands
            .send(Command::Unsubscribe {
                sid: self.sid.clone(),
                max_messages: Some(after),
            })
            .await;
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if self.unsubscribed {
            return;
        }
        let sid = self.sid.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let _ = commands
                .send(Command::Unsubscribe {
                    sid,
                    max_messages: None,
                })
                .await;
        });
    }
}

impl Stream for Subscriber {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
