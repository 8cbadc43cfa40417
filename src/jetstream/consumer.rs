//! Pull consumer administration and the `fetch` loop.

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::JetStreamError;
use crate::jetstream::context::Context;
use crate::jetstream::message::{parse_ack_subject, JetStreamMessage};
use crate::subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverPolicy {
    All,
    Last,
    New,
    LastPerSubject,
}

impl Default for DeliverPolicy {
    fn default() -> Self {
        DeliverPolicy::All
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    None,
    All,
    Explicit,
}

impl Default for AckPolicy {
    fn default() -> Self {
        AckPolicy::Explicit
    }
}

/// Configuration for a pull consumer. Durations are nanoseconds, as on the
/// wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_name: Option<String>,
    #[serde(default)]
    pub deliver_policy: DeliverPolicy,
    #[serde(default)]
    pub ack_policy: AckPolicy,
    #[serde(default)]
    pub ack_wait: i64,
    #[serde(default)]
    pub max_deliver: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_subject: Option<String>,
    #[serde(default)]
    pub max_ack_pending: i64,
    #[serde(default)]
    pub max_waiting: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    pub name: String,
    pub stream_name: String,
    pub config: Config,
    #[serde(default)]
    pub num_pending: u64,
    #[serde(default)]
    pub num_ack_pending: u64,
    #[serde(default)]
    pub num_redelivered: u64,
}

#[derive(Serialize)]
struct NextMessageRequest {
    batch: usize,
    expires: i64,
}

/// A handle to a pull consumer, returned by [`Context::create_consumer`]
/// and [`Context::get_consumer`].
#[derive(Clone)]
pub struct Consumer {
    context: Context,
    stream: String,
    pub info: Info,
}

impl Consumer {
    pub(crate) fn new(context: Context, stream: String, info: Info) -> Self {
        Consumer { context, stream, info }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub async fn refresh_info(&mut self) -> Result<(), JetStreamError> {
        self.info = self
            .context
            .request(&format!("CONSUMER.INFO.{}.{}", self.stream, self.info.name), &())
            .await?;
        Ok(())
    }

    pub async fn delete(&self) -> Result<(), JetStreamError> {
        self.context.delete_consumer(&self.stream, &self.info.name).await
    }

    /// Pulls up to `batch` messages, waiting at most `max_wait` for them to
    /// arrive. Returns whatever was collected before the batch filled, the
    /// deadline passed, or the server sent a terminal status.
    pub async fn fetch(&self, batch: usize, max_wait: Duration) -> Result<Vec<JetStreamMessage>, JetStreamError> {
        let inbox = subject::new_inbox("_INBOX");
        let mut subscriber = self
            .context
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|err| JetStreamError::PullFailed(err.to_string()))?;

        let request = NextMessageRequest {
            batch,
            expires: max_wait.as_nanos() as i64,
        };
        let payload = serde_json::to_vec(&request).map_err(|err| JetStreamError::PullFailed(err.to_string()))?;
        let next_subject = format!("CONSUMER.MSG.NEXT.{}.{}", self.stream, self.info.name);

        self.context
            .client
            .publish_with_reply(
                self.context.api_subject(&next_subject),
                inbox,
                payload,
            )
            .await
            .map_err(|err| JetStreamError::PullFailed(err.to_string()))?;

        let mut collected = Vec::with_capacity(batch);
        let deadline = tokio::time::Instant::now() + max_wait;

        while collected.len() < batch {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let message = match tokio::time::timeout(remaining, subscriber.next()).await {
                Ok(Some(message)) => message,
                Ok(None) | Err(_) => break,
            };

            if let Some(status) = message.status() {
                if status == 404 || status == 408 || status >= 400 {
                    break;
                }
            }

            let Some(reply) = message.reply.clone() else {
                continue;
            };
            let Some(metadata) = parse_ack_subject(&reply) else {
                continue;
            };

            collected.push(JetStreamMessage::new(message, metadata, self.context.client.clone()));
        }

        subscriber.unsubscribe().await;
        Ok(collected)
    }
}

pub(crate) fn not_found_if_404(err: JetStreamError, stream: &str, consumer: &str) -> JetStreamError {
    match &err {
        JetStreamError::ApiError { err_code, .. } if *err_code == 10014 => JetStreamError::ConsumerNotFound {
            stream: stream.to_string(),
            consumer: consumer.to_string(),
        },
        _ => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_policy_defaults_to_explicit() {
        assert_eq!(Config::default().ack_policy, AckPolicy::Explicit);
    }

    #[test]
    fn durable_name_is_omitted_from_json_when_absent() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("durable_name"));
    }
}
