//! Stream administration: create/update/delete/purge/get-message, and the
//! `Stream` handle returned by those operations.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use time::OffsetDateTime;

use crate::error::JetStreamError;
use crate::jetstream::consumer::{Consumer, Config as ConsumerConfig};
use crate::jetstream::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    Limits,
    Interest,
    Workqueue,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Limits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    File,
    Memory,
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::File
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DiscardPolicy {
    Old = 0,
    New = 1,
}

impl Default for DiscardPolicy {
    fn default() -> Self {
        DiscardPolicy::Old
    }
}

/// A stream's configuration. Durations are expressed in nanoseconds, as on
/// the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub storage: StorageType,
    #[serde(default)]
    pub discard: DiscardPolicy,
    #[serde(default)]
    pub max_consumers: i64,
    #[serde(default)]
    pub max_msgs: i64,
    #[serde(default)]
    pub max_bytes: i64,
    #[serde(default)]
    pub max_age: i64,
    #[serde(default)]
    pub max_msg_size: i32,
    #[serde(default)]
    pub duplicate_window: i64,
    #[serde(default = "one")]
    pub num_replicas: usize,
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct State {
    #[serde(default)]
    pub messages: u64,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub first_seq: u64,
    #[serde(default)]
    pub last_seq: u64,
    #[serde(default)]
    pub consumer_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Info {
    pub config: Config,
    #[serde(default)]
    pub state: State,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PurgeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub purged: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetMessageResponse {
    pub message: StoredMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoredMessage {
    pub subject: String,
    pub seq: u64,
    #[serde(default)]
    pub data: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

/// A handle to an existing stream, returned by [`Context::get_stream`] and
/// [`Context::create_stream`].
#[derive(Clone)]
pub struct Stream {
    pub(crate) context: Context,
    pub info: Info,
}

impl Stream {
    pub(crate) fn new(context: Context, info: Info) -> Self {
        Stream { context, info }
    }

    pub fn name(&self) -> &str {
        &self.info.config.name
    }

    /// Refreshes `self.info` from the server.
    pub async fn refresh_info(&mut self) -> Result<(), JetStreamError> {
        self.info = self
            .context
            .request(&format!("STREAM.INFO.{}", self.info.config.name), &())
            .await?;
        Ok(())
    }

    /// Updates the stream's configuration on the server and returns the
    /// refreshed handle.
    pub async fn update(&self, config: Config) -> Result<Stream, JetStreamError> {
        self.context.update_stream(config).await
    }

    pub async fn purge(&self) -> Result<u64, JetStreamError> {
        let response: PurgeResponse = self
            .context
            .request(&format!("STREAM.PURGE.{}", self.info.config.name), &())
            .await?;
        Ok(response.purged)
    }

    pub async fn get_message(&self, seq: u64) -> Result<StoredMessage, JetStreamError> {
        #[derive(Serialize)]
        struct Request {
            seq: u64,
        }
        let response: GetMessageResponse = self
            .context
            .request(&format!("STREAM.MSG.GET.{}", self.info.config.name), &Request { seq })
            .await?;
        Ok(response.message)
    }

    pub async fn delete_message(&self, seq: u64) -> Result<(), JetStreamError> {
        #[derive(Serialize)]
        struct Request {
            seq: u64,
        }
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            #[allow(dead_code)]
            success: bool,
        }
        let _: Response = self
            .context
            .request(&format!("STREAM.MSG.DELETE.{}", self.info.config.name), &Request { seq })
            .await?;
        Ok(())
    }

    pub async fn delete(&self) -> Result<(), JetStreamError> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(default)]
            #[allow(dead_code)]
            success: bool,
        }
        let _: Response = self
            .context
            .request(&format!("STREAM.DELETE.{}", self.info.config.name), &())
            .await?;
        Ok(())
    }

    pub async fn create_consumer(&self, config: ConsumerConfig) -> Result<Consumer, JetStreamError> {
        self.context.create_consumer(&self.info.config.name, config).await
    }

    pub async fn get_consumer(&self, name: &str) -> Result<Consumer, JetStreamError> {
        self.context.get_consumer(&self.info.config.name, name).await
    }

    pub async fn get_or_create_consumer(&self, name: &str, config: ConsumerConfig) -> Result<Consumer, JetStreamError> {
        match self.get_consumer(name).await {
            Ok(consumer) => Ok(consumer),
            Err(err) if err.kind() == crate::error::JetStreamErrorKind::ConsumerNotFound => {
                self.create_consumer(config).await
            }
            Err(err) => Err(err),
        }
    }
}

pub(crate) fn not_found_if_404(err: JetStreamError, stream: &str) -> JetStreamError {
    match &err {
        JetStreamError::ApiError { err_code, .. } if *err_code == 10059 => JetStreamError::StreamNotFound {
            name: stream.to_string(),
        },
        _ => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_server_defaults() {
        let config = Config::default();
        assert_eq!(config.retention, RetentionPolicy::Limits);
        assert_eq!(config.storage, StorageType::File);
        assert_eq!(config.num_replicas, 0);
    }

    #[test]
    fn retention_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RetentionPolicy::Workqueue).unwrap(), "\"workqueue\"");
    }
}
