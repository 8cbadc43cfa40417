//! The JetStream context: the entry point for stream/consumer management
//! and JetStream-aware publishing, scoped to an API prefix.

use std::time::Duration;

use serde::Serialize;

use crate::client::Client;
use crate::error::JetStreamError;
use crate::jetstream::consumer::{Config as ConsumerConfig, Consumer, Info as ConsumerInfo};
use crate::jetstream::publish::PublishOptions;
use crate::jetstream::response::{decode_response, PubAck};
use crate::jetstream::stream::{Config as StreamConfig, Info as StreamInfo, Stream};

const DEFAULT_API_PREFIX: &str = "$JS.API";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Scopes JetStream operations to an API prefix (plain, domain-qualified, or
/// a fully custom prefix for mirroring across accounts) and a request
/// timeout.
#[derive(Clone)]
pub struct Context {
    pub(crate) client: Client,
    prefix: String,
    timeout: Duration,
}

impl Context {
    pub fn new(client: Client) -> Self {
        Context {
            client,
            prefix: DEFAULT_API_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_domain(client: Client, domain: impl AsRef<str>) -> Self {
        Context {
            client,
            prefix: format!("$JS.{}.API", domain.as_ref()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_prefix(client: Client, prefix: impl Into<String>) -> Self {
        Context {
            client,
            prefix: prefix.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn api_subject(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    /// Issues a typed JetStream API request: `suffix` is appended to the
    /// context's prefix, `body` is serialized as the request payload, and
    /// the response is decoded per [`decode_response`].
    pub(crate) async fn request<T, B>(&self, suffix: &str, body: &B) -> Result<T, JetStreamError>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize,
    {
        let payload = serde_json::to_vec(body).map_err(|err| JetStreamError::ApiError {
            code: 0,
            err_code: 0,
            description: format!("failed to encode JetStream request: {err}"),
        })?;
        let message = self
            .client
            .request_with_headers_and_timeout(self.api_subject(suffix), None, payload, self.timeout)
            .await?;
        decode_response(&message)
    }

    /// Publishes to `subject`, treating the response as a JetStream ack. A
    /// header status of 400 or above is surfaced as `PublishFailed`.
    pub async fn publish(&self, subject: impl Into<String>, payload: impl Into<bytes::Bytes>) -> Result<PubAck, JetStreamError> {
        self.publish_with_options(subject, payload, PublishOptions::new()).await
    }

    pub async fn publish_with_options(
        &self,
        subject: impl Into<String>,
        payload: impl Into<bytes::Bytes>,
        options: PublishOptions,
    ) -> Result<PubAck, JetStreamError> {
        let headers = options.into_headers();
        let message = self
            .client
            .request_with_headers_and_timeout(subject.into(), headers, payload.into(), self.timeout)
            .await?;
        if let Some(status) = message.status() {
            if status >= 400 {
                let description = message
                    .headers
                    .as_ref()
                    .and_then(|h| h.description.clone())
                    .unwrap_or_else(|| format!("publish rejected with status {status}"));
                return Err(JetStreamError::PublishFailed(description));
            }
        }
        decode_response(&message)
    }

    pub async fn create_stream(&self, config: StreamConfig) -> Result<Stream, JetStreamError> {
        if config.name.is_empty() {
            return Err(JetStreamError::StreamNameRequired);
        }
        let info: StreamInfo = self.request(&format!("STREAM.CREATE.{}", config.name), &config).await?;
        Ok(Stream::new(self.clone(), info))
    }

    pub async fn update_stream(&self, config: StreamConfig) -> Result<Stream, JetStreamError> {
        if config.name.is_empty() {
            return Err(JetStreamError::StreamNameRequired);
        }
        let info: StreamInfo = self
            .request(&format!("STREAM.UPDATE.{}", config.name), &config)
            .await
            .map_err(|err| crate::jetstream::stream::not_found_if_404(err, &config.name))?;
        Ok(Stream::new(self.clone(), info))
    }

    pub async fn get_stream(&self, name: impl AsRef<str>) -> Result<Stream, JetStreamError> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(JetStreamError::StreamNameRequired);
        }
        let info: StreamInfo = self
            .request(&format!("STREAM.INFO.{name}"), &())
            .await
            .map_err(|err| crate::jetstream::stream::not_found_if_404(err, name))?;
        Ok(Stream::new(self.clone(), info))
    }

    pub async fn get_or_create_stream(&self, config: StreamConfig) -> Result<Stream, JetStreamError> {
        match self.get_stream(&config.name).await {
            Ok(stream) => Ok(stream),
            Err(JetStreamError::StreamNotFound { .. }) => self.create_stream(config).await,
            Err(err) => Err(err),
        }
    }

    pub async fn delete_stream(&self, name: impl AsRef<str>) -> Result<(), JetStreamError> {
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(default)]
            #[allow(dead_code)]
            success: bool,
        }
        let _: Response = self.request(&format!("STREAM.DELETE.{}", name.as_ref()), &()).await?;
        Ok(())
    }

    pub async fn create_consumer(&self, stream: impl AsRef<str>, config: ConsumerConfig) -> Result<Consumer, JetStreamError> {
        let stream = stream.as_ref();
        if stream.is_empty() {
            return Err(JetStreamError::StreamNameRequired);
        }
        let suffix = match &config.durable_name {
            Some(name) => format!("CONSUMER.DURABLE.CREATE.{stream}.{name}"),
            None => format!("CONSUMER.CREATE.{stream}"),
        };
        let info: ConsumerInfo = self.request(&suffix, &ConsumerCreateRequest { stream_name: stream.to_string(), config }).await?;
        Ok(Consumer::new(self.clone(), stream.to_string(), info))
    }

    pub async fn get_consumer(&self, stream: impl AsRef<str>, name: impl AsRef<str>) -> Result<Consumer, JetStreamError> {
        let (stream, name) = (stream.as_ref(), name.as_ref());
        if stream.is_empty() {
            return Err(JetStreamError::StreamNameRequired);
        }
        if name.is_empty() {
            return Err(JetStreamError::ConsumerNameRequired);
        }
        let info: ConsumerInfo = self
            .request(&format!("CONSUMER.INFO.{stream}.{name}"), &())
            .await
            .map_err(|err| crate::jetstream::consumer::not_found_if_404(err, stream, name))?;
        Ok(Consumer::new(self.clone(), stream.to_string(), info))
    }

    pub async fn delete_consumer(&self, stream: impl AsRef<str>, name: impl AsRef<str>) -> Result<(), JetStreamError> {
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(default)]
            #[allow(dead_code)]
            success: bool,
        }
        let _: Response = self
            .request(&format!("CONSUMER.DELETE.{}.{}", stream.as_ref(), name.as_ref()), &())
            .await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ConsumerCreateRequest {
    stream_name: String,
    config: ConsumerConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefix_is_js_api() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let client = Client::test_handle(tx);
        let ctx = Context::new(client);
        assert_eq!(ctx.api_subject("STREAM.INFO.events"), "$JS.API.STREAM.INFO.events");
    }

    #[test]
    fn domain_prefix_is_rooted_under_the_domain() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let client = Client::test_handle(tx);
        let ctx = Context::with_domain(client, "hub");
        assert_eq!(ctx.api_subject("STREAM.INFO.events"), "$JS.hub.API.STREAM.INFO.events");
    }
}
