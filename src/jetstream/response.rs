//! Decoding for JetStream API responses: the `error` envelope, the no-
//! responders fast path, and the generic success payload.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::JetStreamError;
use crate::header::status;
use crate::message::Message;
use crate::server_info::ApiErrorBody;

/// Acknowledgement returned by a JetStream-aware publish.
#[derive(Debug, Clone, Deserialize)]
pub struct PubAck {
    pub stream: String,
    pub seq: u64,
    #[serde(default)]
    pub duplicate: bool,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Decodes a JetStream API response, per the inspection order in the
/// design: a 503 status means the account has no JetStream enabled, an
/// `error` object in the body is a typed API error, otherwise the body
/// decodes into `T`.
pub fn decode_response<T: DeserializeOwned>(message: &Message) -> Result<T, JetStreamError> {
    if message.status() == Some(status::NO_RESPONDERS) {
        return Err(JetStreamError::NotEnabled);
    }

    let raw: serde_json::Value = serde_json::from_slice(&message.payload).map_err(|err| JetStreamError::ApiError {
        code: 0,
        err_code: 0,
        description: format!("invalid JetStream response body: {err}"),
    })?;

    if let Some(error) = raw.get("error") {
        let body: ApiErrorBody = serde_json::from_value(error.clone()).map_err(|err| JetStreamError::ApiError {
            code: 0,
            err_code: 0,
            description: format!("invalid JetStream error body: {err}"),
        })?;
        return Err(JetStreamError::ApiError {
            code: body.code,
            err_code: body.err_code,
            description: body.description,
        });
    }

    serde_json::from_value(raw).map_err(|err| JetStreamError::ApiError {
        code: 0,
        err_code: 0,
        description: format!("unexpected JetStream response shape: {err}"),
    })
}
