//! Error types for every subsystem boundary.
//!
//! Each error is a `thiserror`-derived enum whose variants line up with the
//! kinds enumerated in the design: connection, protocol, JetStream,
//! credentials and nkey errors. `kind()` returns a small `Copy` enum so
//! callers can match on the failure mode without string comparison.

use std::io;
use std::time::Duration;

/// Errors that can occur while establishing or maintaining a connection.
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("connection refused by {host}:{port}")]
    ConnectionRefused { host: String, port: u16 },
    #[error("DNS resolution failed for {host}")]
    DnsResolutionFailed { host: String },
    #[error("server requires TLS but client is not configured for TLS")]
    TlsRequired,
    #[error("TLS handshake failed: {reason}")]
    TlsHandshakeFailed { reason: String },
    #[error("TLS configuration failed: {reason}")]
    TlsConfigurationFailed { reason: String },
    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },
    #[error("exhausted reconnect attempts ({attempts})")]
    MaxReconnectsExceeded { attempts: u64 },
    #[error("server is shutting down")]
    ServerShuttingDown,
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("connection is closed")]
    Closed,
    #[error("connection is draining")]
    Draining,
    #[error("no servers available")]
    NoServersAvailable,
    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl ConnectError {
    pub fn kind(&self) -> ConnectErrorKind {
        match self {
            ConnectError::InvalidUrl(_) => ConnectErrorKind::InvalidUrl,
            ConnectError::ConnectionRefused { .. } => ConnectErrorKind::ConnectionRefused,
            ConnectError::DnsResolutionFailed { .. } => ConnectErrorKind::DnsResolutionFailed,
            ConnectError::TlsRequired => ConnectErrorKind::TlsRequired,
            ConnectError::TlsHandshakeFailed { .. } => ConnectErrorKind::TlsHandshakeFailed,
            ConnectError::TlsConfigurationFailed { .. } => ConnectErrorKind::TlsConfigurationFailed,
            ConnectError::AuthenticationFailed { .. } => ConnectErrorKind::AuthenticationFailed,
            ConnectError::MaxReconnectsExceeded { .. } => ConnectErrorKind::MaxReconnectsExceeded,
            ConnectError::ServerShuttingDown => ConnectErrorKind::ServerShuttingDown,
            ConnectError::Timeout { .. } => ConnectErrorKind::Timeout,
            ConnectError::Closed => ConnectErrorKind::Closed,
            ConnectError::Draining => ConnectErrorKind::Draining,
            ConnectError::NoServersAvailable => ConnectErrorKind::NoServersAvailable,
            ConnectError::Io { .. } => ConnectErrorKind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    InvalidUrl,
    ConnectionRefused,
    DnsResolutionFailed,
    TlsRequired,
    TlsHandshakeFailed,
    TlsConfigurationFailed,
    AuthenticationFailed,
    MaxReconnectsExceeded,
    ServerShuttingDown,
    Timeout,
    Closed,
    Draining,
    NoServersAvailable,
    Io,
}

impl From<io::Error> for ConnectError {
    fn from(err: io::Error) -> Self {
        ConnectError::Io {
            reason: err.to_string(),
        }
    }
}

/// Errors surfaced by ordinary client operations (publish, subscribe,
/// decoding inbound frames).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid subject: {subject}")]
    InvalidSubject { subject: String },
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },
    #[error("payload too large: {size} > {max}")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("connection is stale")]
    StaleConnection,
    #[error("permission violation for {op} on {subject}")]
    PermissionViolation { op: String, subject: String },
    #[error("server error: {message}")]
    ServerError { message: String },
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },
    #[error("subscription {sid} not found")]
    SubscriptionNotFound { sid: String },
    #[error("no responders for {subject}")]
    NoResponders { subject: String },
    #[error("invalid queue group: {name}")]
    InvalidQueueGroup { name: String },
}

impl ProtocolError {
    pub fn kind(&self) -> ProtocolErrorKind {
        match self {
            ProtocolError::InvalidSubject { .. } => ProtocolErrorKind::InvalidSubject,
            ProtocolError::InvalidHeader { .. } => ProtocolErrorKind::InvalidHeader,
            ProtocolError::PayloadTooLarge { .. } => ProtocolErrorKind::PayloadTooLarge,
            ProtocolError::StaleConnection => ProtocolErrorKind::StaleConnection,
            ProtocolError::PermissionViolation { .. } => ProtocolErrorKind::PermissionViolation,
            ProtocolError::ServerError { .. } => ProtocolErrorKind::ServerError,
            ProtocolError::InvalidMessage { .. } => ProtocolErrorKind::InvalidMessage,
            ProtocolError::SubscriptionNotFound { .. } => ProtocolErrorKind::SubscriptionNotFound,
            ProtocolError::NoResponders { .. } => ProtocolErrorKind::NoResponders,
            ProtocolError::InvalidQueueGroup { .. } => ProtocolErrorKind::InvalidQueueGroup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    InvalidSubject,
    InvalidHeader,
    PayloadTooLarge,
    StaleConnection,
    PermissionViolation,
    ServerError,
    InvalidMessage,
    SubscriptionNotFound,
    NoResponders,
    InvalidQueueGroup,
}

/// Errors from a `request()` call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("no responders for {0}")]
    NoResponders(String),
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("connection is closed")]
    Closed,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// JetStream errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JetStreamError {
    #[error("JetStream is not enabled on the server")]
    NotEnabled,
    #[error("stream {name} not found")]
    StreamNotFound { name: String },
    #[error("consumer {consumer} on stream {stream} not found")]
    ConsumerNotFound { stream: String, consumer: String },
    #[error("message not found")]
    MessageNotFound,
    #[error("duplicate message")]
    DuplicateMessage,
    #[error("invalid ack: {reason}")]
    InvalidAck { reason: String },
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },
    #[error("JetStream API error {code} ({err_code}): {description}")]
    ApiError {
        code: u64,
        err_code: u64,
        description: String,
    },
    #[error("invalid stream configuration")]
    InvalidStreamConfig,
    #[error("invalid consumer configuration")]
    InvalidConsumerConfig,
    #[error("a stream name is required")]
    StreamNameRequired,
    #[error("a consumer name is required")]
    ConsumerNameRequired,
    #[error("invalid stream name: {0}")]
    InvalidStreamName(String),
    #[error("invalid consumer name: {0}")]
    InvalidConsumerName(String),
    #[error("ack failed: {0}")]
    AckFailed(String),
    #[error("pull failed: {0}")]
    PullFailed(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl JetStreamError {
    pub fn kind(&self) -> JetStreamErrorKind {
        use JetStreamError::*;
        match self {
            NotEnabled => JetStreamErrorKind::NotEnabled,
            StreamNotFound { .. } => JetStreamErrorKind::StreamNotFound,
            ConsumerNotFound { .. } => JetStreamErrorKind::ConsumerNotFound,
            MessageNotFound => JetStreamErrorKind::MessageNotFound,
            DuplicateMessage => JetStreamErrorKind::DuplicateMessage,
            InvalidAck { .. } => JetStreamErrorKind::InvalidAck,
            Timeout { .. } => JetStreamErrorKind::Timeout,
            ApiError { .. } => JetStreamErrorKind::ApiError,
            InvalidStreamConfig => JetStreamErrorKind::InvalidStreamConfig,
            InvalidConsumerConfig => JetStreamErrorKind::InvalidConsumerConfig,
            StreamNameRequired => JetStreamErrorKind::StreamNameRequired,
            ConsumerNameRequired => JetStreamErrorKind::ConsumerNameRequired,
            InvalidStreamName(_) => JetStreamErrorKind::InvalidStreamName,
            InvalidConsumerName(_) => JetStreamErrorKind::InvalidConsumerName,
            AckFailed(_) => JetStreamErrorKind::AckFailed,
            PullFailed(_) => JetStreamErrorKind::PullFailed,
            PublishFailed(_) => JetStreamErrorKind::PublishFailed,
            Request(_) => JetStreamErrorKind::Request,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JetStreamErrorKind {
    NotEnabled,
    StreamNotFound,
    ConsumerNotFound,
    MessageNotFound,
    DuplicateMessage,
    InvalidAck,
    Timeout,
    ApiError,
    InvalidStreamConfig,
    InvalidConsumerConfig,
    StreamNameRequired,
    ConsumerNameRequired,
    InvalidStreamName,
    InvalidConsumerName,
    AckFailed,
    PullFailed,
    PublishFailed,
    Request,
}

/// Errors reading a credentials file.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("invalid credentials file format")]
    InvalidFormat,
    #[error("credentials file not found: {path}")]
    FileNotFound { path: String },
    #[error("failed to read credentials file: {reason}")]
    ReadError { reason: String },
}

/// Errors decoding or using an NKey seed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NKeyError {
    #[error("invalid seed: {reason}")]
    InvalidSeed { reason: String },
    #[error("invalid nonce")]
    InvalidNonce,
    #[error("signing failed: {reason}")]
    SigningFailed { reason: String },
}
