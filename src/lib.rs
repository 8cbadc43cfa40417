//! A NATS client: core publish/subscribe and request/reply over the NATS
//! wire protocol, plus a JetStream layer for persistent streams and pull
//! consumers.
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), corenats::error::ConnectError> {
//! let client = corenats::connect("nats://localhost:4222").await?;
//! client.publish("greet.joe", "hello").await.ok();
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod connection;
pub mod error;
mod header;
pub mod jetstream;
mod message;
mod multiplexer;
mod options;
mod proto;
mod reconnect;
mod request;
mod server_info;
mod state;
mod subject;
mod subscriber;
mod tls;
mod url;

pub use auth::{Auth, AuthError};
pub use client::{Client, ClientStats};
pub use error::{ConnectError, CredentialsError, JetStreamError, NKeyError, ProtocolError, RequestError};
pub use header::{HeaderMap, HeaderName, HeaderValue};
pub use message::Message;
pub use options::{ConnectOptions, TlsOptions};
pub use reconnect::ReconnectPolicy;
pub use subscriber::Subscriber;

use std::sync::Arc;

/// Connects to a single server using default options. For a cluster, build
/// a [`ConnectOptions`] with [`ConnectOptions::servers`] instead.
pub async fn connect(server: impl Into<String>) -> Result<Client, ConnectError> {
    ConnectOptions::new().server(server).connect().await
}

/// Connects using a fully built [`ConnectOptions`].
pub async fn connect_with_options(options: ConnectOptions) -> Result<Client, ConnectError> {
    Client::connect(Arc::new(options)).await
}
