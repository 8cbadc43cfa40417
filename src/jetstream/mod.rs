//! JetStream: the NATS server's built-in persistence layer, layered on top
//! of the core publish/subscribe client as typed JSON requests against a
//! well-known API subject tree.
//!
//! Start from a [Context] scoped to the default `$JS.API` prefix (or a
//! domain/custom prefix), publish through it for delivery guarantees, and
//! manage streams and pull consumers through the same handle.

pub mod consumer;
pub mod context;
pub mod message;
pub mod publish;
pub mod response;
pub mod stream;

pub use consumer::Consumer;
pub use context::Context;
pub use message::JetStreamMessage;
pub use publish::PublishOptions;
pub use response::PubAck;
pub use stream::Stream;

use crate::client::Client;

/// Creates a [Context] rooted at the default `$JS.API` prefix.
pub fn new(client: Client) -> Context {
    Context::new(client)
}

/// Creates a [Context] rooted at `$JS.<domain>.API`.
pub fn with_domain(client: Client, domain: impl AsRef<str>) -> Context {
    Context::with_domain(client, domain)
}

/// Creates a [Context] rooted at a fully custom API prefix.
pub fn with_prefix(client: Client, prefix: impl Into<String>) -> Context {
    Context::with_prefix(client, prefix)
}
