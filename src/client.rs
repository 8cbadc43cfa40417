//! The client actor: owns the connection, the subscription multiplexer and
//! the request broker, and drives the reconnect loop. [`Client`] is a
//! cheap-clone handle that talks to the actor over a command channel; it
//! never touches the connection or the subscription/request tables itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::auth::Auth;
use crate::connection::Connection;
use crate::error::{ConnectError, ProtocolError, RequestError};
use crate::header::{self, HeaderMap};
use crate::message::Message;
use crate::multiplexer::{DeliveryOutcome, Multiplexer};
use crate::options::ConnectOptions;
use crate::proto::{ClientOp, ServerOp};
use crate::request::RequestBroker;
use crate::server_info::{ConnectInfo, ServerInfo};
use crate::state::{ConnectionEvent, ConnectionState};
use crate::subject::{self, validate_publish_subject, validate_queue_group, validate_subscribe_subject};
use crate::subscriber::Subscriber;
use crate::url::{parse_servers, ServerAddr};

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 512;
const INBOX_SID: &str = "inbox";

/// Messages sent from a [`Client`] handle to the actor. Never constructed
/// outside this crate.
pub(crate) enum Command {
    Publish {
        subject: String,
        payload: Bytes,
        reply: Option<String>,
        headers: Option<HeaderMap>,
    },
    Subscribe {
        subject: String,
        queue_group: Option<String>,
        respond: oneshot::Sender<Result<(String, mpsc::Receiver<Message>), ProtocolError>>,
    },
    Unsubscribe {
        sid: String,
        max_messages: Option<u64>,
    },
    Request {
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
        reply_subject: String,
        sender: oneshot::Sender<Result<Message, RequestError>>,
    },
    CancelRequest {
        reply_subject: String,
    },
    Flush {
        respond: oneshot::Sender<()>,
    },
    Drain {
        respond: oneshot::Sender<()>,
    },
    Close {
        respond: oneshot::Sender<()>,
    },
    ExpireDraining {
        sid: String,
    },
}

/// State shared between the actor and every cloned `Client` handle: the
/// connection state machine (behind a short-lived std mutex, never held
/// across an await) and the message counters.
struct Shared {
    state: Mutex<ConnectionState>,
    sent: AtomicU64,
    received: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Shared {
            state: Mutex::new(ConnectionState::Disconnected),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    fn apply(&self, event: ConnectionEvent) {
        self.state.lock().unwrap().apply(event);
    }
}

/// Point-in-time counters for messages handed to/received from the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientStats {
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// A connection to a NATS server. Cheap to clone: every clone shares the
/// same underlying actor task and connection.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    inbox_prefix: Arc<str>,
    default_request_timeout: Duration,
}

impl Client {
    /// Dials the configured server list (first reachable one wins),
    /// completes the INFO/TLS/CONNECT handshake, and spawns the actor task
    /// that owns the connection for the rest of its life.
    pub async fn connect(options: Arc<ConnectOptions>) -> Result<Client, ConnectError> {
        let addrs = parse_servers(&options.servers)?;
        if addrs.is_empty() {
            return Err(ConnectError::NoServersAvailable);
        }

        let shared = Arc::new(Shared::new());
        shared.apply(ConnectionEvent::Connect);

        let (conn, info) = connect_and_handshake(&addrs, &options).await?;
        shared.apply(ConnectionEvent::Connected(info));

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let actor = Actor {
            options: options.clone(),
            addrs,
            conn: Some(conn),
            mux: Multiplexer::new(),
            requests: RequestBroker::new(),
            shared: shared.clone(),
            commands: cmd_rx,
            self_commands: cmd_tx.clone(),
            inbox_prefix: options.inbox_prefix.clone(),
            inbox_sid: None,
            pings_out: 0,
            reconnect_attempt: 0,
            flush_waiters: Vec::new(),
        };
        tokio::spawn(actor.run());

        Ok(Client {
            commands: cmd_tx,
            shared,
            inbox_prefix: Arc::from(options.inbox_prefix.as_str()),
            default_request_timeout: options.request_timeout,
        })
    }

    pub async fn publish(&self, subject: impl Into<String>, payload: impl Into<Bytes>) -> Result<(), ProtocolError> {
        self.publish_inner(subject.into(), payload.into(), None, None).await
    }

    pub async fn publish_with_reply(
        &self,
        subject: impl Into<String>,
        reply: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Result<(), ProtocolError> {
        self.publish_inner(subject.into(), payload.into(), Some(reply.into()), None).await
    }

    pub async fn publish_with_headers(
        &self,
        subject: impl Into<String>,
        headers: HeaderMap,
        payload: impl Into<Bytes>,
    ) -> Result<(), ProtocolError> {
        self.publish_inner(subject.into(), payload.into(), None, Some(headers)).await
    }

    async fn publish_inner(
        &self,
        subject: String,
        payload: Bytes,
        reply: Option<String>,
        headers: Option<HeaderMap>,
    ) -> Result<(), ProtocolError> {
        validate_publish_subject(&subject)?;
        if let Some(reply) = &reply {
            validate_publish_subject(reply)?;
        }
        if !self.shared.state.lock().unwrap().can_accept_operations() {
            return Err(ProtocolError::ServerError {
                message: "Not connected".to_string(),
            });
        }
        let _ = self
            .commands
            .send(Command::Publish {
                subject,
                payload,
                reply,
                headers,
            })
            .await;
        Ok(())
    }

    /// Subscribes to `subject`. Dropping the returned [`Subscriber`]
    /// unsubscribes automatically.
    pub async fn subscribe(&self, subject: impl Into<String>) -> Result<Subscriber, ProtocolError> {
        self.subscribe_inner(subject.into(), None).await
    }

    pub async fn queue_subscribe(
        &self,
        subject: impl Into<String>,
        queue_group: impl Into<String>,
    ) -> Result<Subscriber, ProtocolError> {
        self.subscribe_inner(subject.into(), Some(queue_group.into())).await
    }

    async fn subscribe_inner(&self, subject: String, queue_group: Option<String>) -> Result<Subscriber, ProtocolError> {
        validate_subscribe_subject(&subject)?;
        if let Some(queue) = &queue_group {
            validate_queue_group(queue)?;
        }

        let closed = || ProtocolError::ServerError {
            message: "client is closed".to_string(),
        };

        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe {
                subject,
                queue_group,
                respond: tx,
            })
            .await
            .map_err(|_| closed())?;

        let (sid, receiver) = rx.await.map_err(|_| closed())??;
        Ok(Subscriber::new(sid, receiver, self.commands.clone()))
    }

    pub async fn request(&self, subject: impl Into<String>, payload: impl Into<Bytes>) -> Result<Message, RequestError> {
        self.request_inner(subject.into(), payload.into(), None, self.default_request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        subject: impl Into<String>,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Message, RequestError> {
        self.request_inner(subject.into(), payload.into(), None, timeout).await
    }

    pub async fn request_with_headers(
        &self,
        subject: impl Into<String>,
        headers: HeaderMap,
        payload: impl Into<Bytes>,
    ) -> Result<Message, RequestError> {
        self.request_inner(subject.into(), payload.into(), Some(headers), self.default_request_timeout)
            .await
    }

    /// Like [`Client::request_with_headers`], but with an explicit timeout.
    /// Used by the JetStream context, which has its own default timeout
    /// distinct from the core client's.
    pub(crate) async fn request_with_headers_and_timeout(
        &self,
        subject: impl Into<String>,
        headers: Option<HeaderMap>,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Message, RequestError> {
        self.request_inner(subject.into(), payload.into(), headers, timeout).await
    }

    async fn request_inner(
        &self,
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
        timeout: Duration,
    ) -> Result<Message, RequestError> {
        validate_publish_subject(&subject)?;
        let reply_subject = subject::new_inbox(&self.inbox_prefix);
        let (tx, rx) = oneshot::channel();

        let sent = self
            .commands
            .send(Command::Request {
                subject,
                payload,
                headers,
                reply_subject: reply_subject.clone(),
                sender: tx,
            })
            .await;
        if sent.is_err() {
            return Err(RequestError::Closed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RequestError::Closed),
            Err(_) => {
                let _ = self.commands.send(Command::CancelRequest { reply_subject }).await;
                Err(RequestError::Timeout { after: timeout })
            }
        }
    }

    /// Sends a PING and waits for the matching PONG, so every write queued
    /// before this call is confirmed to have left the socket.
    pub async fn flush(&self) -> Result<(), ConnectError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush { respond: tx })
            .await
            .map_err(|_| ConnectError::Closed)?;
        rx.await.map_err(|_| ConnectError::Closed)
    }

    /// Stops accepting new subscriptions, unsubscribes from everything, and
    /// closes once the drain timeout elapses.
    pub async fn drain(&self) -> Result<(), ConnectError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Drain { respond: tx })
            .await
            .map_err(|_| ConnectError::Closed)?;
        rx.await.map_err(|_| ConnectError::Closed)
    }

    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Close { respond: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().unwrap().can_accept_operations()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().unwrap().is_closed()
    }

    /// Builds a `Client` around a bare command channel with no running
    /// actor, for unit tests in other modules that only need to observe
    /// subject construction or validation, not live delivery.
    #[cfg(test)]
    pub(crate) fn test_handle(commands: mpsc::Sender<Command>) -> Client {
        Client {
            commands,
            shared: Arc::new(Shared::new()),
            inbox_prefix: Arc::from("_INBOX"),
            default_request_timeout: Duration::from_secs(1),
        }
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            messages_sent: self.shared.sent.load(Ordering::Relaxed),
            messages_received: self.shared.received.load(Ordering::Relaxed),
        }
    }
}

/// The actor owning the connection and every piece of mutable client state.
/// Runs as a single spawned task for the lifetime of the client.
struct Actor {
    options: Arc<ConnectOptions>,
    addrs: Vec<ServerAddr>,
    conn: Option<Connection>,
    mux: Multiplexer,
    requests: RequestBroker,
    shared: Arc<Shared>,
    commands: mpsc::Receiver<Command>,
    self_commands: mpsc::Sender<Command>,
    inbox_prefix: String,
    inbox_sid: Option<String>,
    pings_out: u32,
    reconnect_attempt: u64,
    flush_waiters: Vec<oneshot::Sender<()>>,
}

enum ConnOutcome {
    Op(ServerOp),
    Closed,
    Error(ConnectError),
}

async fn read_or_pending(conn: &mut Option<Connection>) -> ConnOutcome {
    match conn {
        Some(c) => match c.read_op().await {
            Ok(Some(op)) => ConnOutcome::Op(op),
            Ok(None) => ConnOutcome::Closed,
            Err(err) => ConnOutcome::Error(err),
        },
        None => std::future::pending::<ConnOutcome>().await,
    }
}

impl Actor {
    async fn run(mut self) {
        let mut ping_timer = tokio::time::interval(self.options.ping_interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping_timer.reset();

        loop {
            if self.conn.is_none() && !self.reconnect().await {
                break;
            }

            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await {
                                self.shutdown().await;
                                return;
                            }
                        }
                        None => break,
                    }
                }

                outcome = read_or_pending(&mut self.conn) => {
                    match outcome {
                        ConnOutcome::Op(op) => self.handle_server_op(op).await,
                        ConnOutcome::Closed => {
                            tracing::debug!("connection closed by peer");
                            self.conn = None;
                        }
                        ConnOutcome::Error(err) => {
                            tracing::warn!(error = %err, "connection read failed");
                            self.conn = None;
                        }
                    }
                }

                _ = ping_timer.tick() => {
                    self.tick_ping().await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.shutdown().await;
        }
        self.conn = None;
        self.mux.finish_all();
        self.requests.fail_all_closed();
        for tx in self.flush_waiters.drain(..) {
            let _ = tx.send(());
        }
        self.shared.apply(ConnectionEvent::Close);
    }

    /// Returns `true` if the actor should stop after this command.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Publish {
                subject,
                payload,
                reply,
                headers,
            } => {
                self.send_publish(subject, payload, reply, headers).await;
                false
            }
            Command::Subscribe {
                subject,
                queue_group,
                respond,
            } => {
                self.handle_subscribe(subject, queue_group, respond).await;
                false
            }
            Command::Unsubscribe { sid, max_messages } => {
                self.handle_unsubscribe(sid, max_messages).await;
                false
            }
            Command::Request {
                subject,
                payload,
                headers,
                reply_subject,
                sender,
            } => {
                self.handle_request(subject, payload, headers, reply_subject, sender).await;
                false
            }
            Command::CancelRequest { reply_subject } => {
                self.requests.remove(&reply_subject);
                false
            }
            Command::Flush { respond } => {
                self.handle_flush(respond).await;
                false
            }
            Command::Drain { respond } => {
                self.handle_drain(respond).await;
                true
            }
            Command::Close { respond } => {
                let _ = respond.send(());
                true
            }
            Command::ExpireDraining { sid } => {
                self.mux.expire_draining(&sid);
                false
            }
        }
    }

    async fn send_publish(&mut self, subject: String, payload: Bytes, reply: Option<String>, headers: Option<HeaderMap>) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        let op = match headers {
            Some(h) => ClientOp::Hpub {
                subject,
                reply,
                headers: h,
                payload,
            },
            None => ClientOp::Pub { subject, reply, payload },
        };
        conn.enqueue(&op);
        match conn.flush().await {
            Ok(()) => {
                self.shared.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::warn!(error = %err, "publish flush failed");
                self.conn = None;
            }
        }
    }

    async fn handle_subscribe(
        &mut self,
        subject: String,
        queue_group: Option<String>,
        respond: oneshot::Sender<Result<(String, mpsc::Receiver<Message>), ProtocolError>>,
    ) {
        let sid = self.mux.generate_sid();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.mux.register(sid.clone(), subject.clone(), queue_group.clone(), tx);

        if let Some(conn) = self.conn.as_mut() {
            conn.enqueue(&ClientOp::Sub {
                subject,
                queue_group,
                sid: sid.clone(),
            });
            let _ = conn.flush().await;
        }

        let _ = respond.send(Ok((sid, rx)));
    }

    async fn handle_unsubscribe(&mut self, sid: String, max_messages: Option<u64>) {
        match max_messages {
            Some(max) => {
                self.mux.set_auto_unsubscribe(&sid, max);
                if let Some(conn) = self.conn.as_mut() {
                    conn.enqueue(&ClientOp::Unsub {
                        sid,
                        max_messages: Some(max),
                    });
                    let _ = conn.flush().await;
                }
            }
            None => {
                self.mux.unregister(&sid);
                if let Some(conn) = self.conn.as_mut() {
                    conn.enqueue(&ClientOp::Unsub {
                        sid: sid.clone(),
                        max_messages: None,
                    });
                    let _ = conn.flush().await;
                }
                self.schedule_drain_expiry(sid);
            }
        }
    }

    fn schedule_drain_expiry(&self, sid: String) {
        let tx = self.self_commands.clone();
        let window = Multiplexer::drain_window();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(Command::ExpireDraining { sid }).await;
        });
    }

    async fn handle_request(
        &mut self,
        subject: String,
        payload: Bytes,
        headers: Option<HeaderMap>,
        reply_subject: String,
        sender: oneshot::Sender<Result<Message, RequestError>>,
    ) {
        if self.conn.is_none() {
            let _ = sender.send(Err(RequestError::Closed));
            return;
        }

        self.ensure_inbox_subscription().await;
        self.requests.register(reply_subject.clone(), sender);

        let conn = self.conn.as_mut().expect("checked above");
        let op = match headers {
            Some(h) => ClientOp::Hpub {
                subject,
                reply: Some(reply_subject.clone()),
                headers: h,
                payload,
            },
            None => ClientOp::Pub {
                subject,
                reply: Some(reply_subject.clone()),
                payload,
            },
        };
        conn.enqueue(&op);

        match conn.flush().await {
            Ok(()) => {
                self.shared.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::warn!(error = %err, "request flush failed");
                self.requests.remove(&reply_subject);
                self.conn = None;
            }
        }
    }

    async fn ensure_inbox_subscription(&mut self) {
        if self.inbox_sid.is_some() {
            return;
        }
        self.inbox_sid = Some(INBOX_SID.to_string());
        if let Some(conn) = self.conn.as_mut() {
            conn.enqueue(&ClientOp::Sub {
                subject: format!("{}.>", self.inbox_prefix),
                queue_group: None,
                sid: INBOX_SID.to_string(),
            });
            let _ = conn.flush().await;
        }
    }

    async fn handle_flush(&mut self, respond: oneshot::Sender<()>) {
        let Some(conn) = self.conn.as_mut() else {
            let _ = respond.send(());
            return;
        };
        conn.enqueue(&ClientOp::Ping);
        if conn.flush().await.is_err() {
            self.conn = None;
            let _ = respond.send(());
            return;
        }
        self.flush_waiters.push(respond);
    }

    async fn handle_drain(&mut self, respond: oneshot::Sender<()>) {
        self.shared.apply(ConnectionEvent::Drain);

        let active = self.mux.active_subscriptions();
        if let Some(conn) = self.conn.as_mut() {
            for (sid, _, _) in &active {
                conn.enqueue(&ClientOp::Unsub {
                    sid: sid.clone(),
                    max_messages: None,
                });
            }
            let _ = conn.flush().await;
        }
        self.mux.finish_all();
        self.requests.fail_all_closed();

        tokio::time::sleep(self.options.drain_timeout).await;

        if let Some(conn) = self.conn.as_mut() {
            conn.shutdown().await;
        }
        self.conn = None;
        let _ = respond.send(());
    }

    async fn handle_server_op(&mut self, op: ServerOp) {
        match op {
            ServerOp::Ping => {
                if let Some(conn) = self.conn.as_mut() {
                    conn.enqueue(&ClientOp::Pong);
                    let _ = conn.flush().await;
                }
            }
            ServerOp::Pong => {
                self.pings_out = 0;
                for tx in self.flush_waiters.drain(..) {
                    let _ = tx.send(());
                }
            }
            ServerOp::Ok => {}
            ServerOp::Err(message) => {
                tracing::warn!(%message, "server reported an error");
            }
            ServerOp::Info(info) => {
                let mut state = self.shared.state.lock().unwrap();
                if matches!(*state, ConnectionState::Connected(_)) {
                    state.force_set(ConnectionState::Connected(*info));
                }
            }
            ServerOp::Msg {
                subject,
                sid,
                reply,
                payload,
            } => {
                self.deliver(subject, sid, reply, payload, None).await;
            }
            ServerOp::Hmsg {
                subject,
                sid,
                reply,
                headers,
                payload,
            } => {
                self.deliver(subject, sid, reply, payload, Some(headers)).await;
            }
        }
    }

    async fn deliver(&mut self, subject: String, sid: String, reply: Option<String>, payload: Bytes, headers: Option<HeaderMap>) {
        self.shared.received.fetch_add(1, Ordering::Relaxed);

        if RequestBroker::is_inbox_subject(&subject, &self.inbox_prefix) {
            let status = headers.as_ref().and_then(|h| h.status);
            if status == Some(header::status::NO_RESPONDERS) {
                self.requests
                    .complete(&subject, Err(RequestError::NoResponders(subject.clone())));
            } else {
                let msg = Message {
                    subject: subject.clone(),
                    reply,
                    payload,
                    headers,
                };
                self.requests.complete(&subject, Ok(msg));
            }
            return;
        }

        let msg = Message {
            subject,
            reply,
            payload,
            headers,
        };
        if let DeliveryOutcome::Unknown = self.mux.deliver(&sid, msg).await {
            tracing::debug!(sid, "message for unknown subscription id");
        }
    }

    async fn tick_ping(&mut self) {
        if self.conn.is_none() {
            return;
        }
        if self.pings_out >= self.options.max_pings_out {
            tracing::warn!(pings_out = self.pings_out, "stale connection, reconnecting");
            if let Some(conn) = self.conn.as_mut() {
                conn.shutdown().await;
            }
            self.conn = None;
            return;
        }
        let conn = self.conn.as_mut().expect("checked above");
        conn.enqueue(&ClientOp::Ping);
        if conn.flush().await.is_ok() {
            self.pings_out += 1;
        } else {
            self.conn = None;
        }
    }

    /// Reconnects using the configured policy. Returns `false` if the
    /// policy gave up (reconnection disabled or attempts exhausted), in
    /// which case the actor shuts down.
    async fn reconnect(&mut self) -> bool {
        self.shared.apply(ConnectionEvent::Disconnected);

        let mut attempt = self.reconnect_attempt;
        loop {
            attempt += 1;
            if !self.options.reconnect.should_continue(attempt) {
                self.reconnect_attempt = attempt;
                return false;
            }

            self.shared.apply(ConnectionEvent::Reconnecting { attempt });
            let delay = self.options.reconnect.next_delay(attempt);
            tokio::time::sleep(delay).await;

            match connect_and_handshake(&self.addrs, &self.options).await {
                Ok((conn, info)) => {
                    self.conn = Some(conn);
                    self.pings_out = 0;
                    self.shared.apply(ConnectionEvent::Connected(info));
                    self.resubscribe().await;
                    self.reconnect_attempt = 0;
                    return true;
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt, "reconnect attempt failed");
                }
            }
        }
    }

    async fn resubscribe(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if let Some(sid) = &self.inbox_sid {
            conn.enqueue(&ClientOp::Sub {
                subject: format!("{}.>", self.inbox_prefix),
                queue_group: None,
                sid: sid.clone(),
            });
        }
        for (sid, subject, queue_group) in self.mux.active_subscriptions() {
            conn.enqueue(&ClientOp::Sub { subject, queue_group, sid });
        }
        let _ = conn.flush().await;
    }
}

async fn connect_and_handshake(addrs: &[ServerAddr], options: &ConnectOptions) -> Result<(Connection, ServerInfo), ConnectError> {
    let mut last_err = None;
    for addr in addrs {
        match try_one(addr, options).await {
            Ok(result) => return Ok(result),
            Err(err) => {
                tracing::debug!(server = %addr.sanitized(), error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or(ConnectError::NoServersAvailable))
}

async fn try_one(addr: &ServerAddr, options: &ConnectOptions) -> Result<(Connection, ServerInfo), ConnectError> {
    let (mut conn, info) = Connection::open(addr, options).await?;

    let mut connect_info = ConnectInfo::new();
    connect_info.verbose = options.verbose;
    connect_info.pedantic = options.pedantic;
    connect_info.echo = options.echo;
    connect_info.name = options.name.clone();
    connect_info.tls_required = options.tls.enabled || addr.tls_required();

    let auth = match &options.auth {
        Auth::None => addr.embedded_auth(),
        other => other.clone(),
    };
    let nonce = if info.nonce.is_empty() { None } else { Some(info.nonce.as_str()) };
    auth.apply(&mut connect_info, nonce)
        .map_err(|err| ConnectError::AuthenticationFailed { reason: err.to_string() })?;

    let json = serde_json::to_string(&connect_info).map_err(|err| ConnectError::Io {
        reason: format!("failed to encode CONNECT: {err}"),
    })?;
    conn.enqueue(&ClientOp::Connect(json));
    conn.enqueue(&ClientOp::Ping);
    conn.flush().await?;

    loop {
        match conn.read_op().await? {
            Some(ServerOp::Pong) => break,
            Some(ServerOp::Ok) => continue,
            Some(ServerOp::Err(message)) => {
                return Err(ConnectError::AuthenticationFailed { reason: message });
            }
            Some(_) => continue,
            None => {
                return Err(ConnectError::Io {
                    reason: "connection closed during handshake".to_string(),
                })
            }
        }
    }

    Ok((conn, info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> (Client, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(8);
        let client = Client {
            commands: tx,
            shared: Arc::new(Shared::new()),
            inbox_prefix: Arc::from("_INBOX"),
            default_request_timeout: Duration::from_secs(1),
        };
        (client, rx)
    }

    /// A client whose shared state has been driven to `Connected`, for tests
    /// that exercise command submission rather than the disconnected-gate.
    fn connected_client() -> (Client, mpsc::Receiver<Command>) {
        let (client, rx) = test_client();
        client.shared.apply(ConnectionEvent::Connect);
        client.shared.apply(ConnectionEvent::Connected(ServerInfo::default()));
        (client, rx)
    }

    #[test]
    fn fresh_client_is_neither_connected_nor_closed() {
        let (client, _rx) = test_client();
        assert!(!client.is_connected());
        assert!(!client.is_closed());
    }

    #[test]
    fn stats_start_at_zero() {
        let (client, _rx) = test_client();
        let stats = client.stats();
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.messages_received, 0);
    }

    #[tokio::test]
    async fn publish_rejects_invalid_subject_without_sending_a_command() {
        let (client, mut rx) = connected_client();
        let result = client.publish("bad..subject", Bytes::new()).await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_fails_when_not_connected() {
        let (client, mut rx) = test_client();
        let result = client.publish("foo.bar", Bytes::new()).await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_enqueues_a_command_for_valid_subjects() {
        let (client, mut rx) = connected_client();
        client.publish("foo.bar", Bytes::from_static(b"hi")).await.unwrap();
        match rx.recv().await {
            Some(Command::Publish { subject, .. }) => assert_eq!(subject, "foo.bar"),
            other => panic!("unexpected command: {}", other.is_some()),
        }
    }
}
