//! `ConnectOptions`: the builder covering every configuration row in the
//! design (servers, auth, TLS, reconnect policy, timeouts, protocol flags).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Auth;
use crate::reconnect::ReconnectPolicy;

/// TLS configuration. Disabled by default; a server that reports
/// `tls_required=true` in its `INFO` without this being enabled fails the
/// connection with `ConnectError::TlsRequired`.
#[derive(Clone, Default)]
pub struct TlsOptions {
    pub enabled: bool,
    pub insecure_skip_verify: bool,
    pub root_certificates: Vec<Vec<u8>>,
    pub client_certificate: Option<(Vec<Vec<u8>>, Vec<u8>)>,
    pub sni: Option<String>,
}

impl TlsOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Connection configuration. Construct via [`ConnectOptions::new`] and the
/// builder setters, then pass to [`crate::connect_with_options`] (or call
/// [`ConnectOptions::connect`] directly).
#[derive(Clone)]
pub struct ConnectOptions {
    pub(crate) servers: Vec<String>,
    pub(crate) name: Option<String>,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) tls: TlsOptions,
    pub(crate) auth: Auth,
    pub(crate) ping_interval: Duration,
    pub(crate) max_pings_out: u32,
    pub(crate) request_timeout: Duration,
    pub(crate) drain_timeout: Duration,
    pub(crate) echo: bool,
    pub(crate) verbose: bool,
    pub(crate) pedantic: bool,
    pub(crate) max_payload: i64,
    pub(crate) inbox_prefix: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            servers: vec!["nats://localhost:4222".to_string()],
            name: None,
            reconnect: ReconnectPolicy::default(),
            tls: TlsOptions::default(),
            auth: Auth::None,
            ping_interval: Duration::from_secs(120),
            max_pings_out: 2,
            request_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
            echo: true,
            verbose: false,
            pedantic: false,
            max_payload: 0,
            inbox_prefix: "_INBOX".to_string(),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.servers = vec![server.into()];
        self
    }

    pub fn servers(mut self, servers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn require_tls(mut self, enabled: bool) -> Self {
        self.tls.enabled = enabled;
        self
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn token(self, token: impl Into<String>) -> Self {
        self.auth(Auth::Token(token.into()))
    }

    pub fn user_and_password(self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.auth(Auth::UserPass(user.into(), pass.into()))
    }

    pub fn nkey(self, seed: impl Into<String>) -> Self {
        self.auth(Auth::NKey(seed.into()))
    }

    pub fn jwt(self, jwt: impl Into<String>, seed: impl Into<String>) -> Self {
        self.auth(Auth::Jwt(jwt.into(), seed.into()))
    }

    pub fn credentials_file(self, path: impl Into<PathBuf>) -> Self {
        self.auth(Auth::Credentials(path.into()))
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn max_pings_out(mut self, max: u32) -> Self {
        self.max_pings_out = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn pedantic(mut self, pedantic: bool) -> Self {
        self.pedantic = pedantic;
        self
    }

    pub fn max_payload(mut self, max: i64) -> Self {
        self.max_payload = max;
        self
    }

    pub fn inbox_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inbox_prefix = prefix.into();
        self
    }

    /// Connects using these options. Sugar over
    /// [`crate::client::Client::connect`].
    pub async fn connect(self) -> Result<crate::client::Client, crate::error::ConnectError> {
        crate::client::Client::connect(Arc::new(self)).await
    }
}
