//! Core connection type

use super::state::ConnectionState;
use super::tls::TlsConfig;
use super::transport::{Protocol, Transport};
use crate::protocol::constants::methods;
use crate::protocol::service::{connect_args, session_args};
use crate::protocol::{ApplicationException, Message, MessageType, ServerStatus, SessionInfo, Struct, Value};
use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-call timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Password wrapper that never prints its contents
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Plain-text value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Connection configuration
///
/// Immutable once built. Use `ConnectionConfig::new` for the six core
/// fields or `ConnectionConfig::builder()` to also tune timeouts, TLS and
/// the HTTP path.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password
    pub password: Secret,
    /// Wire protocol
    pub protocol: Protocol,
    /// TCP connect timeout (default: 10 seconds)
    pub connect_timeout: Duration,
    /// Per-call timeout (default: 30 seconds)
    pub request_timeout: Duration,
    /// Path posted to by the HTTP protocols (default: `/`)
    pub http_path: String,
    /// TLS settings for `https` (default: system roots)
    pub tls: Option<TlsConfig>,
}

impl ConnectionConfig {
    /// Create a configuration from the six core fields
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<Secret>,
        protocol: Protocol,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            protocol,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http_path: "/".to_string(),
            tls: None,
        }
    }

    /// Create a builder for advanced configuration
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = ConnectionConfig::builder("metis.mapd.com", "mapd", "demouser")
    ///     .password("secret")
    ///     .protocol(Protocol::Https)
    ///     .connect_timeout(Duration::from_secs(5))
    ///     .build();
    /// ```
    pub fn builder(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            host: host.into(),
            port: None,
            database: database.into(),
            user: user.into(),
            password: Secret::new(""),
            protocol: Protocol::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http_path: "/".to_string(),
            tls: None,
        }
    }

    /// Check the values that must hold before any socket is opened.
    ///
    /// Port 0 can never be reached, so it is reported as a connection error.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.user.is_empty() {
            return Err(Error::Config("user must not be empty".into()));
        }
        if self.database.is_empty() {
            return Err(Error::Config("database must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Connection(format!(
                "{}:0: port 0 is not a connectable TCP port",
                self.host
            )));
        }
        Ok(())
    }
}

/// Builder for creating `ConnectionConfig` with advanced options
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    host: String,
    port: Option<u16>,
    database: String,
    user: String,
    password: Secret,
    protocol: Protocol,
    connect_timeout: Duration,
    request_timeout: Duration,
    http_path: String,
    tls: Option<TlsConfig>,
}

impl ConnectionConfigBuilder {
    /// Set the port
    ///
    /// Default: the protocol's default port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<Secret>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the wire protocol
    ///
    /// Default: `Protocol::Binary`
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set TCP connection timeout
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = duration;
        self
    }

    /// Set the per-call timeout
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = duration;
        self
    }

    /// Set the path posted to by the HTTP protocols
    pub fn http_path(mut self, path: impl Into<String>) -> Self {
        self.http_path = path.into();
        self
    }

    /// Set TLS settings for `https`
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConnectionConfig {
        ConnectionConfig {
            port: self.port.unwrap_or_else(|| self.protocol.default_port()),
            host: self.host,
            database: self.database,
            user: self.user,
            password: self.password,
            protocol: self.protocol,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            http_path: self.http_path,
            tls: self.tls,
        }
    }
}

/// Thrift service connection
///
/// Speaks the service calls over one transport. Holds no session id; the
/// caller passes it to every call after `authenticate`.
#[derive(Debug)]
pub struct Connection {
    transport: Transport,
    state: ConnectionState,
    seq_id: i32,
}

impl Connection {
    /// Create connection from transport
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: ConnectionState::Initial,
            seq_id: 0,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Endpoint this connection talks to
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Open a session; returns the session id.
    ///
    /// A service exception raised by `connect` is reported as
    /// [`Error::Authentication`].
    pub async fn authenticate(
        &mut self,
        user: &str,
        password: &Secret,
        database: &str,
    ) -> Result<String> {
        self.state.transition(ConnectionState::Authenticating)?;

        let args = connect_args(user, password.expose(), database);
        let mut result = match self.exchange(methods::CONNECT, args).await {
            Ok(result) => result,
            Err(Error::Server(msg)) => {
                self.state = ConnectionState::Closed;
                return Err(Error::Authentication(msg));
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                return Err(e);
            }
        };

        let session = match result.take(0) {
            Some(Value::String(session)) => session,
            _ => {
                self.state = ConnectionState::Closed;
                return Err(Error::Protocol(
                    "connect reply carried no session id".into(),
                ));
            }
        };

        self.state.transition(ConnectionState::Ready)?;
        tracing::debug!("authentication successful");
        Ok(session)
    }

    /// List the tables visible to the session
    pub async fn get_tables(&mut self, session: &str) -> Result<Vec<String>> {
        let mut result = self.call(methods::GET_TABLES, session_args(session)).await?;
        result
            .take(0)
            .and_then(Value::into_string_list)
            .ok_or_else(|| Error::Protocol("get_tables reply is not a list of strings".into()))
    }

    /// Describe the session
    pub async fn get_session_info(&mut self, session: &str) -> Result<SessionInfo> {
        let result = self
            .call(methods::GET_SESSION_INFO, session_args(session))
            .await?;
        let info = result
            .get(0)
            .and_then(Value::as_struct)
            .ok_or_else(|| Error::Protocol("get_session_info reply carried no struct".into()))?;
        SessionInfo::from_struct(info).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Describe the server
    pub async fn get_server_status(&mut self, session: &str) -> Result<ServerStatus> {
        let result = self
            .call(methods::GET_SERVER_STATUS, session_args(session))
            .await?;
        let status = result
            .get(0)
            .and_then(Value::as_struct)
            .ok_or_else(|| Error::Protocol("get_server_status reply carried no struct".into()))?;
        ServerStatus::from_struct(status).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Close the session on the server side
    pub async fn disconnect(&mut self, session: &str) -> Result<()> {
        self.call(methods::DISCONNECT, session_args(session)).await?;
        Ok(())
    }

    /// Issue a call on an authenticated connection; returns the result struct.
    pub async fn call(&mut self, method: &str, args: Struct) -> Result<Struct> {
        if self.state != ConnectionState::Ready {
            return Err(Error::InvalidState {
                expected: ConnectionState::Ready.to_string(),
                actual: self.state.to_string(),
            });
        }

        self.state.transition(ConnectionState::Busy)?;
        let result = self.exchange(method, args).await;
        // Transport failures leave the stream in an unknown position
        match &result {
            Err(Error::Connection(_)) | Err(Error::Protocol(_)) | Err(Error::Io(_)) => {
                self.state = ConnectionState::Closed;
            }
            _ => self.state.transition(ConnectionState::Ready)?,
        }
        result
    }

    /// One request/reply round trip with reply validation
    async fn exchange(&mut self, method: &str, args: Struct) -> Result<Struct> {
        self.seq_id = self.seq_id.wrapping_add(1);
        let seq_id = self.seq_id;
        let call_start = Instant::now();

        let reply = self
            .transport
            .round_trip(&Message::call(method, seq_id, args))
            .await;

        let outcome = reply.and_then(|reply| interpret_reply(method, seq_id, reply));

        crate::metrics::histograms::call_duration(method, call_start.elapsed().as_millis() as u64);
        crate::metrics::counters::call_completed(
            method,
            if outcome.is_ok() {
                crate::metrics::labels::OUTCOME_OK
            } else {
                crate::metrics::labels::OUTCOME_ERROR
            },
        );
        tracing::debug!(method, seq_id, ok = outcome.is_ok(), "call finished");

        outcome
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.state.transition(ConnectionState::Closed)?;
        self.transport.shutdown().await
    }
}

/// Turn a reply message into the result struct, mapping exceptions to errors
fn interpret_reply(method: &str, seq_id: i32, mut reply: Message) -> Result<Struct> {
    if reply.name != method {
        return Err(Error::Protocol(format!(
            "reply for `{}` while waiting for `{}`",
            reply.name, method
        )));
    }
    if reply.seq_id != seq_id {
        return Err(Error::Protocol(format!(
            "reply sequence id {} does not match call {}",
            reply.seq_id, seq_id
        )));
    }

    match reply.kind {
        MessageType::Reply => {}
        MessageType::Exception => {
            let exc = ApplicationException::from_struct(&reply.body);
            if exc.is_unknown_method() {
                return Err(Error::UnknownMethod(method.to_string()));
            }
            return Err(Error::Protocol(format!("`{}` failed: {}", method, exc)));
        }
        other => {
            return Err(Error::Protocol(format!(
                "unexpected message type {:?} in reply to `{}`",
                other, method
            )))
        }
    }

    // Field 1 of a result struct is the declared service exception
    if let Some(Value::Struct(exc)) = reply.body.take(1) {
        let msg = exc.string(1).unwrap_or("unspecified server error").to_string();
        return Err(Error::Server(msg));
    }

    Ok(reply.body)
}
