//! In-process OmniSciDB stand-in for offline tests
//!
//! Serves the five service calls the crate uses, either as Thrift binary
//! over TCP or as Thrift JSON over a minimal HTTP/1.1 responder, optionally
//! behind TLS with a throwaway CA.

#![allow(dead_code)]

use bytes::{Buf, BytesMut};
use omnisci_fixture::connection::{ConnectionConfig, Protocol, TlsConfig};
use omnisci_fixture::protocol::constants::{app_exception, methods};
use omnisci_fixture::protocol::service::service_exception;
use omnisci_fixture::protocol::{
    self, ApplicationException, Message, ServerStatus, SessionInfo, Struct, Value,
};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyPair};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// Behaviour of the mock server
#[derive(Debug, Clone)]
pub struct MockOptions {
    pub user: String,
    pub password: String,
    pub database: String,
    pub tables: Vec<String>,
    /// Answer `get_session_info` with UNKNOWN_METHOD, like pre-4.x servers
    pub legacy: bool,
    /// Report this user from `get_session_info` instead of the one that logged in
    pub reported_user: Option<String>,
    /// Methods answered with a service exception
    pub failing: Vec<String>,
}

impl MockOptions {
    pub fn local() -> Self {
        Self {
            user: "admin".into(),
            password: "HyperInteractive".into(),
            database: "omnisci".into(),
            tables: vec!["omnisci_states".into(), "omnisci_counties".into()],
            legacy: false,
            reported_user: None,
            failing: Vec::new(),
        }
    }

    pub fn external() -> Self {
        Self {
            user: "demouser".into(),
            password: "HyperInteractive".into(),
            database: "mapd".into(),
            tables: vec![
                "flights_donotmodify".into(),
                "contributions_donotmodify".into(),
                "tweets_nov_feb".into(),
                "zipcodes".into(),
            ],
            legacy: false,
            reported_user: None,
            failing: Vec::new(),
        }
    }

    pub fn tables(mut self, tables: &[&str]) -> Self {
        self.tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn legacy(mut self) -> Self {
        self.legacy = true;
        self
    }

    pub fn reported_user(mut self, user: &str) -> Self {
        self.reported_user = Some(user.into());
        self
    }

    pub fn failing(mut self, methods: &[&str]) -> Self {
        self.failing = methods.iter().map(|m| m.to_string()).collect();
        self
    }
}

struct ServiceState {
    options: MockOptions,
    sessions: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    next_session: Mutex<u32>,
    closed_streams: AtomicUsize,
}

impl ServiceState {
    fn new(options: MockOptions) -> Self {
        Self {
            options,
            sessions: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            next_session: Mutex::new(0),
            closed_streams: AtomicUsize::new(0),
        }
    }

    fn dispatch(&self, call: Message) -> Message {
        self.calls.lock().unwrap().push(call.name.clone());
        let name = call.name.as_str();
        let seq_id = call.seq_id;
        let args = &call.body;

        if name == methods::CONNECT {
            let opts = &self.options;
            let ok = args.string(1) == Some(opts.user.as_str())
                && args.string(2) == Some(opts.password.as_str())
                && args.string(3) == Some(opts.database.as_str());
            if !ok {
                return failure(name, seq_id, "Invalid credentials.");
            }
            let mut next = self.next_session.lock().unwrap();
            *next += 1;
            let session = format!("session-{:04}", *next);
            self.sessions.lock().unwrap().insert(session.clone());
            return success(name, seq_id, Value::String(session));
        }

        let known = [
            methods::DISCONNECT,
            methods::GET_TABLES,
            methods::GET_SESSION_INFO,
            methods::GET_SERVER_STATUS,
        ];
        if !known.contains(&name) || (name == methods::GET_SESSION_INFO && self.options.legacy) {
            let exc = ApplicationException {
                message: format!("Invalid method name: '{}'", name),
                kind: app_exception::UNKNOWN_METHOD,
            };
            return Message::exception(name, seq_id, &exc);
        }

        if self.options.failing.iter().any(|m| m == name) {
            return failure(name, seq_id, "Service unavailable.");
        }

        let session = args.string(1).unwrap_or_default().to_string();
        if !self.sessions.lock().unwrap().contains(&session) {
            return failure(name, seq_id, "Session not valid.");
        }

        match name {
            n if n == methods::DISCONNECT => {
                self.sessions.lock().unwrap().remove(&session);
                Message::reply(name, seq_id, Struct::new())
            }
            n if n == methods::GET_TABLES => {
                success(name, seq_id, Value::string_list(self.options.tables.clone()))
            }
            n if n == methods::GET_SESSION_INFO => {
                let info = SessionInfo {
                    user: self
                        .options
                        .reported_user
                        .clone()
                        .unwrap_or_else(|| self.options.user.clone()),
                    database: self.options.database.clone(),
                    start_time: 1_600_000_000,
                    is_super: self.options.user == "admin",
                };
                success(name, seq_id, Value::Struct(info.to_struct()))
            }
            _ => {
                let status = ServerStatus {
                    read_only: false,
                    version: "5.10.2-mock".into(),
                    rendering_enabled: false,
                    start_time: 1_600_000_000,
                    edition: "ce".into(),
                    host_name: "mock".into(),
                };
                success(name, seq_id, Value::Struct(status.to_struct()))
            }
        }
    }
}

fn success(name: &str, seq_id: i32, value: Value) -> Message {
    Message::reply(name, seq_id, Struct::new().with(0, value))
}

fn failure(name: &str, seq_id: i32, msg: &str) -> Message {
    Message::reply(
        name,
        seq_id,
        Struct::new().with(1, Value::Struct(service_exception(msg))),
    )
}

/// Server certificate signed by a throwaway CA, plus the CA file clients trust
pub struct TestCertificates {
    _dir: TempDir,
    pub ca_path: String,
    pub acceptor: TlsAcceptor,
}

impl TestCertificates {
    /// Issue a certificate for `localhost` and `127.0.0.1`
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.distinguished_name = common_name("omnisci-fixture test CA");
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();
        let issuer = Issuer::new(ca_params, ca_key);

        let server_key = KeyPair::generate().unwrap();
        let mut server_params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        server_params.distinguished_name = common_name("omnisci-fixture test server");
        server_params.is_ca = IsCa::NoCa;
        let server_cert = server_params.signed_by(&server_key, &issuer).unwrap();

        let dir = tempfile::Builder::new().prefix("omnisci-tls").tempdir().unwrap();
        let ca_path = dir.path().join("ca.pem");
        std::fs::write(&ca_path, ca_cert.pem()).unwrap();

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let server_config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(
                vec![CertificateDer::from(server_cert.der().to_vec())],
                PrivateKeyDer::from(PrivatePkcs8KeyDer::from(server_key.serialize_der())),
            )
            .unwrap();

        Self {
            _dir: dir,
            ca_path: ca_path.to_string_lossy().into_owned(),
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
        }
    }

    /// Client TLS settings trusting only the test CA
    pub fn client_tls(&self) -> TlsConfig {
        TlsConfig::builder()
            .ca_cert_path(self.ca_path.clone())
            .build()
            .unwrap()
    }
}

fn common_name(name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, name);
    dn
}

/// A running mock server
pub struct MockServer {
    addr: SocketAddr,
    protocol: Protocol,
    state: Arc<ServiceState>,
    handle: JoinHandle<()>,
    certs: Option<TestCertificates>,
}

impl MockServer {
    /// Serve Thrift binary over TCP
    pub async fn binary(options: MockOptions) -> Self {
        Self::start(options, Protocol::Binary, None).await
    }

    /// Serve Thrift JSON over HTTP
    pub async fn http(options: MockOptions) -> Self {
        Self::start(options, Protocol::Http, None).await
    }

    /// Serve Thrift JSON over HTTPS with a certificate from a throwaway CA
    pub async fn https(options: MockOptions) -> Self {
        Self::start(options, Protocol::Https, Some(TestCertificates::generate())).await
    }

    async fn start(options: MockOptions, protocol: Protocol, certs: Option<TestCertificates>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServiceState::new(options));
        let acceptor = certs.as_ref().map(|c| c.acceptor.clone());

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = server_state.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _ = match (protocol, acceptor) {
                        (Protocol::Binary, _) => serve_binary(stream, &state).await,
                        (_, Some(acceptor)) => match acceptor.accept(stream).await {
                            Ok(tls) => serve_http(tls, &state).await,
                            Err(e) => Err(e),
                        },
                        (_, None) => serve_http(stream, &state).await,
                    };
                });
            }
        });

        Self {
            addr,
            protocol,
            state,
            handle,
            certs,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Config pointing at this server with the given credentials
    pub fn config(&self, user: &str, password: &str, database: &str) -> ConnectionConfig {
        let mut config =
            ConnectionConfig::new("127.0.0.1", self.port(), database, user, password, self.protocol);
        config.tls = self.certs.as_ref().map(TestCertificates::client_tls);
        config
    }

    /// PEM file of the CA that signed an HTTPS server's certificate
    pub fn ca_path(&self) -> Option<&str> {
        self.certs.as_ref().map(|c| c.ca_path.as_str())
    }

    /// Config with the credentials the server accepts
    pub fn valid_config(&self) -> ConnectionConfig {
        let opts = &self.state.options;
        self.config(&opts.user, &opts.password, &opts.database)
    }

    /// Method names received so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| *c == method).count()
    }

    /// Number of sessions still open on the server
    pub fn open_sessions(&self) -> usize {
        self.state.sessions.lock().unwrap().len()
    }

    /// Wait until `count` binary clients have hung up, or give up after a second
    pub async fn wait_for_hangups(&self, count: usize) -> bool {
        for _ in 0..100 {
            if self.state.closed_streams.load(Ordering::SeqCst) >= count {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_binary(mut stream: TcpStream, state: &ServiceState) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        match protocol::decode_message(&buf) {
            Ok((call, consumed)) => {
                buf.advance(consumed);
                let reply = state.dispatch(call);
                stream.write_all(&protocol::encode_message(&reply)?).await?;
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(e),
        }
        if stream.read_buf(&mut buf).await? == 0 {
            state.closed_streams.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
    }
}

async fn serve_http<S>(mut stream: S, state: &ServiceState) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = read_http_request(&mut stream).await?;
    let (status, payload) = match protocol::json::decode_message(&body) {
        Ok(call) => {
            let reply = state.dispatch(call);
            ("200 OK", protocol::json::encode_message(&reply)?)
        }
        Err(_) => ("400 Bad Request", Vec::new()),
    };
    write_http_response(&mut stream, status, &payload).await
}

/// Read one HTTP request and return its body
async fn read_http_request<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4096);
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
    }
    Ok(buf[header_end..header_end + content_length].to_vec())
}

async fn write_http_response<S: AsyncWrite + Unpin>(
    stream: &mut S,
    status: &str,
    body: &[u8],
) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/vnd.apache.thrift.json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.shutdown().await
}

/// HTTP server that answers every request with a fixed status and body
pub async fn canned_http(status: &'static str, body: &'static [u8]) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_http_request(&mut stream).await.is_ok() {
                    let _ = write_http_response(&mut stream, status, body).await;
                }
            });
        }
    });
    (port, handle)
}

/// Plain HTTP server that answers whatever arrives with a 400, like an HTTP
/// port reached with an HTTPS URL
pub async fn plain_http_peer() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                if stream.read(&mut buf).await.unwrap_or(0) == 0 {
                    return;
                }
                let _ = stream
                    .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                // Drain until the client hangs up so it sees our bytes, not a reset
                while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
            });
        }
    });
    (port, handle)
}

/// TCP server that answers a binary call with raw bytes, then closes
pub async fn canned_binary(response: &'static [u8]) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = BytesMut::with_capacity(1024);
                loop {
                    match protocol::decode_message(&buf) {
                        Ok(_) => break,
                        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                        Err(_) => return,
                    }
                    match stream.read_buf(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                }
                let _ = stream.write_all(response).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (port, handle)
}

/// A loopback port with nothing listening on it
pub fn refused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
