//! Transport abstraction (Thrift binary over TCP vs Thrift JSON over HTTP(S))

use super::conn::ConnectionConfig;
use super::tls::TlsConfig;
use crate::protocol::{self, constants::JSON_CONTENT_TYPE, Message};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Wire transport requested by a configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Thrift binary protocol over a raw TCP stream
    #[default]
    Binary,
    /// Thrift JSON protocol over HTTP
    Http,
    /// Thrift JSON protocol over HTTPS
    Https,
}

impl Protocol {
    /// Port the server listens on for this protocol by default
    pub fn default_port(self) -> u16 {
        match self {
            Self::Binary => 6274,
            Self::Http => 6278,
            Self::Https => 443,
        }
    }

    /// Lowercase name, also used as a metrics label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(Self::Binary),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(Error::Config(format!(
                "invalid protocol '{}': expected binary, http, or https",
                s
            ))),
        }
    }
}

/// Thrift binary over a TCP stream
#[derive(Debug)]
pub struct BinaryTransport {
    stream: TcpStream,
    read_buf: BytesMut,
    peer: String,
    reply_timeout: Duration,
}

impl BinaryTransport {
    async fn round_trip(&mut self, msg: &Message) -> Result<Message> {
        let buf = protocol::encode_message(msg)?;
        self.stream
            .write_all(&buf)
            .await
            .map_err(|e| Error::from_network(e, &self.peer))?;
        self.stream
            .flush()
            .await
            .map_err(|e| Error::from_network(e, &self.peer))?;

        match tokio::time::timeout(self.reply_timeout, self.receive()).await {
            Ok(reply) => reply,
            Err(_) => Err(Error::Connection(format!(
                "{}: no reply within {:?}",
                self.peer, self.reply_timeout
            ))),
        }
    }

    async fn receive(&mut self) -> Result<Message> {
        loop {
            match protocol::decode_message(&self.read_buf) {
                Ok((msg, consumed)) => {
                    self.read_buf.advance(consumed);
                    return Ok(msg);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => {
                    return Err(Error::Protocol(format!(
                        "{}: malformed binary reply: {}",
                        self.peer, e
                    )))
                }
            }

            // Need more data
            let n = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| Error::from_network(e, &self.peer))?;
            if n == 0 {
                return Err(if self.read_buf.is_empty() {
                    Error::Connection(format!("{}: connection closed by server", self.peer))
                } else {
                    Error::Protocol(format!(
                        "{}: connection closed mid-reply after {} bytes",
                        self.peer,
                        self.read_buf.len()
                    ))
                });
            }
        }
    }
}

/// Thrift JSON over HTTP(S)
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    async fn round_trip(&mut self, msg: &Message) -> Result<Message> {
        let payload = protocol::json::encode_message(msg)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, JSON_CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(|e| Error::from_http(e, &self.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Protocol(format!(
                "{}: unexpected HTTP status {}",
                self.url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_http(e, &self.url))?;

        protocol::json::decode_message(&body)
            .map_err(|e| Error::Protocol(format!("{}: malformed JSON reply: {}", self.url, e)))
    }
}

/// Transport layer abstraction
#[derive(Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Thrift binary over TCP
    Binary(BinaryTransport),
    /// Thrift JSON over HTTP or HTTPS
    Http(HttpTransport),
}

impl Transport {
    /// Open the transport described by `config`
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        match config.protocol {
            Protocol::Binary => {
                Self::connect_tcp(
                    &config.host,
                    config.port,
                    config.connect_timeout,
                    config.request_timeout,
                )
                .await
            }
            Protocol::Http | Protocol::Https => Self::http(config),
        }
    }

    /// Connect via TCP for the binary protocol
    pub async fn connect_tcp(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Connection(format!("{}: {}", peer, e))),
            Err(_) => {
                return Err(Error::Connection(format!(
                    "{}: connect timed out after {:?}",
                    peer, connect_timeout
                )))
            }
        };
        stream.set_nodelay(true)?;
        tracing::debug!(peer = %peer, "tcp connected");

        Ok(Transport::Binary(BinaryTransport {
            stream,
            read_buf: BytesMut::with_capacity(8192),
            peer,
            reply_timeout,
        }))
    }

    /// Build an HTTP(S) transport. No socket is opened until the first call.
    pub fn http(config: &ConnectionConfig) -> Result<Self> {
        let url = endpoint_url(config);

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);

        // Local servers are never reached through a system proxy
        if is_loopback(&config.host) {
            builder = builder.no_proxy();
        }

        if config.protocol == Protocol::Https {
            let tls = match &config.tls {
                Some(tls) => tls.clone(),
                None => TlsConfig::builder().build()?,
            };
            builder = builder.use_preconfigured_tls((*tls.client_config()).clone());
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Transport::Http(HttpTransport { client, url }))
    }

    /// Send a call and wait for its reply
    pub async fn round_trip(&mut self, msg: &Message) -> Result<Message> {
        match self {
            Transport::Binary(t) => t.round_trip(msg).await,
            Transport::Http(t) => t.round_trip(msg).await,
        }
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Transport::Binary(t) => t.stream.shutdown().await?,
            Transport::Http(_) => {}
        }
        Ok(())
    }

    /// Human-readable endpoint (`host:port` or URL)
    pub fn endpoint(&self) -> &str {
        match self {
            Transport::Binary(t) => &t.peer,
            Transport::Http(t) => &t.url,
        }
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// URL the HTTP transports post to
fn endpoint_url(config: &ConnectionConfig) -> String {
    let scheme = if config.protocol == Protocol::Https {
        "https"
    } else {
        "http"
    };
    // IPv6 literals need brackets in a URL
    let host = if config.host.contains(':') && !config.host.starts_with('[') {
        format!("[{}]", config.host)
    } else {
        config.host.clone()
    };
    let path = if config.http_path.starts_with('/') {
        config.http_path.clone()
    } else {
        format!("/{}", config.http_path)
    };
    format!("{}://{}:{}{}", scheme, host, config.port, path)
}
