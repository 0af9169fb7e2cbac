//! Error types

use std::io;
use thiserror::Error;

/// Result alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint unreachable, connection dropped, or connect timed out
    #[error("connection error: {0}")]
    Connection(String),

    /// Server rejected the credentials or the database
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Peer does not speak the requested protocol
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server does not implement the called method
    #[error("server does not implement `{0}`")]
    UnknownMethod(String),

    /// Service exception raised by a call other than `connect`
    #[error("server error: {0}")]
    Server(String),

    /// A verification check did not hold
    #[error("check failed: {0}")]
    Check(#[from] CheckFailure),

    /// Invalid configuration or connection string
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation not allowed in the current connection state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A failed verification assertion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckFailure {
    /// The session reports a different user than configured
    #[error("authenticated user is `{actual}`, expected `{expected}`")]
    UserMismatch {
        /// Configured user
        expected: String,
        /// User reported by the session
        actual: String,
    },

    /// Expected tables are absent from the database
    #[error("missing tables in `{database}`: {}", .missing.join(", "))]
    MissingTables {
        /// Database that was listed
        database: String,
        /// Expected tables not found, in expected order
        missing: Vec<String>,
    },
}

impl Error {
    /// Static label for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Authentication(_) => "authentication",
            Self::Protocol(_) => "protocol",
            Self::UnknownMethod(_) => "unknown_method",
            Self::Server(_) => "server",
            Self::Check(_) => "check",
            Self::Config(_) => "config",
            Self::InvalidState { .. } => "invalid_state",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error means the endpoint could not be reached
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Classify an I/O error raised while talking to `target`.
    ///
    /// Refused, reset, aborted, unreachable and timed-out sockets become
    /// [`Error::Connection`]; anything else stays [`Error::Io`].
    pub(crate) fn from_network(err: io::Error, target: &str) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            ConnectionRefused | ConnectionReset | ConnectionAborted | NotConnected
            | BrokenPipe | TimedOut | AddrNotAvailable | UnexpectedEof => {
                Self::Connection(format!("{}: {}", target, err))
            }
            _ => Self::Io(err),
        }
    }

    /// Classify an HTTP client error
    pub(crate) fn from_http(err: reqwest::Error, target: &str) -> Self {
        // A peer that answers the TLS handshake with something else is reachable
        if let Some(tls_err) = tls_protocol_violation(&err) {
            return Self::Protocol(format!("{}: {}: {}", target, err, tls_err));
        }
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::Connection(format!("{}: {}", target, err))
        } else {
            Self::Protocol(format!("{}: {}", target, err))
        }
    }
}

/// Find a rustls error in `err`'s source chain that means the peer does not
/// speak TLS, as opposed to a certificate or I/O failure.
fn tls_protocol_violation<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a rustls::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        // io::Error hides its payload from source(), so unwrap it by hand
        let tls_err = e.downcast_ref::<rustls::Error>().or_else(|| {
            e.downcast_ref::<io::Error>()
                .and_then(|io_err| io_err.get_ref())
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        });
        if let Some(tls_err) = tls_err {
            return match tls_err {
                rustls::Error::InvalidMessage(_)
                | rustls::Error::InappropriateMessage { .. }
                | rustls::Error::InappropriateHandshakeMessage { .. }
                | rustls::Error::PeerSentOversizedRecord => Some(tls_err),
                _ => None,
            };
        }
        current = e.source();
    }
    None
}
