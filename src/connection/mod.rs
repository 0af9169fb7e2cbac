//! Connection management
//!
//! This module handles:
//! * Connection configuration
//! * Transport abstraction (binary TCP vs HTTP/HTTPS)
//! * Service calls over an open transport
//! * State machine enforcement
//! * TLS configuration for `https`

mod conn;
mod state;
mod tls;
mod transport;

pub use conn::{
    Connection, ConnectionConfig, ConnectionConfigBuilder, Secret, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use state::ConnectionState;
pub use tls::{TlsConfig, TlsConfigBuilder};
pub use transport::{BinaryTransport, HttpTransport, Protocol, Transport};
