//! Client API
//!
//! [`Session`] is the connection handle; [`ConnectionInfo`] parses
//! `omnisci://` connection strings into a [`ConnectionConfig`](crate::ConnectionConfig).

pub mod connection_string;
mod session;

pub use connection_string::{ConnectionInfo, DEFAULT_DATABASE};
pub use session::Session;
