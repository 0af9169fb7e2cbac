//! Connection fixtures and verification checks for OmniSciDB
//!
//! The crate turns a [`ConnectionConfig`] into an authenticated [`Session`]
//! over the server's Thrift service (binary over TCP, or JSON over HTTP/HTTPS)
//! and runs a small battery of read-only checks against it.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> omnisci_fixture::Result<()> {
//! use omnisci_fixture::fixture::{run_all, Environments};
//!
//! omnisci_fixture::fixture::init_tracing();
//! let envs = Environments::from_env()?;
//! let report = run_all(&envs).await;
//! for failure in report.failures() {
//!     eprintln!("{}: {}", failure.check, failure.error.as_deref().unwrap_or(""));
//! }
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod connection;
pub mod error;
pub mod fixture;
pub mod metrics;
pub mod protocol;

pub use client::{ConnectionInfo, Session};
pub use connection::{ConnectionConfig, Protocol, Secret, TlsConfig};
pub use error::{CheckFailure, Error, Result};
pub use fixture::{Check, Environment, Environments, Report};
