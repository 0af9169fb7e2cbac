//! Session handle

use super::connection_string::ConnectionInfo;
use crate::connection::{Connection, ConnectionConfig, Protocol, Transport};
use crate::protocol::{ServerStatus, SessionInfo};
use crate::{Error, Result};
use std::time::Instant;
use tracing::Instrument;

/// An authenticated session on an OmniSciDB server
///
/// Created by [`Session::connect`]; release it with [`Session::close`],
/// which disconnects the server-side session and shuts the transport down.
#[derive(Debug)]
pub struct Session {
    conn: Option<Connection>,
    session_id: String,
    user: String,
    database: String,
    protocol: Protocol,
}

impl Session {
    /// Connect and authenticate
    ///
    /// # Errors
    ///
    /// * [`Error::Connection`] - endpoint unreachable or timed out
    /// * [`Error::Authentication`] - credentials or database rejected
    /// * [`Error::Protocol`] - the endpoint does not speak `config.protocol`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example() -> omnisci_fixture::Result<()> {
    /// use omnisci_fixture::{ConnectionConfig, Protocol, Session};
    ///
    /// let config = ConnectionConfig::new(
    ///     "127.0.0.1", 6274, "omnisci", "admin", "HyperInteractive", Protocol::Binary,
    /// );
    /// let mut session = Session::connect(&config).await?;
    /// assert_eq!(session.user(), "admin");
    /// let tables = session.list_tables().await?;
    /// session.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let protocol = config.protocol;
        let span = tracing::info_span!(
            "connect",
            host = %config.host,
            port = config.port,
            user = %config.user,
            database = %config.database,
            protocol = %protocol
        );

        let result = Self::establish(config).instrument(span).await;
        if let Err(ref e) = result {
            tracing::warn!(
                host = %config.host,
                port = config.port,
                category = e.category(),
                "connect failed: {}",
                e
            );
            crate::metrics::counters::connection_failed(protocol.as_str(), e.category());
        }
        result
    }

    /// Parse a connection string, then connect
    pub async fn connect_str(connection_string: &str) -> Result<Self> {
        let info = ConnectionInfo::parse(connection_string)?;
        Self::connect(&info.to_config()).await
    }

    async fn establish(config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let start = Instant::now();

        let transport = Transport::connect(config).await?;
        let mut conn = Connection::new(transport);
        let session_id = conn
            .authenticate(&config.user, &config.password, &config.database)
            .await?;

        // Older servers lack get_session_info; trust the configured identity there
        let (user, database) = match conn.get_session_info(&session_id).await {
            Ok(info) => (info.user, info.database),
            Err(Error::UnknownMethod(method)) => {
                tracing::debug!(%method, "server cannot describe sessions, using configured identity");
                (config.user.clone(), config.database.clone())
            }
            Err(e) => {
                if let Err(disconnect_err) = conn.disconnect(&session_id).await {
                    tracing::debug!(error = %disconnect_err, "disconnect after failed setup failed");
                }
                if let Err(close_err) = conn.close().await {
                    tracing::debug!(error = %close_err, "close after failed setup failed");
                }
                return Err(e);
            }
        };

        let elapsed = start.elapsed().as_millis() as u64;
        crate::metrics::counters::connection_opened(config.protocol.as_str());
        crate::metrics::histograms::connect_duration(config.protocol.as_str(), elapsed);
        tracing::info!(endpoint = conn.endpoint(), %user, elapsed_ms = elapsed, "session established");

        Ok(Self {
            conn: Some(conn),
            session_id,
            user,
            database,
            protocol: config.protocol,
        })
    }

    /// Authenticated user as reported by the server
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Database the session is bound to
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Protocol the session speaks
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Whether `close` has not yet been called
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Names of the tables visible to this session
    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        let session_id = self.session_id.clone();
        let tables = self.conn()?.get_tables(&session_id).await?;
        tracing::debug!(count = tables.len(), database = %self.database, "listed tables");
        Ok(tables)
    }

    /// Ask the server to describe this session
    pub async fn session_info(&mut self) -> Result<SessionInfo> {
        let session_id = self.session_id.clone();
        self.conn()?.get_session_info(&session_id).await
    }

    /// Ask the server for its status
    pub async fn server_status(&mut self) -> Result<ServerStatus> {
        let session_id = self.session_id.clone();
        self.conn()?.get_server_status(&session_id).await
    }

    /// Disconnect the server-side session and shut the transport down.
    ///
    /// The transport is shut down even when `disconnect` fails; the first
    /// error is returned.
    pub async fn close(mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let disconnected = conn.disconnect(&self.session_id).await;
        let shutdown = conn.close().await;
        tracing::debug!(user = %self.user, "session closed");

        disconnected.and(shutdown)
    }

    fn conn(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or_else(|| Error::InvalidState {
            expected: "open session".into(),
            actual: "closed".into(),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!(user = %self.user, "session dropped without close; server session left open");
        }
    }
}
