//! Scoped session acquisition

use crate::client::Session;
use crate::connection::ConnectionConfig;
use crate::Result;
use futures::future::BoxFuture;

/// Run `body` against a fresh session, closing it afterwards.
///
/// The session is closed whether or not `body` succeeds. An error from
/// `body` wins over an error from closing.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> omnisci_fixture::Result<()> {
/// use futures::FutureExt;
/// use omnisci_fixture::fixture::{with_session, Environment};
///
/// let config = Environment::Local.config()?;
/// let tables = with_session(&config, |session| {
///     async move { session.list_tables().await }.boxed()
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_session<T, F>(config: &ConnectionConfig, body: F) -> Result<T>
where
    F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T>>,
{
    let mut session = Session::connect(config).await?;
    let outcome = body(&mut session).await;
    let closed = session.close().await;

    match outcome {
        Ok(value) => closed.map(|()| value),
        Err(e) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "close after failed scope also failed");
            }
            Err(e)
        }
    }
}

/// A session shared by every test of one module
///
/// Connects on the first [`get`](ModuleFixture::get) and hands out the same
/// session until [`teardown`](ModuleFixture::teardown).
#[derive(Debug)]
pub struct ModuleFixture {
    config: ConnectionConfig,
    session: Option<Session>,
}

impl ModuleFixture {
    /// Create an unconnected fixture
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Configuration the fixture connects with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether a session is currently held
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// The fixture's session, connecting on first use
    pub async fn get(&mut self) -> Result<&mut Session> {
        let session = match self.session.take() {
            Some(session) => session,
            None => Session::connect(&self.config).await?,
        };
        Ok(self.session.insert(session))
    }

    /// Close the session if one was opened
    pub async fn teardown(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}
