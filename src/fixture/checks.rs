//! Verification checks
//!
//! Read-only assertions against live sessions. [`run_all`] opens one session
//! per configuration on first use and shares it between the checks that
//! target it; each failure is still reported against its own check.
//! Nothing is retried.

use super::environment::Environments;
use super::scope::{with_session, ModuleFixture};
use crate::client::Session;
use crate::connection::ConnectionConfig;
use crate::error::CheckFailure;
use crate::metrics::labels::{OUTCOME_ERROR, OUTCOME_OK};
use crate::{Error, Result};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Tables the external demo database must contain
pub const EXPECTED_TABLES: [&str; 2] = ["flights_donotmodify", "tweets_nov_feb"];

/// Assert that `session` is authenticated as `expected`
pub fn check_identity(session: &Session, expected: &str) -> Result<()> {
    if session.user() == expected {
        return Ok(());
    }
    Err(Error::Check(CheckFailure::UserMismatch {
        expected: expected.to_string(),
        actual: session.user().to_string(),
    }))
}

/// Assert that every table in `expected` is visible to `session`.
///
/// The failure lists all missing tables, not just the first.
pub async fn check_tables_present(session: &mut Session, expected: &[&str]) -> Result<()> {
    let tables = session.list_tables().await?;
    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !tables.iter().any(|t| t == *name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::Check(CheckFailure::MissingTables {
        database: session.database().to_string(),
        missing,
    }))
}

/// One verification check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// The local session is authenticated as the configured local user
    LocalIdentity,
    /// The external session is authenticated as the configured external user
    ExternalIdentity,
    /// The external database holds [`EXPECTED_TABLES`]
    SchemaPresence,
}

impl Check {
    /// Every check, in run order
    pub const ALL: [Check; 3] = [
        Self::LocalIdentity,
        Self::ExternalIdentity,
        Self::SchemaPresence,
    ];

    /// Short name, also used as the metric label
    pub fn name(self) -> &'static str {
        match self {
            Self::LocalIdentity => "local_identity",
            Self::ExternalIdentity => "external_identity",
            Self::SchemaPresence => "schema_presence",
        }
    }

    /// Configuration the check connects with
    pub fn config(self, envs: &Environments) -> &ConnectionConfig {
        match self {
            Self::LocalIdentity => &envs.local,
            Self::ExternalIdentity | Self::SchemaPresence => &envs.external,
        }
    }

    /// Run the check against an already open session
    pub async fn run_on(self, session: &mut Session, envs: &Environments) -> Result<()> {
        match self {
            Self::LocalIdentity | Self::ExternalIdentity => {
                check_identity(session, &self.config(envs).user)
            }
            Self::SchemaPresence => check_tables_present(session, &EXPECTED_TABLES).await,
        }
    }

    /// Run the check in its own session scope
    pub async fn run(self, envs: &Environments) -> Result<()> {
        let config = self.config(envs);
        match self {
            Self::LocalIdentity | Self::ExternalIdentity => {
                let expected = config.user.clone();
                with_session(config, move |session| {
                    async move { check_identity(session, &expected) }.boxed()
                })
                .await
            }
            Self::SchemaPresence => {
                with_session(config, |session| {
                    check_tables_present(session, &EXPECTED_TABLES).boxed()
                })
                .await
            }
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one check
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    /// Check that ran
    pub check: Check,
    /// Error category when the check failed
    pub category: Option<&'static str>,
    /// Error message when the check failed
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl CheckOutcome {
    /// Whether the check held
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcomes of a full run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    /// One outcome per check, in run order
    pub outcomes: Vec<CheckOutcome>,
}

impl Report {
    /// True only if every check passed
    pub fn passed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(CheckOutcome::passed)
    }

    /// Outcomes of the checks that failed
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    /// Outcome of one check, if it ran
    pub fn outcome(&self, check: Check) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.check == check)
    }
}

/// Failure recorded for one check
#[derive(Debug, Clone)]
struct Failure {
    category: &'static str,
    message: String,
}

impl From<&Error> for Failure {
    fn from(e: &Error) -> Self {
        Self {
            category: e.category(),
            message: e.to_string(),
        }
    }
}

/// One configuration's fixture, shared by the checks that target it
struct SharedScope {
    name: &'static str,
    fixture: ModuleFixture,
    // Cached so a failed connect is reported to every check without retrying
    setup_failure: Option<Failure>,
}

impl SharedScope {
    fn new(name: &'static str, config: &ConnectionConfig) -> Self {
        Self {
            name,
            fixture: ModuleFixture::new(config.clone()),
            setup_failure: None,
        }
    }

    async fn run(&mut self, check: Check, envs: &Environments) -> std::result::Result<(), Failure> {
        if let Some(failure) = &self.setup_failure {
            return Err(failure.clone());
        }
        let session = match self.fixture.get().await {
            Ok(session) => session,
            Err(e) => {
                let failure = Failure::from(&e);
                self.setup_failure = Some(failure.clone());
                return Err(failure);
            }
        };
        check.run_on(session, envs).await.map_err(|e| Failure::from(&e))
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.fixture.teardown().await {
            tracing::warn!(scope = self.name, error = %e, "fixture teardown failed");
        }
    }
}

/// Run every check in order and collect the outcomes.
///
/// Check A runs on the local fixture, checks B and C share the external
/// one. Both fixtures are torn down after the last check, whatever the
/// outcomes.
pub async fn run_all(envs: &Environments) -> Report {
    let mut local = SharedScope::new("local", &envs.local);
    let mut external = SharedScope::new("external", &envs.external);
    let mut report = Report::default();

    for check in Check::ALL {
        let scope = match check {
            Check::LocalIdentity => &mut local,
            Check::ExternalIdentity | Check::SchemaPresence => &mut external,
        };

        let start = Instant::now();
        let result = scope.run(check, envs).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(()) => {
                tracing::info!(%check, duration_ms, "check passed");
                crate::metrics::counters::check_completed(check.name(), OUTCOME_OK);
                CheckOutcome {
                    check,
                    category: None,
                    error: None,
                    duration_ms,
                }
            }
            Err(failure) => {
                tracing::error!(
                    %check,
                    category = failure.category,
                    duration_ms,
                    "check failed: {}",
                    failure.message
                );
                crate::metrics::counters::check_completed(check.name(), OUTCOME_ERROR);
                CheckOutcome {
                    check,
                    category: Some(failure.category),
                    error: Some(failure.message),
                    duration_ms,
                }
            }
        };
        report.outcomes.push(outcome);
    }

    local.teardown().await;
    external.teardown().await;

    report
}
