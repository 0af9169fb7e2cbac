//! Named connection environments
//!
//! Three presets exist. `Local` and `LocalMapped` differ only in port:
//! 6274 is the server's native binary port, 16274 is where containerised
//! test servers commonly expose it. Every field can be overridden from the
//! process environment:
//!
//! | environment               | prefix               |
//! |---------------------------|----------------------|
//! | `Local`, `LocalMapped`    | `OMNISCI_LOCAL_`     |
//! | `External`                | `OMNISCI_EXTERNAL_`  |
//!
//! with suffixes `HOST`, `PORT`, `DATABASE`, `USER`, `PASSWORD`, `PROTOCOL`.

use crate::connection::{ConnectionConfig, Protocol};
use crate::{Error, Result};

/// Loopback host of the local server
pub const LOCAL_HOST: &str = "127.0.0.1";
/// Native binary port of the local server
pub const LOCAL_PORT: u16 = 6274;
/// Port of a local server exposed through a port mapping
pub const LOCAL_MAPPED_PORT: u16 = 16274;
/// Database of the local server
pub const LOCAL_DATABASE: &str = "omnisci";
/// User of the local server
pub const LOCAL_USER: &str = "admin";
/// Default password of the local server
pub const LOCAL_PASSWORD: &str = "HyperInteractive";

/// Host of the public demo server
pub const EXTERNAL_HOST: &str = "metis.mapd.com";
/// Port of the public demo server
pub const EXTERNAL_PORT: u16 = 443;
/// Database of the public demo server
pub const EXTERNAL_DATABASE: &str = "mapd";
/// User of the public demo server
pub const EXTERNAL_USER: &str = "demouser";
/// Default password of the public demo server
pub const EXTERNAL_PASSWORD: &str = "HyperInteractive";

/// A named connection environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Loopback server on the native binary port
    Local,
    /// Loopback server on the mapped port
    LocalMapped,
    /// Public demo server over HTTPS
    External,
}

impl Environment {
    /// All environments
    pub const ALL: [Environment; 3] = [Self::Local, Self::LocalMapped, Self::External];

    /// Short name
    pub fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::LocalMapped => "local-mapped",
            Self::External => "external",
        }
    }

    /// Prefix of the override variables
    pub fn env_prefix(self) -> &'static str {
        match self {
            Self::Local | Self::LocalMapped => "OMNISCI_LOCAL_",
            Self::External => "OMNISCI_EXTERNAL_",
        }
    }

    /// Built-in configuration, ignoring the process environment
    pub fn default_config(self) -> ConnectionConfig {
        match self {
            Self::Local => ConnectionConfig::new(
                LOCAL_HOST,
                LOCAL_PORT,
                LOCAL_DATABASE,
                LOCAL_USER,
                LOCAL_PASSWORD,
                Protocol::Binary,
            ),
            Self::LocalMapped => ConnectionConfig::new(
                LOCAL_HOST,
                LOCAL_MAPPED_PORT,
                LOCAL_DATABASE,
                LOCAL_USER,
                LOCAL_PASSWORD,
                Protocol::Binary,
            ),
            Self::External => ConnectionConfig::new(
                EXTERNAL_HOST,
                EXTERNAL_PORT,
                EXTERNAL_DATABASE,
                EXTERNAL_USER,
                EXTERNAL_PASSWORD,
                Protocol::Https,
            ),
        }
    }

    /// Configuration with overrides read from the process environment
    pub fn config(self) -> Result<ConnectionConfig> {
        self.config_from(|key| std::env::var(key).ok())
    }

    /// Configuration with overrides read through `lookup`
    pub fn config_from<F>(self, lookup: F) -> Result<ConnectionConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = self.env_prefix();
        let var = |suffix: &str| {
            let key = format!("{}{}", prefix, suffix);
            lookup(&key).map(|value| (key, value))
        };

        let mut config = self.default_config();

        if let Some((_, host)) = var("HOST") {
            config.host = host;
        }
        if let Some((key, port)) = var("PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} is not a valid port: '{}'", key, port)))?;
        }
        if let Some((_, database)) = var("DATABASE") {
            config.database = database;
        }
        if let Some((_, user)) = var("USER") {
            config.user = user;
        }
        if let Some((_, password)) = var("PASSWORD") {
            config.password = password.into();
        }
        if let Some((key, protocol)) = var("PROTOCOL") {
            config.protocol = protocol
                .parse()
                .map_err(|e| Error::Config(format!("{}: {}", key, e)))?;
        }

        Ok(config)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|env| env.name() == s)
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown environment '{}': expected local, local-mapped, or external",
                    s
                ))
            })
    }
}

/// The pair of configurations the checks run against
#[derive(Debug, Clone)]
pub struct Environments {
    /// Local server configuration
    pub local: ConnectionConfig,
    /// External server configuration
    pub external: ConnectionConfig,
}

impl Environments {
    /// Built-in configurations, ignoring the process environment
    pub fn defaults() -> Self {
        Self {
            local: Environment::Local.default_config(),
            external: Environment::External.default_config(),
        }
    }

    /// Local (port 6274) and external configurations with environment overrides
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            local: Environment::Local.config()?,
            external: Environment::External.config()?,
        })
    }

    /// Like [`Environments::from_env`] with the local server on the mapped port
    pub fn mapped_from_env() -> Result<Self> {
        Ok(Self {
            local: Environment::LocalMapped.config()?,
            external: Environment::External.config()?,
        })
    }
}
