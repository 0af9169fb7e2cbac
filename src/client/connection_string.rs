//! Connection string parsing
//!
//! Supports formats:
//! * omnisci://[user[:password]@]host[:port][/database][?protocol=binary|http|https]
//! * mapd://... and heavydb://... as aliases

use crate::connection::{ConnectionConfig, Protocol, Secret};
use crate::{Error, Result};

/// Database used when the connection string names none
pub const DEFAULT_DATABASE: &str = "omnisci";

const SCHEMES: [&str; 3] = ["omnisci://", "mapd://", "heavydb://"];

/// Parsed connection info
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Host
    pub host: String,
    /// Port
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password
    pub password: Option<Secret>,
    /// Wire protocol
    pub protocol: Protocol,
}

/// Extract a query parameter value from a query string
fn parse_query_param(query_string: &str, param: &str) -> Option<String> {
    if query_string.is_empty() {
        return None;
    }

    // Remove leading '?' if present
    let query = query_string.trim_start_matches('?');

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == param {
                return Some(value.to_string());
            }
        }
    }
    None
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = SCHEMES
            .iter()
            .find_map(|scheme| s.strip_prefix(scheme))
            .ok_or_else(|| {
                Error::Config(
                    "connection string must start with omnisci://, mapd:// or heavydb://".into(),
                )
            })?;

        // Format: [user[:password]@]host[:port][/database][?params]
        let (rest, query_string) = match rest.find('?') {
            Some(q_pos) => rest.split_at(q_pos),
            None => (rest, ""),
        };

        // The password may hold '@' or '/', the database name neither
        let (auth, rest) = match rest.rfind('@') {
            Some(pos) => (Some(&rest[..pos]), &rest[pos + 1..]),
            None => (None, rest),
        };

        let (user, password) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (user.to_string(), Some(Secret::new(pass))),
                None => (auth.to_string(), None),
            },
            None => (whoami::username(), None),
        };

        let protocol = match parse_query_param(query_string, "protocol") {
            Some(p) => p.parse()?,
            None => Protocol::default(),
        };

        let (host_port, database) = match rest.split_once('/') {
            Some((hp, db)) if !db.is_empty() => (hp, db.to_string()),
            Some((hp, _)) => (hp, DEFAULT_DATABASE.to_string()),
            None => (rest, DEFAULT_DATABASE.to_string()),
        };

        let (host, port) = split_host_port(host_port)?;
        if host.is_empty() {
            return Err(Error::Config("connection string has no host".into()));
        }

        Ok(Self {
            host,
            port: port.unwrap_or_else(|| protocol.default_port()),
            database,
            user,
            password,
            protocol,
        })
    }

    /// Convert to ConnectionConfig
    pub fn to_config(&self) -> ConnectionConfig {
        let mut builder = ConnectionConfig::builder(&self.host, &self.database, &self.user)
            .port(self.port)
            .protocol(self.protocol);
        if let Some(ref password) = self.password {
            builder = builder.password(password.clone());
        }
        builder.build()
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 literals
fn split_host_port(host_port: &str) -> Result<(String, Option<u16>)> {
    let parse_port = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| Error::Config(format!("invalid port: '{}'", p)))
    };

    if let Some(rest) = host_port.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::Config("unterminated IPv6 literal".into()))?;
        let port = match after.strip_prefix(':') {
            Some(p) => Some(parse_port(p)?),
            None if after.is_empty() => None,
            None => return Err(Error::Config(format!("invalid host: '{}'", host_port))),
        };
        return Ok((host.to_string(), port));
    }

    match host_port.split_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((host_port.to_string(), None)),
    }
}
