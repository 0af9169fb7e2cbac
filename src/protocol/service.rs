//! Service-level argument and result structs

use super::message::{Struct, Value};
use serde::{Deserialize, Serialize};
use std::io;

/// Arguments of `connect(1: user, 2: passwd, 3: dbname)`
pub fn connect_args(user: &str, password: &str, database: &str) -> Struct {
    Struct::new()
        .with(1, Value::String(user.to_string()))
        .with(2, Value::String(password.to_string()))
        .with(3, Value::String(database.to_string()))
}

/// Arguments of every call that only takes `1: session`
pub fn session_args(session: &str) -> Struct {
    Struct::new().with(1, Value::String(session.to_string()))
}

/// Identity of an open session as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Authenticated user
    pub user: String,
    /// Current database
    pub database: String,
    /// Session start, seconds since the epoch
    pub start_time: i64,
    /// Whether the user is a superuser
    pub is_super: bool,
}

impl SessionInfo {
    /// Decode from `TSessionInfo`
    pub fn from_struct(s: &Struct) -> io::Result<Self> {
        Ok(Self {
            user: required_string(s, 1, "TSessionInfo.user")?,
            database: s.string(2).unwrap_or_default().to_string(),
            start_time: s.get(3).and_then(Value::as_i64).unwrap_or_default(),
            is_super: s.get(4).and_then(Value::as_bool).unwrap_or_default(),
        })
    }

    /// Encode as `TSessionInfo`
    pub fn to_struct(&self) -> Struct {
        Struct::new()
            .with(1, Value::String(self.user.clone()))
            .with(2, Value::String(self.database.clone()))
            .with(3, Value::I64(self.start_time))
            .with(4, Value::Bool(self.is_super))
    }
}

/// Server status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Server runs in read-only mode
    pub read_only: bool,
    /// Server version string
    pub version: String,
    /// Backend rendering available
    pub rendering_enabled: bool,
    /// Server start, seconds since the epoch
    pub start_time: i64,
    /// Edition (`ce`, `ee`, ...)
    pub edition: String,
    /// Host name of the server
    pub host_name: String,
}

impl ServerStatus {
    /// Decode from `TServerStatus`
    pub fn from_struct(s: &Struct) -> io::Result<Self> {
        Ok(Self {
            read_only: s.get(1).and_then(Value::as_bool).unwrap_or_default(),
            version: required_string(s, 2, "TServerStatus.version")?,
            rendering_enabled: s.get(3).and_then(Value::as_bool).unwrap_or_default(),
            start_time: s.get(4).and_then(Value::as_i64).unwrap_or_default(),
            edition: s.string(5).unwrap_or_default().to_string(),
            host_name: s.string(6).unwrap_or_default().to_string(),
        })
    }

    /// Encode as `TServerStatus`
    pub fn to_struct(&self) -> Struct {
        Struct::new()
            .with(1, Value::Bool(self.read_only))
            .with(2, Value::String(self.version.clone()))
            .with(3, Value::Bool(self.rendering_enabled))
            .with(4, Value::I64(self.start_time))
            .with(5, Value::String(self.edition.clone()))
            .with(6, Value::String(self.host_name.clone()))
    }
}

/// Build the service exception struct (`TOmniSciException { 1: error_msg }`)
pub fn service_exception(message: &str) -> Struct {
    Struct::new().with(1, Value::String(message.to_string()))
}

fn required_string(s: &Struct, id: i16, what: &str) -> io::Result<String> {
    s.string(id).map(str::to_string).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("missing required field {}", what),
        )
    })
}
