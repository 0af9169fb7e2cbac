//! Protocol message types

use super::constants::{app_exception, message_type, ttype};
use std::io;

/// Message kind carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Call (client → server)
    Call,
    /// Reply (server → client)
    Reply,
    /// Application exception (server → client)
    Exception,
    /// One-way call, no reply expected
    Oneway,
}

impl MessageType {
    /// Wire code of this message type
    pub fn code(self) -> u8 {
        match self {
            Self::Call => message_type::CALL,
            Self::Reply => message_type::REPLY,
            Self::Exception => message_type::EXCEPTION,
            Self::Oneway => message_type::ONEWAY,
        }
    }

    /// Parse a wire code
    pub fn from_code(code: u8) -> io::Result<Self> {
        match code {
            message_type::CALL => Ok(Self::Call),
            message_type::REPLY => Ok(Self::Reply),
            message_type::EXCEPTION => Ok(Self::Exception),
            message_type::ONEWAY => Ok(Self::Oneway),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message type: {}", other),
            )),
        }
    }
}

/// A Thrift value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Signed byte
    Byte(i8),
    /// Double
    Double(f64),
    /// 16-bit integer
    I16(i16),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// UTF-8 string
    String(String),
    /// Nested struct
    Struct(Struct),
    /// Map with declared key and value types
    Map {
        /// Key type
        key: u8,
        /// Value type
        value: u8,
        /// Entries in wire order
        entries: Vec<(Value, Value)>,
    },
    /// Set with declared element type
    Set(u8, Vec<Value>),
    /// List with declared element type
    List(u8, Vec<Value>),
}

impl Value {
    /// Wire type of this value
    pub fn ttype(&self) -> u8 {
        match self {
            Self::Bool(_) => ttype::BOOL,
            Self::Byte(_) => ttype::BYTE,
            Self::Double(_) => ttype::DOUBLE,
            Self::I16(_) => ttype::I16,
            Self::I32(_) => ttype::I32,
            Self::I64(_) => ttype::I64,
            Self::String(_) => ttype::STRING,
            Self::Struct(_) => ttype::STRUCT,
            Self::Map { .. } => ttype::MAP,
            Self::Set(..) => ttype::SET,
            Self::List(..) => ttype::LIST,
        }
    }

    /// Build a list of strings
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(
            ttype::STRING,
            items.into_iter().map(|s| Self::String(s.into())).collect(),
        )
    }

    /// Borrow as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Read any integer type widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow as a struct
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a list or set of strings into a `Vec<String>`
    pub fn into_string_list(self) -> Option<Vec<String>> {
        match self {
            Self::List(_, items) | Self::Set(_, items) => items
                .into_iter()
                .map(|v| match v {
                    Self::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }
}

/// A struct field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field id
    pub id: i16,
    /// Field value
    pub value: Value,
}

/// A Thrift struct: ordered fields keyed by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Struct {
    fields: Vec<Field>,
}

impl Struct {
    /// Empty struct
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn with(mut self, id: i16, value: Value) -> Self {
        self.push(id, value);
        self
    }

    /// Add a field
    pub fn push(&mut self, id: i16, value: Value) {
        self.fields.push(Field { id, value });
    }

    /// Look up a field by id
    pub fn get(&self, id: i16) -> Option<&Value> {
        self.fields.iter().find(|f| f.id == id).map(|f| &f.value)
    }

    /// Remove and return a field by id
    pub fn take(&mut self, id: i16) -> Option<Value> {
        let pos = self.fields.iter().position(|f| f.id == id)?;
        Some(self.fields.remove(pos).value)
    }

    /// Iterate over fields in wire order
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the struct has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read a string field
    pub fn string(&self, id: i16) -> Option<&str> {
        self.get(id).and_then(Value::as_str)
    }
}

/// A complete message: header plus argument/result struct
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Method name
    pub name: String,
    /// Message type
    pub kind: MessageType,
    /// Sequence id, echoed by the server
    pub seq_id: i32,
    /// Arguments (calls) or result (replies)
    pub body: Struct,
}

impl Message {
    /// Build a call message
    pub fn call(name: impl Into<String>, seq_id: i32, args: Struct) -> Self {
        Self {
            name: name.into(),
            kind: MessageType::Call,
            seq_id,
            body: args,
        }
    }

    /// Build a reply message
    pub fn reply(name: impl Into<String>, seq_id: i32, result: Struct) -> Self {
        Self {
            name: name.into(),
            kind: MessageType::Reply,
            seq_id,
            body: result,
        }
    }

    /// Build an application exception message
    pub fn exception(name: impl Into<String>, seq_id: i32, err: &ApplicationException) -> Self {
        Self {
            name: name.into(),
            kind: MessageType::Exception,
            seq_id,
            body: err.to_struct(),
        }
    }
}

/// `TApplicationException` raised by the Thrift processor itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationException {
    /// Human-readable message
    pub message: String,
    /// Exception type code
    pub kind: i32,
}

impl ApplicationException {
    /// Decode from the exception struct (`1: message`, `2: type`)
    pub fn from_struct(body: &Struct) -> Self {
        Self {
            message: body.string(1).unwrap_or_default().to_string(),
            kind: body
                .get(2)
                .and_then(Value::as_i64)
                .map(|v| v as i32)
                .unwrap_or(app_exception::UNKNOWN),
        }
    }

    /// Encode as the exception struct
    pub fn to_struct(&self) -> Struct {
        Struct::new()
            .with(1, Value::String(self.message.clone()))
            .with(2, Value::I32(self.kind))
    }

    /// Whether the server reported an unknown method
    pub fn is_unknown_method(&self) -> bool {
        self.kind == app_exception::UNKNOWN_METHOD
    }
}

impl std::fmt::Display for ApplicationException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (type {})", self.message, self.kind)
    }
}
