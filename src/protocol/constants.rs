//! Thrift protocol constants

/// Strict binary protocol version (`VERSION_1`)
pub const VERSION_1: u32 = 0x8001_0000;

/// Mask selecting the version bits of a strict message header
pub const VERSION_MASK: u32 = 0xffff_0000;

/// Mask selecting the message type bits of a strict message header
pub const TYPE_MASK: u32 = 0x0000_00ff;

/// TJSONProtocol version written as the first array element of every message
pub const JSON_VERSION: i64 = 1;

/// Content type used for Thrift JSON over HTTP
pub const JSON_CONTENT_TYPE: &str = "application/vnd.apache.thrift.json";

/// Wire type identifiers
pub mod ttype {
    /// End of struct marker
    pub const STOP: u8 = 0;

    /// No value
    pub const VOID: u8 = 1;

    /// Boolean
    pub const BOOL: u8 = 2;

    /// Signed 8-bit integer
    pub const BYTE: u8 = 3;

    /// IEEE 754 double
    pub const DOUBLE: u8 = 4;

    /// Signed 16-bit integer
    pub const I16: u8 = 6;

    /// Signed 32-bit integer
    pub const I32: u8 = 8;

    /// Signed 64-bit integer
    pub const I64: u8 = 10;

    /// Length-prefixed string (or binary)
    pub const STRING: u8 = 11;

    /// Nested struct
    pub const STRUCT: u8 = 12;

    /// Map
    pub const MAP: u8 = 13;

    /// Set
    pub const SET: u8 = 14;

    /// List
    pub const LIST: u8 = 15;
}

/// Message types
pub mod message_type {
    /// Client call expecting a reply
    pub const CALL: u8 = 1;

    /// Server reply
    pub const REPLY: u8 = 2;

    /// Application-level exception raised by the Thrift processor
    pub const EXCEPTION: u8 = 3;

    /// Client call without reply
    pub const ONEWAY: u8 = 4;
}

/// `TApplicationException` type codes
pub mod app_exception {
    /// Unknown error
    pub const UNKNOWN: i32 = 0;

    /// The processor does not know the called method
    pub const UNKNOWN_METHOD: i32 = 1;

    /// Invalid message type
    pub const INVALID_MESSAGE_TYPE: i32 = 2;

    /// Reply method name did not match the call
    pub const WRONG_METHOD_NAME: i32 = 3;

    /// Reply sequence id did not match the call
    pub const BAD_SEQUENCE_ID: i32 = 4;

    /// Reply carried neither a result nor an exception
    pub const MISSING_RESULT: i32 = 5;

    /// Server-side internal error
    pub const INTERNAL_ERROR: i32 = 6;

    /// Protocol error
    pub const PROTOCOL_ERROR: i32 = 7;
}

/// Service method names
pub mod methods {
    /// Open a session
    pub const CONNECT: &str = "connect";

    /// Close a session
    pub const DISCONNECT: &str = "disconnect";

    /// List tables visible to the session
    pub const GET_TABLES: &str = "get_tables";

    /// Describe the session (user, database)
    pub const GET_SESSION_INFO: &str = "get_session_info";

    /// Describe the server (version, edition)
    pub const GET_SERVER_STATUS: &str = "get_server_status";
}
