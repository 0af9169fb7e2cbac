//! Thrift wire protocol
//!
//! This module handles:
//! * The generic Thrift value model (structs, lists, maps)
//! * Strict binary protocol encoding/decoding (the `binary` transport)
//! * TJSONProtocol encoding/decoding (the `http` / `https` transports)
//! * Service-level argument and result structs

pub mod constants;
pub mod decode;
pub mod encode;
pub mod json;
pub mod message;
pub mod service;

pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{ApplicationException, Field, Message, MessageType, Struct, Value};
pub use service::{ServerStatus, SessionInfo};
