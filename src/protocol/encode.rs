//! Binary protocol encoding

use super::constants::{ttype, VERSION_1};
use super::message::{Message, Struct, Value};
use bytes::{BufMut, BytesMut};
use std::io;

/// Encode a message with the strict binary protocol
pub fn encode_message(msg: &Message) -> io::Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(64);

    // Strict header: version | type, name, seqid
    buf.put_u32(VERSION_1 | u32::from(msg.kind.code()));
    encode_string(&mut buf, &msg.name)?;
    buf.put_i32(msg.seq_id);

    encode_struct(&mut buf, &msg.body)?;

    Ok(buf)
}

fn encode_struct(buf: &mut BytesMut, s: &Struct) -> io::Result<()> {
    for field in s.fields() {
        buf.put_u8(field.value.ttype());
        buf.put_i16(field.id);
        encode_value(buf, &field.value)?;
    }
    buf.put_u8(ttype::STOP);
    Ok(())
}

fn encode_value(buf: &mut BytesMut, value: &Value) -> io::Result<()> {
    match value {
        Value::Bool(b) => buf.put_u8(u8::from(*b)),
        Value::Byte(v) => buf.put_i8(*v),
        Value::Double(v) => buf.put_f64(*v),
        Value::I16(v) => buf.put_i16(*v),
        Value::I32(v) => buf.put_i32(*v),
        Value::I64(v) => buf.put_i64(*v),
        Value::String(s) => encode_string(buf, s)?,
        Value::Struct(s) => encode_struct(buf, s)?,
        Value::Map {
            key,
            value,
            entries,
        } => {
            buf.put_u8(*key);
            buf.put_u8(*value);
            put_len(buf, entries.len())?;
            for (k, v) in entries {
                check_elem(*key, k)?;
                check_elem(*value, v)?;
                encode_value(buf, k)?;
                encode_value(buf, v)?;
            }
        }
        Value::Set(elem, items) | Value::List(elem, items) => {
            buf.put_u8(*elem);
            put_len(buf, items.len())?;
            for item in items {
                check_elem(*elem, item)?;
                encode_value(buf, item)?;
            }
        }
    }
    Ok(())
}

fn encode_string(buf: &mut BytesMut, s: &str) -> io::Result<()> {
    put_len(buf, s.len())?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_len(buf: &mut BytesMut, len: usize) -> io::Result<()> {
    let len = i32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("length {} does not fit in i32", len),
        )
    })?;
    buf.put_i32(len);
    Ok(())
}

fn check_elem(declared: u8, value: &Value) -> io::Result<()> {
    if value.ttype() != declared {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "container element type {} does not match declared type {}",
                value.ttype(),
                declared
            ),
        ));
    }
    Ok(())
}
