//! Binary protocol decoding

use super::constants::{ttype, TYPE_MASK, VERSION_1, VERSION_MASK};
use super::message::{Message, MessageType, Struct, Value};
use std::io;

/// Maximum length accepted for a string or container header (64 MB).
///
/// Lengths above this are rejected before allocation so that a peer speaking
/// another protocol (an HTTP banner read as a length) fails fast.
const MAX_LENGTH: usize = 64 * 1024 * 1024;

/// Maximum struct/container nesting depth
const MAX_DEPTH: usize = 64;

/// Decode one message from the front of `data`.
///
/// # Returns
/// `Ok((msg, consumed))` - Message and number of bytes consumed
/// `Err(e)` with kind `UnexpectedEof` - more bytes are needed
/// `Err(e)` with any other kind - the data is not a valid message
pub fn decode_message(data: &[u8]) -> io::Result<(Message, usize)> {
    let mut r = Reader { data, pos: 0 };

    let header = r.read_i32()?;
    let (name, kind, seq_id) = if header < 0 {
        let header = header as u32;
        if header & VERSION_MASK != VERSION_1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad protocol version: 0x{:08X}", header & VERSION_MASK),
            ));
        }
        let kind = MessageType::from_code((header & TYPE_MASK) as u8)?;
        let name = r.read_string()?;
        let seq_id = r.read_i32()?;
        (name, kind, seq_id)
    } else {
        // Non-strict header: the first word is the name length
        let name = r.read_string_of_len(header)?;
        let kind = MessageType::from_code(r.read_u8()?)?;
        let seq_id = r.read_i32()?;
        (name, kind, seq_id)
    };

    let body = r.read_struct(0)?;

    Ok((
        Message {
            name,
            kind,
            seq_id,
            body,
        },
        r.pos,
    ))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> io::Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1, "byte")?[0])
    }

    fn read_i16(&mut self) -> io::Result<i16> {
        let b = self.take(2, "i16")?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        let b = self.take(4, "i32")?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i64(&mut self) -> io::Result<i64> {
        let b = self.take(8, "i64")?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_be_bytes(arr))
    }

    fn read_len(&mut self) -> io::Result<usize> {
        let len = self.read_i32()?;
        check_len(len)
    }

    fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_i32()?;
        self.read_string_of_len(len)
    }

    fn read_string_of_len(&mut self, len: i32) -> io::Result<String> {
        let len = check_len(len)?;
        let bytes = self.take(len, "string data")?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid UTF-8 in string: {}", e),
            )
        })
    }

    fn read_struct(&mut self, depth: usize) -> io::Result<Struct> {
        check_depth(depth)?;
        let mut s = Struct::new();
        loop {
            let field_type = self.read_u8()?;
            if field_type == ttype::STOP {
                break;
            }
            let id = self.read_i16()?;
            let value = self.read_value(field_type, depth + 1)?;
            s.push(id, value);
        }
        Ok(s)
    }

    fn read_value(&mut self, t: u8, depth: usize) -> io::Result<Value> {
        check_depth(depth)?;
        let value = match t {
            ttype::BOOL => Value::Bool(self.read_u8()? != 0),
            ttype::BYTE => Value::Byte(self.read_u8()? as i8),
            ttype::DOUBLE => Value::Double(f64::from_bits(self.read_i64()? as u64)),
            ttype::I16 => Value::I16(self.read_i16()?),
            ttype::I32 => Value::I32(self.read_i32()?),
            ttype::I64 => Value::I64(self.read_i64()?),
            ttype::STRING => Value::String(self.read_string()?),
            ttype::STRUCT => Value::Struct(self.read_struct(depth)?),
            ttype::MAP => {
                let key = self.read_u8()?;
                let value = self.read_u8()?;
                let len = self.read_len()?;
                let mut entries = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    let k = self.read_value(key, depth + 1)?;
                    let v = self.read_value(value, depth + 1)?;
                    entries.push((k, v));
                }
                Value::Map {
                    key,
                    value,
                    entries,
                }
            }
            ttype::SET | ttype::LIST => {
                let elem = self.read_u8()?;
                let len = self.read_len()?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.read_value(elem, depth + 1)?);
                }
                if t == ttype::SET {
                    Value::Set(elem, items)
                } else {
                    Value::List(elem, items)
                }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown field type: {}", other),
                ))
            }
        };
        Ok(value)
    }
}

fn check_len(len: i32) -> io::Result<usize> {
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative length: {}", len),
        ));
    }
    let len = len as usize;
    if len > MAX_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length {} exceeds maximum allowed {}", len, MAX_LENGTH),
        ));
    }
    Ok(len)
}

fn check_depth(depth: usize) -> io::Result<()> {
    if depth > MAX_DEPTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("nesting depth exceeds {}", MAX_DEPTH),
        ));
    }
    Ok(())
}
