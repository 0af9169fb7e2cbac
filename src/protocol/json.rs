//! Thrift JSON protocol (TJSONProtocol), used over HTTP
//!
//! Layout:
//! * message: `[1, "name", type, seqid, {struct}]`
//! * struct: `{"<field id>": {"<type name>": value}}`
//! * list/set: `["<elem type>", count, elems...]`
//! * map: `["<key type>", "<value type>", count, {"key": value}]`
//! * bool: `1` / `0`

use super::constants::{ttype, JSON_VERSION};
use super::message::{Message, MessageType, Struct, Value};
use serde_json::{Map, Number, Value as Json};
use std::io;

/// Maximum struct/container nesting depth
const MAX_DEPTH: usize = 64;

/// Encode a message as TJSONProtocol bytes
pub fn encode_message(msg: &Message) -> io::Result<Vec<u8>> {
    let json = Json::Array(vec![
        Json::from(JSON_VERSION),
        Json::String(msg.name.clone()),
        Json::from(msg.kind.code()),
        Json::from(msg.seq_id),
        struct_to_json(&msg.body)?,
    ]);
    serde_json::to_vec(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Decode a complete TJSONProtocol message
pub fn decode_message(data: &[u8]) -> io::Result<Message> {
    let json: Json = serde_json::from_slice(data).map_err(|e| invalid(format!("invalid JSON: {}", e)))?;
    let parts = json
        .as_array()
        .ok_or_else(|| invalid("message is not a JSON array"))?;
    if parts.len() < 4 {
        return Err(invalid("message array is too short"));
    }

    let version = parts[0].as_i64().ok_or_else(|| invalid("missing version"))?;
    if version != JSON_VERSION {
        return Err(invalid(format!("unsupported JSON protocol version: {}", version)));
    }
    let name = parts[1]
        .as_str()
        .ok_or_else(|| invalid("missing method name"))?
        .to_string();
    let code = parts[2]
        .as_u64()
        .and_then(|c| u8::try_from(c).ok())
        .ok_or_else(|| invalid("missing message type"))?;
    let kind = MessageType::from_code(code)?;
    let seq_id = parts[3]
        .as_i64()
        .and_then(|s| i32::try_from(s).ok())
        .ok_or_else(|| invalid("missing sequence id"))?;
    let body = match parts.get(4) {
        Some(s) => json_to_struct(s, 0)?,
        None => Struct::new(),
    };

    Ok(Message {
        name,
        kind,
        seq_id,
        body,
    })
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn type_name(t: u8) -> io::Result<&'static str> {
    Ok(match t {
        ttype::BOOL => "tf",
        ttype::BYTE => "i8",
        ttype::I16 => "i16",
        ttype::I32 => "i32",
        ttype::I64 => "i64",
        ttype::DOUBLE => "dbl",
        ttype::STRING => "str",
        ttype::STRUCT => "rec",
        ttype::MAP => "map",
        ttype::SET => "set",
        ttype::LIST => "lst",
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("type {} has no JSON name", other),
            ))
        }
    })
}

fn type_id(name: &str) -> io::Result<u8> {
    Ok(match name {
        "tf" => ttype::BOOL,
        "i8" => ttype::BYTE,
        "i16" => ttype::I16,
        "i32" => ttype::I32,
        "i64" => ttype::I64,
        "dbl" => ttype::DOUBLE,
        "str" => ttype::STRING,
        "rec" => ttype::STRUCT,
        "map" => ttype::MAP,
        "set" => ttype::SET,
        "lst" => ttype::LIST,
        other => return Err(invalid(format!("unknown JSON type name: {}", other))),
    })
}

fn struct_to_json(s: &Struct) -> io::Result<Json> {
    let mut obj = Map::new();
    for field in s.fields() {
        let mut typed = Map::new();
        typed.insert(
            type_name(field.value.ttype())?.to_string(),
            value_to_json(&field.value)?,
        );
        obj.insert(field.id.to_string(), Json::Object(typed));
    }
    Ok(Json::Object(obj))
}

fn value_to_json(value: &Value) -> io::Result<Json> {
    Ok(match value {
        Value::Bool(b) => Json::from(u8::from(*b)),
        Value::Byte(v) => Json::from(*v),
        Value::I16(v) => Json::from(*v),
        Value::I32(v) => Json::from(*v),
        Value::I64(v) => Json::from(*v),
        Value::Double(v) => match Number::from_f64(*v) {
            Some(n) => Json::Number(n),
            None if v.is_nan() => Json::String("NaN".into()),
            None if *v > 0.0 => Json::String("Infinity".into()),
            None => Json::String("-Infinity".into()),
        },
        Value::String(s) => Json::String(s.clone()),
        Value::Struct(s) => struct_to_json(s)?,
        Value::Set(elem, items) | Value::List(elem, items) => {
            let mut arr = Vec::with_capacity(items.len() + 2);
            arr.push(Json::String(type_name(*elem)?.to_string()));
            arr.push(Json::from(items.len()));
            for item in items {
                arr.push(value_to_json(item)?);
            }
            Json::Array(arr)
        }
        Value::Map {
            key,
            value,
            entries,
        } => {
            let mut obj = Map::new();
            for (k, v) in entries {
                let k = match value_to_json(k)? {
                    Json::String(s) => s,
                    Json::Number(n) => n.to_string(),
                    _ => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "map keys must be strings or numbers",
                        ))
                    }
                };
                obj.insert(k, value_to_json(v)?);
            }
            Json::Array(vec![
                Json::String(type_name(*key)?.to_string()),
                Json::String(type_name(*value)?.to_string()),
                Json::from(entries.len()),
                Json::Object(obj),
            ])
        }
    })
}

fn json_to_struct(json: &Json, depth: usize) -> io::Result<Struct> {
    check_depth(depth)?;
    let obj = json
        .as_object()
        .ok_or_else(|| invalid("struct is not a JSON object"))?;
    let mut s = Struct::new();
    for (id, typed) in obj {
        let id: i16 = id
            .parse()
            .map_err(|_| invalid(format!("invalid field id: {}", id)))?;
        let typed = typed
            .as_object()
            .ok_or_else(|| invalid("field value is not a typed object"))?;
        let (tname, raw) = typed
            .iter()
            .next()
            .ok_or_else(|| invalid("field value has no type tag"))?;
        s.push(id, json_to_value(type_id(tname)?, raw, depth + 1)?);
    }
    Ok(s)
}

fn json_to_value(t: u8, json: &Json, depth: usize) -> io::Result<Value> {
    check_depth(depth)?;
    let value = match t {
        ttype::BOOL => Value::Bool(json.as_i64().ok_or_else(|| invalid("expected bool"))? != 0),
        ttype::BYTE => Value::Byte(int_as(json)?),
        ttype::I16 => Value::I16(int_as(json)?),
        ttype::I32 => Value::I32(int_as(json)?),
        ttype::I64 => Value::I64(json.as_i64().ok_or_else(|| invalid("expected i64"))?),
        ttype::DOUBLE => Value::Double(match json {
            Json::Number(n) => n.as_f64().ok_or_else(|| invalid("expected double"))?,
            Json::String(s) if s == "NaN" => f64::NAN,
            Json::String(s) if s == "Infinity" => f64::INFINITY,
            Json::String(s) if s == "-Infinity" => f64::NEG_INFINITY,
            _ => return Err(invalid("expected double")),
        }),
        ttype::STRING => Value::String(
            json.as_str()
                .ok_or_else(|| invalid("expected string"))?
                .to_string(),
        ),
        ttype::STRUCT => Value::Struct(json_to_struct(json, depth)?),
        ttype::SET | ttype::LIST => {
            let arr = json.as_array().ok_or_else(|| invalid("expected list"))?;
            let elem = arr
                .first()
                .and_then(Json::as_str)
                .ok_or_else(|| invalid("list without element type"))?;
            let elem = type_id(elem)?;
            let count = arr
                .get(1)
                .and_then(Json::as_u64)
                .ok_or_else(|| invalid("list without count"))? as usize;
            let raw = &arr[2..];
            if raw.len() != count {
                return Err(invalid(format!(
                    "list count {} does not match {} elements",
                    count,
                    raw.len()
                )));
            }
            let items = raw
                .iter()
                .map(|item| json_to_value(elem, item, depth + 1))
                .collect::<io::Result<Vec<_>>>()?;
            if t == ttype::SET {
                Value::Set(elem, items)
            } else {
                Value::List(elem, items)
            }
        }
        ttype::MAP => {
            let arr = json.as_array().ok_or_else(|| invalid("expected map"))?;
            if arr.len() != 4 {
                return Err(invalid("map must have four elements"));
            }
            let key = type_id(arr[0].as_str().ok_or_else(|| invalid("map key type"))?)?;
            let value = type_id(arr[1].as_str().ok_or_else(|| invalid("map value type"))?)?;
            let obj = arr[3].as_object().ok_or_else(|| invalid("map entries"))?;
            let mut entries = Vec::with_capacity(obj.len());
            for (k, v) in obj {
                // Keys are always quoted; numeric keys must be re-parsed
                let k = match key {
                    ttype::STRING => Json::String(k.clone()),
                    _ => serde_json::from_str(k)
                        .map_err(|_| invalid(format!("invalid map key: {}", k)))?,
                };
                entries.push((
                    json_to_value(key, &k, depth + 1)?,
                    json_to_value(value, v, depth + 1)?,
                ));
            }
            Value::Map {
                key,
                value,
                entries,
            }
        }
        other => return Err(invalid(format!("unknown field type: {}", other))),
    };
    Ok(value)
}

fn int_as<T: TryFrom<i64>>(json: &Json) -> io::Result<T> {
    json.as_i64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| invalid("integer out of range"))
}

fn check_depth(depth: usize) -> io::Result<()> {
    if depth > MAX_DEPTH {
        return Err(invalid(format!("nesting depth exceeds {}", MAX_DEPTH)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_connect_call_layout() {
        let args = Struct::new()
            .with(1, Value::String("demouser".into()))
            .with(2, Value::String("pw".into()))
            .with(3, Value::String("mapd".into()));
        let bytes = encode_message(&Message::call("connect", 0, args)).unwrap();
        let json: Json = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(
            json,
            serde_json::json!([
                1,
                "connect",
                1,
                0,
                {"1": {"str": "demouser"}, "2": {"str": "pw"}, "3": {"str": "mapd"}}
            ])
        );
    }

    #[test]
    fn test_decode_get_tables_reply() {
        let raw = br#"[1,"get_tables",2,3,{"0":{"lst":["str",2,"flights_donotmodify","tweets_nov_feb"]}}]"#;
        let msg = decode_message(raw).unwrap();

        assert_eq!(msg.kind, MessageType::Reply);
        assert_eq!(msg.seq_id, 3);
        let tables = msg.body.get(0).cloned().and_then(Value::into_string_list).unwrap();
        assert_eq!(tables, vec!["flights_donotmodify", "tweets_nov_feb"]);
    }

    #[test]
    fn test_decode_service_exception_reply() {
        let raw = br#"[1,"connect",2,0,{"1":{"rec":{"1":{"str":"Invalid credentials."}}}}]"#;
        let msg = decode_message(raw).unwrap();

        let exc = msg.body.get(1).and_then(Value::as_struct).unwrap();
        assert_eq!(exc.string(1), Some("Invalid credentials."));
    }

    #[test]
    fn test_decode_session_info_struct() {
        let raw = br#"[1,"get_session_info",2,1,{"0":{"rec":{"1":{"str":"admin"},"2":{"str":"omnisci"},"3":{"i64":1700000000},"4":{"tf":1}}}}]"#;
        let msg = decode_message(raw).unwrap();

        let info = msg.body.get(0).and_then(Value::as_struct).unwrap();
        assert_eq!(info.string(1), Some("admin"));
        assert_eq!(info.get(3).and_then(Value::as_i64), Some(1_700_000_000));
        assert_eq!(info.get(4).and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn test_map_with_numeric_keys() {
        let value = Value::Map {
            key: ttype::I32,
            value: ttype::STRING,
            entries: vec![(Value::I32(4), Value::String("four".into()))],
        };
        let msg = Message::reply("m", 0, Struct::new().with(0, value.clone()));
        let decoded = decode_message(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(decoded.body.get(0), Some(&value));
    }

    #[test]
    fn test_decode_rejects_non_thrift_body() {
        let err = decode_message(b"<html>Bad Gateway</html>").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = decode_message(br#"{"error": "nope"}"#).unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));
    }

    #[test]
    fn test_decode_rejects_list_count_mismatch() {
        let raw = br#"[1,"get_tables",2,0,{"0":{"lst":["str",3,"a"]}}]"#;
        assert!(decode_message(raw).is_err());
    }
}
