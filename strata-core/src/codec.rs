//! Conversion between caller values and their database representation.
//!
//! [`encode`] runs on every outbound record: primitive lists become array
//! literals (`{a,b,c}`) and nested maps become JSON text, because the store
//! has no native form for them. Values of JSON fields are always JSON text. [`decode`] runs once per returned row before
//! the schema projection. Neither step fails.

use crate::{FieldType, Fields, Map, Value};
use std::fmt::Write;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

/// Prepare a record for binding.
///
/// Lists and maps held by a `json` or `[json]` field, or by a dotted JSON
/// sub key, are written as JSON text whatever their content, so an empty
/// list stays `[]` instead of becoming the array literal `{}`.
pub fn encode(fields: &Fields, value: &Map) -> Map {
    value
        .iter()
        .map(|(k, v)| {
            let json = k.contains('.')
                || fields
                    .get(k)
                    .is_some_and(|f| matches!(f.kind, FieldType::Json | FieldType::JsonArray));
            let encoded = match v {
                Value::List(..) | Value::Map(..) if json => encode_json(v),
                v => encode_value(v),
            };
            (k.clone(), encoded)
        })
        .collect()
}

/// Encode a single value, see [`encode`].
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::List(items) if is_primitive_list(items) => {
            let mut out = String::with_capacity(items.len() * 4 + 2);
            write_array_literal(&mut out, items);
            Value::Varchar(out)
        }
        Value::List(items) if items.iter().all(|v| matches!(v, Value::Map(..))) => {
            encode_json(value)
        }
        Value::Map(..) => encode_json(value),
        _ => value.clone(),
    }
}

/// JSON text of a list or map, the empty collection of the same kind on failure.
fn encode_json(value: &Value) -> Value {
    Value::Varchar(serde_json::to_string(&to_json(value)).unwrap_or_else(|e| {
        let empty = if matches!(value, Value::List(..)) { "[]" } else { "{}" };
        log::warn!("Could not serialize a {}, storing `{}`: {:#}", value.type_name(), empty, e);
        empty.into()
    }))
}

/// Normalize a scanned row: timestamps move to the local offset, blobs become text.
pub fn decode(columns: &[String], values: Vec<Value>) -> Map {
    let offset = local_offset();
    columns
        .iter()
        .cloned()
        .zip(values)
        .map(|(name, value)| {
            let value = match value {
                Value::Timestamp(v) => Value::Timestamp(v.to_offset(offset)),
                Value::Blob(v) => Value::Varchar(String::from_utf8_lossy(&v).into_owned()),
                v => v,
            };
            (name, value)
        })
        .collect()
}

fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Boolean(..)
            | Value::Int8(..)
            | Value::Int16(..)
            | Value::Int32(..)
            | Value::Int64(..)
            | Value::UInt8(..)
            | Value::UInt16(..)
            | Value::UInt32(..)
            | Value::UInt64(..)
            | Value::Float32(..)
            | Value::Float64(..)
            | Value::Varchar(..)
    )
}

fn is_primitive_list(items: &[Value]) -> bool {
    items.iter().all(is_primitive)
}

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

macro_rules! write_float {
    ($out:ident, $value:expr) => {{
        if $value.is_nan() {
            $out.push_str("NaN");
        } else if $value.is_infinite() {
            $out.push_str(if $value.is_sign_negative() { "-Infinity" } else { "Infinity" });
        } else {
            let mut buffer = ryu::Buffer::new();
            $out.push_str(buffer.format($value));
        }
    }};
}

fn write_array_literal(out: &mut String, items: &[Value]) {
    out.push('{');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match *item {
            Value::Boolean(v) => out.push_str(if v { "TRUE" } else { "FALSE" }),
            Value::Int8(v) => write_integer!(out, v),
            Value::Int16(v) => write_integer!(out, v),
            Value::Int32(v) => write_integer!(out, v),
            Value::Int64(v) => write_integer!(out, v),
            Value::UInt8(v) => write_integer!(out, v),
            Value::UInt16(v) => write_integer!(out, v),
            Value::UInt32(v) => write_integer!(out, v),
            Value::UInt64(v) => write_integer!(out, v),
            Value::Float32(v) => write_float!(out, v),
            Value::Float64(v) => write_float!(out, v),
            Value::Varchar(ref v) => write_array_element(out, v),
            _ => {}
        }
    }
    out.push('}');
}

fn write_array_element(out: &mut String, value: &str) {
    let needs_quotes = value.is_empty()
        || value.eq_ignore_ascii_case("NULL")
        || value
            .chars()
            .any(|c| matches!(c, ',' | '{' | '}' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Split a one dimensional array literal (`{a,"b,c",NULL}`) into its elements.
///
/// Returns `None` when the input is not brace delimited or is malformed.
/// Unquoted `NULL` elements are `None`.
pub fn parse_array_literal(input: &str) -> Option<Vec<Option<String>>> {
    let inner = input.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut result = Vec::new();
    if inner.trim().is_empty() {
        return Some(result);
    }
    let mut chars = inner.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let element = if chars.next_if_eq(&'"').is_some() {
            let mut current = String::new();
            loop {
                match chars.next()? {
                    '\\' => current.push(chars.next()?),
                    '"' => break,
                    c => current.push(c),
                }
            }
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            Some(current)
        } else {
            let mut current = String::new();
            while let Some(c) = chars.next_if(|c| *c != ',') {
                if c == '"' || c == '{' || c == '}' {
                    return None;
                }
                current.push(c);
            }
            let current = current.trim_end();
            if current.eq_ignore_ascii_case("NULL") {
                None
            } else {
                Some(current.to_string())
            }
        };
        result.push(element);
        match chars.next() {
            Some(',') => continue,
            None => break,
            Some(_) => return None,
        }
    }
    Some(result)
}

/// Convert a value into its JSON form.
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Boolean(v) => Json::Bool(*v),
        Value::Float32(..) | Value::Float64(..) | Value::Decimal(..) => value
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::UInt64(v) => Json::from(*v),
        v if v.is_integer() => v.as_i64().map(Json::from).unwrap_or(Json::Null),
        Value::Varchar(v) => Json::String(v.clone()),
        Value::Blob(v) => Json::String(String::from_utf8_lossy(v).into_owned()),
        Value::Timestamp(v) => v
            .format(&Rfc3339)
            .map(Json::String)
            .unwrap_or(Json::Null),
        Value::Uuid(v) => Json::String(v.to_string()),
        Value::List(v) => Json::Array(v.iter().map(to_json).collect()),
        Value::Map(v) => Json::Object(v.iter().map(|(k, v)| (k.clone(), to_json(v))).collect()),
        _ => Json::Null,
    }
}

/// Convert a JSON document into a value.
pub fn from_json(value: serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match value {
        Json::Null => Value::Null,
        Json::Bool(v) => Value::Boolean(v),
        Json::Number(v) => {
            if let Some(v) = v.as_i64() {
                Value::Int64(v)
            } else if let Some(v) = v.as_u64() {
                Value::UInt64(v)
            } else {
                Value::Float64(v.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(v) => Value::Varchar(v),
        Json::Array(v) => Value::List(v.into_iter().map(from_json).collect()),
        Json::Object(v) => Value::Map(v.into_iter().map(|(k, v)| (k, from_json(v))).collect()),
    }
}

/// Render a timestamp in RFC 3339, used where a timestamp has to travel as text.
pub fn format_timestamp(value: &OffsetDateTime) -> String {
    let mut out = String::with_capacity(32);
    match value.format(&Rfc3339) {
        Ok(v) => out.push_str(&v),
        Err(..) => {
            let _ = write!(out, "{}", value);
        }
    }
    out
}
