use crate::{
    DataError, DataResult, FieldDef, FieldType, Fields, Map, Value,
    codec::{self, format_timestamp},
};
use atoi::FromRadix10SignedChecked;
use std::str::FromStr;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// How [`project`] treats the declared fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Reads: every declared field is considered, defaults are applied and
    /// required fields must be present. Undeclared columns are dropped.
    Strict,
    /// Creates and updates: only the supplied fields are validated, absent
    /// fields are left untouched.
    Partial,
}

/// Map `input` onto the declared `fields`, coercing each value to its type.
pub fn project(fields: &Fields, input: &Map, mode: Projection) -> DataResult<Map> {
    let mut output = Map::new();
    let mut failed = Vec::new();
    let mut messages = Vec::new();
    match mode {
        Projection::Strict => {
            for (name, field) in fields {
                match input.get(name).filter(|v| !v.is_null()) {
                    Some(value) => match coerce(&field.kind, value) {
                        Some(value) => {
                            output.insert(name.clone(), value);
                        }
                        None => fail(&mut failed, &mut messages, name, field, value),
                    },
                    None => {
                        if let Some(default) = &field.default {
                            output.insert(name.clone(), default.clone());
                        } else if !field.nullable {
                            failed.push(name.clone());
                            messages.push(format!("`{}` is required", name));
                        }
                    }
                }
            }
        }
        Projection::Partial => {
            for (name, value) in input {
                let Some(field) = fields.get(name) else {
                    if let Some((base, _)) = name.split_once('.')
                        && fields
                            .get(base)
                            .is_some_and(|f| matches!(f.kind, FieldType::Json | FieldType::Any))
                    {
                        output.insert(name.clone(), value.clone());
                    }
                    continue;
                };
                if value.is_null() {
                    if field.nullable {
                        output.insert(name.clone(), Value::Null);
                    } else {
                        failed.push(name.clone());
                        messages.push(format!("`{}` cannot be null", name));
                    }
                    continue;
                }
                match coerce(&field.kind, value) {
                    Some(value) => {
                        output.insert(name.clone(), value);
                    }
                    None => fail(&mut failed, &mut messages, name, field, value),
                }
            }
        }
    }
    if failed.is_empty() {
        Ok(output)
    } else {
        Err(DataError::ProjectionValidation {
            fields: failed,
            message: messages.join(", "),
        })
    }
}

fn fail(
    failed: &mut Vec<String>,
    messages: &mut Vec<String>,
    name: &str,
    field: &FieldDef,
    value: &Value,
) {
    failed.push(name.to_string());
    messages.push(format!(
        "`{}` expects {} but got {}",
        if field.name.is_empty() {
            name
        } else {
            &field.name
        },
        field.kind,
        value.type_name()
    ));
}

/// Coerce a non null value to `kind`, `None` when it cannot be represented.
pub fn coerce(kind: &FieldType, value: &Value) -> Option<Value> {
    match kind {
        FieldType::Any => Some(value.clone()),
        FieldType::Bool => match value {
            Value::Boolean(..) => Some(value.clone()),
            Value::Varchar(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "on" | "1" => Some(Value::Boolean(true)),
                "false" | "f" | "no" | "off" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            v => v.as_i128().map(|v| Value::Boolean(v != 0)),
        },
        FieldType::Int => match value {
            Value::Varchar(v) => parse_integer(v.trim()).map(Value::Int64),
            v => v.as_i64().map(Value::Int64),
        },
        FieldType::Float => match value {
            Value::Varchar(v) => fast_float::parse::<f64, _>(v.trim()).ok().map(Value::Float64),
            v => v.as_f64().map(Value::Float64),
        },
        FieldType::String => match value {
            Value::Varchar(..) => Some(value.clone()),
            Value::Boolean(v) => Some(Value::Varchar(v.to_string())),
            Value::Decimal(v) => Some(Value::Varchar(v.to_string())),
            Value::Uuid(v) => Some(Value::Varchar(v.to_string())),
            Value::Timestamp(v) => Some(Value::Varchar(format_timestamp(v))),
            Value::Blob(v) => Some(Value::Varchar(String::from_utf8_lossy(v).into_owned())),
            Value::Float32(v) => Some(Value::Varchar(v.to_string())),
            Value::Float64(v) => Some(Value::Varchar(v.to_string())),
            v if v.is_integer() => v.as_i128().map(|v| Value::Varchar(v.to_string())),
            _ => None,
        },
        FieldType::Timestamp => match value {
            Value::Timestamp(..) => Some(value.clone()),
            Value::Varchar(v) => OffsetDateTime::parse(v.trim(), &Rfc3339)
                .ok()
                .map(Value::Timestamp),
            v => v
                .as_i64()
                .and_then(|v| OffsetDateTime::from_unix_timestamp(v).ok())
                .map(Value::Timestamp),
        },
        FieldType::Uuid => match value {
            Value::Uuid(..) => Some(value.clone()),
            Value::Varchar(v) => Uuid::from_str(v.trim()).ok().map(Value::Uuid),
            _ => None,
        },
        FieldType::Json => match value {
            Value::Map(..) => Some(value.clone()),
            Value::Varchar(v) => match serde_json::from_str::<serde_json::Value>(v) {
                Ok(json @ serde_json::Value::Object(..)) => Some(codec::from_json(json)),
                _ => None,
            },
            _ => None,
        },
        FieldType::JsonArray => match value {
            Value::List(items) if items.iter().all(|v| matches!(v, Value::Map(..))) => {
                Some(value.clone())
            }
            Value::Varchar(v) => match serde_json::from_str::<serde_json::Value>(v) {
                Ok(json @ serde_json::Value::Array(..)) => {
                    let value = codec::from_json(json);
                    let objects = value
                        .as_list()
                        .is_some_and(|v| v.iter().all(|v| matches!(v, Value::Map(..))));
                    objects.then_some(value)
                }
                _ => None,
            },
            _ => None,
        },
        FieldType::Array(inner) => match value {
            Value::List(items) => items
                .iter()
                .map(|v| {
                    if v.is_null() {
                        Some(Value::Null)
                    } else {
                        coerce(inner, v)
                    }
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            Value::Varchar(v) => codec::parse_array_literal(v)?
                .into_iter()
                .map(|v| match v {
                    Some(v) => coerce(inner, &Value::Varchar(v)),
                    None => Some(Value::Null),
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            _ => None,
        },
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let (value, consumed) = i64::from_radix_10_signed_checked(text.as_bytes());
    if consumed == text.len() && consumed > 0 {
        value
    } else {
        None
    }
}
