use bytes::BytesMut;
use postgres_types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use rust_decimal::{Decimal, prelude::FromPrimitive};
use std::{error::Error, str::FromStr};
use strata_core::{Value, codec};
use time::{
    Date, OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::well_known::Rfc3339,
};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// Bridges [`Value`] with the Postgres binary format, in both directions.
///
/// Outbound values are converted to the parameter type the server inferred,
/// so an `Int32` binds to an `int8` column and an array literal produced by
/// the codec binds to an array parameter.
#[derive(Debug)]
pub(crate) struct ValueHolder(pub(crate) Value);

impl From<Value> for ValueHolder {
    fn from(value: Value) -> Self {
        ValueHolder(value)
    }
}

impl<'a> FromSql<'a> for ValueHolder {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Self::from_sql_nullable(ty, Some(raw))
    }
    fn from_sql_null(ty: &Type) -> Result<Self, BoxError> {
        Self::from_sql_nullable(ty, None)
    }
    fn from_sql_nullable(ty: &Type, raw: Option<&'a [u8]>) -> Result<Self, BoxError> {
        let Some(raw) = raw else {
            return Ok(ValueHolder(Value::Null));
        };
        macro_rules! to_value {
            ($($($ty:path)|+ => ($value:path, $source:ty),)+) => {
                match *ty {
                    $($($ty)|+ => $value(<$source>::from_sql(ty, raw)?.into()),)+
                    Type::JSON | Type::JSONB => codec::from_json(serde_json::Value::from_sql(ty, raw)?),
                    Type::TIMESTAMP => {
                        Value::Timestamp(PrimitiveDateTime::from_sql(ty, raw)?.assume_utc())
                    }
                    Type::DATE => Value::Timestamp(Date::from_sql(ty, raw)?.midnight().assume_utc()),
                    _ => match ty.kind() {
                        Kind::Array(..) => Value::List(
                            Vec::<ValueHolder>::from_sql(ty, raw)?
                                .into_iter()
                                .map(|v| v.0)
                                .collect(),
                        ),
                        Kind::Enum(..) => Value::Varchar(String::from_sql(ty, raw)?),
                        _ => {
                            return Err(strata_core::Error::msg(format!(
                                "Cannot decode sql type `{}`, value: `{}`",
                                ty,
                                String::from_utf8_lossy(raw)
                            ))
                            .into());
                        }
                    },
                }
            };
        }
        let value = to_value!(
            Type::BOOL => (Value::Boolean, bool),
            Type::CHAR => (Value::Int8, i8),
            Type::INT2 => (Value::Int16, i16),
            Type::INT4 => (Value::Int32, i32),
            Type::INT8 => (Value::Int64, i64),
            Type::OID => (Value::UInt32, u32),
            Type::FLOAT4 => (Value::Float32, f32),
            Type::FLOAT8 => (Value::Float64, f64),
            Type::NUMERIC => (Value::Decimal, Decimal),
            Type::VARCHAR
            | Type::TEXT
            | Type::NAME
            | Type::BPCHAR
            | Type::XML
            | Type::UNKNOWN => (Value::Varchar, String),
            Type::BYTEA => (Value::Blob, Vec<u8>),
            Type::TIMESTAMPTZ => (Value::Timestamp, OffsetDateTime),
            Type::UUID => (Value::Uuid, Uuid),
        );
        Ok(ValueHolder(value))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl ToSql for ValueHolder {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError>
    where
        Self: Sized,
    {
        bind(&self.0, ty, out)
    }

    fn accepts(_ty: &Type) -> bool
    where
        Self: Sized,
    {
        true
    }

    to_sql_checked!();
}

fn bind(value: &Value, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if value.is_null() {
        return Ok(IsNull::Yes);
    }
    let mismatch = || -> BoxError {
        strata_core::Error::msg(format!(
            "Cannot bind a `{}` value to a parameter of type `{}`",
            value.type_name(),
            ty
        ))
        .into()
    };
    macro_rules! integer {
        ($target:ty) => {
            integer(value)
                .and_then(|v| <$target>::try_from(v).ok())
                .ok_or_else(mismatch)?
                .to_sql(ty, out)
        };
    }
    match *ty {
        Type::BOOL => boolean(value).ok_or_else(mismatch)?.to_sql(ty, out),
        Type::CHAR => integer!(i8),
        Type::INT2 => integer!(i16),
        Type::INT4 => integer!(i32),
        Type::INT8 => integer!(i64),
        Type::OID => integer!(u32),
        Type::FLOAT4 => (float(value).ok_or_else(mismatch)? as f32).to_sql(ty, out),
        Type::FLOAT8 => float(value).ok_or_else(mismatch)?.to_sql(ty, out),
        Type::NUMERIC => decimal(value).ok_or_else(mismatch)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => json(value).to_sql(ty, out),
        Type::BYTEA => match value {
            Value::Blob(v) => (&**v).to_sql(ty, out),
            Value::Varchar(v) => v.as_bytes().to_sql(ty, out),
            _ => Err(mismatch()),
        },
        Type::UUID => uuid(value).ok_or_else(mismatch)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => timestamp(value).ok_or_else(mismatch)?.to_sql(ty, out),
        Type::TIMESTAMP => {
            let v = timestamp(value).ok_or_else(mismatch)?.to_offset(UtcOffset::UTC);
            PrimitiveDateTime::new(v.date(), v.time()).to_sql(ty, out)
        }
        Type::DATE => timestamp(value).ok_or_else(mismatch)?.date().to_sql(ty, out),
        _ => match ty.kind() {
            Kind::Array(..) => list(value)
                .ok_or_else(mismatch)?
                .into_iter()
                .map(ValueHolder)
                .collect::<Vec<_>>()
                .to_sql(ty, out),
            _ => text(value).ok_or_else(mismatch)?.to_sql(ty, out),
        },
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(v) => Some(*v),
        Value::Varchar(v) => match v.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" => Some(true),
            "f" | "false" | "0" => Some(false),
            _ => None,
        },
        v => v.as_i128().map(|v| v != 0),
    }
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Varchar(v) => v.trim().parse().ok(),
        v => v.as_i128().or_else(|| v.as_i64().map(Into::into)),
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Varchar(v) => v.trim().parse().ok(),
        v => v.as_f64(),
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Decimal(v) => Some(*v),
        Value::Float32(..) | Value::Float64(..) => value.as_f64().and_then(Decimal::from_f64),
        Value::Varchar(v) => Decimal::from_str(v.trim()).ok(),
        v => v.as_i128().and_then(Decimal::from_i128),
    }
}

/// Text that looks like a JSON document is sent as is, anything else is converted.
fn json(value: &Value) -> serde_json::Value {
    if let Value::Varchar(v) = value
        && v.trim_start().starts_with(['{', '['])
        && let Ok(json) = serde_json::from_str(v)
    {
        return json;
    }
    codec::to_json(value)
}

fn uuid(value: &Value) -> Option<Uuid> {
    match value {
        Value::Uuid(v) => Some(*v),
        Value::Varchar(v) => Uuid::from_str(v.trim()).ok(),
        _ => None,
    }
}

fn timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Timestamp(v) => Some(*v),
        Value::Varchar(v) => OffsetDateTime::parse(v.trim(), &Rfc3339).ok(),
        v => v
            .as_i64()
            .and_then(|v| OffsetDateTime::from_unix_timestamp(v).ok()),
    }
}

fn list(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(v) => Some(v.clone()),
        Value::Varchar(v) => Some(
            codec::parse_array_literal(v)?
                .into_iter()
                .map(|v| v.map(Value::Varchar).unwrap_or_default())
                .collect(),
        ),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    Some(match value {
        Value::Varchar(v) => v.clone(),
        Value::Boolean(v) => v.to_string(),
        Value::Float32(v) => v.to_string(),
        Value::Float64(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Uuid(v) => v.to_string(),
        Value::Timestamp(v) => codec::format_timestamp(v),
        Value::Blob(v) => String::from_utf8_lossy(v).into_owned(),
        Value::List(..) | Value::Map(..) => match codec::encode_value(value) {
            Value::Varchar(v) => v,
            _ => return None,
        },
        v => v.as_i128()?.to_string(),
    })
}
