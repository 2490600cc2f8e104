use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::{collections::BTreeMap, mem::discriminant};
use time::OffsetDateTime;
use uuid::Uuid;

/// Field name to value record, the shape every row and input takes.
pub type Map = BTreeMap<String, Value>;

/// Dynamically typed value flowing between callers, the codec and the drivers.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    Varchar(String),
    Blob(Box<[u8]>),
    Timestamp(OffsetDateTime),
    Uuid(Uuid),
    List(Vec<Value>),
    Map(Map),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            (Self::List(l), Self::List(r)) => l == r,
            (Self::Map(l), Self::Map(r)) => l == r,
            (Self::Decimal(d), v) | (v, Self::Decimal(d)) if v.is_integer() => v
                .as_i128()
                .and_then(|v| Decimal::try_from_i128_with_scale(v, 0).ok())
                .is_some_and(|v| v == *d),
            (Self::Float32(..) | Self::Float64(..), _) | (_, Self::Float32(..) | Self::Float64(..)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(l), Some(r)) if self.is_numeric() && other.is_numeric() => l == r,
                    _ => false,
                }
            }
            _ if self.is_integer() && other.is_integer() => self.as_i128() == other.as_i128(),
            _ => discriminant(self) == discriminant(other),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Value::Int8(..)
                | Value::Int16(..)
                | Value::Int32(..)
                | Value::Int64(..)
                | Value::UInt8(..)
                | Value::UInt16(..)
                | Value::UInt32(..)
                | Value::UInt64(..)
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Value::Float32(..) | Value::Float64(..) | Value::Decimal(..))
    }

    /// Widened integer view, `None` for every non integer variant.
    pub fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Value::Int8(v) => v as i128,
            Value::Int16(v) => v as i128,
            Value::Int32(v) => v as i128,
            Value::Int64(v) => v as i128,
            Value::UInt8(v) => v as i128,
            Value::UInt16(v) => v as i128,
            Value::UInt32(v) => v as i128,
            Value::UInt64(v) => v as i128,
            _ => return None,
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Decimal(v) if v.fract().is_zero() => v.to_i64(),
            Value::Float32(..) | Value::Float64(..) => {
                let v = self.as_f64()?;
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                    Some(v as i64)
                } else {
                    None
                }
            }
            _ => self.as_i128().and_then(|v| i64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            Value::Decimal(v) => v.to_f64(),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Short variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(..) => "boolean",
            Value::Int8(..) => "int8",
            Value::Int16(..) => "int16",
            Value::Int32(..) => "int32",
            Value::Int64(..) => "int64",
            Value::UInt8(..) => "uint8",
            Value::UInt16(..) => "uint16",
            Value::UInt32(..) => "uint32",
            Value::UInt64(..) => "uint64",
            Value::Float32(..) => "float32",
            Value::Float64(..) => "float64",
            Value::Decimal(..) => "decimal",
            Value::Varchar(..) => "varchar",
            Value::Blob(..) => "blob",
            Value::Timestamp(..) => "timestamp",
            Value::Uuid(..) => "uuid",
            Value::List(..) => "list",
            Value::Map(..) => "map",
        }
    }
}
