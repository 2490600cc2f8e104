use crate::{Error, Map, Result, Value};
use rust_decimal::Decimal;
use std::{any, collections::BTreeMap};
use time::OffsetDateTime;
use uuid::Uuid;

/// Conversion between native Rust types and the dynamic [`Value`].
///
/// `as_value` must not be lossy. `try_from_value` accepts the canonical variant
/// for the type and, for integers, any other integer variant that fits after a
/// range check.
///
/// ```rust
/// use strata_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert!(matches!(v, Value::Int32(42)));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

fn mismatch<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert a `{}` value into `{}`",
        value.type_name(),
        any::type_name::<T>()
    ))
}

macro_rules! impl_as_value_integer {
    ($source:ty, $into:path) => {
        impl AsValue for $source {
            fn as_value(self) -> Value {
                $into(self)
            }
            fn try_from_value(value: Value) -> Result<Self> {
                if let $into(v) = value {
                    return Ok(v);
                }
                value
                    .as_i128()
                    .and_then(|v| <$source>::try_from(v).ok())
                    .ok_or_else(|| mismatch::<$source>(&value))
            }
        }
    };
}

impl_as_value_integer!(i8, Value::Int8);
impl_as_value_integer!(i16, Value::Int16);
impl_as_value_integer!(i32, Value::Int32);
impl_as_value_integer!(i64, Value::Int64);
impl_as_value_integer!(u8, Value::UInt8);
impl_as_value_integer!(u16, Value::UInt16);
impl_as_value_integer!(u32, Value::UInt32);
impl_as_value_integer!(u64, Value::UInt64);

macro_rules! impl_as_value {
    ($source:ty, $into:path) => {
        impl AsValue for $source {
            fn as_value(self) -> Value {
                $into(self)
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    $into(v) => Ok(v),
                    _ => Err(mismatch::<$source>(&value)),
                }
            }
        }
    };
}

impl_as_value!(bool, Value::Boolean);
impl_as_value!(Decimal, Value::Decimal);
impl_as_value!(String, Value::Varchar);
impl_as_value!(Box<[u8]>, Value::Blob);
impl_as_value!(OffsetDateTime, Value::Timestamp);
impl_as_value!(Uuid, Value::Uuid);
impl_as_value!(Map, Value::Map);

impl AsValue for f32 {
    fn as_value(self) -> Value {
        Value::Float32(self)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(v),
            _ => Err(mismatch::<f32>(&value)),
        }
    }
}

impl AsValue for f64 {
    fn as_value(self) -> Value {
        Value::Float64(self)
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if let Value::Float64(v) = value {
            return Ok(v);
        }
        value.as_f64().ok_or_else(|| mismatch::<f64>(&value))
    }
}

impl AsValue for &str {
    fn as_value(self) -> Value {
        Value::Varchar(self.into())
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Err(mismatch::<&str>(&value))
    }
}

impl AsValue for Value {
    fn as_value(self) -> Value {
        self
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => Value::Null,
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::try_from_value(value).map(Some)
        }
    }
}

impl<T: AsValue> AsValue for Vec<T> {
    fn as_value(self) -> Value {
        Value::List(self.into_iter().map(AsValue::as_value).collect())
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::List(v) => v.into_iter().map(T::try_from_value).collect(),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl<T: AsValue> AsValue for BTreeMap<&str, T> {
    fn as_value(self) -> Value {
        Value::Map(
            self.into_iter()
                .map(|(k, v)| (k.to_string(), v.as_value()))
                .collect(),
        )
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Err(mismatch::<Self>(&value))
    }
}

macro_rules! impl_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    value.as_value()
                }
            }
        )+
    };
}

impl_from!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    Decimal,
    String,
    &str,
    Box<[u8]>,
    OffsetDateTime,
    Uuid,
    Map,
);

impl<T: AsValue> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        value.as_value()
    }
}

impl<T: AsValue> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.as_value()
    }
}

/// Builds a [`Map`] from `key => value` pairs, converting values with [`AsValue`].
///
/// ```rust
/// use strata_core::{Value, map};
/// let m = map! { "name" => "a", "age" => 3 };
/// assert_eq!(m["age"], Value::Int32(3));
/// ```
#[macro_export]
macro_rules! map {
    () => { $crate::Map::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Map::new();
        $(
            map.insert(::std::string::String::from($key), $crate::AsValue::as_value($value));
        )+
        map
    }};
}
