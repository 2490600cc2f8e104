//! Dialect neutral filter parsing.
//!
//! A parser turns caller [`Filter`] arguments into a WHERE fragment that uses
//! [`DELIMS`] around field names, `?` placeholders and, for random ordering,
//! the [`RANDBY`] token. The condition compiler later rewrites these for the
//! target dialect.

use crate::{DataError, DataResult, Map, Value};
use std::fmt::Write;

/// Sentinel wrapped around every field name.
pub const DELIMS: &str = "`";
/// Sentinel standing for the dialect random ordering function.
pub const RANDBY: &str = "$RANDBY$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Asc,
    Desc,
}

/// One filter or ordering argument.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Conditions joined by AND, separate `Where` groups are joined by OR
    Where(Map),
    Sort(String, Sort),
    Random,
}

impl Filter {
    pub fn asc(field: impl Into<String>) -> Self {
        Filter::Sort(field.into(), Sort::Asc)
    }
    pub fn desc(field: impl Into<String>) -> Self {
        Filter::Sort(field.into(), Sort::Desc)
    }
}

impl From<Map> for Filter {
    fn from(value: Map) -> Self {
        Filter::Where(value)
    }
}

/// Output of a [`FilterParser`], still in the neutral form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parsed {
    pub condition: String,
    pub params: Vec<Value>,
    pub order: String,
}

pub trait FilterParser: Send + Sync {
    fn parse(&self, args: &[Filter]) -> DataResult<Parsed>;
}

/// Parser for `Where` maps.
///
/// A field maps to a scalar (`=`), to `Null` (`IS NULL`), to a list (`IN`) or
/// to an operator map: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
/// `$nin`, `$like`, `$null` and `$any` (array membership). A dotted field
/// (`info.city`) reads a JSON sub key as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultParser;

impl FilterParser for DefaultParser {
    fn parse(&self, args: &[Filter]) -> DataResult<Parsed> {
        let mut parsed = Parsed::default();
        let mut groups = Vec::new();
        let mut orders = Vec::new();
        for arg in args {
            match arg {
                Filter::Where(map) => {
                    if let Some(group) = write_group(map, &mut parsed.params)? {
                        groups.push(group);
                    }
                }
                Filter::Sort(field, sort) => {
                    let mut out = String::new();
                    write_field(&mut out, field)?;
                    out.push_str(match sort {
                        Sort::Asc => " ASC",
                        Sort::Desc => " DESC",
                    });
                    orders.push(out);
                }
                Filter::Random => orders.push(RANDBY.into()),
            }
        }
        parsed.condition = match groups.len() {
            0 => "1=1".into(),
            1 => groups.remove(0),
            _ => groups
                .iter()
                .map(|v| format!("({})", v))
                .collect::<Vec<_>>()
                .join(" OR "),
        };
        if !orders.is_empty() {
            parsed.order = format!("ORDER BY {}", orders.join(","));
        }
        Ok(parsed)
    }
}

fn write_group(map: &Map, params: &mut Vec<Value>) -> DataResult<Option<String>> {
    let mut conditions = Vec::with_capacity(map.len());
    for (field, value) in map {
        match value {
            Value::Map(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                for (op, operand) in ops {
                    conditions.push(write_operator(field, op, operand, params)?);
                }
            }
            _ => conditions.push(write_operator(field, "$eq", value, params)?),
        }
    }
    Ok(if conditions.is_empty() {
        None
    } else {
        Some(conditions.join(" AND "))
    })
}

fn write_operator(
    field: &str,
    op: &str,
    operand: &Value,
    params: &mut Vec<Value>,
) -> DataResult<String> {
    let mut out = String::new();
    write_field(&mut out, field)?;
    match (op, operand) {
        ("$eq", Value::Null) | ("$null", Value::Boolean(true)) => out.push_str(" IS NULL"),
        ("$ne", Value::Null) | ("$null", Value::Boolean(false)) => out.push_str(" IS NOT NULL"),
        ("$eq", Value::List(items)) | ("$in", Value::List(items)) => {
            write_list(&mut out, " IN ", items, params, "1=0")?
        }
        ("$nin", Value::List(items)) => write_list(&mut out, " NOT IN ", items, params, "1=1")?,
        ("$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" | "$like", _) => {
            let symbol = match op {
                "$eq" => "=",
                "$ne" => "<>",
                "$gt" => ">",
                "$gte" => ">=",
                "$lt" => "<",
                "$lte" => "<=",
                _ => " LIKE ",
            };
            out.push_str(symbol);
            out.push('?');
            params.push(operand.clone());
        }
        ("$any", _) => {
            out.insert_str(0, "?=ANY(");
            out.push(')');
            params.push(operand.clone());
        }
        ("$in" | "$nin" | "$null", _) => {
            return Err(DataError::FilterParse(format!(
                "operator `{}` on `{}` does not accept a {} operand",
                op,
                field,
                operand.type_name()
            )));
        }
        _ => {
            return Err(DataError::FilterParse(format!(
                "unknown operator `{}` on `{}`",
                op, field
            )));
        }
    }
    Ok(out)
}

fn write_list(
    out: &mut String,
    keyword: &str,
    items: &[Value],
    params: &mut Vec<Value>,
    empty: &str,
) -> DataResult<()> {
    if items.is_empty() {
        out.clear();
        out.push_str(empty);
        return Ok(());
    }
    out.push_str(keyword);
    out.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
        params.push(item.clone());
    }
    out.push(')');
    Ok(())
}

fn write_field(out: &mut String, field: &str) -> DataResult<()> {
    let mut parts = field.split('.');
    let column = parts.next().unwrap_or_default();
    let valid = |v: &str| {
        !v.is_empty()
            && !v.contains(DELIMS)
            && !v.contains(['"', '\'', '?', '\\'])
            && !v.chars().any(char::is_control)
    };
    if !valid(column) {
        return Err(DataError::FilterParse(format!("invalid field name `{}`", field)));
    }
    let _ = write!(out, "{DELIMS}{column}{DELIMS}");
    let path = parts.collect::<Vec<_>>();
    if let Some((last, rest)) = path.split_last() {
        for key in rest.iter().chain([last]) {
            if !valid(key) {
                return Err(DataError::FilterParse(format!("invalid field name `{}`", field)));
            }
        }
        for key in rest {
            let _ = write!(out, "->'{}'", key);
        }
        let _ = write!(out, "->>'{}'", last);
    }
    Ok(())
}
