//! Dialect rendering of parsed filters.

use crate::{DELIMS, DataError, DataResult, Filter, FilterParser, RANDBY, SqlWriter, Value};

/// WHERE and ORDER BY fragments ready to be embedded in a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedQuery {
    pub condition: String,
    pub params: Vec<Value>,
    pub order: String,
}

/// Render `args` for the dialect of `writer`.
///
/// Placeholders are numbered from `offset`, so a statement that already bound
/// `n` parameters (an UPDATE SET clause) passes `n + 1`.
pub fn compile(
    writer: &dyn SqlWriter,
    parser: &dyn FilterParser,
    offset: usize,
    args: &[Filter],
) -> DataResult<RenderedQuery> {
    let parsed = parser.parse(args).map_err(|e| match e {
        DataError::FilterParse(..) => e,
        e => DataError::FilterParse(e.to_string()),
    })?;
    let mut quote = String::new();
    quote.push(writer.identifier_quote());
    let mut random = String::new();
    writer.write_random_order(&mut random);
    let (condition, placeholders) = renumber(
        writer,
        &parsed.condition.replace(DELIMS, &quote),
        offset,
        parsed.params.len(),
    );
    if placeholders != parsed.params.len() {
        return Err(DataError::FilterParse(format!(
            "the condition has {} placeholders but {} parameters were supplied",
            placeholders,
            parsed.params.len()
        )));
    }
    let order = parsed
        .order
        .replace(DELIMS, &quote)
        .replace(RANDBY, &random);
    Ok(RenderedQuery {
        condition,
        params: parsed.params,
        order,
    })
}

/// Replace the `?` placeholders outside quoted identifiers and string literals.
///
/// Returns the rendered text and the number of placeholders found.
fn renumber(writer: &dyn SqlWriter, input: &str, offset: usize, limit: usize) -> (String, usize) {
    let quote = writer.identifier_quote();
    let mut out = String::with_capacity(input.len() + limit * 2);
    let mut found = 0;
    let mut within: Option<char> = None;
    for c in input.chars() {
        match within {
            Some(delimiter) => {
                if c == delimiter {
                    within = None;
                }
                out.push(c);
            }
            None if c == quote || c == '\'' => {
                within = Some(c);
                out.push(c);
            }
            None if c == '?' => {
                writer.write_placeholder(&mut out, offset + found);
                found += 1;
            }
            None => out.push(c),
        }
    }
    (out, found)
}
