use crate::separated_by;
use std::fmt::Write;

/// Renders the statements issued by the entity handles.
///
/// Every fragment built here references parameters positionally, callers keep
/// the parameter list in the same order as the placeholders they asked for.
pub trait SqlWriter: Send + Sync {
    fn as_dyn(&self) -> &dyn SqlWriter;

    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    fn identifier_quote(&self) -> char {
        '"'
    }

    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        let quote = self.identifier_quote();
        let doubled = String::from_iter([quote, quote]);
        out.push(quote);
        self.write_escaped(out, value, quote, &doubled);
        out.push(quote);
    }

    fn write_string_literal(&self, out: &mut String, value: &str) {
        out.push('\'');
        self.write_escaped(out, value, '\'', "''");
        out.push('\'');
    }

    /// Positional placeholder, `index` starts from 1.
    fn write_placeholder(&self, out: &mut String, index: usize) {
        let _ = write!(out, "${}", index);
    }

    fn write_random_order(&self, out: &mut String) {
        out.push_str("RANDOM()");
    }

    fn write_table_ref(&self, out: &mut String, schema: &str, relation: &str) {
        if !schema.is_empty() {
            self.write_identifier_quoted(out, schema);
            out.push('.');
        }
        self.write_identifier_quoted(out, relation);
    }

    /// Column reference, `name:2` addresses the second element of an array column.
    fn write_column_ref(&self, out: &mut String, name: &str) {
        match name.split_once(':') {
            Some((column, index)) if !index.is_empty() && index.bytes().all(|c| c.is_ascii_digit()) => {
                self.write_identifier_quoted(out, column);
                let _ = write!(out, "[{}]", index);
            }
            _ => self.write_identifier_quoted(out, name),
        }
    }

    /// `"field"=$N`
    fn write_assignment(&self, out: &mut String, field: &str, index: usize) {
        self.write_identifier_quoted(out, field);
        out.push('=');
        self.write_placeholder(out, index);
    }

    /// `"field"="field"+$N`
    fn write_increment(&self, out: &mut String, field: &str, index: usize) {
        self.write_identifier_quoted(out, field);
        out.push('=');
        self.write_identifier_quoted(out, field);
        out.push('+');
        self.write_placeholder(out, index);
    }

    /// Set one key of a JSON column, leaving the other keys in place.
    fn write_json_merge(&self, out: &mut String, field: &str, key: &str, index: usize);

    /// Add to a numeric key of a JSON column, a missing key counts as zero.
    fn write_json_increment(&self, out: &mut String, field: &str, key: &str, index: usize);

    fn write_insert(
        &self,
        out: &mut String,
        schema: &str,
        relation: &str,
        columns: &[&str],
        returning: &str,
    ) {
        out.push_str("INSERT INTO ");
        self.write_table_ref(out, schema, relation);
        if columns.is_empty() {
            out.push_str(" DEFAULT VALUES");
        } else {
            out.push_str(" (");
            separated_by(
                out,
                columns,
                |out, v| self.write_identifier_quoted(out, v),
                ",",
            );
            out.push_str(") VALUES (");
            separated_by(
                out,
                1..=columns.len(),
                |out, i| self.write_placeholder(out, i),
                ",",
            );
            out.push(')');
        }
        out.push_str(" RETURNING ");
        self.write_identifier_quoted(out, returning);
        out.push(';');
    }

    fn write_update(
        &self,
        out: &mut String,
        schema: &str,
        relation: &str,
        assignments: &str,
        condition: &str,
    ) {
        out.push_str("UPDATE ");
        self.write_table_ref(out, schema, relation);
        out.push_str(" SET ");
        out.push_str(assignments);
        out.push_str(" WHERE ");
        out.push_str(condition);
    }

    /// `columns` empty selects every column.
    fn write_select(
        &self,
        out: &mut String,
        schema: &str,
        relation: &str,
        columns: &[&str],
        condition: &str,
        order: &str,
    ) {
        out.push_str("SELECT ");
        if columns.is_empty() {
            out.push('*');
        } else {
            separated_by(
                out,
                columns,
                |out, v| self.write_identifier_quoted(out, v),
                ",",
            );
        }
        out.push_str(" FROM ");
        self.write_table_ref(out, schema, relation);
        out.push_str(" WHERE ");
        out.push_str(condition);
        if !order.is_empty() {
            out.push(' ');
            out.push_str(order);
        }
    }

    fn write_limit(&self, out: &mut String, offset: Option<u64>, limit: Option<u64>) {
        if let Some(offset) = offset {
            let _ = write!(out, " OFFSET {}", offset);
        }
        if let Some(limit) = limit {
            let _ = write!(out, " LIMIT {}", limit);
        }
    }

    /// `function` is an aggregate name, it is validated by the caller.
    fn write_count(
        &self,
        out: &mut String,
        schema: &str,
        relation: &str,
        function: &str,
        column: &str,
        condition: &str,
    ) {
        out.push_str("SELECT ");
        out.push_str(function);
        out.push('(');
        self.write_column_ref(out, column);
        out.push_str(") FROM ");
        self.write_table_ref(out, schema, relation);
        out.push_str(" WHERE ");
        out.push_str(condition);
    }

    #[allow(clippy::too_many_arguments)]
    fn write_group(
        &self,
        out: &mut String,
        schema: &str,
        relation: &str,
        field: &str,
        function: &str,
        column: &str,
        alias: &str,
        condition: &str,
        order: &str,
    ) {
        out.push_str("SELECT ");
        self.write_identifier_quoted(out, field);
        out.push(',');
        out.push_str(function);
        out.push('(');
        self.write_column_ref(out, column);
        out.push_str(") AS ");
        self.write_identifier_quoted(out, alias);
        out.push_str(" FROM ");
        self.write_table_ref(out, schema, relation);
        out.push_str(" WHERE ");
        out.push_str(condition);
        out.push_str(" GROUP BY ");
        self.write_identifier_quoted(out, field);
        out.push(' ');
        if order.is_empty() {
            out.push_str("ORDER BY ");
            self.write_identifier_quoted(out, alias);
            out.push_str(" DESC");
        } else {
            out.push_str(order);
        }
    }

    fn write_delete(&self, out: &mut String, schema: &str, relation: &str, condition: &str) {
        out.push_str("DELETE FROM ");
        self.write_table_ref(out, schema, relation);
        out.push_str(" WHERE ");
        out.push_str(condition);
    }

    fn write_create_sequence(&self, out: &mut String, name: &str, start: i64, step: i64) {
        out.push_str("CREATE SEQUENCE IF NOT EXISTS ");
        self.write_identifier_quoted(out, name);
        let _ = write!(out, " START {} INCREMENT {};", start, step);
    }

    fn write_next_value(&self, out: &mut String, name: &str) {
        out.push_str("SELECT nextval(");
        let mut quoted = String::with_capacity(name.len() + 2);
        self.write_identifier_quoted(&mut quoted, name);
        self.write_string_literal(out, &quoted);
        out.push_str(");");
    }

    fn write_drop_sequence(&self, out: &mut String, name: &str) {
        out.push_str("DROP SEQUENCE IF EXISTS ");
        self.write_identifier_quoted(out, name);
        out.push(';');
    }
}

/// Writer with the default rendering, `$N` placeholders and JSONB merges.
#[derive(Default, Debug, Clone, Copy)]
pub struct GenericSqlWriter;

impl GenericSqlWriter {
    pub fn new() -> Self {
        Self
    }
}

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }

    fn write_json_merge(&self, out: &mut String, field: &str, key: &str, index: usize) {
        self.write_identifier_quoted(out, field);
        out.push('=');
        self.write_identifier_quoted(out, field);
        out.push_str("||jsonb_build_object(");
        self.write_string_literal(out, key);
        out.push_str(", ");
        self.write_placeholder(out, index);
        out.push(')');
    }

    fn write_json_increment(&self, out: &mut String, field: &str, key: &str, index: usize) {
        self.write_identifier_quoted(out, field);
        out.push('=');
        self.write_identifier_quoted(out, field);
        out.push_str("||jsonb_build_object(");
        self.write_string_literal(out, key);
        out.push_str(", COALESCE((");
        self.write_identifier_quoted(out, field);
        out.push_str("->>");
        self.write_string_literal(out, key);
        out.push_str(")::int8,0)+");
        self.write_placeholder(out, index);
        out.push(')');
    }
}
