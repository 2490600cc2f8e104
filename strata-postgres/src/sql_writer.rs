use strata_core::SqlWriter;

/// Postgres dialect, the JSON merge casts its parameter to `jsonb` so the server can type it.
#[derive(Default, Debug, Clone, Copy)]
pub struct PostgresSqlWriter {}

impl SqlWriter for PostgresSqlWriter {
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
        out.push_str("::jsonb)");
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
