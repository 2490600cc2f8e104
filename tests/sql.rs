#[cfg(test)]
mod tests {
    use indoc::indoc;
    use strata::{GenericSqlWriter, SqlWriter};
    use strata_postgres::PostgresSqlWriter;

    const WRITER: PostgresSqlWriter = PostgresSqlWriter {};

    #[test]
    fn insert() {
        let mut out = String::new();
        WRITER.write_insert(&mut out, "public", "users", &["name", "age"], "id");
        assert_eq!(
            out,
            r#"INSERT INTO "public"."users" ("name","age") VALUES ($1,$2) RETURNING "id";"#
        );
        let mut out = String::new();
        WRITER.write_insert(&mut out, "", "empty", &[], "uid");
        assert_eq!(out, r#"INSERT INTO "empty" DEFAULT VALUES RETURNING "uid";"#);
    }

    #[test]
    fn update() {
        let writer = WRITER.as_dyn();
        let mut assignments = String::new();
        writer.write_assignment(&mut assignments, "name", 1);
        assignments.push(',');
        writer.write_increment(&mut assignments, "age", 2);
        assignments.push(',');
        writer.write_json_merge(&mut assignments, "stats", "city", 3);
        let mut condition = String::new();
        writer.write_assignment(&mut condition, "id", 4);
        let mut out = String::new();
        writer.write_update(&mut out, "crm", "people", &assignments, &condition);
        assert_eq!(
            out,
            indoc! {r#"
                UPDATE "crm"."people" SET "name"=$1,"age"="age"+$2,"stats"="stats"||jsonb_build_object('city', $3::jsonb) WHERE "id"=$4
            "#}
            .trim()
        );
    }

    #[test]
    fn json_merge_dialects() {
        let mut out = String::new();
        GenericSqlWriter.write_json_merge(&mut out, "info", "it's", 7);
        assert_eq!(out, r#""info"="info"||jsonb_build_object('it''s', $7)"#);
        let mut out = String::new();
        WRITER.write_json_merge(&mut out, "info", "it's", 7);
        assert_eq!(out, r#""info"="info"||jsonb_build_object('it''s', $7::jsonb)"#);
    }

    #[test]
    fn json_increment() {
        for writer in [WRITER.as_dyn(), GenericSqlWriter.as_dyn()] {
            let mut out = String::new();
            writer.write_json_increment(&mut out, "stats", "views", 1);
            assert_eq!(
                out,
                r#""stats"="stats"||jsonb_build_object('views', COALESCE(("stats"->>'views')::int8,0)+$1)"#
            );
        }
    }

    #[test]
    fn select() {
        let mut out = String::new();
        WRITER.write_select(
            &mut out,
            "public",
            "users",
            &["id", "name"],
            r#""age">$1"#,
            r#"ORDER BY "name" ASC"#,
        );
        WRITER.write_limit(&mut out, Some(10), Some(5));
        assert_eq!(
            out,
            indoc! {r#"
                SELECT "id","name" FROM "public"."users" WHERE "age">$1 ORDER BY "name" ASC OFFSET 10 LIMIT 5
            "#}
            .trim()
        );
        let mut out = String::new();
        WRITER.write_select(&mut out, "public", "users", &[], "1=1", "");
        WRITER.write_limit(&mut out, None, Some(1));
        assert_eq!(out, r#"SELECT * FROM "public"."users" WHERE 1=1 LIMIT 1"#);
    }

    #[test]
    fn aggregates() {
        let mut out = String::new();
        WRITER.write_count(&mut out, "public", "users", "MAX", "scores:2", "1=1");
        assert_eq!(
            out,
            r#"SELECT MAX("scores"[2]) FROM "public"."users" WHERE 1=1"#
        );
        let mut out = String::new();
        WRITER.write_group(
            &mut out,
            "public",
            "users",
            "age",
            "COUNT",
            "id",
            "$count",
            "1=1",
            "",
        );
        assert_eq!(
            out,
            indoc! {r#"
                SELECT "age",COUNT("id") AS "$count" FROM "public"."users" WHERE 1=1 GROUP BY "age" ORDER BY "$count" DESC
            "#}
            .trim()
        );
    }

    #[test]
    fn delete() {
        let mut out = String::new();
        WRITER.write_delete(&mut out, "public", "users", r#""id"=$1"#);
        assert_eq!(out, r#"DELETE FROM "public"."users" WHERE "id"=$1"#);
    }

    #[test]
    fn sequences() {
        let mut out = String::new();
        WRITER.write_create_sequence(&mut out, "serial_orders", 100, 1);
        assert_eq!(
            out,
            r#"CREATE SEQUENCE IF NOT EXISTS "serial_orders" START 100 INCREMENT 1;"#
        );
        let mut out = String::new();
        WRITER.write_next_value(&mut out, "serial_orders");
        assert_eq!(out, r#"SELECT nextval('"serial_orders"');"#);
        let mut out = String::new();
        WRITER.write_drop_sequence(&mut out, "serial_orders");
        assert_eq!(out, r#"DROP SEQUENCE IF EXISTS "serial_orders";"#);
    }

    #[test]
    fn quoting() {
        let mut out = String::new();
        WRITER.write_identifier_quoted(&mut out, r#"we"ird"#);
        assert_eq!(out, r#""we""ird""#);
        let mut out = String::new();
        WRITER.write_column_ref(&mut out, "tags:x");
        assert_eq!(out, r#""tags:x""#);
    }
}
