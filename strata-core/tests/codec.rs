#[cfg(test)]
mod tests {
    use strata_core::{
        FieldDef, FieldType, Fields, Map, Projection, Value,
        codec::{decode, encode, encode_value, parse_array_literal},
        map, project,
    };
    use time::{OffsetDateTime, macros::datetime};

    #[test]
    fn primitive_lists_become_literals() {
        assert_eq!(
            encode_value(&vec![1, 2, 3].into()),
            Value::Varchar("{1,2,3}".into())
        );
        assert_eq!(
            encode_value(&vec![true, false].into()),
            Value::Varchar("{TRUE,FALSE}".into())
        );
        assert_eq!(
            encode_value(&vec!["plain", "with space", "a,b", "quo\"te", "", "null"].into()),
            Value::Varchar(r#"{plain,"with space","a,b","quo\"te","","null"}"#.into())
        );
        assert_eq!(
            encode_value(&vec![1.5f64, -0.25].into()),
            Value::Varchar("{1.5,-0.25}".into())
        );
        assert_eq!(
            encode_value(&Vec::<i32>::new().into()),
            Value::Varchar("{}".into())
        );
    }

    #[test]
    fn maps_become_json() {
        let encoded = encode(&Fields::new(), &map! {
            "info" => map! { "city" => "Rome", "zip" => 100 },
            "items" => vec![map! { "a" => 1 }, map! { "a" => 2 }],
            "name" => "plain",
        });
        assert_eq!(
            encoded["info"],
            Value::Varchar(r#"{"city":"Rome","zip":100}"#.into())
        );
        assert_eq!(
            encoded["items"],
            Value::Varchar(r#"[{"a":1},{"a":2}]"#.into())
        );
        assert_eq!(encoded["name"], Value::Varchar("plain".into()));
    }

    #[test]
    fn json_fields_keep_their_collection_kind() {
        let mut fields = Fields::new();
        fields.insert("items".into(), FieldDef::new(FieldType::JsonArray).nullable());
        fields.insert("info".into(), FieldDef::new(FieldType::Json).nullable());
        fields.insert(
            "tags".into(),
            FieldDef::new(FieldType::Array(Box::new(FieldType::String))).nullable(),
        );
        let encoded = encode(
            &fields,
            &map! {
                "items" => Value::List(vec![]),
                "info" => Map::new(),
                "tags" => Value::List(vec![]),
                "info.codes" => vec![1, 2],
            },
        );
        assert_eq!(encoded["items"], Value::Varchar("[]".into()));
        assert_eq!(encoded["info"], Value::Varchar("{}".into()));
        assert_eq!(encoded["tags"], Value::Varchar("{}".into()));
        assert_eq!(encoded["info.codes"], Value::Varchar("[1,2]".into()));
    }

    #[test]
    fn empty_json_lists_survive_the_round_trip() {
        let mut fields = Fields::new();
        fields.insert("items".into(), FieldDef::new(FieldType::JsonArray));
        for items in [vec![], vec![map! { "a" => 1 }]] {
            let input = map! { "items" => items.clone() };
            let projected = project(&fields, &input, Projection::Partial).unwrap();
            let encoded = encode(&fields, &projected);
            let decoded = decode(&["items".into()], vec![encoded["items"].clone()]);
            let read = project(&fields, &decoded, Projection::Strict).unwrap();
            let expected = items.into_iter().map(Value::Map).collect::<Vec<_>>();
            assert_eq!(read["items"], Value::List(expected));
        }
    }

    #[test]
    fn other_values_pass_through() {
        let moment = datetime!(2024-05-01 10:00 UTC);
        assert_eq!(encode_value(&Value::Timestamp(moment)), Value::Timestamp(moment));
        assert_eq!(encode_value(&Value::Null), Value::Null);
        assert_eq!(encode_value(&Value::Int64(7)), Value::Int64(7));
    }

    #[test]
    fn decode_normalizes() {
        let moment = datetime!(2024-05-01 10:00 UTC);
        let decoded = decode(
            &["blob".into(), "when".into(), "n".into()],
            vec![
                Value::Blob(b"text".to_vec().into_boxed_slice()),
                Value::Timestamp(moment),
                Value::Int32(1),
            ],
        );
        assert_eq!(decoded["blob"], Value::Varchar("text".into()));
        assert_eq!(decoded["n"], Value::Int32(1));
        let Value::Timestamp(when) = decoded["when"] else {
            panic!("Expected a timestamp, got {:?}", decoded["when"]);
        };
        assert_eq!(when, moment);
    }

    #[test]
    fn array_literal_parsing() {
        assert_eq!(parse_array_literal("{}"), Some(vec![]));
        assert_eq!(
            parse_array_literal(r#"{a, "b,c" ,NULL,"NULL","q\"x"}"#),
            Some(vec![
                Some("a".into()),
                Some("b,c".into()),
                None,
                Some("NULL".into()),
                Some("q\"x".into()),
            ])
        );
        assert_eq!(parse_array_literal("a,b"), None);
        assert_eq!(parse_array_literal(r#"{"open}"#), None);
        assert_eq!(parse_array_literal("{{1,2},{3}}"), None);
    }

    #[test]
    fn int_lists_survive_the_round_trip() {
        let mut fields = Fields::new();
        fields.insert(
            "ids".into(),
            FieldDef::new("[int]".parse::<FieldType>().unwrap()),
        );
        for ids in [vec![], vec![42i64], vec![1, -2, 300_000_000_000]] {
            let encoded = encode(&fields, &map! { "ids" => ids.clone() });
            let Value::Varchar(literal) = &encoded["ids"] else {
                panic!("Expected an array literal, got {:?}", encoded["ids"]);
            };
            let decoded = decode(&["ids".into()], vec![Value::Blob(literal.as_bytes().into())]);
            let projected = project(&fields, &decoded, Projection::Strict).unwrap();
            let expected = ids.into_iter().map(Value::Int64).collect::<Vec<_>>();
            assert_eq!(projected["ids"], Value::List(expected));
        }
    }

    #[test]
    fn timestamps_keep_the_instant() {
        let now = OffsetDateTime::now_utc();
        let decoded = decode(&["at".into()], vec![Value::Timestamp(now)]);
        assert_eq!(decoded["at"], Value::Timestamp(now));
    }
}
