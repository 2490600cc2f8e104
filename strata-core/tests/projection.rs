#[cfg(test)]
mod tests {
    use strata_core::{
        AsValue, DataError, EntityConfig, EntityKind, EntitySpec, FieldDef, FieldType, Fields,
        MemoryRegistry, Projection, Registry, Value, coerce, map, project,
    };
    use rust_decimal::Decimal;
    use time::macros::datetime;
    use uuid::Uuid;

    fn fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldDef::new(FieldType::String));
        fields.insert("age".into(), FieldDef::new(FieldType::Int).nullable());
        fields.insert("active".into(), FieldDef::new(FieldType::Bool).with_default(true));
        fields.insert("info".into(), FieldDef::new(FieldType::Json).nullable());
        fields
    }

    #[test]
    fn strict_applies_defaults_and_drops_unknown() {
        let output = project(
            &fields(),
            &map! { "name" => "ada", "age" => "36", "extra" => 1 },
            Projection::Strict,
        )
        .unwrap();
        assert_eq!(
            output,
            map! { "active" => true, "age" => 36i64, "name" => "ada" }
        );
    }

    #[test]
    fn strict_requires_fields() {
        let Err(DataError::ProjectionValidation { fields, .. }) =
            project(&fields(), &map! { "age" => 1 }, Projection::Strict)
        else {
            panic!("Expected a validation error");
        };
        assert_eq!(fields, ["name"]);
    }

    #[test]
    fn partial_keeps_only_the_supplied() {
        let output = project(
            &fields(),
            &map! { "age" => Value::Null, "info.city" => "Rome", "other.key" => 1 },
            Projection::Partial,
        )
        .unwrap();
        assert_eq!(output, map! { "age" => Value::Null, "info.city" => "Rome" });
    }

    #[test]
    fn partial_rejects_bad_values() {
        let result = project(
            &fields(),
            &map! { "name" => Value::Null, "age" => "many" },
            Projection::Partial,
        );
        let Err(DataError::ProjectionValidation { fields, message }) = result else {
            panic!("Expected a validation error");
        };
        assert_eq!(fields, ["age", "name"]);
        assert!(message.contains("`age` expects int but got varchar"), "{}", message);
        assert!(message.contains("`name` cannot be null"), "{}", message);
    }

    #[test]
    fn coercions() {
        assert_eq!(
            coerce(&FieldType::Bool, &"yes".as_value()),
            Some(Value::Boolean(true))
        );
        assert_eq!(coerce(&FieldType::Int, &2.0f64.as_value()), Some(Value::Int64(2)));
        assert_eq!(coerce(&FieldType::Int, &2.5f64.as_value()), None);
        assert_eq!(
            coerce(&FieldType::Float, &" 1e3 ".as_value()),
            Some(Value::Float64(1000.0))
        );
        assert_eq!(
            coerce(&FieldType::String, &7u8.as_value()),
            Some(Value::Varchar("7".into()))
        );
        assert_eq!(
            coerce(&FieldType::Timestamp, &"2024-05-01T10:00:00Z".as_value()),
            Some(Value::Timestamp(datetime!(2024-05-01 10:00 UTC)))
        );
        let id = Uuid::nil();
        assert_eq!(
            coerce(&FieldType::Uuid, &id.to_string().as_value()),
            Some(Value::Uuid(id))
        );
        assert_eq!(
            coerce(&FieldType::Json, &r#"{"a":[1]}"#.as_value()),
            Some(Value::Map(map! { "a" => vec![1i64] }))
        );
        assert_eq!(coerce(&FieldType::Json, &"[1]".as_value()), None);
        assert_eq!(
            coerce(&FieldType::JsonArray, &r#"[{"a":1}]"#.as_value()),
            Some(Value::List(vec![Value::Map(map! { "a" => 1i64 })]))
        );
        assert_eq!(
            coerce(
                &FieldType::Array(Box::new(FieldType::String)),
                &r#"{x,"y z",NULL}"#.as_value()
            ),
            Some(Value::List(vec!["x".into(), "y z".into(), Value::Null]))
        );
    }

    #[test]
    fn field_types_parse() {
        assert_eq!("int".parse::<FieldType>().unwrap(), FieldType::Int);
        assert_eq!("[json]".parse::<FieldType>().unwrap(), FieldType::JsonArray);
        assert_eq!(
            "[datetime]".parse::<FieldType>().unwrap(),
            FieldType::Array(Box::new(FieldType::Timestamp))
        );
        assert!("blob".parse::<FieldType>().is_err());
        assert_eq!(FieldType::Array(Box::new(FieldType::Int)).to_string(), "[int]");
    }

    #[test]
    fn spec_resolution() {
        let config = EntityConfig::new().field("name", FieldDef::new(FieldType::String));
        let spec = EntitySpec::resolve("crm.users", "public", &config);
        assert_eq!(spec.schema, "public");
        assert_eq!(spec.relation, "crm_users");
        assert_eq!(spec.key, "id");
        assert!(spec.fields.contains_key("$count"));
        assert!(spec.fields.contains_key("name"));

        let config = EntityConfig::new().schema("crm").relation("people").key("uid");
        let spec = EntitySpec::resolve("users", "public", &config);
        assert_eq!(
            (spec.schema.as_str(), spec.relation.as_str(), spec.key.as_str()),
            ("crm", "people", "uid")
        );
    }

    #[test]
    fn registry_lookup() {
        let registry = MemoryRegistry::new()
            .table("*.users", EntityConfig::new())
            .model("stats", EntityConfig::new());
        assert!(registry.entity(EntityKind::Table, "*.users").is_some());
        assert!(registry.entity(EntityKind::View, "*.users").is_none());
        assert!(registry.entity(EntityKind::Model, "stats").is_some());
    }

    #[test]
    fn values_compare_across_widths() {
        assert_eq!(Value::Int32(5), Value::Int64(5));
        assert_eq!(Value::UInt8(5), Value::Int16(5));
        assert_eq!(Value::Float32(2.0), Value::Int64(2));
        assert_eq!(Value::Int64(1), Value::Decimal(Decimal::ONE));
        assert_eq!(Value::Decimal(Decimal::new(300, 2)), Value::UInt8(3));
        assert_eq!(Value::Float64(1.0), Value::Decimal(Decimal::ONE));
        assert_ne!(Value::Int64(1), Value::Decimal(Decimal::new(15, 1)));
        assert_ne!(Value::Decimal(Decimal::ONE), Value::Varchar("1".into()));
        assert_ne!(Value::Int32(5), Value::Varchar("5".into()));
        assert_ne!(Value::Null, Value::Int32(0));
        assert_eq!(Value::Null, Value::Null);
        let n: u8 = AsValue::try_from_value(Value::Int64(200)).unwrap();
        assert_eq!(n, 200);
        assert!(<u8 as AsValue>::try_from_value(Value::Int64(300)).is_err());
        assert!(<i32 as AsValue>::try_from_value(Value::Varchar("1".into())).is_err());
        let v: Option<String> = AsValue::try_from_value(Value::Null).unwrap();
        assert_eq!(v, None);
    }
}
