use crate::common::{Recorder, database, reset};
use strata::{DataError, Filter, Pool, Value, map};

pub async fn models<P: Pool + Clone>(pool: P) {
    reset(&pool).await;
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();
    {
        let mut users = session.table("users").expect("The users table is declared");
        for (name, age) in [("c", 30), ("a", 10), ("b", 20)] {
            users
                .create(&map! { "name" => name, "age" => age, "tags" => vec!["x"] })
                .await
                .expect("Could not create a user");
        }
    }

    let mut model = session.model("users").expect("The users model is declared");
    let found = model
        .query(&[Filter::asc("name")])
        .await
        .expect("Could not query the model");
    assert_eq!(found.len(), 3);
    for item in &found {
        let keys = item.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, ["id", "name"]);
    }
    let first = model
        .first(&[map! { "age" => map! { "$gt" => 15 } }.into(), Filter::asc("age")])
        .await
        .expect("Could not read the model")
        .expect("Nothing matched");
    assert_eq!(first["name"], Value::from("b"));

    let mut names = Vec::new();
    model
        .range(
            |item| {
                names.push(item["name"].clone());
                Ok(())
            },
            &[Filter::asc("name")],
        )
        .await
        .expect("Could not range over the model");
    assert_eq!(names, [Value::from("a"), Value::from("b"), Value::from("c")]);

    let mut seen = 0;
    model
        .limit_range(
            2,
            |_| {
                seen += 1;
                Ok(())
            },
            &[],
        )
        .await
        .expect("Could not range over the model");
    assert_eq!(seen, 2);

    let mut seen = 0;
    let result = model
        .range(
            |_| {
                seen += 1;
                Err(DataError::EmptyInput("stop".into()))
            },
            &[],
        )
        .await;
    assert!(matches!(result, Err(DataError::EmptyInput(v)) if v == "stop"));
    assert_eq!(seen, 1);
}
