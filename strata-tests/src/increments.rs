use crate::common::{Recorder, database, reset};
use strata::{DataError, Filter, Pool, Value, map};
use time::{Duration, OffsetDateTime};

pub async fn increments<P: Pool + Clone>(pool: P) {
    reset(&pool).await;
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();
    let mut users = session.table("users").expect("The users table is declared");
    let created = users
        .create(&map! { "name" => "ada", "age" => 30 })
        .await
        .expect("Could not create a user");
    let filter: [Filter; 1] = [map! { "id" => created["id"].clone() }.into()];

    for _ in 0..2 {
        let affected = users
            .update(&map! { "$inc" => map! { "stats.views" => 1 } }, &filter)
            .await
            .expect("Could not increment");
        assert_eq!(affected, 1);
    }
    let found = users
        .first(&filter)
        .await
        .expect("Could not read the user")
        .expect("The user was not found");
    assert_eq!(found["stats"], Value::Map(map! { "views" => 2 }));

    let affected = users
        .update(
            &map! { "$inc" => map! { "age" => 5 }, "stats.city" => "Rome" },
            &filter,
        )
        .await
        .expect("Could not update");
    assert_eq!(affected, 1);
    let found = users
        .first(&filter)
        .await
        .expect("Could not read the user")
        .expect("The user was not found");
    assert_eq!(found["age"], Value::Int64(35));
    assert_eq!(
        found["stats"],
        Value::Map(map! { "city" => "Rome", "views" => 2 })
    );

    let before = OffsetDateTime::now_utc() - Duration::minutes(1);
    let changed = users
        .change(&found, &map! { "name" => "ada l." })
        .await
        .expect("Could not change");
    assert_eq!(changed["name"], Value::from("ada l."));
    let Value::Timestamp(stamp) = changed["changed"] else {
        panic!("The change was not stamped: {:?}", changed);
    };
    assert!(stamp > before);
    let found = users
        .first(&filter)
        .await
        .expect("Could not read the user")
        .expect("The user was not found");
    assert_eq!(found["name"], Value::from("ada l."));
    assert!(matches!(found["changed"], Value::Timestamp(..)));

    let error = users
        .update(&map! { "unknown" => 1 }, &filter)
        .await
        .expect_err("An update without values must fail");
    assert!(matches!(error, DataError::EmptyInput(..)));
    assert!(matches!(session.erred(), Some(DataError::EmptyInput(..))));

    let events = recorder.take();
    let (name, payload) = events.last().expect("No event was fired");
    assert_eq!(name, "data.change");
    let payload = payload.as_ref().expect("The change event has a payload");
    assert_eq!(
        payload["before"].as_map().map(|v| v["name"].clone()),
        Some(Value::from("ada"))
    );
    assert_eq!(
        payload["after"].as_map().map(|v| v["name"].clone()),
        Some(Value::from("ada l."))
    );
}
