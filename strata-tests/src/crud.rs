use crate::common::{Recorder, database, reset};
use strata::{Filter, Map, Pool, Value, map};
use uuid::Uuid;

pub async fn create_read<P: Pool + Clone>(pool: P) {
    reset(&pool).await;
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();
    let mut users = session.table("users").expect("The users table is declared");

    let token = Uuid::new_v4();
    let created = users
        .create(&map! {
            "name" => "ada",
            "age" => 36,
            "tags" => vec!["math", "first programmer"],
            "scores" => vec![10i64, 20, 30],
            "stats" => map! { "views" => 0 },
            "token" => token,
            "ignored" => true,
        })
        .await
        .expect("Could not create a user");
    let id = created.get("id").cloned().expect("The key was not returned");
    assert!(matches!(id, Value::Int64(..)));
    assert!(!created.contains_key("ignored"));

    let found = users
        .first(&[map! { "id" => id.clone() }.into()])
        .await
        .expect("Could not read the user back")
        .expect("The user was not found");
    assert_eq!(found, created);
    assert_eq!(found["token"], Value::Uuid(token));
    let found = users
        .entity(id.clone())
        .await
        .expect("Could not read the user by key");
    assert_eq!(found, Some(created.clone()));

    for (name, age) in [("bob", 25), ("carl", 25), ("dora", 41)] {
        users
            .create(&map! { "name" => name, "age" => age, "scores" => Vec::<i64>::new() })
            .await
            .expect("Could not create a user");
    }
    assert_eq!(recorder.names().len(), 4);

    assert_eq!(users.count(&[]).await.expect("Could not count"), 4.0);
    assert_eq!(
        users
            .count(&[map! { "age" => map! { "$gte" => 30 } }.into()])
            .await
            .expect("Could not count"),
        2.0
    );
    assert_eq!(
        users
            .count_by("SUM", "age", &[])
            .await
            .expect("Could not sum"),
        127.0
    );
    assert_eq!(
        users
            .count_by("MAX", "scores:2", &[])
            .await
            .expect("Could not aggregate an array element"),
        20.0
    );

    let found = users
        .query(&[
            map! { "name" => vec!["bob", "dora"] }.into(),
            Filter::desc("name"),
        ])
        .await
        .expect("Could not query");
    let names = found
        .iter()
        .map(|v| v["name"].clone())
        .collect::<Vec<_>>();
    assert_eq!(names, [Value::from("dora"), Value::from("bob")]);
    assert_eq!(found[1]["scores"], Value::List(vec![]));

    let found = users
        .query(&[map! { "tags" => map! { "$any" => "math" } }.into()])
        .await
        .expect("Could not query by array membership");
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0]["tags"],
        Value::List(vec!["math".into(), "first programmer".into()])
    );

    let found = users
        .query(&[
            map! { "stats.views" => "0" }.into(),
            map! { "age" => Value::Null }.into(),
        ])
        .await
        .expect("Could not query by JSON sub key");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["name"], Value::from("ada"));

    let created = users
        .create(&map! { "name" => "eve", "history" => Vec::<Map>::new() })
        .await
        .expect("Could not create a user with an empty history");
    let found = users
        .entity(created["id"].clone())
        .await
        .expect("Could not read back an empty history")
        .expect("The user was not found");
    assert_eq!(found["history"], Value::List(vec![]));
    let changed = users
        .change(&found, &map! { "history" => vec![map! { "event" => "login" }] })
        .await
        .expect("Could not change the history");
    let found = users
        .first(&[map! { "id" => changed["id"].clone() }.into()])
        .await
        .expect("Could not read back the history")
        .expect("The user was not found");
    assert_eq!(
        found["history"],
        Value::List(vec![Value::Map(map! { "event" => "login" })])
    );
    users
        .remove(&[map! { "id" => changed["id"].clone() }.into()])
        .await
        .expect("Could not remove the user")
        .expect("The user was not removed");

    let (total, page) = users
        .limit(1, 2, &[Filter::asc("name")])
        .await
        .expect("Could not page");
    assert_eq!(total, 4);
    let names = page.iter().map(|v| v["name"].clone()).collect::<Vec<_>>();
    assert_eq!(names, [Value::from("bob"), Value::from("carl")]);

    let groups = users.group("age", &[]).await.expect("Could not group");
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0], map! { "$count" => 2i64, "age" => 25i64 });

    let mut view = session.view("users").expect("The users view is declared");
    assert_eq!(
        view.count(&[map! { "name" => map! { "$like" => "%a%" } }.into()])
            .await
            .expect("Could not count through the view"),
        3.0
    );
    assert!(session.table("nothing").is_err());
    assert!(session.erred().is_some());
}

pub async fn remove_delete<P: Pool + Clone>(pool: P) {
    reset(&pool).await;
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();
    let mut users = session.table("users").expect("The users table is declared");
    for (name, age) in [("a", 1), ("b", 2), ("c", 3)] {
        users
            .create(&map! { "name" => name, "age" => age })
            .await
            .expect("Could not create a user");
    }

    let removed = users
        .remove(&[map! { "name" => "a" }.into()])
        .await
        .expect("Could not remove")
        .expect("Nothing was removed");
    assert_eq!(removed["age"], Value::Int64(1));
    assert_eq!(users.count(&[]).await.expect("Could not count"), 2.0);
    let removed = users
        .remove(&[map! { "name" => "zzz" }.into()])
        .await
        .expect("Could not remove");
    assert_eq!(removed, None);

    let deleted = users
        .delete(&[map! { "age" => map! { "$gte" => 2 } }.into()])
        .await
        .expect("Could not delete");
    assert_eq!(deleted, 2);
    assert_eq!(users.count(&[]).await.expect("Could not count"), 0.0);

    let events = recorder.take();
    let names = events.iter().map(|(v, _)| v.as_str()).collect::<Vec<_>>();
    assert_eq!(
        names,
        ["data.create", "data.create", "data.create", "data.remove"]
    );
    let payload = events[3].1.as_ref().expect("The remove event has a payload");
    assert_eq!(payload["base"], Value::from("strata"));
    assert_eq!(payload["table"], Value::from("users"));
    assert_eq!(payload["id"], events[0].1.as_ref().expect("payload")["id"]);
}
