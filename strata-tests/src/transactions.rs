use crate::common::{Recorder, database, reset};
use strata::{DataError, Pool, Value, map};

pub async fn gating<P: Pool + Clone>(pool: P) {
    reset(&pool).await;
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();

    session.begin().await.expect("Could not begin");
    {
        let mut users = session.table("users").expect("The users table is declared");
        let first = users
            .create(&map! { "name" => "first" })
            .await
            .expect("Could not create a user");
        users
            .create(&map! { "name" => "second" })
            .await
            .expect("Could not create a user");
        users
            .change(&first, &map! { "age" => 3 })
            .await
            .expect("Could not change a user");
    }
    assert!(recorder.names().is_empty());
    assert_eq!(session.pending_triggers().len(), 3);
    session.submit().await.expect("Could not submit");
    let events = recorder.take();
    let names = events.iter().map(|(v, _)| v.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["data.create", "data.create", "data.change"]);
    let entity = |i: usize| {
        events[i]
            .1
            .as_ref()
            .and_then(|v| v.get("entity"))
            .and_then(|v| v.as_map())
            .map(|v| v["name"].clone())
    };
    assert_eq!(entity(0), Some(Value::from("first")));
    assert_eq!(entity(1), Some(Value::from("second")));

    session.begin().await.expect("Could not begin");
    session
        .table("users")
        .expect("The users table is declared")
        .create(&map! { "name" => "third" })
        .await
        .expect("Could not create a user");
    session.cancel().await.expect("Could not cancel");
    assert!(recorder.names().is_empty());
    let total = session
        .table("users")
        .expect("The users table is declared")
        .count(&[])
        .await
        .expect("Could not count");
    assert_eq!(total, 2.0);
    assert!(matches!(
        session.submit().await,
        Err(DataError::NoActiveTransaction)
    ));
}

pub async fn error_rollback<P: Pool + Clone>(pool: P) {
    reset(&pool).await;
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();

    session.begin().await.expect("Could not begin");
    session
        .table("users")
        .expect("The users table is declared")
        .create(&map! { "name" => "lost" })
        .await
        .expect("Could not create a user");
    let error = session
        .table("ghosts")
        .expect("The ghosts table is declared")
        .first(&[])
        .await
        .expect_err("Reading a missing relation must fail");
    assert!(matches!(error, DataError::Statement(..)));
    assert!(!session.is_manual());
    assert!(matches!(
        session.submit().await,
        Err(DataError::NoActiveTransaction)
    ));
    assert!(matches!(session.erred(), Some(DataError::Statement(..))));
    let lost = session
        .table("users")
        .expect("The users table is declared")
        .count(&[map! { "name" => "lost" }.into()])
        .await
        .expect("Could not count");
    assert_eq!(lost, 0.0);
    assert!(recorder.names().is_empty());

    let id = session
        .batch(async |session| {
            let created = session
                .table("users")?
                .create(&map! { "name" => "kept" })
                .await?;
            Ok(created["id"].clone())
        })
        .await
        .expect("The batch did not commit");
    assert!(matches!(id, Value::Int64(..)));
    assert_eq!(recorder.names(), ["data.create"]);

    let result = session
        .batch(async |session| {
            session
                .table("users")?
                .create(&map! { "name" => "dropped" })
                .await?;
            session
                .table("users")?
                .create(&map! { "age" => 1 })
                .await?;
            Ok(())
        })
        .await;
    assert!(result.is_err());
    assert!(!session.is_manual());
    assert_eq!(recorder.names(), ["data.create"]);
    let total = session
        .table("users")
        .expect("The users table is declared")
        .count(&[])
        .await
        .expect("Could not count");
    assert_eq!(total, 1.0);
}

pub async fn idempotent_begin<P: Pool + Clone>(pool: P) {
    reset(&pool).await;
    let recorder = Recorder::new();
    let database = database(pool, &recorder);
    let mut session = database.session();
    assert_eq!(database.health().workload, 1);

    let first = session.begin().await.expect("Could not begin");
    let second = session.begin().await.expect("Could not begin");
    assert_eq!(first, second);
    assert_eq!(session.transaction_id(), Some(first));
    session.cancel().await.expect("Could not cancel");
    let third = session.begin().await.expect("Could not begin");
    assert_ne!(third, first);
    session.submit().await.expect("Could not submit");

    let mut other = database.session();
    assert_eq!(database.health().workload, 2);
    other.begin().await.expect("Could not begin");
    other
        .table("users")
        .expect("The users table is declared")
        .create(&map! { "name" => "pending" })
        .await
        .expect("Could not create a user");
    other.close().await.expect("Could not close");
    assert_eq!(database.health().workload, 1);
    assert!(recorder.names().is_empty());
    let total = session
        .table("users")
        .expect("The users table is declared")
        .count(&[])
        .await
        .expect("Could not count");
    assert_eq!(total, 0.0);
    drop(session);
    assert_eq!(database.health().workload, 0);
}
