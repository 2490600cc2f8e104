#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicI64, Ordering},
        },
    };
    use strata_core::{
        CHANGE_TRIGGER, CREATE_TRIGGER, DataError, Database, EntityConfig, Executor, FieldDef,
        FieldType, Filter, GenericSqlWriter, Map, MemoryRegistry, Pool, Query, REMOVE_TRIGGER,
        Result, RowLabeled, RowsAffected, Transaction, Value, map,
    };

    #[derive(Default)]
    struct Shared {
        journal: Mutex<Vec<Query>>,
        rows: Mutex<VecDeque<Vec<RowLabeled>>>,
        ids: AtomicI64,
        refuse_commit: AtomicBool,
    }

    impl Shared {
        fn run(&self, query: Query) -> Result<Vec<RowLabeled>> {
            let failing = query.sql.contains("broken");
            let insert = query.sql.starts_with("INSERT");
            let select = query.sql.starts_with("SELECT");
            self.journal.lock().unwrap().push(query);
            if failing {
                return Err(strata_core::Error::msg("relation \"broken\" does not exist"));
            }
            if insert {
                let id = self.ids.fetch_add(1, Ordering::Relaxed) + 1;
                return Ok(vec![RowLabeled::new(
                    Arc::from(["id".to_string()]),
                    Box::new([Value::Int64(id)]),
                )]);
            }
            if select {
                return Ok(self.rows.lock().unwrap().pop_front().unwrap_or_default());
            }
            Ok(Vec::new())
        }
        fn mark(&self, sql: &str) {
            self.journal.lock().unwrap().push(sql.into());
        }
    }

    struct MockPool(Arc<Shared>);
    struct MockTransaction(Arc<Shared>);

    impl Executor for MockTransaction {
        async fn fetch(&mut self, query: Query) -> Result<Vec<RowLabeled>> {
            self.0.run(query)
        }
        async fn execute(&mut self, query: Query) -> Result<RowsAffected> {
            self.0.run(query).map(|_| RowsAffected { rows_affected: 1 })
        }
    }

    impl Transaction for MockTransaction {
        async fn commit(self) -> Result<()> {
            self.0.mark("COMMIT");
            if self.0.refuse_commit.load(Ordering::Relaxed) {
                return Err(strata_core::Error::msg(
                    "could not serialize access due to concurrent update",
                ));
            }
            Ok(())
        }
        async fn rollback(self) -> Result<()> {
            self.0.mark("ROLLBACK");
            Ok(())
        }
    }

    impl Pool for MockPool {
        type Transaction = MockTransaction;
        type SqlWriter = GenericSqlWriter;

        fn sql_writer(&self) -> GenericSqlWriter {
            GenericSqlWriter::new()
        }
        async fn begin(&self) -> Result<MockTransaction> {
            self.0.mark("BEGIN");
            Ok(MockTransaction(self.0.clone()))
        }
        async fn fetch(&self, query: Query) -> Result<Vec<RowLabeled>> {
            self.0.run(query)
        }
        async fn execute(&self, query: Query) -> Result<RowsAffected> {
            self.0.run(query).map(|_| RowsAffected { rows_affected: 3 })
        }
    }

    type Events = Arc<Mutex<Vec<(String, Option<Map>)>>>;

    fn setup() -> (Database<MockPool>, Arc<Shared>, Events) {
        let shared = Arc::new(Shared::default());
        let events: Events = Default::default();
        let recorder = events.clone();
        let registry = MemoryRegistry::new()
            .table(
                "*.users",
                EntityConfig::new()
                    .field("id", FieldDef::new(FieldType::Int).nullable())
                    .field("name", FieldDef::new(FieldType::String))
                    .field("stats", FieldDef::new(FieldType::Json).nullable())
                    .field("changed", FieldDef::new(FieldType::Timestamp).nullable()),
            )
            .table("broken", EntityConfig::new());
        let database = Database::builder(MockPool(shared.clone()))
            .name("main")
            .registry(registry)
            .events(move |name: &str, payload: Option<Map>| {
                recorder.lock().unwrap().push((name.to_string(), payload))
            })
            .build();
        (database, shared, events)
    }

    fn statements(shared: &Shared) -> Vec<String> {
        shared
            .journal
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.sql.clone())
            .collect()
    }

    fn fired(events: &Events) -> Vec<String> {
        events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, payload)| {
                let entity = payload
                    .as_ref()
                    .and_then(|v| v.get("entity"))
                    .and_then(Value::as_map)
                    .and_then(|v| v.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                format!("{}:{}", name, entity)
            })
            .collect()
    }

    #[tokio::test]
    async fn triggers_fire_after_commit_in_order() {
        let (database, shared, events) = setup();
        let mut session = database.session();
        session.begin().await.unwrap();
        for name in ["a", "b", "c"] {
            session
                .table("users")
                .unwrap()
                .create(&map! { "name" => name })
                .await
                .unwrap();
        }
        assert_eq!(session.pending_triggers().len(), 3);
        assert!(events.lock().unwrap().is_empty());
        session.submit().await.unwrap();
        assert_eq!(
            fired(&events),
            [
                "data.create:a".to_string(),
                "data.create:b".into(),
                "data.create:c".into()
            ]
        );
        let statements = statements(&shared);
        assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
        assert_eq!(
            statements[1],
            r#"INSERT INTO "public"."users" ("name") VALUES ($1) RETURNING "id";"#
        );
        assert!(!session.is_manual());
    }

    #[tokio::test]
    async fn failed_commit_fires_nothing() {
        let (database, shared, events) = setup();
        shared.refuse_commit.store(true, Ordering::Relaxed);
        let mut session = database.session();
        session.begin().await.unwrap();
        let mut users = session.table("users").unwrap();
        users.create(&map! { "name" => "a" }).await.unwrap();
        users.create(&map! { "name" => "b" }).await.unwrap();
        assert_eq!(session.pending_triggers().len(), 2);
        let result = session.submit().await;
        assert!(matches!(result, Err(DataError::Statement(..))), "{:?}", result);
        assert!(!session.is_manual());
        assert!(session.pending_triggers().is_empty());
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(
            statements(&shared).last().map(String::as_str),
            Some("COMMIT")
        );
        assert!(matches!(
            session.submit().await,
            Err(DataError::NoActiveTransaction)
        ));

        shared.refuse_commit.store(false, Ordering::Relaxed);
        session.begin().await.unwrap();
        session
            .table("users")
            .unwrap()
            .create(&map! { "name" => "c" })
            .await
            .unwrap();
        session.submit().await.unwrap();
        assert_eq!(fired(&events), ["data.create:c".to_string()]);
    }

    #[tokio::test]
    async fn cancel_discards_triggers() {
        let (database, shared, events) = setup();
        let mut session = database.session();
        session.begin().await.unwrap();
        let mut users = session.table("users").unwrap();
        users.create(&map! { "name" => "a" }).await.unwrap();
        users.create(&map! { "name" => "b" }).await.unwrap();
        session.cancel().await.unwrap();
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(
            statements(&shared).last().map(String::as_str),
            Some("ROLLBACK")
        );
        assert!(matches!(
            session.submit().await,
            Err(DataError::NoActiveTransaction)
        ));
        assert!(matches!(
            session.cancel().await,
            Err(DataError::NoActiveTransaction)
        ));
    }

    #[tokio::test]
    async fn error_forces_rollback() {
        let (database, shared, events) = setup();
        let mut session = database.session();
        session.begin().await.unwrap();
        session
            .table("users")
            .unwrap()
            .create(&map! { "name" => "a" })
            .await
            .unwrap();
        let result = session
            .table("broken")
            .unwrap()
            .create(&map! { "name" => "b" })
            .await;
        assert!(matches!(result, Err(DataError::Statement(..))));
        assert!(!session.is_manual());
        assert_eq!(
            statements(&shared).last().map(String::as_str),
            Some("ROLLBACK")
        );
        assert!(session.submit().await.unwrap_err().is_no_active_transaction());
        assert!(matches!(session.erred(), Some(DataError::Statement(..))));
        assert!(session.erred().is_none());
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn begin_is_idempotent() {
        let (database, shared, _) = setup();
        let mut session = database.session();
        let first = session.begin().await.unwrap();
        let second = session.begin().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(session.transaction_id(), Some(first));
        assert_eq!(
            statements(&shared)
                .iter()
                .filter(|v| *v == "BEGIN")
                .count(),
            1
        );
        session.submit().await.unwrap();
        let third = session.begin().await.unwrap();
        assert_ne!(first, third);
        session.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn automatic_mode_fires_immediately() {
        let (database, shared, events) = setup();
        let mut session = database.session();
        let created = session
            .table("users")
            .unwrap()
            .create(&map! { "name" => "a" })
            .await
            .unwrap();
        assert_eq!(created.get("id"), Some(&Value::Int64(1)));
        assert_eq!(fired(&events), ["data.create:a".to_string()]);
        assert!(!statements(&shared).iter().any(|v| v == "BEGIN"));
        let (_, payload) = events.lock().unwrap().remove(0);
        let payload = payload.unwrap();
        assert_eq!(payload.get("base"), Some(&Value::Varchar("main".into())));
        assert_eq!(payload.get("table"), Some(&Value::Varchar("users".into())));
        assert_eq!(payload.get("id"), Some(&Value::Int64(1)));
    }

    #[tokio::test]
    async fn unknown_entity() {
        let (database, _, _) = setup();
        let mut session = database.session();
        assert!(matches!(
            session.table("ghost").err(),
            Some(DataError::SchemaNotFound(..))
        ));
        assert!(matches!(session.erred(), Some(DataError::SchemaNotFound(..))));
        assert!(session.view("users").is_err());
        assert!(session.model("users").is_err());
    }

    #[tokio::test]
    async fn update_renders_set_then_where() {
        let (database, shared, _) = setup();
        let mut session = database.session();
        let affected = session
            .table("users")
            .unwrap()
            .update(
                &map! { "$inc" => map! { "stats.views" => 1 } },
                &[Filter::Where(map! { "id" => 5 })],
            )
            .await
            .unwrap();
        assert_eq!(affected, 3);
        let journal = shared.journal.lock().unwrap();
        let query = journal.last().unwrap();
        assert_eq!(
            query.sql,
            r#"UPDATE "public"."users" SET "stats"="stats"||jsonb_build_object('views', COALESCE(("stats"->>'views')::int8,0)+$1) WHERE "id"=$2"#
        );
        assert_eq!(query.params, [Value::Int32(1), Value::Int32(5)]);
    }

    #[tokio::test]
    async fn update_without_values_is_empty_input() {
        let (database, _, _) = setup();
        let mut session = database.session();
        let result = session
            .table("users")
            .unwrap()
            .update(&map! { "unknown" => 1 }, &[])
            .await;
        assert!(matches!(result, Err(DataError::EmptyInput(..))));
    }

    #[tokio::test]
    async fn change_stamps_and_merges() {
        let (database, shared, events) = setup();
        let mut session = database.session();
        let item = map! { "id" => 7, "name" => "old" };
        let after = session
            .table("users")
            .unwrap()
            .change(&item, &map! { "name" => "new" })
            .await
            .unwrap();
        assert_eq!(after.get("name"), Some(&Value::Varchar("new".into())));
        assert!(matches!(after.get("changed"), Some(Value::Timestamp(..))));
        let journal = shared.journal.lock().unwrap();
        let query = journal.last().unwrap();
        assert_eq!(
            query.sql,
            r#"UPDATE "public"."users" SET "changed"=$1,"name"=$2 WHERE "id"=$3"#
        );
        assert_eq!(query.params[2], Value::Int32(7));
        let events = events.lock().unwrap();
        assert_eq!(events[0].0, CHANGE_TRIGGER);
        let payload = events[0].1.as_ref().unwrap();
        assert_eq!(payload.get("before"), Some(&Value::Map(item.clone())));
        assert_eq!(payload.get("after"), Some(&Value::Map(after.clone())));
        drop(journal);
        let missing = session
            .table("users")
            .unwrap()
            .change(&map! { "name" => "x" }, &map! { "name" => "y" })
            .await;
        assert!(matches!(missing, Err(DataError::EmptyInput(..))));
    }

    #[tokio::test]
    async fn remove_reads_then_deletes() {
        let (database, shared, events) = setup();
        shared.rows.lock().unwrap().push_back(vec![RowLabeled::new(
            Arc::from(["id".to_string(), "name".to_string()]),
            Box::new([Value::Int32(4), Value::Varchar("gone".into())]),
        )]);
        let mut session = database.session();
        let removed = session
            .table("users")
            .unwrap()
            .remove(&[Filter::Where(map! { "id" => 4, "name" => "gone" })])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.get("id"), Some(&Value::Int64(4)));
        let statements = statements(&shared);
        assert_eq!(
            statements[0],
            r#"SELECT * FROM "public"."users" WHERE "id"=$1 LIMIT 1"#
        );
        assert_eq!(statements[1], r#"DELETE FROM "public"."users" WHERE "id"=$1"#);
        assert_eq!(events.lock().unwrap()[0].0, REMOVE_TRIGGER);
        let nothing = session
            .table("users")
            .unwrap()
            .remove(&[Filter::Where(map! { "name" => "none" })])
            .await
            .unwrap();
        assert!(nothing.is_none());
    }

    #[tokio::test]
    async fn batch_commits_or_rolls_back() {
        let (database, shared, events) = setup();
        let mut session = database.session();
        let id = session
            .batch(async |session| {
                let created = session
                    .table("users")
                    .unwrap()
                    .create(&map! { "name" => "a" })
                    .await?;
                Ok(created.get("id").cloned())
            })
            .await
            .unwrap();
        assert_eq!(id, Some(Value::Int64(1)));
        assert_eq!(events.lock().unwrap()[0].0, CREATE_TRIGGER);
        assert_eq!(
            statements(&shared).last().map(String::as_str),
            Some("COMMIT")
        );

        let result = session
            .batch(async |session| {
                session
                    .table("users")
                    .unwrap()
                    .create(&map! { "name" => "b" })
                    .await?;
                Err::<(), _>(DataError::EmptyInput("users".into()))
            })
            .await;
        assert!(matches!(result, Err(DataError::EmptyInput(..))));
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(
            statements(&shared).last().map(String::as_str),
            Some("ROLLBACK")
        );
        assert!(!session.is_manual());
    }

    #[tokio::test]
    async fn close_rolls_back_and_releases() {
        let (database, shared, events) = setup();
        let mut session = database.session();
        let other = database.session();
        assert_eq!(database.health().workload, 2);
        session.begin().await.unwrap();
        session
            .table("users")
            .unwrap()
            .create(&map! { "name" => "a" })
            .await
            .unwrap();
        session.close().await.unwrap();
        assert_eq!(
            statements(&shared).last().map(String::as_str),
            Some("ROLLBACK")
        );
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(database.health().workload, 1);
        other.close().await.unwrap();
        assert_eq!(database.health().workload, 0);
    }

    #[tokio::test]
    async fn serial_creates_then_draws() {
        let (database, shared, _) = setup();
        shared.rows.lock().unwrap().push_back(vec![RowLabeled::new(
            Arc::from(["nextval".to_string()]),
            Box::new([Value::Int64(10)]),
        )]);
        let mut session = database.session();
        assert_eq!(session.serial("order", 10, 0).await.unwrap(), 10);
        session.break_serial("order").await.unwrap();
        assert_eq!(
            statements(&shared),
            [
                r#"CREATE SEQUENCE IF NOT EXISTS "serial_order" START 10 INCREMENT 1;"#.to_string(),
                r#"SELECT nextval('"serial_order"');"#.into(),
                r#"DROP SEQUENCE IF EXISTS "serial_order";"#.into(),
            ]
        );
    }

    #[tokio::test]
    async fn limit_counts_and_pages() {
        let (database, shared, _) = setup();
        {
            let mut rows = shared.rows.lock().unwrap();
            rows.push_back(vec![RowLabeled::new(
                Arc::from(["count".to_string()]),
                Box::new([Value::Int64(12)]),
            )]);
            rows.push_back(vec![RowLabeled::new(
                Arc::from(["id".to_string(), "name".to_string(), "extra".to_string()]),
                Box::new([Value::Int64(3), Value::Varchar("c".into()), Value::Boolean(true)]),
            )]);
        }
        let mut session = database.session();
        let (total, items) = session
            .view("users")
            .unwrap()
            .limit(
                2,
                1,
                &[Filter::Where(map! { "name" => map! { "$like" => "%c%" } }), Filter::desc("id")],
            )
            .await
            .unwrap();
        assert_eq!(total, 12);
        assert_eq!(items, [map! { "id" => 3i64, "name" => "c" }]);
        let statements = statements(&shared);
        assert_eq!(
            statements,
            [
                r#"SELECT COUNT("id") FROM "public"."users" WHERE "name" LIKE $1"#.to_string(),
                r#"SELECT * FROM "public"."users" WHERE "name" LIKE $1 ORDER BY "id" DESC OFFSET 2 LIMIT 1"#.into(),
            ]
        );
    }

    #[tokio::test]
    async fn projection_failure_is_recorded() {
        let (database, shared, _) = setup();
        shared.rows.lock().unwrap().push_back(vec![RowLabeled::new(
            Arc::from(["id".to_string()]),
            Box::new([Value::Int64(3)]),
        )]);
        let mut session = database.session();
        let result = session.view("users").unwrap().first(&[]).await;
        let Err(DataError::ProjectionValidation { fields, .. }) = result else {
            panic!("Expected a validation failure, got {:?}", result);
        };
        assert_eq!(fields, ["name".to_string()]);
        assert!(session.erred().is_some());
    }
}
