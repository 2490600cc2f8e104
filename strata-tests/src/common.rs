use std::sync::{Arc, Mutex};
use strata::{
    Database, EntityConfig, EventBus, FieldDef, FieldType, Map, MemoryRegistry, Pool, Query,
};

/// Relation backing the `users` entity.
pub const USERS: &str = "strata_users";

/// Event bus keeping every trigger it receives.
#[derive(Default, Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(String, Option<Map>)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|v| v.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<(String, Option<Map>)> {
        self.events
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }
}

impl EventBus for Recorder {
    fn trigger(&self, name: &str, payload: Option<Map>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((name.to_string(), payload));
        }
    }
}

fn users() -> EntityConfig {
    EntityConfig::new()
        .relation(USERS)
        .field("id", FieldDef::new(FieldType::Int).nullable())
        .field("name", FieldDef::new(FieldType::String))
        .field("age", FieldDef::new(FieldType::Int).nullable())
        .field(
            "tags",
            FieldDef::new(FieldType::Array(Box::new(FieldType::String))).nullable(),
        )
        .field(
            "scores",
            FieldDef::new(FieldType::Array(Box::new(FieldType::Int))).nullable(),
        )
        .field("stats", FieldDef::new(FieldType::Json).nullable())
        .field("history", FieldDef::new(FieldType::JsonArray).nullable())
        .field("token", FieldDef::new(FieldType::Uuid).nullable())
        .field("changed", FieldDef::new(FieldType::Timestamp).nullable())
}

/// Database named `strata` declaring the `users` table, view and model.
pub fn database<P: Pool>(pool: P, recorder: &Recorder) -> Database<P> {
    let registry = MemoryRegistry::new()
        .table("*.users", users())
        .view("strata.users", users())
        .model(
            "users",
            EntityConfig::new()
                .relation(USERS)
                .field("id", FieldDef::new(FieldType::Int))
                .field("name", FieldDef::new(FieldType::String)),
        )
        .table("*.ghosts", EntityConfig::new().relation("strata_missing"));
    Database::builder(pool)
        .name("strata")
        .registry(registry)
        .events(recorder.clone())
        .build()
}

pub(crate) async fn reset<P: Pool>(pool: &P) {
    pool.execute(Query::from(format!("DROP TABLE IF EXISTS \"{}\"", USERS)))
        .await
        .expect("Could not drop the users table");
    pool.execute(Query::from(format!(
        r#"CREATE TABLE "{}" (
            "id" BIGSERIAL PRIMARY KEY,
            "name" TEXT NOT NULL,
            "age" INTEGER,
            "tags" TEXT[],
            "scores" INT8[],
            "stats" JSONB NOT NULL DEFAULT '{{}}',
            "history" JSONB,
            "token" UUID,
            "changed" TIMESTAMPTZ
        )"#,
        USERS
    )))
    .await
    .expect("Could not create the users table");
}
