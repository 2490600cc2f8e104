use crate::{
    DefaultParser, EventBus, FilterParser, MemoryRegistry, NoEvents, Pool, Registry, Session,
};
use std::sync::{Arc, Mutex};

/// Pool snapshot returned by [`Database::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    /// Sessions currently leased
    pub workload: i64,
}

struct Shared<P: Pool> {
    pool: P,
    name: String,
    schema: String,
    actives: Mutex<i64>,
    registry: Arc<dyn Registry>,
    events: Arc<dyn EventBus>,
    parser: Arc<dyn FilterParser>,
}

/// A connected database, cheap to clone. Work happens through [`Session`]s.
pub struct Database<P: Pool> {
    shared: Arc<Shared<P>>,
}

impl<P: Pool> Clone for Database<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: Pool> Database<P> {
    pub fn builder(pool: P) -> DatabaseBuilder<P> {
        DatabaseBuilder {
            schema: pool.default_schema().to_string(),
            pool,
            name: "default".into(),
            registry: Arc::new(MemoryRegistry::new()),
            events: Arc::new(NoEvents),
            parser: Arc::new(DefaultParser),
        }
    }

    pub fn new(pool: P) -> Self {
        Self::builder(pool).build()
    }

    /// Lease a new session.
    pub fn session(&self) -> Session<P> {
        match self.shared.actives.lock() {
            Ok(mut actives) => *actives += 1,
            Err(e) => log::error!("Active sessions counter is poisoned: {}", e),
        }
        Session::new(Lease {
            database: self.clone(),
        })
    }

    pub fn health(&self) -> Health {
        Health {
            workload: self.shared.actives.lock().map(|v| *v).unwrap_or_default(),
        }
    }

    pub fn pool(&self) -> &P {
        &self.shared.pool
    }
    pub fn name(&self) -> &str {
        &self.shared.name
    }
    pub fn schema(&self) -> &str {
        &self.shared.schema
    }
    pub fn registry(&self) -> &dyn Registry {
        self.shared.registry.as_ref()
    }
    pub fn events(&self) -> &dyn EventBus {
        self.shared.events.as_ref()
    }
    pub fn parser(&self) -> &dyn FilterParser {
        self.shared.parser.as_ref()
    }
}

pub struct DatabaseBuilder<P: Pool> {
    pool: P,
    name: String,
    schema: String,
    registry: Arc<dyn Registry>,
    events: Arc<dyn EventBus>,
    parser: Arc<dyn FilterParser>,
}

impl<P: Pool> DatabaseBuilder<P> {
    /// Logical name, used first when resolving entity declarations.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
    pub fn registry(mut self, registry: impl Registry + 'static) -> Self {
        self.registry = Arc::new(registry);
        self
    }
    pub fn shared_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }
    pub fn events(mut self, events: impl EventBus + 'static) -> Self {
        self.events = Arc::new(events);
        self
    }
    pub fn shared_events(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }
    pub fn parser(mut self, parser: impl FilterParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }
    pub fn build(self) -> Database<P> {
        Database {
            shared: Arc::new(Shared {
                pool: self.pool,
                name: self.name,
                schema: self.schema,
                actives: Mutex::new(0),
                registry: self.registry,
                events: self.events,
                parser: self.parser,
            }),
        }
    }
}

/// Accounting for one leased session, released on drop.
pub(crate) struct Lease<P: Pool> {
    pub(crate) database: Database<P>,
}

impl<P: Pool> Drop for Lease<P> {
    fn drop(&mut self) {
        match self.database.shared.actives.lock() {
            Ok(mut actives) => *actives -= 1,
            Err(e) => log::error!("Active sessions counter is poisoned: {}", e),
        }
    }
}
