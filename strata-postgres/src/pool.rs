use crate::{PostgresDriver, PostgresSetting, PostgresSqlWriter, PostgresTransaction, util};
use postgres_openssl::MakeTlsConnector;
use std::sync::{Arc, Mutex};
use strata_core::{Pool, Query, Result, RowLabeled, RowsAffected};
use tokio::spawn;
use tokio_postgres::{Client, NoTls};

struct Inner {
    url: String,
    tls: Option<MakeTlsConnector>,
    schema: String,
    max_idle: usize,
    idle: Mutex<Vec<Client>>,
}

/// Connections to one Postgres database.
///
/// Statements run directly on the pool autocommit on a connection leased for
/// their duration. Up to `max_idle` connections are kept for reuse.
#[derive(Clone)]
pub struct PostgresPool {
    inner: Arc<Inner>,
}

impl PostgresPool {
    pub(crate) fn new(
        url: String,
        tls: Option<MakeTlsConnector>,
        schema: String,
        max_idle: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url,
                tls,
                schema,
                max_idle,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Shorthand for [`PostgresDriver::connect`] with the default setting.
    pub async fn connect(url: &str) -> Result<Self> {
        PostgresDriver::new()
            .connect(url, PostgresSetting::default())
            .await
    }

    pub fn schema(&self) -> &str {
        &self.inner.schema
    }

    /// Connections currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().map(|v| v.len()).unwrap_or_default()
    }

    pub(crate) async fn lease(&self) -> Result<Client> {
        if let Some(client) = self.take_idle() {
            return Ok(client);
        }
        self.open().await
    }

    pub(crate) fn release(&self, client: Client) {
        if client.is_closed() {
            return;
        }
        match self.inner.idle.lock() {
            Ok(mut idle) if idle.len() < self.inner.max_idle => idle.push(client),
            Ok(..) => {}
            Err(e) => log::error!("Idle connections list is poisoned: {}", e),
        }
    }

    fn take_idle(&self) -> Option<Client> {
        match self.inner.idle.lock() {
            Ok(mut idle) => {
                idle.retain(|v| !v.is_closed());
                idle.pop()
            }
            Err(e) => {
                log::error!("Idle connections list is poisoned: {}", e);
                None
            }
        }
    }

    pub(crate) async fn open(&self) -> Result<Client> {
        let client = match &self.inner.tls {
            None => {
                let (client, connection) = tokio_postgres::connect(&self.inner.url, NoTls).await?;
                spawn(async move {
                    if let Err(e) = connection.await
                        && !e.is_closed()
                    {
                        log::error!("Postgres connection error: {:#}", e);
                    }
                });
                client
            }
            Some(tls) => {
                let (client, connection) =
                    tokio_postgres::connect(&self.inner.url, tls.clone()).await?;
                spawn(async move {
                    if let Err(e) = connection.await
                        && !e.is_closed()
                    {
                        log::error!("Postgres connection error: {:#}", e);
                    }
                });
                client
            }
        };
        Ok(client)
    }
}

impl Pool for PostgresPool {
    type Transaction = PostgresTransaction;
    type SqlWriter = PostgresSqlWriter;

    fn sql_writer(&self) -> PostgresSqlWriter {
        PostgresSqlWriter {}
    }

    fn default_schema(&self) -> &str {
        &self.inner.schema
    }

    async fn begin(&self) -> Result<PostgresTransaction> {
        PostgresTransaction::new(self.clone()).await
    }

    async fn fetch(&self, query: Query) -> Result<Vec<RowLabeled>> {
        let client = self.lease().await?;
        let result = util::fetch(&client, query).await;
        self.release(client);
        result
    }

    async fn execute(&self, query: Query) -> Result<RowsAffected> {
        let client = self.lease().await?;
        let result = util::execute(&client, query).await;
        self.release(client);
        result
    }
}
