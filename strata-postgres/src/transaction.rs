use crate::{PostgresPool, util};
use strata_core::{Context, Executor, Query, Result, RowLabeled, RowsAffected, Transaction};
use tokio_postgres::Client;

/// Transaction holding a connection leased from the pool until it commits or rolls back.
pub struct PostgresTransaction {
    pool: PostgresPool,
    client: Option<Client>,
}

impl PostgresTransaction {
    pub(crate) async fn new(pool: PostgresPool) -> Result<Self> {
        let client = pool.lease().await?;
        client
            .batch_execute("BEGIN")
            .await
            .context("Could not begin the transaction")?;
        Ok(Self {
            pool,
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .context("The transaction is already closed")
    }

    async fn finish(mut self, statement: &str) -> Result<()> {
        let client = self
            .client
            .take()
            .context("The transaction is already closed")?;
        client
            .batch_execute(statement)
            .await
            .with_context(|| format!("While running `{}`", statement))
            .map_err(|e| {
                log::error!("{:#}", e);
                e
            })?;
        self.pool.release(client);
        Ok(())
    }
}

impl Executor for PostgresTransaction {
    async fn fetch(&mut self, query: Query) -> Result<Vec<RowLabeled>> {
        util::fetch(self.client()?, query).await
    }

    async fn execute(&mut self, query: Query) -> Result<RowsAffected> {
        util::execute(self.client()?, query).await
    }
}

impl Transaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.client.is_some() {
            log::warn!(
                "Dropping a transaction that was neither committed nor rolled back, its connection is closed"
            );
        }
    }
}
