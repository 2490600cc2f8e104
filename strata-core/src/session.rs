use crate::{
    Context, DataError, DataResult, Database, EntityConfig, EntityKind, EntitySpec, Exec, Map,
    Model, Pool, Query, RowLabeled, RowsAffected, SqlWriter, Table, Transaction, Trigger, View,
    database::Lease,
};
use std::{
    fmt::{self, Display},
    mem,
};

/// Identifies the transaction opened by [`Session::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

enum State<T> {
    /// Every statement runs on the pool and autocommits, events fire right away.
    Automatic,
    /// Statements share `transaction`, events wait in `triggers` for the commit.
    Manual {
        id: TransactionId,
        transaction: T,
        triggers: Vec<Trigger>,
    },
}

/// One leased handle on a [`Database`].
///
/// A session owns its transaction and the events waiting for it. Every failed
/// operation rolls the open transaction back, and the error is both returned
/// and kept until [`Session::erred`] takes it.
pub struct Session<P: Pool> {
    lease: Lease<P>,
    state: State<P::Transaction>,
    last_error: Option<DataError>,
    transactions: u64,
}

impl<P: Pool> Session<P> {
    pub(crate) fn new(lease: Lease<P>) -> Self {
        Self {
            lease,
            state: State::Automatic,
            last_error: None,
            transactions: 0,
        }
    }

    pub fn database(&self) -> &Database<P> {
        &self.lease.database
    }

    /// True while a manual transaction is open.
    pub fn is_manual(&self) -> bool {
        matches!(self.state, State::Manual { .. })
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match &self.state {
            State::Manual { id, .. } => Some(*id),
            State::Automatic => None,
        }
    }

    /// Events recorded by the open transaction, waiting for its commit.
    pub fn pending_triggers(&self) -> &[Trigger] {
        match &self.state {
            State::Manual { triggers, .. } => triggers,
            State::Automatic => &[],
        }
    }

    /// Enter manual mode, opening a transaction unless one is already open.
    pub async fn begin(&mut self) -> DataResult<TransactionId> {
        if let State::Manual { id, .. } = self.state {
            return Ok(id);
        }
        let begun = self
            .database()
            .pool()
            .begin()
            .await
            .context("Could not begin a transaction");
        let transaction = match begun {
            Ok(v) => v,
            Err(e) => return self.settle("data.begin", "transaction", Err(e.into())).await,
        };
        self.transactions += 1;
        let id = TransactionId(self.transactions);
        log::trace!("Beginning {}", id);
        self.state = State::Manual {
            id,
            transaction,
            triggers: Vec::new(),
        };
        Ok(id)
    }

    /// Executor for the next statement: the open transaction in manual mode, the pool otherwise.
    pub fn begin_exec(&mut self) -> Exec<'_, P> {
        match &mut self.state {
            State::Manual { transaction, .. } => Exec::Transaction(transaction),
            State::Automatic => Exec::Pool(self.lease.database.pool()),
        }
    }

    /// Commit the open transaction, then fire its events in the order they were recorded.
    pub async fn submit(&mut self) -> DataResult<()> {
        let State::Manual {
            id,
            transaction,
            triggers,
        } = mem::replace(&mut self.state, State::Automatic)
        else {
            return Err(DataError::NoActiveTransaction);
        };
        if let Err(e) = transaction
            .commit()
            .await
            .with_context(|| format!("Could not commit {}", id))
        {
            log::error!("{:#}", e);
            return Err(e.into());
        }
        log::trace!("Committed {}, firing {} triggers", id, triggers.len());
        let events = self.database().events();
        for trigger in triggers {
            events.trigger(&trigger.name, trigger.payload);
        }
        Ok(())
    }

    /// Roll back the open transaction, its events are discarded.
    pub async fn cancel(&mut self) -> DataResult<()> {
        let State::Manual {
            id,
            transaction,
            triggers,
        } = mem::replace(&mut self.state, State::Automatic)
        else {
            return Err(DataError::NoActiveTransaction);
        };
        log::trace!("Rolling back {}, discarding {} triggers", id, triggers.len());
        transaction
            .rollback()
            .await
            .with_context(|| format!("Could not roll back {}", id))
            .map_err(|e| {
                log::error!("{:#}", e);
                e.into()
            })
    }

    /// Run `work` in a transaction: committed when it succeeds, rolled back otherwise.
    pub async fn batch<T>(
        &mut self,
        work: impl AsyncFnOnce(&mut Self) -> DataResult<T>,
    ) -> DataResult<T> {
        self.begin().await?;
        match work(self).await {
            Ok(value) => {
                self.submit().await?;
                Ok(value)
            }
            Err(e) => {
                if self.is_manual() {
                    let _ = self.cancel().await;
                }
                Err(e)
            }
        }
    }

    /// Release the session, rolling back the transaction left open.
    pub async fn close(mut self) -> DataResult<()> {
        if !self.is_manual() {
            return Ok(());
        }
        let discarded = self.pending_triggers().len();
        if discarded > 0 {
            log::debug!(
                "Closing the session with an open transaction discards {} triggers",
                discarded
            );
        }
        self.cancel().await
    }

    /// Take the error recorded by the last failed operation.
    pub fn erred(&mut self) -> Option<DataError> {
        self.last_error.take()
    }

    pub fn last_error(&self) -> Option<&DataError> {
        self.last_error.as_ref()
    }

    pub fn table(&mut self, name: &str) -> DataResult<Table<'_, P>> {
        let spec = self.resolve(EntityKind::Table, name)?;
        Ok(Table::new(self, spec))
    }

    pub fn view(&mut self, name: &str) -> DataResult<View<'_, P>> {
        let spec = self.resolve(EntityKind::View, name)?;
        Ok(View::new(self, spec))
    }

    pub fn model(&mut self, name: &str) -> DataResult<Model<'_, P>> {
        let spec = self.resolve(EntityKind::Model, name)?;
        Ok(Model::new(self, spec))
    }

    /// Next value of the `serial_<key>` sequence, created on first use.
    pub async fn serial(&mut self, key: &str, start: i64, step: i64) -> DataResult<i64> {
        self.reset_error();
        let result = self.next_serial(key, start, step).await;
        self.settle("data.serial", key, result).await
    }

    /// Drop the `serial_<key>` sequence.
    pub async fn break_serial(&mut self, key: &str) -> DataResult<()> {
        self.reset_error();
        let mut sql = String::new();
        self.database()
            .pool()
            .sql_writer()
            .write_drop_sequence(&mut sql, &serial_name(key));
        let result = self.execute(sql.into()).await.map(|_| ());
        self.settle("data.break", key, result).await
    }

    async fn next_serial(&mut self, key: &str, start: i64, step: i64) -> DataResult<i64> {
        let name = serial_name(key);
        let step = if step == 0 { 1 } else { step };
        let writer = self.database().pool().sql_writer();
        let mut sql = String::new();
        writer.write_create_sequence(&mut sql, &name, start, step);
        self.execute(sql.into()).await?;
        let mut sql = String::new();
        writer.write_next_value(&mut sql, &name);
        let rows = self.fetch(sql.into()).await?;
        rows.first()
            .and_then(|row| row.values().first())
            .and_then(|v| v.as_i64())
            .ok_or_else(|| anyhow::anyhow!("Sequence `{}` did not return a value", name).into())
    }

    fn resolve(&mut self, kind: EntityKind, name: &str) -> DataResult<EntitySpec> {
        self.reset_error();
        let config = self.lookup(kind, name);
        match config {
            Some(config) => Ok(EntitySpec::resolve(
                name,
                self.database().schema(),
                &config,
            )),
            None => {
                let error = DataError::SchemaNotFound(format!("{} {}", kind, name));
                log::error!("{}", error);
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    fn lookup(&self, kind: EntityKind, name: &str) -> Option<EntityConfig> {
        let registry = self.database().registry();
        [
            format!("{}.{}", self.database().name(), name),
            format!("*.{}", name),
            name.to_string(),
        ]
        .iter()
        .find_map(|key| registry.entity(kind, key))
    }

    pub(crate) fn reset_error(&mut self) {
        self.last_error = None;
    }

    /// Record a mutation event: queued while a transaction is open, fired otherwise.
    pub(crate) fn trigger(&mut self, name: &str, payload: Option<Map>) {
        match &mut self.state {
            State::Manual { triggers, .. } => triggers.push(Trigger::new(name, payload)),
            State::Automatic => self.lease.database.events().trigger(name, payload),
        }
    }

    pub(crate) async fn fetch(&mut self, query: Query) -> DataResult<Vec<RowLabeled>> {
        Ok(self.begin_exec().fetch(query).await?)
    }

    pub(crate) async fn execute(&mut self, query: Query) -> DataResult<RowsAffected> {
        Ok(self.begin_exec().execute(query).await?)
    }

    /// Pass `result` through, on failure roll back, record and log the error.
    pub(crate) async fn settle<T>(
        &mut self,
        key: &str,
        entity: &str,
        result: DataResult<T>,
    ) -> DataResult<T> {
        let error = match result {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if self.is_manual() {
            let _ = self.cancel().await;
        }
        log::warn!("{} `{}` failed: {}", key, entity, error);
        self.last_error = Some(error.clone());
        Err(error)
    }
}

impl<P: Pool> Drop for Session<P> {
    fn drop(&mut self) {
        if let State::Manual { id, triggers, .. } = &self.state {
            log::warn!(
                "Session dropped while {} is open, it will be rolled back and {} triggers are discarded",
                id,
                triggers.len()
            );
        }
    }
}

fn serial_name(key: &str) -> String {
    format!("serial_{}", key.replace('"', ""))
}
