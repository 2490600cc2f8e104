use crate::{Result, SqlWriter, Value, truncate_long};
use std::{
    fmt::{self, Display},
    future::Future,
    sync::Arc,
};

/// SQL text with its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl From<String> for Query {
    fn from(value: String) -> Self {
        Self::new(value, Vec::new())
    }
}

impl From<&str> for Query {
    fn from(value: &str) -> Self {
        Self::new(value, Vec::new())
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.sql))
    }
}

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    pub rows_affected: u64,
}

/// Shared column name list.
pub type RowNames = Arc<[String]>;
/// Row values aligned with `RowNames`.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
}

/// Something able to run statements: an open transaction.
pub trait Executor: Send {
    /// Execute the query and return the rows.
    fn fetch(&mut self, query: Query) -> impl Future<Output = Result<Vec<RowLabeled>>> + Send;

    /// Execute the query and return the total number of rows affected.
    fn execute(&mut self, query: Query) -> impl Future<Output = Result<RowsAffected>> + Send;
}

pub trait Transaction: Executor + Sized {
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// Shared connection pool, each statement run directly on it autocommits.
pub trait Pool: Send + Sync + Sized + 'static {
    type Transaction: Transaction;
    type SqlWriter: SqlWriter;

    fn sql_writer(&self) -> Self::SqlWriter;

    /// Namespace used when an entity does not declare one.
    fn default_schema(&self) -> &str {
        "public"
    }

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;

    fn fetch(&self, query: Query) -> impl Future<Output = Result<Vec<RowLabeled>>> + Send;

    fn execute(&self, query: Query) -> impl Future<Output = Result<RowsAffected>> + Send;
}

/// Executor chosen for one operation: the pool itself or the open transaction.
pub enum Exec<'a, P: Pool> {
    Pool(&'a P),
    Transaction(&'a mut P::Transaction),
}

impl<'a, P: Pool> Exec<'a, P> {
    pub fn is_transaction(&self) -> bool {
        matches!(self, Exec::Transaction(..))
    }

    pub async fn fetch(&mut self, query: Query) -> Result<Vec<RowLabeled>> {
        match self {
            Exec::Pool(pool) => pool.fetch(query).await,
            Exec::Transaction(transaction) => transaction.fetch(query).await,
        }
    }

    pub async fn execute(&mut self, query: Query) -> Result<RowsAffected> {
        match self {
            Exec::Pool(pool) => pool.execute(query).await,
            Exec::Transaction(transaction) => transaction.execute(query).await,
        }
    }
}
