use crate::ValueHolder;
use futures::TryStreamExt;
use std::pin::pin;
use strata_core::{
    Context, Error, Query, Result, Row, RowLabeled, RowNames, RowsAffected, truncate_long,
};
use tokio_postgres::Client;

pub(crate) fn row_to_strata_row(row: &tokio_postgres::Row) -> Result<Row> {
    (0..row.len())
        .map(|i| match row.try_get::<_, ValueHolder>(i) {
            Ok(v) => Ok(v.0),
            Err(e) => {
                let col = &row.columns()[i];
                Err(Error::new(e).context(format!(
                    "Could not deserialize column {} `{}`: {}",
                    i,
                    col.name(),
                    col.type_()
                )))
            }
        })
        .collect()
}

/// Statements are prepared one at a time, a trailing semicolon is not needed.
fn statement(sql: &str) -> &str {
    sql.trim_end().trim_end_matches(';')
}

pub(crate) async fn fetch(client: &Client, query: Query) -> Result<Vec<RowLabeled>> {
    let Query { sql, params } = query;
    let result = async {
        let stream = client
            .query_raw(statement(&sql), params.into_iter().map(ValueHolder))
            .await?;
        let mut stream = pin!(stream);
        let mut labels: Option<RowNames> = None;
        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            let labels = labels.get_or_insert_with(|| {
                row.columns().iter().map(|c| c.name().to_string()).collect()
            });
            rows.push(RowLabeled::new(labels.clone(), row_to_strata_row(&row)?));
        }
        Ok::<_, Error>(rows)
    }
    .await;
    result
        .with_context(|| format!("While fetching the query:\n{}", truncate_long!(sql)))
        .map_err(|e| {
            log::error!("{:#}", e);
            e
        })
}

pub(crate) async fn execute(client: &Client, query: Query) -> Result<RowsAffected> {
    let Query { sql, params } = query;
    client
        .execute_raw(statement(&sql), params.into_iter().map(ValueHolder))
        .await
        .map(|rows_affected| RowsAffected { rows_affected })
        .with_context(|| format!("While running the query:\n{}", truncate_long!(sql)))
        .map_err(|e| {
            log::error!("{:#}", e);
            e
        })
}
