use crate::{COUNT_FIELD, DataResult, EntitySpec, Filter, Map, Pool, Query, Session, View};

/// Read access to a model: a relation read through its declared fields only.
pub struct Model<'s, P: Pool> {
    view: View<'s, P>,
}

impl<'s, P: Pool> Model<'s, P> {
    pub(crate) fn new(session: &'s mut Session<P>, spec: EntitySpec) -> Self {
        Self {
            view: View::new(session, spec),
        }
    }

    pub fn spec(&self) -> &EntitySpec {
        &self.view.spec
    }

    pub async fn first(&mut self, filters: &[Filter]) -> DataResult<Option<Map>> {
        self.view.session.reset_error();
        let result = self
            .fetch(filters, Some(1))
            .await
            .map(|v| v.into_iter().next());
        self.view
            .session
            .settle("model.first", &self.view.spec.name, result)
            .await
    }

    pub async fn query(&mut self, filters: &[Filter]) -> DataResult<Vec<Map>> {
        self.view.session.reset_error();
        let result = self.fetch(filters, None).await;
        self.view
            .session
            .settle("model.query", &self.view.spec.name, result)
            .await
    }

    /// Feed every matching record to `next`, see [`Model::limit_range`].
    pub async fn range(
        &mut self,
        next: impl FnMut(Map) -> DataResult<()>,
        filters: &[Filter],
    ) -> DataResult<()> {
        self.limit_range(0, next, filters).await
    }

    /// Feed at most `limit` matching records to `next`, zero meaning no limit.
    ///
    /// Stops at the first error returned by `next` and hands it back unchanged.
    pub async fn limit_range(
        &mut self,
        limit: u64,
        mut next: impl FnMut(Map) -> DataResult<()>,
        filters: &[Filter],
    ) -> DataResult<()> {
        self.view.session.reset_error();
        let result = self.fetch(filters, (limit > 0).then_some(limit)).await;
        let items = self
            .view
            .session
            .settle("model.range", &self.view.spec.name, result)
            .await?;
        items.into_iter().try_for_each(&mut next)
    }

    async fn fetch(&mut self, filters: &[Filter], limit: Option<u64>) -> DataResult<Vec<Map>> {
        let rendered = self.view.render(1, filters)?;
        let columns = self
            .view
            .spec
            .fields
            .keys()
            .filter(|k| *k != COUNT_FIELD)
            .map(String::as_str)
            .collect::<Vec<_>>();
        let sql = self.view.select(&columns, &rendered, None, limit);
        let rows = self
            .view
            .session
            .fetch(Query::new(sql, rendered.params))
            .await?;
        self.view.project_rows(rows)
    }
}
