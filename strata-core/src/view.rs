use crate::{
    COUNT_FIELD, DataError, DataResult, EntitySpec, FieldDef, FieldType, Fields, Filter, Map,
    Pool, Projection, Query, RenderedQuery, RowLabeled, Session, SqlWriter, Value, codec,
    compile, project,
};

/// Read access to a declared relation.
pub struct View<'s, P: Pool> {
    pub(crate) session: &'s mut Session<P>,
    pub(crate) spec: EntitySpec,
}

impl<'s, P: Pool> View<'s, P> {
    pub(crate) fn new(session: &'s mut Session<P>, spec: EntitySpec) -> Self {
        Self { session, spec }
    }

    pub fn spec(&self) -> &EntitySpec {
        &self.spec
    }

    /// Number of rows matching `filters`.
    pub async fn count(&mut self, filters: &[Filter]) -> DataResult<f64> {
        let key = self.spec.key.clone();
        self.count_by("COUNT", &key, filters).await
    }

    /// Aggregate `function` over `field` (`SUM`, `MAX`, ...) on the matching rows.
    ///
    /// `field` may address an array element as `name:index`. An empty result
    /// counts as zero.
    pub async fn count_by(
        &mut self,
        function: &str,
        field: &str,
        filters: &[Filter],
    ) -> DataResult<f64> {
        self.session.reset_error();
        let result = self.fetch_count(function, field, filters).await;
        self.session
            .settle("data.count", &self.spec.name, result)
            .await
    }

    /// First row matching `filters`, honoring their ordering.
    pub async fn first(&mut self, filters: &[Filter]) -> DataResult<Option<Map>> {
        self.session.reset_error();
        let result = self.fetch_first(filters).await;
        self.session
            .settle("data.first", &self.spec.name, result)
            .await
    }

    pub async fn query(&mut self, filters: &[Filter]) -> DataResult<Vec<Map>> {
        self.session.reset_error();
        let result = self.fetch_query(filters).await;
        self.session
            .settle("data.query", &self.spec.name, result)
            .await
    }

    /// Page of the matching rows, together with the total number of matches.
    pub async fn limit(
        &mut self,
        offset: u64,
        limit: u64,
        filters: &[Filter],
    ) -> DataResult<(i64, Vec<Map>)> {
        self.session.reset_error();
        let result = self.fetch_limit(offset, limit, filters).await;
        self.session
            .settle("data.limit", &self.spec.name, result)
            .await
    }

    /// Number of rows for each distinct value of `field`, the count is under `$count`.
    pub async fn group(&mut self, field: &str, filters: &[Filter]) -> DataResult<Vec<Map>> {
        self.group_by(field, "COUNT", field, filters).await
    }

    /// Aggregate `function` over `column` for each distinct value of `field`.
    ///
    /// The aggregate is returned under `$count` for `COUNT` and under `column`
    /// otherwise. Without an explicit ordering groups come largest first.
    pub async fn group_by(
        &mut self,
        field: &str,
        function: &str,
        column: &str,
        filters: &[Filter],
    ) -> DataResult<Vec<Map>> {
        self.session.reset_error();
        let result = self.fetch_group(field, function, column, filters).await;
        self.session
            .settle("data.group", &self.spec.name, result)
            .await
    }

    /// Row whose key equals `id`.
    pub async fn entity(&mut self, id: impl Into<Value>) -> DataResult<Option<Map>> {
        self.session.reset_error();
        let result = self.fetch_entity(id.into()).await;
        self.session
            .settle("data.entity", &self.spec.name, result)
            .await
    }

    async fn fetch_count(
        &mut self,
        function: &str,
        field: &str,
        filters: &[Filter],
    ) -> DataResult<f64> {
        let function = aggregate(function)?;
        let rendered = self.render(1, filters)?;
        let mut sql = String::new();
        self.writer().write_count(
            &mut sql,
            &self.spec.schema,
            &self.spec.relation,
            function,
            field,
            &rendered.condition,
        );
        let rows = self.session.fetch(Query::new(sql, rendered.params)).await?;
        Ok(rows
            .first()
            .and_then(|row| row.values().first())
            .and_then(|v| match v {
                Value::Varchar(v) => fast_float::parse(v.trim()).ok(),
                v => v.as_f64(),
            })
            .unwrap_or_default())
    }

    pub(crate) async fn fetch_first(&mut self, filters: &[Filter]) -> DataResult<Option<Map>> {
        let rendered = self.render(1, filters)?;
        let sql = self.select(&[], &rendered, None, Some(1));
        let rows = self.session.fetch(Query::new(sql, rendered.params)).await?;
        rows.into_iter()
            .next()
            .map(|row| self.project_row(row))
            .transpose()
    }

    async fn fetch_query(&mut self, filters: &[Filter]) -> DataResult<Vec<Map>> {
        let rendered = self.render(1, filters)?;
        let sql = self.select(&[], &rendered, None, None);
        let rows = self.session.fetch(Query::new(sql, rendered.params)).await?;
        self.project_rows(rows)
    }

    async fn fetch_limit(
        &mut self,
        offset: u64,
        limit: u64,
        filters: &[Filter],
    ) -> DataResult<(i64, Vec<Map>)> {
        let rendered = self.render(1, filters)?;
        let mut sql = String::new();
        self.writer().write_count(
            &mut sql,
            &self.spec.schema,
            &self.spec.relation,
            "COUNT",
            &self.spec.key,
            &rendered.condition,
        );
        let rows = self
            .session
            .fetch(Query::new(sql, rendered.params.clone()))
            .await?;
        let total = rows
            .first()
            .and_then(|row| row.values().first())
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let sql = self.select(&[], &rendered, Some(offset), Some(limit));
        let rows = self.session.fetch(Query::new(sql, rendered.params)).await?;
        Ok((total, self.project_rows(rows)?))
    }

    async fn fetch_group(
        &mut self,
        field: &str,
        function: &str,
        column: &str,
        filters: &[Filter],
    ) -> DataResult<Vec<Map>> {
        let function = aggregate(function)?;
        let (alias, kind) = if function.eq_ignore_ascii_case("COUNT") {
            (COUNT_FIELD, FieldType::Int)
        } else {
            (column, FieldType::Float)
        };
        let rendered = self.render(1, filters)?;
        let mut sql = String::new();
        self.writer().write_group(
            &mut sql,
            &self.spec.schema,
            &self.spec.relation,
            field,
            function,
            column,
            alias,
            &rendered.condition,
            &rendered.order,
        );
        let rows = self.session.fetch(Query::new(sql, rendered.params)).await?;
        let mut fields = Fields::new();
        fields.insert(
            field.to_string(),
            self.spec
                .fields
                .get(field)
                .cloned()
                .unwrap_or_else(|| FieldDef::new(FieldType::Any))
                .nullable(),
        );
        fields.insert(alias.to_string(), FieldDef::new(kind).nullable());
        rows.into_iter()
            .map(|RowLabeled { labels, values }| {
                let decoded = codec::decode(&labels, values.into_vec());
                project(&fields, &decoded, Projection::Partial)
            })
            .collect()
    }

    async fn fetch_entity(&mut self, id: Value) -> DataResult<Option<Map>> {
        let writer = self.writer();
        let mut condition = String::new();
        writer.write_assignment(&mut condition, &self.spec.key, 1);
        let mut sql = String::new();
        writer.write_select(
            &mut sql,
            &self.spec.schema,
            &self.spec.relation,
            &[],
            &condition,
            "",
        );
        writer.write_limit(&mut sql, None, Some(1));
        let rows = self.session.fetch(Query::new(sql, vec![id])).await?;
        rows.into_iter()
            .next()
            .map(|row| self.project_row(row))
            .transpose()
    }

    pub(crate) fn writer(&self) -> P::SqlWriter {
        self.session.database().pool().sql_writer()
    }

    /// Compile `filters` with placeholders numbered from `offset`.
    pub(crate) fn render(&self, offset: usize, filters: &[Filter]) -> DataResult<RenderedQuery> {
        let database = self.session.database();
        compile(
            database.pool().sql_writer().as_dyn(),
            database.parser(),
            offset,
            filters,
        )
    }

    /// SELECT for `rendered`, `columns` empty selects every column.
    pub(crate) fn select(
        &self,
        columns: &[&str],
        rendered: &RenderedQuery,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> String {
        let mut sql = String::new();
        let writer = self.writer();
        writer.write_select(
            &mut sql,
            &self.spec.schema,
            &self.spec.relation,
            columns,
            &rendered.condition,
            &rendered.order,
        );
        writer.write_limit(&mut sql, offset, limit);
        sql
    }

    pub(crate) fn project_row(&self, row: RowLabeled) -> DataResult<Map> {
        let RowLabeled { labels, values } = row;
        let decoded = codec::decode(&labels, values.into_vec());
        project(&self.spec.fields, &decoded, Projection::Strict)
    }

    pub(crate) fn project_rows(&self, rows: Vec<RowLabeled>) -> DataResult<Vec<Map>> {
        rows.into_iter().map(|row| self.project_row(row)).collect()
    }
}

/// Accept only plain function names, they are written verbatim.
pub(crate) fn aggregate(function: &str) -> DataResult<&str> {
    if !function.is_empty()
        && function
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'_')
    {
        Ok(function)
    } else {
        Err(DataError::FilterParse(format!(
            "invalid aggregate function `{}`",
            function
        )))
    }
}
