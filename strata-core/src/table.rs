use crate::{
    CHANGE_TRIGGER, CREATE_TRIGGER, DataError, DataResult, EntitySpec, Filter, INC, Map, Pool,
    Projection, Query, REMOVE_TRIGGER, Session, SqlWriter, Value, View, codec, project,
};
use std::ops::{Deref, DerefMut};
use time::OffsetDateTime;

/// Field stamped with the modification time by [`Table::change`] when declared.
pub const CHANGED_FIELD: &str = "changed";

/// Read and write access to a declared table. Every read of [`View`] is available.
pub struct Table<'s, P: Pool> {
    view: View<'s, P>,
}

impl<'s, P: Pool> Deref for Table<'s, P> {
    type Target = View<'s, P>;
    fn deref(&self) -> &Self::Target {
        &self.view
    }
}

impl<'s, P: Pool> DerefMut for Table<'s, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.view
    }
}

impl<'s, P: Pool> Table<'s, P> {
    pub(crate) fn new(session: &'s mut Session<P>, spec: EntitySpec) -> Self {
        Self {
            view: View::new(session, spec),
        }
    }

    /// Insert `data`, returning the stored record with its generated key.
    pub async fn create(&mut self, data: &Map) -> DataResult<Map> {
        self.view.session.reset_error();
        let result = self.insert(data).await;
        self.view
            .session
            .settle("data.create", &self.view.spec.name, result)
            .await
    }

    /// Apply `data` to the record `item`, identified by its key.
    ///
    /// Returns `item` merged with the applied values. A declared `changed`
    /// field is stamped with the current time unless `data` sets it.
    pub async fn change(&mut self, item: &Map, data: &Map) -> DataResult<Map> {
        self.view.session.reset_error();
        let result = self.modify(item, data).await;
        self.view
            .session
            .settle("data.change", &self.view.spec.name, result)
            .await
    }

    /// Physically delete the first record matching `filters` and return it.
    pub async fn remove(&mut self, filters: &[Filter]) -> DataResult<Option<Map>> {
        self.view.session.reset_error();
        let result = self.delete_first(filters).await;
        self.view
            .session
            .settle("data.remove", &self.view.spec.name, result)
            .await
    }

    /// Delete every record matching `filters`, returning how many were deleted.
    pub async fn delete(&mut self, filters: &[Filter]) -> DataResult<u64> {
        self.view.session.reset_error();
        let result = self.delete_all(filters).await;
        self.view
            .session
            .settle("data.delete", &self.view.spec.name, result)
            .await
    }

    /// Apply `data` to every record matching `filters`.
    ///
    /// `data` may hold dotted keys (`info.city`) to set one key of a JSON
    /// field and an `$inc` map of increments. Returns the affected count.
    pub async fn update(&mut self, data: &Map, filters: &[Filter]) -> DataResult<u64> {
        self.view.session.reset_error();
        let result = self.update_all(data, filters).await;
        self.view
            .session
            .settle("data.update", &self.view.spec.name, result)
            .await
    }

    async fn insert(&mut self, data: &Map) -> DataResult<Map> {
        let spec = &self.view.spec;
        let mut value = project(&spec.fields, data, Projection::Partial)?;
        let encoded = codec::encode(&spec.fields, &value);
        let (columns, params): (Vec<&str>, Vec<Value>) = encoded
            .iter()
            .filter(|(k, v)| !k.contains('.') && !(**k == spec.key && v.is_null()))
            .map(|(k, v)| (k.as_str(), v.clone()))
            .unzip();
        let mut sql = String::new();
        self.view
            .writer()
            .write_insert(&mut sql, &spec.schema, &spec.relation, &columns, &spec.key);
        let rows = self.view.session.fetch(Query::new(sql, params)).await?;
        let id = rows
            .into_iter()
            .next()
            .and_then(|row| row.values.into_vec().into_iter().next())
            .ok_or_else(|| anyhow::anyhow!("The insert did not return the key `{}`", spec.key))?;
        value.insert(spec.key.clone(), id.clone());
        let payload = self.payload(&id, &value);
        self.view.session.trigger(CREATE_TRIGGER, Some(payload));
        Ok(value)
    }

    async fn modify(&mut self, item: &Map, data: &Map) -> DataResult<Map> {
        let spec = &self.view.spec;
        let Some(id) = item.get(&spec.key).filter(|v| !v.is_null()).cloned() else {
            return Err(DataError::EmptyInput(spec.name.clone()));
        };
        let mut data = data.clone();
        if spec.fields.contains_key(CHANGED_FIELD)
            && data.get(CHANGED_FIELD).is_none_or(Value::is_null)
        {
            data.insert(
                CHANGED_FIELD.into(),
                Value::Timestamp(OffsetDateTime::now_utc()),
            );
        }
        let value = project(&spec.fields, &data, Projection::Partial)?;
        let (assignments, mut params) = self.assignments(&value, data.get(INC))?;
        let writer = self.view.writer();
        let mut condition = String::new();
        writer.write_assignment(&mut condition, &spec.key, params.len() + 1);
        params.push(id.clone());
        let mut sql = String::new();
        writer.write_update(
            &mut sql,
            &spec.schema,
            &spec.relation,
            &assignments,
            &condition,
        );
        self.view.session.execute(Query::new(sql, params)).await?;
        let mut after = item.clone();
        after.extend(value.into_iter().filter(|(k, _)| !k.contains('.')));
        let mut payload = self.payload(&id, &after);
        payload.insert("before".into(), Value::Map(item.clone()));
        payload.insert("after".into(), Value::Map(after.clone()));
        self.view.session.trigger(CHANGE_TRIGGER, Some(payload));
        Ok(after)
    }

    async fn delete_first(&mut self, filters: &[Filter]) -> DataResult<Option<Map>> {
        let spec = &self.view.spec;
        let narrowed;
        let filters = match filters {
            [] => {
                return Err(DataError::EmptyInput(spec.name.clone()));
            }
            [Filter::Where(item)] if item.get(&spec.key).is_some_and(|v| !v.is_null()) => {
                let mut by_key = Map::new();
                by_key.insert(spec.key.clone(), item[&spec.key].clone());
                narrowed = [Filter::Where(by_key)];
                &narrowed[..]
            }
            filters => filters,
        };
        let Some(item) = self.view.fetch_first(filters).await? else {
            return Ok(None);
        };
        let spec = &self.view.spec;
        let id = item.get(&spec.key).cloned().unwrap_or_default();
        let writer = self.view.writer();
        let mut condition = String::new();
        writer.write_assignment(&mut condition, &spec.key, 1);
        let mut sql = String::new();
        writer.write_delete(&mut sql, &spec.schema, &spec.relation, &condition);
        self.view
            .session
            .execute(Query::new(sql, vec![id.clone()]))
            .await?;
        let payload = self.payload(&id, &item);
        self.view.session.trigger(REMOVE_TRIGGER, Some(payload));
        Ok(Some(item))
    }

    async fn delete_all(&mut self, filters: &[Filter]) -> DataResult<u64> {
        let rendered = self.view.render(1, filters)?;
        let spec = &self.view.spec;
        let mut sql = String::new();
        self.view.writer().write_delete(
            &mut sql,
            &spec.schema,
            &spec.relation,
            &rendered.condition,
        );
        let affected = self
            .view
            .session
            .execute(Query::new(sql, rendered.params))
            .await?;
        Ok(affected.rows_affected)
    }

    async fn update_all(&mut self, data: &Map, filters: &[Filter]) -> DataResult<u64> {
        let spec = &self.view.spec;
        let value = project(&spec.fields, data, Projection::Partial)?;
        let (assignments, mut params) = self.assignments(&value, data.get(INC))?;
        let rendered = self.view.render(params.len() + 1, filters)?;
        params.extend(rendered.params);
        let mut sql = String::new();
        self.view.writer().write_update(
            &mut sql,
            &spec.schema,
            &spec.relation,
            &assignments,
            &rendered.condition,
        );
        let affected = self.view.session.execute(Query::new(sql, params)).await?;
        Ok(affected.rows_affected)
    }

    /// SET clause for `value` and the `increments`, with its parameters numbered from 1.
    fn assignments(
        &self,
        value: &Map,
        increments: Option<&Value>,
    ) -> DataResult<(String, Vec<Value>)> {
        let spec = &self.view.spec;
        let writer = self.view.writer();
        let mut sql = String::new();
        let mut params = Vec::new();
        for (name, value) in codec::encode(&spec.fields, value) {
            if name == spec.key {
                continue;
            }
            if !sql.is_empty() {
                sql.push(',');
            }
            params.push(value);
            match name.split_once('.') {
                Some((field, key)) => writer.write_json_merge(&mut sql, field, key, params.len()),
                None => writer.write_assignment(&mut sql, &name, params.len()),
            }
        }
        match increments {
            None | Some(Value::Null) => {}
            Some(Value::Map(increments)) => {
                for (name, step) in increments {
                    if !step.is_numeric() {
                        return Err(DataError::ProjectionValidation {
                            fields: vec![name.clone()],
                            message: format!(
                                "`{}` increment must be numeric, got {}",
                                name,
                                step.type_name()
                            ),
                        });
                    }
                    if !sql.is_empty() {
                        sql.push(',');
                    }
                    params.push(step.clone());
                    match name.split_once('.') {
                        Some((field, key)) => {
                            writer.write_json_increment(&mut sql, field, key, params.len())
                        }
                        None => writer.write_increment(&mut sql, name, params.len()),
                    }
                }
            }
            Some(other) => {
                return Err(DataError::ProjectionValidation {
                    fields: vec![INC.into()],
                    message: format!("`{}` must be a map, got {}", INC, other.type_name()),
                });
            }
        }
        if sql.is_empty() {
            return Err(DataError::EmptyInput(spec.name.clone()));
        }
        Ok((sql, params))
    }

    /// `{base, table, entity, <key>}`
    fn payload(&self, id: &Value, entity: &Map) -> Map {
        let spec = &self.view.spec;
        let mut payload = Map::new();
        payload.insert(
            "base".into(),
            Value::Varchar(self.view.session.database().name().into()),
        );
        payload.insert("table".into(), Value::Varchar(spec.name.clone()));
        payload.insert("entity".into(), Value::Map(entity.clone()));
        payload.insert(spec.key.clone(), id.clone());
        payload
    }
}
