//! SurrealDB implementation of [`RecordStore`].
//!
//! Filters are rendered to a `WHERE` clause whose values are always
//! bound parameters; field names are validated identifiers wrapped in
//! backticks. Record ids are the UUID strings used everywhere else and
//! are read back through `meta::id(id)`.

use campusgate_core::error::CampusResult;
use campusgate_core::store::{Collection, Filter, Predicate, Record, RecordStore};
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// A rendered `WHERE` clause and its parameters.
#[derive(Debug, Default, PartialEq)]
struct Clause {
    sql: String,
    params: Vec<(String, Value)>,
}

fn render(filter: &Filter) -> CampusResult<Clause> {
    filter.validate()?;
    let mut parts = Vec::new();
    let mut params = Vec::new();

    for (i, predicate) in filter.predicates().iter().enumerate() {
        let field = if predicate.field() == "id" {
            "meta::id(id)".to_string()
        } else {
            format!("`{}`", predicate.field())
        };
        let param = format!("p{i}");
        let (sql, value) = match predicate {
            Predicate::Eq(_, v) => (format!("{field} = ${param}"), Some(v.clone())),
            Predicate::Ne(_, v) => (format!("{field} != ${param}"), Some(v.clone())),
            Predicate::Lt(_, v) => (format!("{field} < ${param}"), Some(v.clone())),
            Predicate::Lte(_, v) => (format!("{field} <= ${param}"), Some(v.clone())),
            Predicate::Gt(_, v) => (format!("{field} > ${param}"), Some(v.clone())),
            Predicate::Gte(_, v) => (format!("{field} >= ${param}"), Some(v.clone())),
            Predicate::In(_, vs) => (
                format!("{field} INSIDE ${param}"),
                Some(Value::Array(vs.clone())),
            ),
            Predicate::NotNull(_) => (format!("({field} != NONE AND {field} != NULL)"), None),
            Predicate::IsNull(_) => (format!("({field} = NONE OR {field} = NULL)"), None),
        };
        parts.push(sql);
        if let Some(value) = value {
            params.push((param, value));
        }
    }

    let sql = if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    };
    Ok(Clause { sql, params })
}

/// Turn a raw result row into a [`Record`] keyed by its UUID string.
fn into_record(row: Value) -> Result<Record, DbError> {
    let mut map = match row {
        Value::Object(map) => map,
        other => return Err(DbError::Query(format!("unexpected row shape: {other}"))),
    };
    map.remove("id");
    match map.remove("record_id") {
        Some(Value::String(id)) => {
            map.insert("id".into(), Value::String(id));
            Ok(map)
        }
        other => Err(DbError::Query(format!("row without record id: {other:?}"))),
    }
}

/// SurrealDB-backed record store.
#[derive(Clone)]
pub struct SurrealRecordStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRecordStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Run `query` with the table and clause parameters bound, returning
    /// the rows of the first statement.
    async fn rows(
        &self,
        query: String,
        collection: Collection,
        clause: Clause,
        extra: Option<(&str, Value)>,
    ) -> Result<Vec<Value>, DbError> {
        let mut builder = self
            .db
            .query(query)
            .bind(("tb", collection.as_str().to_string()));
        for (name, value) in clause.params {
            builder = builder.bind((name, value));
        }
        if let Some((name, value)) = extra {
            builder = builder.bind((name.to_string(), value));
        }
        let result = builder.await?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<Value> = result.take(0)?;
        Ok(rows)
    }
}

impl<C: Connection> RecordStore for SurrealRecordStore<C> {
    async fn select(&self, collection: Collection, filter: &Filter) -> CampusResult<Vec<Record>> {
        let clause = render(filter)?;
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM type::table($tb){}",
            clause.sql
        );
        let rows = self.rows(query, collection, clause, None).await?;
        let records = rows
            .into_iter()
            .map(into_record)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(records)
    }

    async fn insert(&self, collection: Collection, mut record: Record) -> CampusResult<Record> {
        let id = match record.remove("id") {
            Some(Value::String(id)) => id,
            _ => Uuid::new_v4().to_string(),
        };

        let result = self
            .db
            .query("CREATE type::record($tb, $id) CONTENT $content RETURN NONE")
            .bind(("tb", collection.as_str().to_string()))
            .bind(("id", id.clone()))
            .bind(("content", Value::Object(record.clone())))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| {
            let message = e.to_string();
            if message.contains("already exists") {
                campusgate_core::CampusError::AlreadyExists {
                    entity: format!("{collection}:{id}"),
                }
            } else {
                DbError::Query(message).into()
            }
        })?;

        record.insert("id".into(), Value::String(id));
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        mut patch: Record,
    ) -> CampusResult<u64> {
        patch.remove("id");
        let clause = render(filter)?;
        let query = format!(
            "UPDATE type::table($tb) MERGE $patch{} RETURN AFTER",
            clause.sql
        );
        let rows = self
            .rows(query, collection, clause, Some(("patch", Value::Object(patch))))
            .await?;
        Ok(rows.len() as u64)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> CampusResult<u64> {
        let clause = render(filter)?;
        let query = format!("DELETE type::table($tb){} RETURN BEFORE", clause.sql);
        let rows = self.rows(query, collection, clause, None).await?;
        Ok(rows.len() as u64)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> CampusResult<u64> {
        let clause = render(filter)?;
        let query = format!(
            "SELECT count() AS total FROM type::table($tb){} GROUP ALL",
            clause.sql
        );
        let mut builder = self
            .db
            .query(query)
            .bind(("tb", collection.as_str().to_string()));
        for (name, value) in clause.params {
            builder = builder.bind((name, value));
        }
        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}
