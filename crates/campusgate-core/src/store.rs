//! Record store abstraction.
//!
//! Every collection is a bag of JSON objects keyed by a string `id`.
//! Queries are conjunctions of simple predicates; there are no joins, so
//! multi-collection logic issues sequential queries and correlates rows
//! by id in memory.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CampusError, CampusResult};

/// A stored row.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Institutions,
    InstitutionMemberships,
    Teachers,
    Students,
    UserProfiles,
    InstitutionAdminCredentials,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Institutions,
        Collection::InstitutionMemberships,
        Collection::Teachers,
        Collection::Students,
        Collection::UserProfiles,
        Collection::InstitutionAdminCredentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Institutions => "institutions",
            Collection::InstitutionMemberships => "institution_memberships",
            Collection::Teachers => "teachers",
            Collection::Students => "students",
            Collection::UserProfiles => "user_profiles",
            Collection::InstitutionAdminCredentials => "institution_admin_credentials",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    NotNull(String),
    IsNull(String),
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Eq(f, _)
            | Predicate::Ne(f, _)
            | Predicate::Lt(f, _)
            | Predicate::Lte(f, _)
            | Predicate::Gt(f, _)
            | Predicate::Gte(f, _)
            | Predicate::In(f, _)
            | Predicate::NotNull(f)
            | Predicate::IsNull(f) => f,
        }
    }

    /// Evaluate against a row. Missing fields read as `null`; range
    /// predicates only hold between two numbers or two strings.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Predicate::Eq(_, v) => actual == v,
            Predicate::Ne(_, v) => actual != v,
            Predicate::Lt(_, v) => compare(actual, v) == Some(Ordering::Less),
            Predicate::Lte(_, v) => matches!(
                compare(actual, v),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::Gt(_, v) => compare(actual, v) == Some(Ordering::Greater),
            Predicate::Gte(_, v) => matches!(
                compare(actual, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::In(_, vs) => vs.contains(actual),
            Predicate::NotNull(_) => !actual.is_null(),
            Predicate::IsNull(_) => actual.is_null(),
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Conjunction of predicates. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl ToString) -> Self {
        Self::new().eq("id", id.to_string())
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(Predicate::Eq(field.into(), value.into()))
    }

    pub fn ne(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(Predicate::Ne(field.into(), value.into()))
    }

    pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(Predicate::Lt(field.into(), value.into()))
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(Predicate::Lte(field.into(), value.into()))
    }

    pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(Predicate::Gt(field.into(), value.into()))
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.with(Predicate::Gte(field.into(), value.into()))
    }

    pub fn is_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.with(Predicate::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn not_null(self, field: &str) -> Self {
        self.with(Predicate::NotNull(field.into()))
    }

    pub fn is_null(self, field: &str) -> Self {
        self.with(Predicate::IsNull(field.into()))
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }

    /// Reject field names that are not plain identifiers.
    pub fn validate(&self) -> CampusResult<()> {
        self.predicates
            .iter()
            .try_for_each(|p| validate_field(p.field()))
    }
}

/// Field names are `[a-z_][a-z0-9_]*`.
pub fn validate_field(name: &str) -> CampusResult<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CampusError::validation(format!("invalid field name: {name:?}")))
    }
}

/// Generic query-by-filter access to the named collections.
pub trait RecordStore: Send + Sync {
    fn select(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> impl Future<Output = CampusResult<Vec<Record>>> + Send;

    /// Store a row. A missing `id` is assigned a fresh UUID; the stored
    /// row is returned.
    fn insert(
        &self,
        collection: Collection,
        record: Record,
    ) -> impl Future<Output = CampusResult<Record>> + Send;

    /// Merge `patch` into every matching row; returns the number of rows
    /// matched.
    fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> impl Future<Output = CampusResult<u64>> + Send;

    fn delete(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> impl Future<Output = CampusResult<u64>> + Send;

    fn count(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> impl Future<Output = CampusResult<u64>> + Send;
}

/// Serialize a model into a row.
pub fn to_record<T: Serialize>(value: &T) -> CampusResult<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(CampusError::Internal(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(CampusError::Internal(format!("encode record: {e}"))),
    }
}

/// Decode a row into a model.
pub fn from_record<T: DeserializeOwned>(collection: Collection, record: Record) -> CampusResult<T> {
    serde_json::from_value(Value::Object(record))
        .map_err(|e| CampusError::Database(format!("malformed {collection} row: {e}")))
}
