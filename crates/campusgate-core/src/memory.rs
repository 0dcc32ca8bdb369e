//! In-memory [`RecordStore`].
//!
//! Backs the test suites and offline tooling. Failure switches let tests
//! simulate an unreachable store or a row whose writes are rejected.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CampusError, CampusResult};
use crate::store::{Collection, Filter, Record, RecordStore};

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<Collection, Vec<Record>>,
    unavailable: bool,
    write_failures: Vec<(Collection, Filter)>,
}

/// Shared in-memory store. Clones see the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the backend were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().await.unavailable = unavailable;
    }

    /// Reject updates and deletes touching rows matched by `filter`.
    pub async fn fail_writes_matching(&self, collection: Collection, filter: Filter) {
        self.inner
            .write()
            .await
            .write_failures
            .push((collection, filter));
    }

    /// Snapshot of every row in a collection.
    pub async fn rows(&self, collection: Collection) -> Vec<Record> {
        self.inner
            .read()
            .await
            .rows
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl Inner {
    fn check_available(&self) -> CampusResult<()> {
        if self.unavailable {
            Err(CampusError::Database("record store unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, collection: Collection, filter: &Filter) -> CampusResult<()> {
        let rows = self.rows.get(&collection).map(Vec::as_slice).unwrap_or(&[]);
        let rejected = self.write_failures.iter().any(|(c, deny)| {
            *c == collection && rows.iter().any(|r| filter.matches(r) && deny.matches(r))
        });
        if rejected {
            Err(CampusError::Database(format!(
                "write rejected on {collection}"
            )))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for MemoryRecordStore {
    async fn select(&self, collection: Collection, filter: &Filter) -> CampusResult<Vec<Record>> {
        filter.validate()?;
        let inner = self.inner.read().await;
        inner.check_available()?;
        Ok(inner
            .rows
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn insert(&self, collection: Collection, mut record: Record) -> CampusResult<Record> {
        let mut inner = self.inner.write().await;
        inner.check_available()?;

        let id = match record.get("id") {
            Some(Value::String(id)) => id.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        record.insert("id".into(), Value::String(id.clone()));

        let rows = inner.rows.entry(collection).or_default();
        if rows.iter().any(|r| r.get("id") == record.get("id")) {
            return Err(CampusError::AlreadyExists {
                entity: format!("{collection}:{id}"),
            });
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> CampusResult<u64> {
        filter.validate()?;
        let mut inner = self.inner.write().await;
        inner.check_available()?;
        inner.check_writable(collection, filter)?;

        let mut changed = 0;
        for row in inner.rows.entry(collection).or_default().iter_mut() {
            if filter.matches(row) {
                for (k, v) in &patch {
                    if k != "id" {
                        row.insert(k.clone(), v.clone());
                    }
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> CampusResult<u64> {
        filter.validate()?;
        let mut inner = self.inner.write().await;
        inner.check_available()?;
        inner.check_writable(collection, filter)?;

        let rows = inner.rows.entry(collection).or_default();
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok((before - rows.len()) as u64)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> CampusResult<u64> {
        Ok(self.select(collection, filter).await?.len() as u64)
    }
}
