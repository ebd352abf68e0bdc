//! In-memory store implementation

use super::traits::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory store for development and testing
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<Collection, Vec<Row>>>>,
    sequences: Arc<RwLock<HashMap<(Collection, String), i64>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        let collections = Collection::ALL
            .into_iter()
            .map(|c| (c, Vec::new()))
            .collect();

        Self {
            collections: Arc::new(RwLock::new(collections)),
            sequences: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of rows currently held in a collection
    pub async fn len(&self, collection: Collection) -> usize {
        let collections = self.collections.read().await;
        collections.get(&collection).map_or(0, Vec::len)
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn select(&self, collection: Collection, query: &Query) -> StorageResult<Vec<Row>> {
        let collections = self.collections.read().await;
        let mut rows: Vec<Row> = collections
            .get(&collection)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            // stable sort keeps insertion order for ties
            rows.sort_by(|a, b| {
                let a = a.get(&order.field).unwrap_or(&serde_json::Value::Null);
                let b = b.get(&order.field).unwrap_or(&serde_json::Value::Null);
                match order.direction {
                    Direction::Asc => compare_values(a, b),
                    Direction::Desc => compare_values(b, a),
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn insert(&self, collection: Collection, row: Row) -> StorageResult<()> {
        let mut collections = self.collections.write().await;
        collections.entry(collection).or_default().push(row);
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> StorageResult<u64> {
        let mut collections = self.collections.write().await;
        let mut changed = 0;
        for row in collections.entry(collection).or_default().iter_mut() {
            if filters.iter().all(|f| f.matches(row)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> StorageResult<u64> {
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection).or_default();
        let before = rows.len();
        rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
        Ok((before - rows.len()) as u64)
    }

    async fn next_sequence(&self, collection: Collection, field: &str) -> StorageResult<i64> {
        let mut sequences = self.sequences.write().await;
        let key = (collection, field.to_string());

        let current = match sequences.get(&key) {
            Some(current) => *current,
            None => {
                let collections = self.collections.read().await;
                collections
                    .get(&collection)
                    .into_iter()
                    .flatten()
                    .filter_map(|row| row.get(field).and_then(serde_json::Value::as_i64))
                    .max()
                    .unwrap_or(0)
            }
        };

        let next = current + 1;
        sequences.insert(key, next);
        Ok(next)
    }
}
