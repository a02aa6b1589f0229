use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entity::{CatalogEntity, EntityPatch};
use crate::database::DatabaseError;
use crate::filter::{Filter, FilterData};

/// Table (or collection) name shared by every store backend
pub const CATALOG_TABLE: &str = "catalog";

/// Find and update-by-id access to the catalog collection
#[async_trait]
pub trait EntityStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn count(&self, filter: FilterData) -> Result<u64, DatabaseError>;

    async fn find_many(&self, filter: FilterData) -> Result<Vec<CatalogEntity>, DatabaseError>;

    /// Apply `patch` to one entity and return its new state, or `None` when
    /// the id no longer exists.
    async fn update_one(&self, id: &str, patch: &EntityPatch) -> Result<Option<CatalogEntity>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// In-process store; filters are evaluated against each entity's JSON form
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<String, CatalogEntity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = CatalogEntity>) -> Self {
        let map = entities.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self { entities: RwLock::new(map) }
    }

    /// Insert or replace by id
    pub async fn insert(&self, entity: CatalogEntity) {
        self.entities.write().await.insert(entity.id.clone(), entity);
    }

    pub async fn get(&self, id: &str) -> Option<CatalogEntity> {
        self.entities.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<CatalogEntity> {
        self.entities.read().await.values().cloned().collect()
    }

    async fn select(&self, filter_data: FilterData) -> Result<Vec<CatalogEntity>, DatabaseError> {
        let filter = Filter::from_data(CATALOG_TABLE, filter_data)?;
        let entities = self.entities.read().await;

        let mut rows = Vec::with_capacity(entities.len());
        for entity in entities.values() {
            let doc = serde_json::to_value(entity).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
            rows.push((doc, entity));
        }
        let matched: Vec<CatalogEntity> = filter.apply(rows).into_iter().cloned().collect();
        Ok(matched)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn count(&self, filter: FilterData) -> Result<u64, DatabaseError> {
        Ok(self.select(filter).await?.len() as u64)
    }

    async fn find_many(&self, filter: FilterData) -> Result<Vec<CatalogEntity>, DatabaseError> {
        self.select(filter).await
    }

    async fn update_one(&self, id: &str, patch: &EntityPatch) -> Result<Option<CatalogEntity>, DatabaseError> {
        let mut entities = self.entities.write().await;
        Ok(entities.get_mut(id).map(|entity| {
            patch.apply_to(entity);
            entity.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::with_entities([
            CatalogEntity::new("p1", "s1").archived(),
            CatalogEntity::new("v1", "s1").with_ancestors(["p1"]).archived(),
            CatalogEntity::new("o1", "s1").with_ancestors(["p1", "v1"]),
            CatalogEntity::new("p2", "s2").archived(),
            CatalogEntity::new("v3", "s1").with_ancestors(["p1"]).without_archive_flag(),
        ])
    }

    #[tokio::test]
    async fn default_filter_hides_archived() {
        let store = store();
        let visible = store.find_many(FilterData::with_where(json!({ "shopId": "s1" }))).await.unwrap();
        assert_eq!(visible.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["o1", "v3"]);

        let all = store
            .count(FilterData::with_where(json!({ "shopId": "s1" })).including_archived())
            .await
            .unwrap();
        assert_eq!(all, 4);
    }

    #[tokio::test]
    async fn ancestor_intersection_finds_descendants_and_unflagged_documents() {
        let store = store();
        let found = store
            .find_many(
                FilterData::with_where(json!({
                    "isDeleted": { "$ne": false },
                    "$or": [{ "_id": { "$in": ["p1"] } }, { "ancestors": { "$any": ["p1"] } }]
                }))
                .including_archived(),
            )
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "v1", "v3"]);
    }

    #[tokio::test]
    async fn update_one_patches_and_reports_missing() {
        let store = store();
        let updated = store.update_one("v1", &EntityPatch::unarchive(Utc::now())).await.unwrap().unwrap();
        assert!(updated.is_active());
        assert_eq!(store.get("v1").await, Some(updated));

        assert!(store.update_one("missing", &EntityPatch::default()).await.unwrap().is_none());
    }
}
