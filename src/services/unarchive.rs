use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::auth::{product_resource, Denial, PermissionChecker, ARCHIVE_ACTION};
use crate::catalog::entity::fields;
use crate::catalog::{CatalogEntity, EntityPatch, EntityStore};
use crate::config::AppConfig;
use crate::database::DatabaseError;
use crate::filter::FilterData;

#[derive(Debug, Error)]
pub enum UnarchiveError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not authorized to archive: {}", .denied.join(", "))]
    Authorization { denied: Vec<String> },

    /// Deliberately does not say which ids are missing
    #[error("One or more products do not exist")]
    NotFound,

    #[error("Unarchive partially applied: {} updates failed, {} succeeded", .failed.len(), .transitioned.len())]
    PartialFailure {
        failed: Vec<String>,
        transitioned: Vec<String>,
    },

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Internal ids, already decoded from whatever the transport uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnarchiveInput {
    pub product_ids: Vec<String>,
    pub shop_id: String,
}

impl UnarchiveInput {
    pub fn new<I, S>(product_ids: I, shop_id: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            product_ids: product_ids.into_iter().map(Into::into).collect(),
            shop_id: shop_id.into(),
        }
    }

    /// Shape check over an untyped request body
    pub fn from_value(value: &Value) -> Result<Self, UnarchiveError> {
        let obj = value
            .as_object()
            .ok_or_else(|| UnarchiveError::Validation("input must be an object".to_string()))?;

        let product_ids = match obj.get("productIds") {
            None | Some(Value::Null) => return Err(UnarchiveError::Validation("productIds is required".to_string())),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| UnarchiveError::Validation("productIds must contain only strings".to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(UnarchiveError::Validation("productIds must be an array".to_string())),
        };

        let shop_id = match obj.get("shopId") {
            None | Some(Value::Null) => return Err(UnarchiveError::Validation("shopId is required".to_string())),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(UnarchiveError::Validation("shopId must be a string".to_string())),
        };

        Ok(Self { product_ids, shop_id })
    }

    pub fn validate(&self, max_batch_size: usize) -> Result<(), UnarchiveError> {
        if self.product_ids.is_empty() {
            return Err(UnarchiveError::Validation("productIds must not be empty".to_string()));
        }
        if self.product_ids.iter().any(|id| id.is_empty()) {
            return Err(UnarchiveError::Validation("productIds must not contain empty ids".to_string()));
        }
        if self.shop_id.is_empty() {
            return Err(UnarchiveError::Validation("shopId must not be empty".to_string()));
        }
        let distinct = self.distinct_ids().len();
        if distinct > max_batch_size {
            return Err(UnarchiveError::Validation(format!(
                "at most {} products per request, got {}",
                max_batch_size, distinct
            )));
        }
        Ok(())
    }

    /// Requested ids with duplicates removed, in first-seen order
    pub fn distinct_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.product_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct UnarchiveOptions {
    pub refetch_requested: bool,
    pub max_batch_size: usize,
    pub max_concurrent_updates: usize,
    pub audit_logging: bool,
}

impl Default for UnarchiveOptions {
    fn default() -> Self {
        Self {
            refetch_requested: true,
            max_batch_size: 500,
            max_concurrent_updates: 32,
            audit_logging: false,
        }
    }
}

impl From<&AppConfig> for UnarchiveOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            refetch_requested: config.catalog.refetch_requested,
            max_batch_size: config.catalog.max_batch_size,
            max_concurrent_updates: config.catalog.max_concurrent_updates,
            audit_logging: config.security.enable_audit_logging,
        }
    }
}

/// Restores archived products together with their variants and options.
///
/// Authorization and the shop check cover only the requested ids. The
/// transition covers every archived entity whose `ancestors` contain one of
/// them, and the result lists only the requested ids.
pub struct UnarchiveService {
    store: Arc<dyn EntityStore>,
    options: UnarchiveOptions,
}

impl UnarchiveService {
    pub fn new(store: Arc<dyn EntityStore>, options: UnarchiveOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub async fn unarchive(
        &self,
        checker: &dyn PermissionChecker,
        input: UnarchiveInput,
    ) -> Result<Vec<CatalogEntity>, UnarchiveError> {
        input.validate(self.options.max_batch_size)?;
        let ids = input.distinct_ids();
        let shop_id = input.shop_id.as_str();
        info!(shop_id, requested = ids.len(), "unarchive requested");

        let denials = authorize_all(checker, &ids, shop_id).await;
        if !denials.is_empty() {
            let denied: Vec<String> = denials.into_iter().map(|(id, _)| id).collect();
            warn!(shop_id, ?denied, "unarchive denied");
            return Err(UnarchiveError::Authorization { denied });
        }

        let owned = self.store.count(tenant_filter(&ids, shop_id)).await?;
        if (owned as usize) < ids.len() {
            warn!(shop_id, owned, requested = ids.len(), "requested products missing from shop");
            return Err(UnarchiveError::NotFound);
        }

        let discovered = self.store.find_many(discovery_filter(&ids, shop_id)).await?;
        debug!(shop_id, discovered = discovered.len(), "archived entities discovered");

        let transitioned = self
            .apply_transition(discovered.into_iter().map(|entity| entity.id).collect())
            .await?;

        if self.options.audit_logging {
            info!(
                target: "audit",
                shop_id,
                requested = ?ids,
                transitioned = ?transitioned.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
                "products unarchived"
            );
        }

        let result = if self.options.refetch_requested {
            self.fetch_requested(&ids, shop_id).await?
        } else {
            select_requested(&ids, transitioned)
        };

        info!(shop_id, returned = result.len(), "unarchive complete");
        Ok(result)
    }

    /// Every update is attempted; any failure or vanished entity turns the
    /// whole call into a `PartialFailure` without undoing the others.
    async fn apply_transition(&self, ids: Vec<String>) -> Result<Vec<CatalogEntity>, UnarchiveError> {
        let patch = EntityPatch::unarchive(Utc::now());
        let concurrency = self.options.max_concurrent_updates.max(1);

        let outcomes: Vec<(String, Result<Option<CatalogEntity>, DatabaseError>)> = stream::iter(ids)
            .map(|id| {
                let store = Arc::clone(&self.store);
                let patch = patch.clone();
                async move {
                    let outcome = store.update_one(&id, &patch).await;
                    (id, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut transitioned = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Some(entity)) => transitioned.push(entity),
                Ok(None) => {
                    warn!(id = %id, "entity disappeared before update");
                    failed.push(id);
                }
                Err(e) => {
                    error!(id = %id, error = %e, "entity update failed");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            let mut done: Vec<String> = transitioned.into_iter().map(|e| e.id).collect();
            done.sort();
            warn!(failed = failed.len(), succeeded = done.len(), "unarchive partially applied");
            return Err(UnarchiveError::PartialFailure { failed, transitioned: done });
        }

        Ok(transitioned)
    }

    async fn fetch_requested(&self, ids: &[String], shop_id: &str) -> Result<Vec<CatalogEntity>, UnarchiveError> {
        let current = self.store.find_many(tenant_filter(ids, shop_id)).await?;
        Ok(select_requested(ids, current))
    }
}

/// Run every permission check concurrently and collect all denials
pub async fn authorize_all(
    checker: &dyn PermissionChecker,
    ids: &[String],
    shop_id: &str,
) -> Vec<(String, Denial)> {
    let checks = ids.iter().map(|id| async move {
        let resource = product_resource(id);
        checker
            .check(&resource, ARCHIVE_ACTION, shop_id)
            .await
            .err()
            .map(|denial| (id.clone(), denial))
    });
    join_all(checks).await.into_iter().flatten().collect()
}

/// Requested ids owned by the shop, archived or not
pub fn tenant_filter(ids: &[String], shop_id: &str) -> FilterData {
    FilterData::with_where(json!({
        (fields::ID): { "$in": ids },
        (fields::SHOP_ID): shop_id,
    }))
    .including_archived()
}

/// Archived entities that are requested or descend from a requested id.
/// `$ne: false` also catches documents stored without the flag.
pub fn discovery_filter(ids: &[String], shop_id: &str) -> FilterData {
    FilterData {
        order: Some(json!({ (fields::ID): "asc" })),
        ..FilterData::with_where(json!({
            (fields::IS_DELETED): { "$ne": false },
            (fields::SHOP_ID): shop_id,
            "$or": [
                { (fields::ID): { "$in": ids } },
                { (fields::ANCESTORS): { "$any": ids } },
            ],
        }))
        .including_archived()
    }
}

/// Keep requested entities only, once each, in request order
pub fn select_requested(ids: &[String], entities: Vec<CatalogEntity>) -> Vec<CatalogEntity> {
    let mut by_id: HashMap<String, CatalogEntity> = entities.into_iter().map(|e| (e.id.clone(), e)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
