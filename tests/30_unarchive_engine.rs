use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use catalog_api_rust::auth::{AllowAll, Denial, PermissionChecker};
use catalog_api_rust::catalog::{CatalogEntity, EntityPatch, EntityStore, MemoryStore};
use catalog_api_rust::database::DatabaseError;
use catalog_api_rust::filter::FilterData;
use catalog_api_rust::services::{UnarchiveError, UnarchiveInput, UnarchiveOptions, UnarchiveService};

/// Records every check and denies the listed resources
#[derive(Default)]
struct RecordingChecker {
    deny: HashSet<String>,
    seen: Mutex<Vec<String>>,
}

impl RecordingChecker {
    fn denying(ids: &[&str]) -> Self {
        Self {
            deny: ids.iter().map(|id| format!("catalog:products:{}", id)).collect(),
            seen: Mutex::new(vec![]),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PermissionChecker for RecordingChecker {
    async fn check(&self, resource: &str, action: &str, shop_id: &str) -> Result<(), Denial> {
        self.seen.lock().unwrap().push(resource.to_string());
        if self.deny.contains(resource) {
            return Err(Denial {
                resource: resource.to_string(),
                action: action.to_string(),
                shop_id: shop_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Delegates to a memory store but fails or loses updates for chosen ids
struct FlakyStore {
    inner: MemoryStore,
    fail: HashSet<String>,
    vanish: HashSet<String>,
}

#[async_trait]
impl EntityStore for FlakyStore {
    fn backend_name(&self) -> &'static str {
        "flaky"
    }

    async fn count(&self, filter: FilterData) -> Result<u64, DatabaseError> {
        self.inner.count(filter).await
    }

    async fn find_many(&self, filter: FilterData) -> Result<Vec<CatalogEntity>, DatabaseError> {
        self.inner.find_many(filter).await
    }

    async fn update_one(&self, id: &str, patch: &EntityPatch) -> Result<Option<CatalogEntity>, DatabaseError> {
        if self.fail.contains(id) {
            return Err(DatabaseError::ConnectionError("timeout".to_string()));
        }
        if self.vanish.contains(id) {
            return Ok(None);
        }
        self.inner.update_one(id, patch).await
    }
}

/// shop-1: R -> D1 -> D2 archived, A archived, B archived
/// shop-2: X archived, plus a forged child of R
fn seeded() -> MemoryStore {
    MemoryStore::with_entities([
        CatalogEntity::new("R", "shop-1").archived().visible(),
        CatalogEntity::new("D1", "shop-1").with_ancestors(["R"]).archived().visible(),
        CatalogEntity::new("D2", "shop-1").with_ancestors(["R", "D1"]).archived(),
        CatalogEntity::new("A", "shop-1").archived(),
        CatalogEntity::new("B", "shop-1").archived(),
        CatalogEntity::new("X", "shop-2").archived(),
        CatalogEntity::new("F", "shop-2").with_ancestors(["R"]).archived(),
    ])
}

fn service(store: Arc<dyn EntityStore>, refetch_requested: bool) -> UnarchiveService {
    UnarchiveService::new(
        store,
        UnarchiveOptions {
            refetch_requested,
            ..UnarchiveOptions::default()
        },
    )
}

fn ids(entities: &[CatalogEntity]) -> Vec<&str> {
    entities.iter().map(|e| e.id.as_str()).collect()
}

#[tokio::test]
async fn cascade_reaches_every_depth_and_reports_only_requested() -> Result<()> {
    let store = Arc::new(seeded());
    let result = service(store.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["R"], "shop-1"))
        .await?;

    assert_eq!(ids(&result), vec!["R"]);
    for id in ["R", "D1", "D2"] {
        let entity = store.get(id).await.unwrap();
        assert!(entity.is_active(), "{} still archived", id);
        assert!(!entity.is_visible, "{} became visible", id);
        assert!(entity.updated_at.is_some());
    }
    Ok(())
}

#[tokio::test]
async fn repeated_call_changes_nothing() -> Result<()> {
    let store = Arc::new(seeded());
    let svc = service(store.clone(), true);

    let first = svc.unarchive(&AllowAll, UnarchiveInput::new(["R"], "shop-1")).await?;
    let after_first = store.snapshot().await;

    let second = svc.unarchive(&AllowAll, UnarchiveInput::new(["R"], "shop-1")).await?;
    assert_eq!(store.snapshot().await, after_first);
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn foreign_shop_id_fails_without_mutation() -> Result<()> {
    let store = Arc::new(seeded());
    let before = store.snapshot().await;

    let err = service(store.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["A", "X"], "shop-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, UnarchiveError::NotFound));
    assert!(!err.to_string().contains('X'));
    assert_eq!(store.snapshot().await, before);
    Ok(())
}

#[tokio::test]
async fn unknown_id_fails_without_mutation() -> Result<()> {
    let store = Arc::new(seeded());
    let before = store.snapshot().await;

    let err = service(store.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["A", "nope"], "shop-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, UnarchiveError::NotFound));
    assert_eq!(store.snapshot().await, before);
    Ok(())
}

#[tokio::test]
async fn descendants_in_other_shops_are_left_alone() -> Result<()> {
    let store = Arc::new(seeded());
    service(store.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["R"], "shop-1"))
        .await?;

    assert_eq!(store.get("F").await.unwrap().is_deleted, Some(true));
    Ok(())
}

#[tokio::test]
async fn descendant_without_archive_flag_is_restored_hidden() -> Result<()> {
    let store = Arc::new(MemoryStore::with_entities([
        CatalogEntity::new("P", "shop-1").archived(),
        CatalogEntity::new("V", "shop-1").with_ancestors(["P"]).without_archive_flag().visible(),
        CatalogEntity::new("W", "shop-1").with_ancestors(["P"]).visible(),
    ]));

    let result = service(store.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["P"], "shop-1"))
        .await?;
    assert_eq!(ids(&result), vec!["P"]);

    let legacy = store.get("V").await.unwrap();
    assert_eq!(legacy.is_deleted, Some(false));
    assert!(!legacy.is_visible);
    assert!(legacy.updated_at.is_some());

    // an explicit active flag is not part of the cascade
    let active = store.get("W").await.unwrap();
    assert!(active.is_visible);
    assert!(active.updated_at.is_none());
    Ok(())
}

#[tokio::test]
async fn requested_product_without_archive_flag_is_transitioned() -> Result<()> {
    let store = Arc::new(MemoryStore::with_entities([
        CatalogEntity::new("P", "shop-1").without_archive_flag().visible(),
    ]));

    let result = service(store.clone(), false)
        .unarchive(&AllowAll, UnarchiveInput::new(["P"], "shop-1"))
        .await?;

    assert_eq!(ids(&result), vec!["P"]);
    assert!(result[0].is_active());
    assert!(!result[0].is_visible);
    Ok(())
}

#[tokio::test]
async fn duplicate_ids_count_once() -> Result<()> {
    let store = Arc::new(seeded());
    let checker = RecordingChecker::default();

    let result = service(store.clone(), false)
        .unarchive(&checker, UnarchiveInput::new(["A", "A"], "shop-1"))
        .await?;

    assert_eq!(ids(&result), vec!["A"]);
    assert_eq!(checker.seen(), vec!["catalog:products:A"]);
    Ok(())
}

#[tokio::test]
async fn any_denial_blocks_every_write() -> Result<()> {
    let store = Arc::new(seeded());
    let before = store.snapshot().await;
    let checker = RecordingChecker::denying(&["B", "R"]);

    let err = service(store.clone(), true)
        .unarchive(&checker, UnarchiveInput::new(["A", "B", "R"], "shop-1"))
        .await
        .unwrap_err();

    match err {
        UnarchiveError::Authorization { denied } => assert_eq!(denied, vec!["B", "R"]),
        other => panic!("expected authorization error, got {:?}", other),
    }
    // every requested id was checked, none of the descendants
    let mut seen = checker.seen();
    seen.sort();
    assert_eq!(seen, vec!["catalog:products:A", "catalog:products:B", "catalog:products:R"]);
    assert_eq!(store.snapshot().await, before);
    Ok(())
}

#[tokio::test]
async fn validation_runs_before_authorization() -> Result<()> {
    let store = Arc::new(seeded());
    let checker = RecordingChecker::default();

    let err = service(store, true)
        .unarchive(&checker, UnarchiveInput::new(Vec::<String>::new(), "shop-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, UnarchiveError::Validation(_)));
    assert!(checker.seen().is_empty());
    Ok(())
}

#[tokio::test]
async fn already_active_product_is_untouched() -> Result<()> {
    let active = CatalogEntity::new("P", "shop-1").visible();
    let store = Arc::new(MemoryStore::with_entities([
        active.clone(),
        CatalogEntity::new("V", "shop-1").with_ancestors(["P"]).archived(),
        CatalogEntity::new("V2", "shop-1").with_ancestors(["P"]).visible(),
    ]));

    let refetched = service(store.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["P"], "shop-1"))
        .await?;

    // still reported, still visible, never written
    assert_eq!(refetched, vec![active.clone()]);
    assert_eq!(store.get("P").await.unwrap(), active);
    assert!(store.get("V").await.unwrap().is_active());
    assert!(store.get("V2").await.unwrap().is_visible);
    Ok(())
}

#[tokio::test]
async fn already_active_product_without_refetch_is_omitted() -> Result<()> {
    let store = Arc::new(MemoryStore::with_entities([
        CatalogEntity::new("P", "shop-1"),
        CatalogEntity::new("V", "shop-1").with_ancestors(["P"]).archived(),
        CatalogEntity::new("Q", "shop-1").archived(),
    ]));

    let result = service(store.clone(), false)
        .unarchive(&AllowAll, UnarchiveInput::new(["P", "Q"], "shop-1"))
        .await?;

    assert_eq!(ids(&result), vec!["Q"]);
    assert!(store.get("V").await.unwrap().is_active());
    Ok(())
}

#[tokio::test]
async fn results_follow_request_order() -> Result<()> {
    let store = Arc::new(seeded());
    let result = service(store, false)
        .unarchive(&AllowAll, UnarchiveInput::new(["B", "R", "A"], "shop-1"))
        .await?;

    assert_eq!(ids(&result), vec!["B", "R", "A"]);
    assert!(result.iter().all(|e| e.is_active() && !e.is_visible && e.shop_id == "shop-1"));
    Ok(())
}

#[tokio::test]
async fn failed_update_reports_partial_failure_and_keeps_the_rest() -> Result<()> {
    let store = Arc::new(FlakyStore {
        inner: seeded(),
        fail: HashSet::from(["D1".to_string()]),
        vanish: HashSet::from(["D2".to_string()]),
    });

    let err = service(store.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["R"], "shop-1"))
        .await
        .unwrap_err();

    match err {
        UnarchiveError::PartialFailure { failed, transitioned } => {
            assert_eq!(failed, vec!["D1", "D2"]);
            assert_eq!(transitioned, vec!["R"]);
        }
        other => panic!("expected partial failure, got {:?}", other),
    }

    // committed updates are not rolled back
    assert!(store.inner.get("R").await.unwrap().is_active());
    assert_eq!(store.inner.get("D1").await.unwrap().is_deleted, Some(true));

    // retrying once the store recovers finishes the job
    let recovered = Arc::new(FlakyStore {
        inner: MemoryStore::with_entities(store.inner.snapshot().await),
        fail: HashSet::new(),
        vanish: HashSet::new(),
    });
    service(recovered.clone(), true)
        .unarchive(&AllowAll, UnarchiveInput::new(["R"], "shop-1"))
        .await?;
    for id in ["R", "D1", "D2"] {
        assert!(recovered.inner.get(id).await.unwrap().is_active());
    }
    Ok(())
}

#[tokio::test]
async fn oversized_batch_is_rejected() -> Result<()> {
    let store = Arc::new(seeded());
    let svc = UnarchiveService::new(
        store,
        UnarchiveOptions {
            max_batch_size: 2,
            ..UnarchiveOptions::default()
        },
    );

    let err = svc
        .unarchive(&AllowAll, UnarchiveInput::new(["A", "B", "R"], "shop-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, UnarchiveError::Validation(_)));
    Ok(())
}
