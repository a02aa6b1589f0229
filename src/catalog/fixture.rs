use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::entity::CatalogEntity;
use super::store::MemoryStore;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to read fixture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML fixture: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON fixture: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported fixture format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid fixture: {0}")]
    Invalid(String),
}

/// Seed data for the in-memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub entities: Vec<CatalogEntity>,
}

impl Fixture {
    pub fn from_yaml(source: &str) -> Result<Self, FixtureError> {
        let fixture: Fixture = serde_yaml::from_str(source)?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn from_json(source: &str) -> Result<Self, FixtureError> {
        let fixture: Fixture = serde_json::from_str(source)?;
        fixture.validate()?;
        Ok(fixture)
    }

    /// Read a `.yaml`/`.yml` or `.json` file
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let source = fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let fixture = match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&source)?,
            "json" => Self::from_json(&source)?,
            other => return Err(FixtureError::UnsupportedFormat(other.to_string())),
        };

        info!("Loaded {} catalog entities from {}", fixture.entities.len(), path.display());
        Ok(fixture)
    }

    /// Ids are unique and every ancestor lives in the same shop as its
    /// descendant. Ancestors missing from the fixture are allowed.
    pub fn validate(&self) -> Result<(), FixtureError> {
        let mut shops: HashMap<&str, &str> = HashMap::new();
        for entity in &self.entities {
            if entity.id.is_empty() || entity.shop_id.is_empty() {
                return Err(FixtureError::Invalid("entity id and shopId must be non-empty".to_string()));
            }
            if shops.insert(&entity.id, &entity.shop_id).is_some() {
                return Err(FixtureError::Invalid(format!("duplicate entity id '{}'", entity.id)));
            }
        }

        for entity in &self.entities {
            let mut seen = HashSet::new();
            for ancestor in &entity.ancestors {
                if ancestor == &entity.id || !seen.insert(ancestor.as_str()) {
                    return Err(FixtureError::Invalid(format!(
                        "entity '{}' has a cyclic or repeated ancestor '{}'",
                        entity.id, ancestor
                    )));
                }
                match shops.get(ancestor.as_str()) {
                    Some(shop) if *shop != entity.shop_id => {
                        return Err(FixtureError::Invalid(format!(
                            "entity '{}' in shop '{}' has ancestor '{}' in shop '{}'",
                            entity.id, entity.shop_id, ancestor, shop
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub async fn seed(self, store: &MemoryStore) {
        for entity in self.entities {
            store.insert(entity).await;
        }
    }

    pub fn into_store(self) -> MemoryStore {
        MemoryStore::with_entities(self.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
entities:
  - _id: p1
    shopId: s1
    isDeleted: true
  - _id: v1
    shopId: s1
    ancestors: [p1]
    isDeleted: true
    title: Large
"#;

    #[test]
    fn parses_yaml_with_defaults() {
        let fixture = Fixture::from_yaml(YAML).unwrap();
        assert_eq!(fixture.entities.len(), 2);
        assert!(!fixture.entities[0].is_visible);
        assert_eq!(fixture.entities[1].ancestors, vec!["p1"]);
        assert_eq!(fixture.entities[1].title.as_deref(), Some("Large"));
    }

    #[test]
    fn parses_json() {
        let fixture = Fixture::from_json(r#"{ "entities": [{ "_id": "p1", "shopId": "s1" }] }"#).unwrap();
        assert_eq!(fixture.entities[0].id, "p1");
    }

    #[test]
    fn rejects_duplicate_ids_and_cross_shop_ancestors() {
        let duplicate = "entities:\n  - { _id: p1, shopId: s1 }\n  - { _id: p1, shopId: s1 }\n";
        assert!(matches!(Fixture::from_yaml(duplicate), Err(FixtureError::Invalid(_))));

        let cross_shop = "entities:\n  - { _id: p1, shopId: s1 }\n  - { _id: v1, shopId: s2, ancestors: [p1] }\n";
        assert!(matches!(Fixture::from_yaml(cross_shop), Err(FixtureError::Invalid(_))));
    }

    #[test]
    fn load_rejects_unknown_extension() {
        let path = std::env::temp_dir().join(format!("catalog-fixture-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "entities = []").unwrap();
        let result = Fixture::load(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(FixtureError::UnsupportedFormat(ext)) if ext == "toml"));
    }

    #[tokio::test]
    async fn seeds_memory_store() {
        let store = MemoryStore::new();
        Fixture::from_yaml(YAML).unwrap().seed(&store).await;
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("v1").await.unwrap().is_deleted, Some(true));
    }
}
