use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column names as stored; the filter dialect and SQL both use these
pub mod fields {
    pub const ID: &str = "_id";
    pub const SHOP_ID: &str = "shopId";
    pub const ANCESTORS: &str = "ancestors";
    pub const IS_DELETED: &str = "isDeleted";
    pub const IS_VISIBLE: &str = "isVisible";
    pub const UPDATED_AT: &str = "updatedAt";
}

/// A product, variant or option. All three kinds live in one collection and
/// are related only through `ancestors` (root first, immediate parent last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct CatalogEntity {
    #[serde(rename = "_id")]
    #[sqlx(rename = "_id")]
    pub id: String,
    pub shop_id: String,
    #[serde(default)]
    pub ancestors: Vec<String>,
    /// `None` when the stored document never carried the flag; discovery
    /// treats that the same as archived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CatalogEntity {
    pub fn new(id: impl Into<String>, shop_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shop_id: shop_id.into(),
            ancestors: vec![],
            is_deleted: Some(false),
            is_visible: false,
            title: None,
            updated_at: None,
        }
    }

    pub fn with_ancestors<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ancestors = ancestors.into_iter().map(Into::into).collect();
        self
    }

    pub fn archived(mut self) -> Self {
        self.is_deleted = Some(true);
        self
    }

    pub fn visible(mut self) -> Self {
        self.is_visible = true;
        self
    }

    /// Drop the archive flag entirely, as older documents were written
    pub fn without_archive_flag(mut self) -> Self {
        self.is_deleted = None;
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.ancestors.is_empty()
    }

    /// Only an explicit `false` counts as active
    pub fn is_active(&self) -> bool {
        self.is_deleted == Some(false)
    }
}

/// Partial update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntityPatch {
    /// Restore to active but leave unpublished; publishing is a separate step
    pub fn unarchive(now: DateTime<Utc>) -> Self {
        Self {
            is_deleted: Some(false),
            is_visible: Some(false),
            updated_at: Some(now),
        }
    }

    pub fn apply_to(&self, entity: &mut CatalogEntity) {
        if let Some(is_deleted) = self.is_deleted {
            entity.is_deleted = Some(is_deleted);
        }
        if let Some(is_visible) = self.is_visible {
            entity.is_visible = is_visible;
        }
        if let Some(updated_at) = self.updated_at {
            entity.updated_at = Some(updated_at);
        }
    }
}
