use async_trait::async_trait;
use sqlx::PgPool;

use super::entity::{fields, CatalogEntity, EntityPatch};
use super::store::EntityStore;
use crate::database::{DatabaseError, DatabaseManager, Repository};
use crate::filter::FilterData;

/// Catalog store backed by a Postgres table with quoted camelCase columns
pub struct PgEntityStore {
    repository: Repository<CatalogEntity>,
}

impl PgEntityStore {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            repository: Repository::new(table, pool),
        }
    }

    /// Connect using the database section of the config and make sure the
    /// table exists.
    pub async fn connect(config: &crate::config::DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = DatabaseManager::connect(config).await?;
        DatabaseManager::ensure_schema(&pool, &config.table).await?;
        Ok(Self::new(pool, config.table.clone()))
    }

    fn update_sql(&self) -> String {
        let column = |name: &str| DatabaseManager::quote_identifier(name);
        format!(
            "UPDATE {table} SET {deleted} = COALESCE($2, {deleted}), {visible} = COALESCE($3, {visible}), \
             {updated} = COALESCE($4, {updated}) WHERE {id} = $1 RETURNING *",
            table = column(self.repository.table_name()),
            deleted = column(fields::IS_DELETED),
            visible = column(fields::IS_VISIBLE),
            updated = column(fields::UPDATED_AT),
            id = column(fields::ID),
        )
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn count(&self, filter: FilterData) -> Result<u64, DatabaseError> {
        let count = self.repository.count(filter).await?;
        Ok(count.max(0) as u64)
    }

    async fn find_many(&self, filter: FilterData) -> Result<Vec<CatalogEntity>, DatabaseError> {
        self.repository.select_any(filter).await
    }

    async fn update_one(&self, id: &str, patch: &EntityPatch) -> Result<Option<CatalogEntity>, DatabaseError> {
        let sql = self.update_sql();
        let row = sqlx::query_as::<_, CatalogEntity>(&sql)
            .bind(id)
            .bind(patch.is_deleted)
            .bind(patch.is_visible)
            .bind(patch.updated_at)
            .fetch_optional(self.repository.pool())
            .await?;
        Ok(row)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(self.repository.pool()).await
    }
}
