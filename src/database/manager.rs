use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::filter::FilterError;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<FilterError> for DatabaseError {
    fn from(err: FilterError) -> Self {
        DatabaseError::QueryError(err.to_string())
    }
}

/// Owns the connection pool for the catalog database
pub struct DatabaseManager;

impl DatabaseManager {
    /// Open a pool using the configured URL and pool limits
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let url = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let redacted = Self::redact(url)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(format!("{}: {}", redacted, e)))?;

        info!("Created database pool for: {}", redacted);
        Ok(pool)
    }

    /// Strip the password from a connection string so it can be logged
    pub fn redact(database_url: &str) -> Result<String, DatabaseError> {
        let mut url = url::Url::parse(database_url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if url.password().is_some() {
            url.set_password(Some("***")).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        Ok(url.into())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Create the catalog table and its ancestor index when missing
    pub async fn ensure_schema(pool: &PgPool, table: &str) -> Result<(), DatabaseError> {
        let quoted = Self::quote_identifier(table);
        let create_table = format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
                "_id" TEXT PRIMARY KEY,
                "shopId" TEXT NOT NULL,
                "ancestors" TEXT[] NOT NULL DEFAULT '{{}}',
                "isDeleted" BOOLEAN,
                "isVisible" BOOLEAN NOT NULL DEFAULT false,
                "title" TEXT,
                "updatedAt" TIMESTAMPTZ
            )"#,
            quoted
        );
        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN (\"ancestors\")",
            Self::quote_identifier(&format!("{}_ancestors_idx", table)),
            quoted
        );

        sqlx::query(&create_table).execute(pool).await?;
        sqlx::query(&create_index).execute(pool).await?;
        info!("Ensured schema for table: {}", table);
        Ok(())
    }

    /// Quote SQL identifier to prevent injection
    pub fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
