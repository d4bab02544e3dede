//! # waypoint-db
//!
//! PostgreSQL storage layer for waypoint.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for every shared entity in `waypoint-core`
//! - The BM25 lexical index, dense-vector columns (`pgvector`), and the
//!   entity/relationship graph backing hybrid retrieval
//! - Idempotent schema migrations, run on every start
//!
//! ## Example
//!
//! ```rust,ignore
//! use waypoint_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/waypoint").await?;
//!     db.migrate().await?;
//!
//!     let job_id = db.jobs.enqueue(waypoint_core::JobType::Research, None, serde_json::json!({})).await?;
//!     println!("Queued job: {job_id}");
//!     Ok(())
//! }
//! ```

pub mod dimension_migration;
pub mod doc_index;
pub mod graph;
pub mod jobs;
pub mod pool;
pub mod reports;
pub mod sessions;

// Test fixtures for integration tests
pub mod test_fixtures;

// Re-export core types
pub use waypoint_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub use dimension_migration::ensure_embedding_dimension;
pub use doc_index::PgDocumentIndexRepository;
pub use graph::PgGraphRepository;
pub use jobs::PgJobRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use reports::PgReportRepository;
pub use sessions::PgSessionRepository;

/// Combined database context with every repository wired to one pool.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Job queue repository (also implements `EventRepository`).
    pub jobs: PgJobRepository,
    /// Research report repository.
    pub reports: PgReportRepository,
    /// BM25 document index repository.
    pub doc_index: PgDocumentIndexRepository,
    /// Entity/relationship graph repository.
    pub graph: PgGraphRepository,
    /// Session repository.
    pub sessions: PgSessionRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobRepository::new(pool.clone()),
            reports: PgReportRepository::new(pool.clone()),
            doc_index: PgDocumentIndexRepository::new(pool.clone()),
            graph: PgGraphRepository::new(pool.clone()),
            sessions: PgSessionRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Connect to test database (for integration tests).
    #[cfg(test)]
    pub async fn connect_test() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| crate::test_fixtures::DEFAULT_TEST_DATABASE_URL.to_string());
        Self::connect(&database_url).await
    }

    /// Run pending migrations. Idempotent: safe to call on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
