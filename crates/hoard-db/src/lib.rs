//! # hoard-db
//!
//! PostgreSQL storage for hoard.
//!
//! This crate provides:
//! - Connection pool management
//! - The durable job queue ([`PgJobRepository`])
//! - The row writes performed by the resolvers, scoped by row id and owner
//! - The tokenized feed episode lookup
//!
//! ## Example
//!
//! ```rust,ignore
//! use hoard_db::{Database, JobRepository, QueuePolicy, SendOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/hoard").await?;
//!     db.jobs.create_queue("resolve-bookmark", &QueuePolicy::default()).await?;
//!     let id = db.jobs
//!         .send("resolve-bookmark", serde_json::json!({}), &SendOptions::default())
//!         .await?;
//!     println!("Queued job: {}", id);
//!     Ok(())
//! }
//! ```
pub mod archives;
pub mod bookmarks;
pub mod episodes;
pub mod jobs;
pub mod pool;

// Note: Always compiled so integration tests (in tests/) can use it
pub mod test_fixtures;

// Re-export core types
pub use hoard_core::*;

pub use archives::PgArchiveRepository;
pub use bookmarks::PgBookmarkRepository;
pub use episodes::PgEpisodeRepository;
pub use jobs::PgJobRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Durable job queue.
    pub jobs: PgJobRepository,
    /// Bookmark metadata writes.
    pub bookmarks: PgBookmarkRepository,
    /// Archive snapshot writes.
    pub archives: PgArchiveRepository,
    /// Episode writes and feed lookup.
    pub episodes: PgEpisodeRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobRepository::new(pool.clone()),
            bookmarks: PgBookmarkRepository::new(pool.clone()),
            archives: PgArchiveRepository::new(pool.clone()),
            episodes: PgEpisodeRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
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
