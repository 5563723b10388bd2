//! Bookmark metadata writes.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use hoard_core::{BookmarkRepository, BookmarkUpdate, Error, Result};

/// PostgreSQL implementation of BookmarkRepository.
#[derive(Clone)]
pub struct PgBookmarkRepository {
    pool: Pool<Postgres>,
}

impl PgBookmarkRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookmarkRepository for PgBookmarkRepository {
    async fn apply_metadata(
        &self,
        owner_id: Uuid,
        bookmark_id: Uuid,
        update: &BookmarkUpdate,
    ) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE bookmarks
             SET title = COALESCE($3, title),
                 summary = COALESCE($4, summary),
                 tags = COALESCE($5, tags),
                 updated_at = NOW()
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(bookmark_id)
        .bind(owner_id)
        .bind(update.title.as_deref())
        .bind(update.summary.as_deref())
        .bind(update.tags.as_deref())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("bookmark {}", bookmark_id)));
        }
        Ok(())
    }
}
