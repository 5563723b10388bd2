//! Archive snapshot writes.
//!
//! Both outcomes leave the row terminal: a snapshot or an error, with
//! `ready = TRUE` either way.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use hoard_core::{ArchiveRepository, Error, ReadableArticle, Result};

/// PostgreSQL implementation of ArchiveRepository.
#[derive(Clone)]
pub struct PgArchiveRepository {
    pool: Pool<Postgres>,
}

impl PgArchiveRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveRepository for PgArchiveRepository {
    async fn store_snapshot(
        &self,
        owner_id: Uuid,
        archive_id: Uuid,
        article: &ReadableArticle,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE archives
             SET title = COALESCE($3, title),
                 site_name = COALESCE($4, site_name),
                 html_content = COALESCE($5, html_content),
                 text_content = COALESCE($6, text_content),
                 length = COALESCE($7, length),
                 excerpt = COALESCE($8, excerpt),
                 byline = COALESCE($9, byline),
                 direction = COALESCE($10, direction),
                 language = COALESCE($11, language),
                 ready = TRUE,
                 error = NULL,
                 updated_at = NOW()
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(archive_id)
        .bind(owner_id)
        .bind(article.title.as_deref())
        .bind(article.site_name.as_deref())
        .bind(article.content.as_deref())
        .bind(article.text_content.as_deref())
        .bind(article.length)
        .bind(article.excerpt.as_deref())
        .bind(article.byline.as_deref())
        .bind(article.direction.as_deref())
        .bind(article.language.as_deref())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("archive {}", archive_id)));
        }
        Ok(())
    }

    async fn mark_failed(&self, owner_id: Uuid, archive_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE archives
             SET error = $3, ready = TRUE, updated_at = NOW()
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(archive_id)
        .bind(owner_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("archive {}", archive_id)));
        }
        Ok(())
    }
}
