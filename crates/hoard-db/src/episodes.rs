//! Episode resolution writes and the tokenized feed lookup.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use hoard_core::{
    EpisodeRepository, EpisodeUpdate, Error, FeedEpisode, Medium, ResolvedEpisode, Result,
};

/// PostgreSQL implementation of EpisodeRepository.
#[derive(Clone)]
pub struct PgEpisodeRepository {
    pool: Pool<Postgres>,
}

impl PgEpisodeRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_medium(row: &PgRow) -> Result<Medium> {
        let medium: String = row.get("medium");
        medium.parse()
    }
}

#[async_trait]
impl EpisodeRepository for PgEpisodeRepository {
    async fn apply_resolution(
        &self,
        owner_id: Uuid,
        episode_id: Uuid,
        update: &EpisodeUpdate,
    ) -> Result<ResolvedEpisode> {
        let row = sqlx::query(
            "UPDATE episodes
             SET url = $3,
                 title = COALESCE($4, title),
                 size_in_bytes = COALESCE($5, size_in_bytes),
                 duration_in_seconds = COALESCE($6, duration_in_seconds),
                 author = COALESCE($7, author),
                 filename = COALESCE($8, filename),
                 ext = COALESCE($9, ext),
                 src_type = COALESCE($10, src_type),
                 ready = TRUE,
                 error = NULL,
                 updated_at = NOW()
             WHERE id = $1 AND owner_id = $2
             RETURNING type, medium",
        )
        .bind(episode_id)
        .bind(owner_id)
        .bind(&update.url)
        .bind(update.title.as_deref())
        .bind(update.size_in_bytes)
        .bind(update.duration_in_seconds)
        .bind(update.author.as_deref())
        .bind(update.filename.as_deref())
        .bind(update.ext.as_deref())
        .bind(update.src_type.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("episode {}", episode_id)))?;

        Ok(ResolvedEpisode {
            entity_type: row.get("type"),
            medium: Self::parse_medium(&row)?,
        })
    }

    async fn mark_failed(&self, owner_id: Uuid, episode_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE episodes
             SET error = $3, updated_at = NOW()
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(episode_id)
        .bind(owner_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("episode {}", episode_id)));
        }
        Ok(())
    }

    async fn find_feed_episode(
        &self,
        feed_id: Uuid,
        episode_id: Uuid,
        token: &str,
    ) -> Result<Option<FeedEpisode>> {
        let row = sqlx::query(
            "SELECT e.id, e.owner_id, e.url, e.type, e.medium, e.ready
             FROM episodes e
             JOIN podcast_feeds f
               ON f.id = e.podcast_feed_id AND f.owner_id = e.owner_id
             WHERE f.id = $1 AND e.id = $2 AND f.token = $3",
        )
        .bind(feed_id)
        .bind(episode_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|row| {
            Ok(FeedEpisode {
                episode_id: row.get("id"),
                owner_id: row.get("owner_id"),
                url: row.get("url"),
                entity_type: row.get("type"),
                medium: Self::parse_medium(&row)?,
                ready: row.get("ready"),
            })
        })
        .transpose()
    }
}
