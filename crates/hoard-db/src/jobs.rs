//! Durable job queue backed by PostgreSQL.
//!
//! Queue definitions hold the retry and retention policy; each job copies the
//! policy at send time so later definition changes do not affect queued work.
//! Workers claim with `FOR UPDATE SKIP LOCKED` so several processes can poll
//! the same queues.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hoard_core::{
    new_v7, Error, Job, JobRepository, JobState, MaintenanceReport, QueuePolicy, QueueStats,
    Result, SendOptions,
};

const JOB_COLUMNS: &str = "id, queue, state, data, priority, retry_count, retry_limit, \
     retry_delay_secs, retry_backoff, start_after, expire_secs, singleton_key, keep_until, \
     output, error_message, created_at, started_at, completed_at";

/// Advisory lock key text for a throttled send. Hashed by PostgreSQL.
pub fn throttle_lock_key(queue: &str, key: &str) -> String {
    format!("job-throttle:{}:{}", queue, key)
}

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_job_row(row: PgRow) -> Result<Job> {
        let state: String = row.get("state");
        Ok(Job {
            id: row.get("id"),
            queue: row.get("queue"),
            state: state.parse()?,
            data: row.get("data"),
            priority: row.get("priority"),
            retry_count: row.get("retry_count"),
            retry_limit: row.get("retry_limit"),
            retry_delay_secs: row.get("retry_delay_secs"),
            retry_backoff: row.get("retry_backoff"),
            start_after: row.get("start_after"),
            expire_secs: row.get("expire_secs"),
            singleton_key: row.get("singleton_key"),
            keep_until: row.get("keep_until"),
            output: row.get("output"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }

    /// Insert one job, inheriting unset options from the queue definition.
    async fn insert_job<'e, E: PgExecutor<'e>>(
        executor: E,
        queue: &str,
        data: JsonValue,
        options: &SendOptions,
        singleton_key: Option<&str>,
    ) -> Result<Uuid> {
        let id = new_v7();
        let row = sqlx::query(
            "INSERT INTO job (id, queue, state, data, priority, retry_limit, retry_delay_secs,
                              retry_backoff, start_after, expire_secs, singleton_key, keep_until)
             SELECT $1, d.name, 'created', $2, $3,
                    COALESCE($4, d.retry_limit),
                    COALESCE($5, d.retry_delay_secs),
                    COALESCE($6, d.retry_backoff),
                    NOW() + make_interval(secs => COALESCE($7::int, 0)),
                    d.expire_secs,
                    $8,
                    NOW() + make_interval(secs => d.retention_secs)
             FROM job_queue_definition d
             WHERE d.name = $9
             RETURNING id",
        )
        .bind(id)
        .bind(&data)
        .bind(options.priority)
        .bind(options.retry_limit)
        .bind(options.retry_delay_secs)
        .bind(options.retry_backoff)
        .bind(options.start_after_secs)
        .bind(singleton_key)
        .bind(queue)
        .fetch_optional(executor)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(row.get("id")),
            None => Err(Error::NotFound(format!("queue {}", queue))),
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn create_queue(&self, name: &str, policy: &QueuePolicy) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_queue_definition
                 (name, retry_limit, retry_delay_secs, retry_backoff, retention_secs, expire_secs)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (name) DO UPDATE SET
                 retry_limit = EXCLUDED.retry_limit,
                 retry_delay_secs = EXCLUDED.retry_delay_secs,
                 retry_backoff = EXCLUDED.retry_backoff,
                 retention_secs = EXCLUDED.retention_secs,
                 expire_secs = EXCLUDED.expire_secs,
                 updated_at = NOW()",
        )
        .bind(name)
        .bind(policy.retry_limit)
        .bind(policy.retry_delay_secs)
        .bind(policy.retry_backoff)
        .bind(policy.retention_secs)
        .bind(policy.expire_secs)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(queue = name, ?policy, "Queue definition upserted");
        Ok(())
    }

    async fn send(&self, queue: &str, data: JsonValue, options: &SendOptions) -> Result<Uuid> {
        let id = Self::insert_job(&self.pool, queue, data, options, None).await?;
        debug!(job_id = %id, queue, "Job sent");
        Ok(id)
    }

    async fn insert(
        &self,
        queue: &str,
        data: Vec<JsonValue>,
        options: &SendOptions,
    ) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut ids = Vec::with_capacity(data.len());
        for item in data {
            ids.push(Self::insert_job(&mut *tx, queue, item, options, None).await?);
        }
        tx.commit().await.map_err(Error::Database)?;

        debug!(queue, count = ids.len(), "Jobs inserted");
        Ok(ids)
    }

    async fn send_throttled(
        &self,
        queue: &str,
        data: JsonValue,
        options: &SendOptions,
        throttle_secs: i32,
        key: &str,
    ) -> Result<Option<Uuid>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Serialize concurrent senders for the same key until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(throttle_lock_key(queue, key))
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let recent: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM job
                 WHERE queue = $1
                   AND singleton_key = $2
                   AND created_at > clock_timestamp() - make_interval(secs => $3::int)
             )",
        )
        .bind(queue)
        .bind(key)
        .bind(throttle_secs)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if recent {
            tx.rollback().await.map_err(Error::Database)?;
            debug!(queue, key, throttle_secs, "Throttled send suppressed");
            return Ok(None);
        }

        let id = Self::insert_job(&mut *tx, queue, data, options, Some(key)).await?;
        // NOW() is the transaction start; the window is measured from the insert
        sqlx::query("UPDATE job SET created_at = clock_timestamp() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(job_id = %id, queue, key, "Throttled job sent");
        Ok(Some(id))
    }

    async fn claim_next(&self, queues: &[String]) -> Result<Option<Job>> {
        if queues.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(&format!(
            "UPDATE job
             SET state = 'active', started_at = NOW()
             WHERE id = (
                 SELECT id FROM job
                 WHERE queue = ANY($1)
                   AND state IN ('created', 'retry')
                   AND start_after <= NOW()
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(queues)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, job_id: Uuid, output: Option<JsonValue>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job
             SET state = 'completed', output = $2, completed_at = NOW()
             WHERE id = $1 AND state = 'active'",
        )
        .bind(job_id)
        .bind(output)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("active job {}", job_id)));
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE job
             SET state = 'failed', error_message = $2, completed_at = NOW()
             WHERE id = $1 AND state NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("unsettled job {}", job_id)));
        }
        Ok(())
    }

    async fn retry(&self, job_id: Uuid, error: &str) -> Result<JobState> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM job WHERE id = $1 FOR UPDATE",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        let job = Self::parse_job_row(row)?;

        let state = match job.next_retry_delay_secs() {
            Some(delay) => {
                sqlx::query(
                    "UPDATE job
                     SET state = 'retry',
                         retry_count = retry_count + 1,
                         error_message = $2,
                         start_after = NOW() + make_interval(secs => $3::bigint::double precision)
                     WHERE id = $1",
                )
                .bind(job_id)
                .bind(error)
                .bind(delay)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                debug!(
                    job_id = %job_id,
                    retry_count = job.retry_count + 1,
                    delay_secs = delay,
                    "Job scheduled for retry"
                );
                JobState::Retry
            }
            None => {
                sqlx::query(
                    "UPDATE job
                     SET state = 'failed', error_message = $2, completed_at = NOW()
                     WHERE id = $1",
                )
                .bind(job_id)
                .bind(error)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                warn!(
                    job_id = %job_id,
                    retry_count = job.retry_count,
                    "Job exhausted its retries"
                );
                JobState::Failed
            }
        };

        tx.commit().await.map_err(Error::Database)?;
        Ok(state)
    }

    async fn maintain(&self) -> Result<MaintenanceReport> {
        let mut report = MaintenanceReport::default();

        let abandoned: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM job
             WHERE state = 'active'
               AND started_at < NOW() - make_interval(secs => expire_secs)",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        for job_id in abandoned {
            match self.retry(job_id, "job expired while active").await {
                Ok(_) => report.requeued += 1,
                Err(e) => warn!(job_id = %job_id, error = %e, "Failed to requeue abandoned job"),
            }
        }

        report.deleted = sqlx::query(
            "DELETE FROM job
             WHERE state IN ('completed', 'failed', 'cancelled')
               AND keep_until < NOW()",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        report.expired = sqlx::query(
            "UPDATE job
             SET state = 'failed', error_message = 'expired before it was processed',
                 completed_at = NOW()
             WHERE state IN ('created', 'retry')
               AND keep_until < NOW()",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if report != MaintenanceReport::default() {
            info!(
                requeued = report.requeued,
                expired = report.expired,
                deleted = report.deleted,
                "Job queue maintenance"
            );
        }
        Ok(report)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {} FROM job WHERE id = $1", JOB_COLUMNS))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                 COUNT(*) FILTER (WHERE state = 'created') AS created,
                 COUNT(*) FILTER (WHERE state = 'active') AS active,
                 COUNT(*) FILTER (WHERE state = 'retry') AS retry,
                 COUNT(*) FILTER (WHERE state = 'completed') AS completed,
                 COUNT(*) FILTER (WHERE state = 'failed') AS failed,
                 COUNT(*) FILTER (WHERE state = 'cancelled') AS cancelled
             FROM job
             WHERE queue = $1",
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            queue: queue.to_string(),
            created: row.get("created"),
            active: row.get("active"),
            retry: row.get("retry"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            cancelled: row.get("cancelled"),
        })
    }
}
