//! In-memory repositories for resolver and worker tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use hoard_core::{
    ArchiveRepository, BookmarkRepository, BookmarkUpdate, EpisodeRepository, EpisodeUpdate,
    Error, FeedEpisode, Job, JobRepository, JobState, MaintenanceReport, Medium, QueuePolicy,
    QueueStats, ReadableArticle, ResolvedEpisode, Result, SendOptions, SrcType,
};

// =============================================================================
// RESOLUTION ROWS
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct BookmarkRow {
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveRow {
    pub owner_id: Uuid,
    pub title: Option<String>,
    pub text_content: Option<String>,
    pub length: Option<i32>,
    pub ready: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EpisodeRow {
    pub owner_id: Uuid,
    pub url: String,
    pub medium: Medium,
    pub entity_type: String,
    pub title: Option<String>,
    pub size_in_bytes: Option<i64>,
    pub duration_in_seconds: Option<i32>,
    pub author: Option<String>,
    pub ext: Option<String>,
    pub src_type: Option<SrcType>,
    pub ready: bool,
    pub error: Option<String>,
}

/// Bookmark, archive and episode rows keyed by id.
#[derive(Default)]
pub struct MemoryStore {
    pub bookmarks: Mutex<HashMap<Uuid, BookmarkRow>>,
    pub archives: Mutex<HashMap<Uuid, ArchiveRow>>,
    pub episodes: Mutex<HashMap<Uuid, EpisodeRow>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every successful-path write fail as if the database went away.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Internal("connection refused".into()))
        } else {
            Ok(())
        }
    }

    pub fn add_bookmark(&self, owner_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.bookmarks.lock().unwrap().insert(
            id,
            BookmarkRow {
                owner_id,
                ..Default::default()
            },
        );
        id
    }

    pub fn add_archive(&self, owner_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.archives.lock().unwrap().insert(
            id,
            ArchiveRow {
                owner_id,
                ..Default::default()
            },
        );
        id
    }

    pub fn add_episode(&self, owner_id: Uuid, url: &str, medium: Medium) -> Uuid {
        let id = Uuid::new_v4();
        self.episodes.lock().unwrap().insert(
            id,
            EpisodeRow {
                owner_id,
                url: url.to_string(),
                medium,
                entity_type: "redirect".to_string(),
                title: None,
                size_in_bytes: None,
                duration_in_seconds: None,
                author: None,
                ext: None,
                src_type: None,
                ready: false,
                error: None,
            },
        );
        id
    }

    pub fn bookmark(&self, id: Uuid) -> BookmarkRow {
        self.bookmarks.lock().unwrap()[&id].clone()
    }

    pub fn archive(&self, id: Uuid) -> ArchiveRow {
        self.archives.lock().unwrap()[&id].clone()
    }

    pub fn episode(&self, id: Uuid) -> EpisodeRow {
        self.episodes.lock().unwrap()[&id].clone()
    }
}

fn not_found(kind: &str, id: Uuid) -> Error {
    Error::NotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl BookmarkRepository for MemoryStore {
    async fn apply_metadata(
        &self,
        owner_id: Uuid,
        bookmark_id: Uuid,
        update: &BookmarkUpdate,
    ) -> Result<()> {
        self.check_writes()?;
        let mut rows = self.bookmarks.lock().unwrap();
        let row = rows
            .get_mut(&bookmark_id)
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| not_found("bookmark", bookmark_id))?;
        if let Some(title) = &update.title {
            row.title = Some(title.clone());
        }
        if let Some(summary) = &update.summary {
            row.summary = Some(summary.clone());
        }
        if let Some(tags) = &update.tags {
            row.tags = tags.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl ArchiveRepository for MemoryStore {
    async fn store_snapshot(
        &self,
        owner_id: Uuid,
        archive_id: Uuid,
        article: &ReadableArticle,
    ) -> Result<()> {
        self.check_writes()?;
        let mut rows = self.archives.lock().unwrap();
        let row = rows
            .get_mut(&archive_id)
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| not_found("archive", archive_id))?;
        if article.title.is_some() {
            row.title = article.title.clone();
        }
        if article.text_content.is_some() {
            row.text_content = article.text_content.clone();
        }
        if article.length.is_some() {
            row.length = article.length;
        }
        row.ready = true;
        Ok(())
    }

    async fn mark_failed(&self, owner_id: Uuid, archive_id: Uuid, error: &str) -> Result<()> {
        let mut rows = self.archives.lock().unwrap();
        let row = rows
            .get_mut(&archive_id)
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| not_found("archive", archive_id))?;
        row.error = Some(error.to_string());
        row.ready = true;
        Ok(())
    }
}

#[async_trait]
impl EpisodeRepository for MemoryStore {
    async fn apply_resolution(
        &self,
        owner_id: Uuid,
        episode_id: Uuid,
        update: &EpisodeUpdate,
    ) -> Result<ResolvedEpisode> {
        self.check_writes()?;
        let mut rows = self.episodes.lock().unwrap();
        let row = rows
            .get_mut(&episode_id)
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| not_found("episode", episode_id))?;
        row.url = update.url.clone();
        if update.title.is_some() {
            row.title = update.title.clone();
        }
        if update.size_in_bytes.is_some() {
            row.size_in_bytes = update.size_in_bytes;
        }
        if update.duration_in_seconds.is_some() {
            row.duration_in_seconds = update.duration_in_seconds;
        }
        if update.author.is_some() {
            row.author = update.author.clone();
        }
        if update.ext.is_some() {
            row.ext = update.ext.clone();
        }
        if update.src_type.is_some() {
            row.src_type = update.src_type;
        }
        row.ready = true;
        row.error = None;
        Ok(ResolvedEpisode {
            entity_type: row.entity_type.clone(),
            medium: row.medium,
        })
    }

    async fn mark_failed(&self, owner_id: Uuid, episode_id: Uuid, error: &str) -> Result<()> {
        let mut rows = self.episodes.lock().unwrap();
        let row = rows
            .get_mut(&episode_id)
            .filter(|r| r.owner_id == owner_id)
            .ok_or_else(|| not_found("episode", episode_id))?;
        row.error = Some(error.to_string());
        Ok(())
    }

    async fn find_feed_episode(
        &self,
        _feed_id: Uuid,
        episode_id: Uuid,
        _token: &str,
    ) -> Result<Option<FeedEpisode>> {
        let rows = self.episodes.lock().unwrap();
        Ok(rows.get(&episode_id).map(|row| FeedEpisode {
            owner_id: row.owner_id,
            episode_id,
            url: row.url.clone(),
            entity_type: row.entity_type.clone(),
            medium: row.medium,
            ready: row.ready,
        }))
    }
}

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Job queue kept in memory, following the PostgreSQL repository's state
/// transitions.
#[derive(Default)]
pub struct MemoryJobRepository {
    queues: Mutex<HashMap<String, QueuePolicy>>,
    jobs: Mutex<Vec<Job>>,
}

impl MemoryJobRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn policy(&self, queue: &str) -> Option<QueuePolicy> {
        self.queues.lock().unwrap().get(queue).copied()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn job(&self, id: Uuid) -> Job {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .expect("job exists")
    }

    /// Push a job's `created_at` into the past.
    pub fn age_job(&self, id: Uuid, secs: i64) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.created_at -= ChronoDuration::seconds(secs);
            if let Some(started) = job.started_at.as_mut() {
                *started -= ChronoDuration::seconds(secs);
            }
        }
    }

    fn build_job(
        &self,
        queue: &str,
        data: JsonValue,
        options: &SendOptions,
        key: Option<&str>,
    ) -> Result<Job> {
        let policy = self
            .policy(queue)
            .ok_or_else(|| Error::NotFound(format!("queue {}", queue)))?;
        let now = Utc::now();
        Ok(Job {
            id: hoard_core::new_v7(),
            queue: queue.to_string(),
            state: JobState::Created,
            data,
            priority: options.priority,
            retry_count: 0,
            retry_limit: options.retry_limit.unwrap_or(policy.retry_limit),
            retry_delay_secs: options.retry_delay_secs.unwrap_or(policy.retry_delay_secs),
            retry_backoff: options.retry_backoff.unwrap_or(policy.retry_backoff),
            start_after: now
                + ChronoDuration::seconds(i64::from(options.start_after_secs.unwrap_or(0))),
            expire_secs: policy.expire_secs,
            singleton_key: key.map(str::to_string),
            keep_until: now + ChronoDuration::seconds(i64::from(policy.retention_secs)),
            output: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    fn settle(&self, job_id: Uuid, check: fn(JobState) -> bool, apply: impl FnOnce(&mut Job)) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id && check(j.state))
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        apply(job);
        Ok(())
    }

    fn retry_locked(job: &mut Job, error: &str) -> JobState {
        let now = Utc::now();
        job.error_message = Some(error.to_string());
        match job.next_retry_delay_secs() {
            Some(delay) => {
                job.state = JobState::Retry;
                job.retry_count += 1;
                job.start_after = now + ChronoDuration::seconds(delay);
            }
            None => {
                job.state = JobState::Failed;
                job.completed_at = Some(now);
            }
        }
        job.state
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn create_queue(&self, name: &str, policy: &QueuePolicy) -> Result<()> {
        self.queues
            .lock()
            .unwrap()
            .insert(name.to_string(), *policy);
        Ok(())
    }

    async fn send(&self, queue: &str, data: JsonValue, options: &SendOptions) -> Result<Uuid> {
        let job = self.build_job(queue, data, options, None)?;
        let id = job.id;
        self.jobs.lock().unwrap().push(job);
        Ok(id)
    }

    async fn insert(
        &self,
        queue: &str,
        data: Vec<JsonValue>,
        options: &SendOptions,
    ) -> Result<Vec<Uuid>> {
        let built = data
            .into_iter()
            .map(|d| self.build_job(queue, d, options, None))
            .collect::<Result<Vec<_>>>()?;
        let ids = built.iter().map(|j| j.id).collect();
        self.jobs.lock().unwrap().extend(built);
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
        let window_start = Utc::now() - ChronoDuration::seconds(i64::from(throttle_secs));
        let job = self.build_job(queue, data, options, Some(key))?;
        let mut jobs = self.jobs.lock().unwrap();
        let recent = jobs.iter().any(|j| {
            j.queue == queue && j.singleton_key.as_deref() == Some(key) && j.created_at > window_start
        });
        if recent {
            return Ok(None);
        }
        let id = job.id;
        jobs.push(job);
        Ok(Some(id))
    }

    async fn claim_next(&self, queues: &[String]) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs
            .iter_mut()
            .filter(|j| queues.contains(&j.queue) && j.state.is_queued() && j.start_after <= now)
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });
        Ok(next.map(|job| {
            job.state = JobState::Active;
            job.started_at = Some(now);
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid, output: Option<JsonValue>) -> Result<()> {
        self.settle(job_id, |s| s == JobState::Active, |job| {
            job.state = JobState::Completed;
            job.output = output;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        self.settle(job_id, |s| !s.is_settled(), |job| {
            job.state = JobState::Failed;
            job.error_message = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        })
    }

    async fn retry(&self, job_id: Uuid, error: &str) -> Result<JobState> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id && !j.state.is_settled())
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        Ok(Self::retry_locked(job, error))
    }

    async fn maintain(&self) -> Result<MaintenanceReport> {
        let now = Utc::now();
        let mut report = MaintenanceReport::default();
        let mut jobs = self.jobs.lock().unwrap();
        for job in jobs.iter_mut() {
            let stale = job.state == JobState::Active
                && job
                    .started_at
                    .is_some_and(|s| s + ChronoDuration::seconds(i64::from(job.expire_secs)) < now);
            if stale {
                Self::retry_locked(job, "job expired while active");
                report.requeued += 1;
            }
        }
        let before = jobs.len();
        jobs.retain(|j| !(j.state.is_settled() && j.keep_until < now));
        report.deleted = (before - jobs.len()) as u64;
        for job in jobs.iter_mut() {
            if job.state.is_queued() && job.keep_until < now {
                job.state = JobState::Failed;
                job.error_message = Some("job expired before it could run".into());
                report.expired += 1;
            }
        }
        Ok(report)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == job_id).cloned())
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = QueueStats {
            queue: queue.to_string(),
            ..Default::default()
        };
        for job in jobs.iter().filter(|j| j.queue == queue) {
            match job.state {
                JobState::Created => stats.created += 1,
                JobState::Active => stats.active += 1,
                JobState::Retry => stats.retry += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}
