//! Worker, queue handle and handler tests against the in-memory job queue.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{MemoryJobRepository, MemoryStore};
use hoard_core::{
    CacheConfig, JobRepository, JobState, MediaMetadata, Medium, QueueOverrides,
    ResolveArchivePayload, ResolveEpisodePayload, ResultCache, SendOptions,
};
use hoard_extract::mock::{MockMediaResolver, MockPageFetcher, StaticReadability};
use hoard_jobs::{
    register_queues, ArchiveResolver, EpisodeResolver, JobContext, JobHandler, JobResult,
    NoOpHandler, Queue, ResolutionTriggers, ResolveArchiveHandler, ResolveEpisodeHandler,
    WorkerBuilder, WorkerConfig, WorkerEvent, RESOLVE_ARCHIVE, RESOLVE_BOOKMARK,
    RESOLVE_EPISODE,
};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::timeout;
use uuid::Uuid;

fn fast_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_poll_interval(10)
        .with_max_concurrent(2)
}

/// Wait for the first event matching `pred`.
async fn wait_for<F>(events: &mut broadcast::Receiver<WorkerEvent>, mut pred: F) -> WorkerEvent
where
    F: FnMut(&WorkerEvent) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for worker event")
}

struct CountingHandler {
    queue: &'static str,
    calls: Arc<AtomicUsize>,
    result: fn() -> JobResult,
}

#[async_trait]
impl JobHandler for CountingHandler {
    fn queue(&self) -> &str {
        self.queue
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.result)()
    }
}

struct PanickingHandler;

#[async_trait]
impl JobHandler for PanickingHandler {
    fn queue(&self) -> &str {
        "panics"
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        panic!("handler blew up");
    }
}

struct SlowHandler;

#[async_trait]
impl JobHandler for SlowHandler {
    fn queue(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        tokio::time::sleep(Duration::from_secs(30)).await;
        JobResult::Success(None)
    }
}

#[tokio::test]
async fn test_register_queues_is_idempotent() {
    let repo = MemoryJobRepository::new();
    register_queues(repo.clone()).await.unwrap();
    let queues = register_queues(repo.clone()).await.unwrap();

    assert_eq!(queues.bookmark.name(), RESOLVE_BOOKMARK);
    assert_eq!(queues.archive.name(), RESOLVE_ARCHIVE);
    assert_eq!(queues.episode.name(), RESOLVE_EPISODE);

    let policy = repo.policy(RESOLVE_BOOKMARK).unwrap();
    assert_eq!(policy.retry_limit, 3);
    assert!(policy.retry_backoff);
    assert_eq!(policy.retention_secs, 7 * 24 * 60 * 60);
}

#[tokio::test]
async fn test_queue_overrides_and_bulk_insert() {
    let repo = MemoryJobRepository::new();
    let queue: Queue<ResolveArchivePayload> = Queue::create(
        repo.clone(),
        "bulk",
        QueueOverrides {
            retry_limit: Some(7),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(queue.policy().retry_limit, 7);

    let payloads: Vec<ResolveArchivePayload> = (0..3)
        .map(|i| ResolveArchivePayload {
            user_id: Uuid::new_v4(),
            archive_id: Uuid::new_v4(),
            url: format!("https://example.com/{i}"),
        })
        .collect();
    let ids = queue.insert(&payloads, &SendOptions::default()).await.unwrap();

    assert_eq!(ids.len(), 3);
    let job = repo.job(ids[0]);
    assert_eq!(job.retry_limit, 7);
    assert_eq!(job.data["url"], json!("https://example.com/0"));
}

#[tokio::test]
async fn test_retrigger_is_throttled_per_entity() {
    let repo = MemoryJobRepository::new();
    let triggers = ResolutionTriggers::new(register_queues(repo.clone()).await.unwrap());

    let payload = ResolveEpisodePayload {
        user_id: Uuid::new_v4(),
        episode_id: Uuid::new_v4(),
        url: "https://video.example.com/1".into(),
        medium: Medium::Audio,
        bookmark_title: None,
    };
    let first = triggers.retry_episode(&payload).await.unwrap();
    let second = triggers.retry_episode(&payload).await.unwrap();
    assert!(first.is_some());
    assert!(second.is_none());

    // A different episode is not affected.
    let other = ResolveEpisodePayload {
        episode_id: Uuid::new_v4(),
        ..payload.clone()
    };
    assert!(triggers.retry_episode(&other).await.unwrap().is_some());

    // Once the window has passed a new job is accepted.
    repo.age_job(first.unwrap(), 120);
    assert!(triggers.retry_episode(&payload).await.unwrap().is_some());

    let stats = repo.queue_stats(RESOLVE_EPISODE).await.unwrap();
    assert_eq!(stats.created, 3);
    let key = repo.job(first.unwrap()).singleton_key;
    assert_eq!(key, Some(format!("episode:{}", payload.episode_id)));
}

#[tokio::test]
async fn test_worker_completes_job() {
    let repo = MemoryJobRepository::new();
    repo.create_queue("noop", &Default::default()).await.unwrap();
    let job_id = repo
        .send("noop", json!({}), &SendOptions::default())
        .await
        .unwrap();

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config())
        .with_handler(NoOpHandler::new("noop"))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    wait_for(&mut events, |e| {
        matches!(e, WorkerEvent::JobCompleted { job_id: id, .. } if *id == job_id)
    })
    .await;
    handle.shutdown().await.unwrap();

    assert_eq!(repo.job(job_id).state, JobState::Completed);
}

#[tokio::test]
async fn test_failed_result_is_terminal() {
    let repo = MemoryJobRepository::new();
    repo.create_queue("bad", &Default::default()).await.unwrap();
    let job_id = repo
        .send("bad", json!({}), &SendOptions::default())
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config())
        .with_handler(CountingHandler {
            queue: "bad",
            calls: calls.clone(),
            result: || JobResult::Failed("invalid payload".into()),
        })
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let event = wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { .. })).await;
    handle.shutdown().await.unwrap();

    assert!(matches!(event, WorkerEvent::JobFailed { retrying: false, .. }));
    let job = repo.job(job_id);
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error_message.as_deref(), Some("invalid payload"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_result_exhausts_retry_limit() {
    let repo = MemoryJobRepository::new();
    repo.create_queue("flaky", &Default::default()).await.unwrap();
    let options = SendOptions {
        retry_limit: Some(1),
        retry_delay_secs: Some(0),
        ..Default::default()
    };
    let job_id = repo.send("flaky", json!({}), &options).await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config())
        .with_handler(CountingHandler {
            queue: "flaky",
            calls: calls.clone(),
            result: || JobResult::Retry("connection reset".into()),
        })
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { retrying: true, .. })).await;
    wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { retrying: false, .. })).await;
    handle.shutdown().await.unwrap();

    let job = repo.job(job_id);
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.retry_count, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_panicking_handler_goes_through_retry() {
    let repo = MemoryJobRepository::new();
    repo.create_queue("panics", &Default::default()).await.unwrap();
    let job_id = repo
        .send("panics", json!({}), &SendOptions::default())
        .await
        .unwrap();

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config())
        .with_handler(PanickingHandler)
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let event = wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { .. })).await;
    handle.shutdown().await.unwrap();

    match event {
        WorkerEvent::JobFailed { error, retrying, .. } => {
            assert!(error.contains("panicked"));
            assert!(retrying);
        }
        other => panic!("unexpected event {other:?}"),
    }
    let job = repo.job(job_id);
    assert_eq!(job.state, JobState::Retry);
    assert_eq!(job.retry_count, 1);
}

#[tokio::test]
async fn test_timed_out_handler_goes_through_retry() {
    let repo = MemoryJobRepository::new();
    repo.create_queue("slow", &Default::default()).await.unwrap();
    let job_id = repo
        .send("slow", json!({}), &SendOptions::default().with_retry_limit(0))
        .await
        .unwrap();

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config().with_job_timeout(Duration::from_millis(50)))
        .with_handler(SlowHandler)
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let event = wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { .. })).await;
    handle.shutdown().await.unwrap();

    assert!(matches!(
        event,
        WorkerEvent::JobFailed { ref error, retrying: false, .. } if error.contains("timeout")
    ));
    assert_eq!(repo.job(job_id).state, JobState::Failed);
}

#[tokio::test]
async fn test_worker_runs_maintenance() {
    let repo = MemoryJobRepository::new();
    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config().with_maintenance_interval(Duration::from_millis(20)))
        .with_handler(NoOpHandler::new("idle"))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    wait_for(&mut events, |e| matches!(e, WorkerEvent::Maintenance(_))).await;
    wait_for(&mut events, |e| matches!(e, WorkerEvent::Maintenance(_))).await;
    handle.shutdown().await.unwrap();
    wait_for(&mut events, |e| matches!(e, WorkerEvent::WorkerStopped)).await;
}

#[tokio::test]
async fn test_disabled_worker_claims_nothing() {
    let repo = MemoryJobRepository::new();
    repo.create_queue("noop", &Default::default()).await.unwrap();
    let job_id = repo
        .send("noop", json!({}), &SendOptions::default())
        .await
        .unwrap();

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config().with_enabled(false))
        .with_handler(NoOpHandler::new("noop"))
        .build()
        .await;
    let _handle = worker.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(repo.job(job_id).state, JobState::Created);
}

#[tokio::test]
async fn test_follow_on_handlers() {
    let repo = MemoryJobRepository::new();
    let store = MemoryStore::new();
    let owner_id = Uuid::new_v4();
    let archive_id = store.add_archive(owner_id);
    let episode_id = store.add_episode(owner_id, "https://v.example/1", Medium::Audio);

    let fetcher = MockPageFetcher::new().with_page("https://blog.example/post", "<html></html>");
    let archives = ArchiveResolver::new(
        store.clone(),
        Arc::new(fetcher.clone()),
        Arc::new(StaticReadability::failing()),
    );
    let media = MockMediaResolver::new().with_metadata(
        "https://v.example/1",
        MediaMetadata {
            ext: Some("m4a".into()),
            duration: Some(61.2),
            ..Default::default()
        },
    );
    let episodes = EpisodeResolver::new(
        store.clone(),
        Arc::new(media.clone()),
        ResultCache::new(&CacheConfig::default()),
    );

    let queues = register_queues(repo.clone()).await.unwrap();
    let archive_job = queues
        .archive
        .send(
            &ResolveArchivePayload {
                user_id: owner_id,
                archive_id,
                url: "https://blog.example/post".into(),
            },
            &SendOptions::default(),
        )
        .await
        .unwrap();
    let episode_job = queues
        .episode
        .send(
            &ResolveEpisodePayload {
                user_id: owner_id,
                episode_id,
                url: "https://v.example/1".into(),
                medium: Medium::Audio,
                bookmark_title: None,
            },
            &SendOptions::default(),
        )
        .await
        .unwrap();

    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config())
        .with_handler(ResolveArchiveHandler::new(archives))
        .with_handler(ResolveEpisodeHandler::new(episodes))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    let mut completed = Vec::new();
    while completed.len() < 2 {
        if let WorkerEvent::JobCompleted { job_id, .. } =
            wait_for(&mut events, |e| matches!(e, WorkerEvent::JobCompleted { .. })).await
        {
            completed.push(job_id);
        }
    }
    handle.shutdown().await.unwrap();

    assert!(completed.contains(&archive_job));
    assert!(completed.contains(&episode_job));

    // The archive failed to extract, yet the job completed and the row is terminal.
    let archive = store.archive(archive_id);
    assert!(archive.ready);
    assert!(archive.error.is_some());
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(repo.job(archive_job).output.unwrap()["ok"], json!(false));

    let episode = store.episode(episode_id);
    assert!(episode.ready);
    assert_eq!(episode.duration_in_seconds, Some(61));
    assert_eq!(media.calls(), vec![("https://v.example/1".to_string(), Medium::Audio)]);
}

#[tokio::test]
async fn test_malformed_payload_fails_job() {
    let repo = MemoryJobRepository::new();
    let store = MemoryStore::new();
    let queues = register_queues(repo.clone()).await.unwrap();
    let job_id = repo
        .send(queues.archive.name(), json!({ "url": 1 }), &SendOptions::default())
        .await
        .unwrap();

    let archives = ArchiveResolver::new(
        store,
        Arc::new(MockPageFetcher::new()),
        Arc::new(StaticReadability::failing()),
    );
    let worker = WorkerBuilder::new(repo.clone())
        .with_config(fast_config())
        .with_handler(ResolveArchiveHandler::new(archives))
        .build()
        .await;
    let handle = worker.start();
    let mut events = handle.events();

    wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { .. })).await;
    handle.shutdown().await.unwrap();

    let job = repo.job(job_id);
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error_message.unwrap().contains("invalid payload"));
}
