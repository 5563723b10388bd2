//! hoard-api server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hoard_api::{router, AppState};
use hoard_core::{
    defaults, ArchiveRepository, BookmarkRepository, CacheConfig, EpisodeRepository,
    JobRepository, MediaResolver, PageFetcher, ResultCache,
};
use hoard_db::{log_pool_metrics, Database, PoolConfig};
use hoard_extract::{
    HttpPageFetcher, MediaExtractionClient, MediaExtractorConfig, MetadataCache,
    PageFetcherConfig, ScraperMetadataExtractor, ScraperReadability,
};
use hoard_jobs::{
    register_queues, ArchiveResolver, BookmarkMetadataResolver, DirectUrlCache, EpisodeResolver,
    ResolutionOrchestrator, ResolveArchiveHandler, ResolveBookmarkHandler, ResolveEpisodeHandler,
    WorkerBuilder, WorkerConfig, WorkerEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "hoard_api=debug,hoard_jobs=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hoard_api=debug,hoard_jobs=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("hoard-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| defaults::SERVER_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Result caches: extraction responses and resolved direct URLs
    let cache_config = CacheConfig::from_env();
    let metadata_cache: MetadataCache = ResultCache::new(&cache_config);
    let direct_urls: DirectUrlCache = ResultCache::new(&cache_config);
    let _purge_tasks = [
        metadata_cache.spawn_purge_task(cache_config.purge_interval),
        direct_urls.spawn_purge_task(cache_config.purge_interval),
    ];
    info!(
        max_entries = cache_config.max_entries,
        ttl_secs = cache_config.ttl.as_secs(),
        "Result caches initialized"
    );

    // External collaborators
    let extractor_config = MediaExtractorConfig::from_env();
    let media: Arc<dyn MediaResolver> =
        Arc::new(MediaExtractionClient::new(&extractor_config, metadata_cache)?);
    let fetcher: Arc<dyn PageFetcher> =
        Arc::new(HttpPageFetcher::new(&PageFetcherConfig::from_env())?);

    let bookmarks: Arc<dyn BookmarkRepository> = Arc::new(db.bookmarks.clone());
    let archives: Arc<dyn ArchiveRepository> = Arc::new(db.archives.clone());
    let episodes: Arc<dyn EpisodeRepository> = Arc::new(db.episodes.clone());

    // Queues are created before the worker starts polling them
    let job_repo: Arc<dyn JobRepository> = Arc::new(db.jobs.clone());
    let queues = register_queues(job_repo.clone()).await?;
    info!(
        bookmark = queues.bookmark.name(),
        archive = queues.archive.name(),
        episode = queues.episode.name(),
        "Job queues registered"
    );

    let archive_resolver = ArchiveResolver::new(
        archives,
        fetcher.clone(),
        Arc::new(ScraperReadability::new()),
    );
    let episode_resolver =
        EpisodeResolver::new(episodes.clone(), media.clone(), direct_urls.clone());
    let orchestrator = ResolutionOrchestrator::new(
        fetcher,
        BookmarkMetadataResolver::new(bookmarks, Arc::new(ScraperMetadataExtractor::new())),
        archive_resolver.clone(),
        episode_resolver.clone(),
    );

    let worker_config = WorkerConfig::from_env();
    let worker_handle = if worker_config.enabled {
        info!("Starting job worker...");
        let worker = WorkerBuilder::new(job_repo)
            .with_config(worker_config)
            .with_handler(ResolveBookmarkHandler::new(orchestrator))
            .with_handler(ResolveArchiveHandler::new(archive_resolver))
            .with_handler(ResolveEpisodeHandler::new(episode_resolver))
            .build()
            .await;

        let handle = worker.start();
        info!("Job worker started");

        tokio::spawn(watch_worker_events(handle.events(), db.pool.clone()));
        Some(handle)
    } else {
        info!("Job worker disabled");
        None
    };

    let app = router(AppState::new(episodes, media, direct_urls));

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker_handle {
        info!("Stopping job worker...");
        handle.shutdown().await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Check pool health after every maintenance sweep.
async fn watch_worker_events(mut events: broadcast::Receiver<WorkerEvent>, pool: PgPool) {
    loop {
        match events.recv().await {
            Ok(WorkerEvent::Maintenance(_)) => log_pool_metrics(&pool),
            Ok(WorkerEvent::WorkerStopped) => break,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Worker event listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
