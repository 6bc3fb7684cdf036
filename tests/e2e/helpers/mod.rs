use audiobook_pipeline::controllers::health::HealthController;
use audiobook_pipeline::domain::cache::ChunkCache;
use audiobook_pipeline::domain::job::{JobService, Pipeline, PipelineSettings};
use audiobook_pipeline::domain::tts::{RetryPolicy, SynthesisGateway};
use audiobook_pipeline::infrastructure::config::{Config, LogFormat};
use audiobook_pipeline::infrastructure::db::{create_pool, run_migrations, DbPool};
use audiobook_pipeline::infrastructure::repositories::{
    ChunkStoreRepository, JobRepository, PlainTextExtractor, TtsRepository, WavBundleAssembler,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_context::AsyncTestContext;

pub mod fake_tts;
pub mod fixtures;

pub use fake_tts::FakeTts;

/// A complete pipeline over an isolated data directory.
///
/// Speech calls go to a scripted `FakeTts` unless another repository is
/// injected with `with_tts_repository`.
pub struct TestContext {
    pub dir: TempDir,
    pub config: Config,
    pub pool: Arc<DbPool>,
    pub tts: Arc<FakeTts>,
    pub job_repo: Arc<JobRepository>,
    pub chunk_store: Arc<ChunkStoreRepository>,
    pub service: Arc<JobService>,
    pub health: HealthController,
    tts_repo: Arc<dyn TtsRepository>,
}

pub fn test_config(data_dir: &Path) -> Config {
    Config {
        database_url: format!("sqlite://{}", data_dir.join("jobs.db").display()),
        data_dir: data_dir.to_path_buf(),
        log_format: LogFormat::Pretty,
        tts_base_url: "http://127.0.0.1:9".to_string(),
        stt_base_url: "http://127.0.0.1:9".to_string(),
        stt_model: "large-v3-turbo".to_string(),
        tts_request_timeout_secs: 5,
        tts_max_attempts: 3,
        tts_backoff_base_secs: 0,
        // One sentence per unit for the fixture books
        chunk_target_words: 5,
        chunk_max_words: 20,
        cache_memory_capacity: 64,
        max_upload_bytes: 1024 * 1024,
    }
}

impl TestContext {
    pub async fn new() -> Self {
        let tts = Arc::new(FakeTts::new());
        Self::build(tts.clone(), tts).await
    }

    pub async fn with_tts_repository(tts_repo: Arc<dyn TtsRepository>) -> Self {
        Self::build(Arc::new(FakeTts::new()), tts_repo).await
    }

    async fn build(tts: Arc<FakeTts>, tts_repo: Arc<dyn TtsRepository>) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create data directory");
        let config = test_config(dir.path());
        let parts = Parts::open(&config, tts_repo.clone()).await;

        Self {
            dir,
            config,
            pool: parts.pool,
            tts,
            job_repo: parts.job_repo,
            chunk_store: parts.chunk_store,
            service: parts.service,
            health: parts.health,
            tts_repo,
        }
    }

    /// Simulate a process restart over the same data directory: fresh pool,
    /// empty in-memory cache, interrupted jobs failed
    pub async fn restart(&mut self) {
        self.pool.close().await;
        let parts = Parts::open(&self.config, self.tts_repo.clone()).await;
        // The previous process is gone, so its jobs are stale right away
        parts
            .job_repo
            .fail_interrupted(Duration::ZERO)
            .await
            .expect("Failed to fail interrupted jobs");

        self.pool = parts.pool;
        self.job_repo = parts.job_repo;
        self.chunk_store = parts.chunk_store;
        self.service = parts.service;
        self.health = parts.health;
    }

    /// A second live process over the same data directory and speech service
    pub async fn open_process(&self) -> Parts {
        Parts::open(&self.config, self.tts_repo.clone()).await
    }
}

/// Everything one process builds at startup
pub struct Parts {
    pub pool: Arc<DbPool>,
    pub job_repo: Arc<JobRepository>,
    pub chunk_store: Arc<ChunkStoreRepository>,
    pub service: Arc<JobService>,
    pub health: HealthController,
}

impl Parts {
    async fn open(config: &Config, tts_repo: Arc<dyn TtsRepository>) -> Self {
        let pool = create_pool(&config.database_url)
            .await
            .expect("Failed to open job store");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let pool = Arc::new(pool);

        let job_repo = Arc::new(JobRepository::new(pool.clone()));
        let chunk_store = Arc::new(ChunkStoreRepository::new(
            pool.clone(),
            config.cache_dir(),
        ));

        let gateway = Arc::new(SynthesisGateway::new(
            tts_repo.clone(),
            RetryPolicy::new(config.tts_max_attempts, Duration::from_millis(10)),
        ));
        let cache = Arc::new(ChunkCache::new(chunk_store.clone(), config.cache_memory_capacity));
        let pipeline = Arc::new(Pipeline::new(
            job_repo.clone(),
            Arc::new(PlainTextExtractor),
            Arc::new(WavBundleAssembler),
            gateway,
            cache,
            PipelineSettings {
                chunk_target_words: config.chunk_target_words,
                chunk_max_words: config.chunk_max_words,
                output_dir: config.output_dir(),
            },
        ));
        let service = Arc::new(JobService::new(
            job_repo.clone(),
            pipeline,
            config.uploads_dir(),
            config.max_upload_bytes,
        ));
        let health = HealthController::new(pool.clone(), tts_repo, config.max_upload_bytes);

        Self {
            pool,
            job_repo,
            chunk_store,
            service,
            health,
        }
    }
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async { TestContext::new().await }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            self.pool.close().await;
            // Data directory is removed when `dir` drops
        }
    }
}
