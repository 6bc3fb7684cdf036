use audiobook_pipeline::controllers::health::HealthController;
use audiobook_pipeline::controllers::jobs::{ConvertArgs, JobController};
use audiobook_pipeline::domain::job::{JobResponse, JobStatus, OWNER_STALE_AFTER};
use audiobook_pipeline::error::{AppError, AppResult};
use audiobook_pipeline::infrastructure::config::{Config, LogFormat};
use audiobook_pipeline::infrastructure::db::{create_pool, run_migrations};
use audiobook_pipeline::infrastructure::repositories::{
    ChunkStoreRepository, JobRepository, PlainTextExtractor, QwenTtsRepository, TtsRepository,
    WavBundleAssembler,
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Turn documents into narrated audiobooks
#[derive(Parser, Debug)]
#[command(name = "audiobook-pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a document and wait for the audiobook
    Convert(ConvertArgs),
    /// List all jobs, newest first
    List,
    /// Show one job with its progress
    Status { job_id: Uuid },
    /// Cancel a running job
    Cancel { job_id: Uuid },
    /// Delete a job with its upload and output; cached audio is kept
    Delete { job_id: Uuid },
    /// Run a finished job again from its stored upload, reusing cached audio
    Resubmit { job_id: Uuid },
    /// Check the job store and the speech service
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    match run(cli.command, config).await {
        Ok((output, code)) => {
            println!("{}", output);
            std::process::exit(code);
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            let body = serde_json::to_string(&e.to_response()).unwrap_or_else(|_| e.to_string());
            eprintln!("{}", body);
            std::process::exit(e.exit_code());
        }
    }
}

/// Wire dependencies, run one command, and return its JSON output with the
/// process exit code
async fn run(command: Command, config: Config) -> AppResult<(String, i32)> {
    for dir in [config.uploads_dir(), config.output_dir(), config.cache_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }

    // Open the job store
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    tracing::debug!(database_url = %config.database_url, "Job store opened");

    let pool = Arc::new(pool);

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Instantiate repositories (inject db pool and clients)
    let job_repo = Arc::new(JobRepository::new(pool.clone()));
    let chunk_store = Arc::new(ChunkStoreRepository::new(pool.clone(), config.cache_dir()));
    let tts_repo: Arc<dyn TtsRepository> = Arc::new(
        QwenTtsRepository::new(
            config.tts_base_url.clone(),
            config.stt_base_url.clone(),
            config.stt_model.clone(),
            config.tts_request_timeout(),
        )
        .map_err(|e| AppError::Internal(format!("failed to build speech client: {}", e)))?,
    );
    let extractor = Arc::new(PlainTextExtractor);
    let assembler = Arc::new(WavBundleAssembler);

    // 2. Instantiate domain services (inject repositories)
    let gateway = Arc::new(audiobook_pipeline::domain::tts::SynthesisGateway::new(
        tts_repo.clone(),
        audiobook_pipeline::domain::tts::RetryPolicy::new(
            config.tts_max_attempts,
            config.tts_backoff_base(),
        ),
    ));
    let cache = Arc::new(audiobook_pipeline::domain::cache::ChunkCache::new(
        chunk_store,
        config.cache_memory_capacity,
    ));
    let pipeline = Arc::new(audiobook_pipeline::domain::job::Pipeline::new(
        job_repo.clone(),
        extractor,
        assembler,
        gateway,
        cache,
        audiobook_pipeline::domain::job::PipelineSettings {
            chunk_target_words: config.chunk_target_words,
            chunk_max_words: config.chunk_max_words,
            output_dir: config.output_dir(),
        },
    ));
    let job_service = Arc::new(audiobook_pipeline::domain::job::JobService::new(
        job_repo.clone(),
        pipeline,
        config.uploads_dir(),
        config.max_upload_bytes,
    ));

    // 3. Instantiate controllers (inject services)
    let job_controller = JobController::new(job_service);
    let health_controller = HealthController::new(pool.clone(), tts_repo, config.max_upload_bytes);

    // Jobs whose process stopped sending heartbeats can no longer make progress
    if !matches!(command, Command::Health) {
        job_repo.fail_interrupted(OWNER_STALE_AFTER).await?;
    }

    let result = match command {
        Command::Convert(args) => job_controller
            .convert(args)
            .await
            .and_then(|job| finished(&job)),
        Command::Resubmit { job_id } => job_controller
            .resubmit(job_id)
            .await
            .and_then(|job| finished(&job)),
        Command::List => job_controller
            .list()
            .await
            .and_then(|jobs| succeeded(&jobs)),
        Command::Status { job_id } => job_controller
            .status(job_id)
            .await
            .and_then(|job| succeeded(&job)),
        Command::Cancel { job_id } => job_controller
            .cancel(job_id)
            .await
            .and_then(|job| succeeded(&job)),
        Command::Delete { job_id } => job_controller
            .delete(job_id)
            .await
            .map(|_| (serde_json::json!({ "deleted": job_id }).to_string(), 0)),
        Command::Health => {
            let (ready, report) = health_controller.health_ready().await;
            render(&report).map(|out| (out, if ready { 0 } else { 4 }))
        }
    };

    job_repo.close().await;
    result
}

fn render<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::Internal(e.to_string()))
}

fn succeeded<T: serde::Serialize>(value: &T) -> AppResult<(String, i32)> {
    render(value).map(|out| (out, 0))
}

/// Output of a followed job; anything but completion is a failure exit
fn finished(job: &JobResponse) -> AppResult<(String, i32)> {
    let code = match job.status {
        JobStatus::Completed => 0,
        JobStatus::Canceled => 130,
        _ => 1,
    };
    render(job).map(|out| (out, code))
}

fn init_logging(config: &Config) {
    // stdout carries command output; logs go to stderr
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "audiobook_pipeline=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "audiobook_pipeline=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
