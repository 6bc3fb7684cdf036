use super::error::JobServiceError;
use super::model::{
    ErrorKind, Job, JobConfig, JobStatus, NewJob, OutputFormat, SourceKind, VoiceKind,
};
use super::pipeline::{Pipeline, PipelineInput};
use super::{JobResponse, SubmitJobRequest};
use crate::domain::tts::{LanguageSelection, ReferenceAudio, VoiceSelector};
use crate::infrastructure::repositories::JobRepository;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_VOICE: &str = "Aiden";
pub const DEFAULT_LANGUAGE: &str = "auto";
pub const DEFAULT_OUTPUT_FORMAT: OutputFormat = OutputFormat::Wav;

/// How often a running job proves its process is alive
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Silence after which another process may fail a job as interrupted
pub const OWNER_STALE_AFTER: Duration = Duration::from_secs(30);

const REFERENCE_AUDIO_FILE: &str = "reference.wav";

/// Handle on a pipeline task running in this process
struct RunningJob {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

pub struct JobService {
    job_repo: Arc<JobRepository>,
    pipeline: Arc<Pipeline>,
    uploads_dir: PathBuf,
    max_upload_bytes: usize,
    running: Arc<Mutex<HashMap<Uuid, RunningJob>>>,
}

impl JobService {
    pub fn new(
        job_repo: Arc<JobRepository>,
        pipeline: Arc<Pipeline>,
        uploads_dir: PathBuf,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            job_repo,
            pipeline,
            uploads_dir,
            max_upload_bytes,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
pub trait JobServiceApi: Send + Sync {
    /// Validate the request, store the upload and start the pipeline
    async fn submit(&self, request: SubmitJobRequest) -> Result<JobResponse, JobServiceError>;

    async fn get(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError>;

    /// All jobs, newest first
    async fn list(&self) -> Result<Vec<JobResponse>, JobServiceError>;

    /// Request cancellation; a job that already finished is returned unchanged
    async fn cancel(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError>;

    /// Stop the job if needed, then remove its record, upload and output.
    /// Cache entries stay.
    async fn delete(&self, job_id: Uuid) -> Result<(), JobServiceError>;

    /// Start a new job from a previous job's upload and configuration
    async fn resubmit(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError>;

    /// Wait until the job's pipeline in this process has finished
    async fn wait(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError>;
}

#[async_trait]
impl JobServiceApi for JobService {
    async fn submit(&self, request: SubmitJobRequest) -> Result<JobResponse, JobServiceError> {
        let (filename, source_kind, config) = self.validate(&request)?;
        let job = self
            .start(filename, source_kind, &request.source, config)
            .await?;
        Ok(JobResponse::from_job(&job, Utc::now()))
    }

    async fn get(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError> {
        let job = self.job_repo.get(job_id).await?;
        Ok(JobResponse::from_job(&job, Utc::now()))
    }

    async fn list(&self) -> Result<Vec<JobResponse>, JobServiceError> {
        let now = Utc::now();
        let jobs = self.job_repo.list().await?;
        Ok(jobs.iter().map(|job| JobResponse::from_job(job, now)).collect())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError> {
        let job = self.job_repo.get(job_id).await?;
        if job.status.is_terminal() {
            tracing::info!(job_id = %job_id, status = %job.status, "Job already finished");
            return Ok(JobResponse::from_job(&job, Utc::now()));
        }

        let token = self.running.lock().get(&job_id).map(|r| r.cancel.clone());
        match token {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %job_id, "Cancellation requested");
            }
            None => {
                // Not running here: either never started or owned by another
                // process, which sees the status at its next checkpoint
                self.job_repo.mark_canceled(job_id).await?;
            }
        }

        self.get(job_id).await
    }

    async fn delete(&self, job_id: Uuid) -> Result<(), JobServiceError> {
        let job = self.job_repo.get(job_id).await?;

        let running = self
            .running
            .lock()
            .get(&job_id)
            .map(|r| (r.cancel.clone(), r.done.clone()));
        match running {
            Some((token, mut done)) => {
                token.cancel();
                let _ = done.wait_for(|finished| *finished).await;
            }
            None if !job.status.is_terminal() => {
                self.job_repo.mark_canceled(job_id).await?;
            }
            None => {}
        }

        remove_dir_if_exists(&self.pipeline.output_dir(job_id)).await?;
        remove_dir_if_exists(&self.upload_dir(job_id)).await?;
        self.job_repo.delete(job_id).await?;

        tracing::info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    async fn resubmit(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError> {
        let previous = self.job_repo.get(job_id).await?;
        if !previous.status.is_terminal() {
            return Err(JobServiceError::Validation(format!(
                "job {} is still {}",
                job_id, previous.status
            )));
        }

        let upload_dir = self.upload_dir(job_id);
        let source = read_upload(&upload_dir.join(source_file_name(previous.source_kind))).await?;
        let voice = match previous.voice_kind {
            VoiceKind::Preset => VoiceSelector::Preset(
                previous
                    .voice_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            ),
            VoiceKind::Clone => VoiceSelector::ClonedFrom(ReferenceAudio::new(
                read_upload(&upload_dir.join(REFERENCE_AUDIO_FILE)).await?,
            )),
        };

        let config = JobConfig {
            voice,
            language: previous.language_selection(),
            output_format: previous.output_format,
            reference_transcript: previous.reference_transcript.clone(),
        };

        let job = self
            .start(previous.filename.clone(), previous.source_kind, &source, config)
            .await?;
        tracing::info!(job_id = %job.id, previous_job_id = %job_id, "Job resubmitted");
        Ok(JobResponse::from_job(&job, Utc::now()))
    }

    async fn wait(&self, job_id: Uuid) -> Result<JobResponse, JobServiceError> {
        let done = self.running.lock().get(&job_id).map(|r| r.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.get(job_id).await
    }
}

impl JobService {
    fn upload_dir(&self, job_id: Uuid) -> PathBuf {
        self.uploads_dir.join(job_id.to_string())
    }

    /// Turn the loosely typed request into a job configuration
    fn validate(
        &self,
        request: &SubmitJobRequest,
    ) -> Result<(String, SourceKind, JobConfig), JobServiceError> {
        let filename = Path::new(request.filename.trim())
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| JobServiceError::Validation("filename is required".to_string()))?;

        let source_kind = SourceKind::from_filename(&filename).ok_or_else(|| {
            let supported: Vec<&str> = SourceKind::ALL.iter().map(|k| k.extension()).collect();
            JobServiceError::Validation(format!(
                "unsupported file type: {}. Use: {}",
                filename,
                supported.join(", ")
            ))
        })?;

        if request.source.is_empty() {
            return Err(JobServiceError::Validation("uploaded file is empty".to_string()));
        }
        if request.source.len() > self.max_upload_bytes {
            return Err(JobServiceError::Validation(format!(
                "file too large: {} bytes (max {})",
                request.source.len(),
                self.max_upload_bytes
            )));
        }

        let output_format = match request.output_format.as_deref() {
            Some(format) => format.parse().map_err(JobServiceError::Validation)?,
            None => DEFAULT_OUTPUT_FORMAT,
        };

        let language: LanguageSelection = request
            .language
            .as_deref()
            .unwrap_or(DEFAULT_LANGUAGE)
            .parse()
            .map_err(JobServiceError::Validation)?;

        let voice = match &request.reference_audio {
            Some(audio) if audio.is_empty() => {
                return Err(JobServiceError::Validation("reference audio is empty".to_string()));
            }
            Some(audio) => VoiceSelector::ClonedFrom(ReferenceAudio::new(audio.clone())),
            None => {
                let name = request.voice.as_deref().unwrap_or(DEFAULT_VOICE).trim();
                if name.is_empty() {
                    return Err(JobServiceError::Validation("voice name is empty".to_string()));
                }
                VoiceSelector::Preset(name.to_string())
            }
        };

        let reference_transcript = request
            .reference_transcript
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && voice.is_clone())
            .map(str::to_string);

        Ok((
            filename,
            source_kind,
            JobConfig {
                voice,
                language,
                output_format,
                reference_transcript,
            },
        ))
    }

    /// Open the record, persist the upload next to it and hand the job to
    /// a pipeline task
    async fn start(
        &self,
        filename: String,
        source_kind: SourceKind,
        source: &[u8],
        config: JobConfig,
    ) -> Result<Job, JobServiceError> {
        let job = self
            .job_repo
            .create(&NewJob {
                filename,
                source_kind,
                config: config.clone(),
            })
            .await?;

        let stored = self
            .store_upload(job.id, source_kind, source, &config.voice)
            .await;
        let source_path = match stored {
            Ok(path) => path,
            Err(e) => {
                let message = format!("failed to store upload: {}", e);
                self.job_repo
                    .update_status(
                        job.id,
                        JobStatus::Failed,
                        Some((ErrorKind::InternalError, &message)),
                    )
                    .await?;
                return Err(JobServiceError::Dependency(message));
            }
        };

        self.spawn(PipelineInput {
            job: job.clone(),
            source_path,
            voice: config.voice,
        });
        Ok(job)
    }

    async fn store_upload(
        &self,
        job_id: Uuid,
        source_kind: SourceKind,
        source: &[u8],
        voice: &VoiceSelector,
    ) -> std::io::Result<PathBuf> {
        let dir = self.upload_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;

        let source_path = dir.join(source_file_name(source_kind));
        tokio::fs::write(&source_path, source).await?;

        if let VoiceSelector::ClonedFrom(reference) = voice {
            tokio::fs::write(dir.join(REFERENCE_AUDIO_FILE), reference.bytes()).await?;
        }

        tracing::debug!(
            job_id = %job_id,
            path = %source_path.display(),
            bytes = source.len(),
            "Upload stored"
        );
        Ok(source_path)
    }

    fn spawn(&self, input: PipelineInput) {
        let job_id = input.job.id;
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        self.running.lock().insert(
            job_id,
            RunningJob {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let pipeline = Arc::clone(&self.pipeline);
        let job_repo = Arc::clone(&self.job_repo);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let heartbeat = async {
                let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
                loop {
                    ticker.tick().await;
                    if let Err(e) = job_repo.heartbeat(job_id).await {
                        tracing::warn!(
                            job_id = %job_id,
                            error = %e,
                            "Failed to record job heartbeat"
                        );
                    }
                }
            };

            tokio::select! {
                _ = pipeline.run(input, cancel) => {}
                _ = heartbeat => {}
            }

            running.lock().remove(&job_id);
            done_tx.send_replace(true);
        });
    }
}

fn source_file_name(kind: SourceKind) -> String {
    format!("source.{}", kind.extension())
}

async fn read_upload(path: &Path) -> Result<Vec<u8>, JobServiceError> {
    tokio::fs::read(path).await.map_err(|e| {
        JobServiceError::Validation(format!(
            "stored upload {} is no longer available: {}",
            path.display(),
            e
        ))
    })
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), JobServiceError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JobServiceError::Dependency(format!(
            "failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
