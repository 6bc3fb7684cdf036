use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::job::{JobResponse, JobServiceApi, SubmitJobRequest},
    error::{AppError, AppResult},
};

/// Arguments of `convert`
#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Source document (epub, pdf, docx, txt, html)
    pub file: PathBuf,
    /// Preset voice name
    #[arg(long)]
    pub voice: Option<String>,
    /// Reference recording to clone the voice from
    #[arg(long)]
    pub reference_audio: Option<PathBuf>,
    /// Transcript of the reference recording; transcribed when omitted
    #[arg(long)]
    pub reference_text: Option<String>,
    /// ISO code, language name, or `auto`
    #[arg(long)]
    pub language: Option<String>,
    /// Output format: m4b, mp3 or wav
    #[arg(long)]
    pub format: Option<String>,
}

pub struct JobController {
    job_service: Arc<dyn JobServiceApi>,
}

impl JobController {
    pub fn new(job_service: Arc<dyn JobServiceApi>) -> Self {
        Self { job_service }
    }

    /// convert <file> - Submit a document and follow the job to the end
    pub async fn convert(&self, args: ConvertArgs) -> AppResult<JobResponse> {
        let source = tokio::fs::read(&args.file).await.map_err(|e| {
            AppError::BadRequest(format!("cannot read {}: {}", args.file.display(), e))
        })?;
        let reference_audio = match &args.reference_audio {
            Some(path) => Some(tokio::fs::read(path).await.map_err(|e| {
                AppError::BadRequest(format!("cannot read {}: {}", path.display(), e))
            })?),
            None => None,
        };

        let filename = args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let job = self
            .job_service
            .submit(SubmitJobRequest {
                filename,
                source,
                voice: args.voice,
                reference_audio,
                reference_transcript: args.reference_text,
                language: args.language,
                output_format: args.format,
            })
            .await?;

        self.follow(job.job_id).await
    }

    /// list - All jobs, newest first
    pub async fn list(&self) -> AppResult<Vec<JobResponse>> {
        Ok(self.job_service.list().await?)
    }

    /// status <id> - One job with its progress
    pub async fn status(&self, job_id: Uuid) -> AppResult<JobResponse> {
        Ok(self.job_service.get(job_id).await?)
    }

    /// cancel <id> - Request cancellation
    pub async fn cancel(&self, job_id: Uuid) -> AppResult<JobResponse> {
        Ok(self.job_service.cancel(job_id).await?)
    }

    /// delete <id> - Remove the job, its upload and its output
    pub async fn delete(&self, job_id: Uuid) -> AppResult<()> {
        Ok(self.job_service.delete(job_id).await?)
    }

    /// resubmit <id> - Run a finished job again, reusing cached audio
    pub async fn resubmit(&self, job_id: Uuid) -> AppResult<JobResponse> {
        let job = self.job_service.resubmit(job_id).await?;
        self.follow(job.job_id).await
    }

    /// Wait for the job; Ctrl-C cancels it and waits for the pipeline to stop
    async fn follow(&self, job_id: Uuid) -> AppResult<JobResponse> {
        tokio::select! {
            job = self.job_service.wait(job_id) => Ok(job?),
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(job_id = %job_id, "Interrupt received, canceling job");
                self.job_service.cancel(job_id).await?;
                Ok(self.job_service.wait(job_id).await?)
            }
        }
    }
}
