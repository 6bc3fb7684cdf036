pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod service;

pub use error::JobServiceError;
pub use model::{
    ChapterPlan, ChapterRecord, ErrorKind, Job, JobConfig, JobStatus, NewJob, OutputFormat,
    SourceKind, UnitPlan, UnitRecord, UnitResolution, UnitState, VoiceKind, TERMINAL_STATUSES,
};
pub use pipeline::{Pipeline, PipelineInput, PipelineSettings};
pub use progress::Progress;
pub use service::{
    JobService, JobServiceApi, DEFAULT_LANGUAGE, DEFAULT_OUTPUT_FORMAT, DEFAULT_VOICE,
    HEARTBEAT_INTERVAL, OWNER_STALE_AFTER,
};

use crate::domain::tts::LanguageCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to create a job. Fields are validated when the job is created;
/// `None` falls back to the documented default.
#[derive(Default)]
pub struct SubmitJobRequest {
    pub filename: String,
    pub source: Vec<u8>,
    pub voice: Option<String>,
    /// Reference recording; when present the voice is cloned and `voice` is ignored
    pub reference_audio: Option<Vec<u8>>,
    pub reference_transcript: Option<String>,
    /// ISO code, service language name, or `auto`
    pub language: Option<String>,
    pub output_format: Option<String>,
}

impl std::fmt::Debug for SubmitJobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitJobRequest")
            .field("filename", &self.filename)
            .field("source_len", &self.source.len())
            .field("voice", &self.voice)
            .field("reference_audio_len", &self.reference_audio.as_ref().map(Vec::len))
            .field("language", &self.language)
            .field("output_format", &self.output_format)
            .finish()
    }
}

/// Job status view returned by every job operation
#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub filename: String,
    pub format: OutputFormat,
    /// Preset name, or `clone` for a cloned voice
    pub voice: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_language: Option<LanguageCode>,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobResponse {
    pub fn from_job(job: &Job, now: DateTime<Utc>) -> Self {
        let voice = match job.voice_kind {
            VoiceKind::Preset => job.voice_name.clone().unwrap_or_default(),
            VoiceKind::Clone => "clone".to_string(),
        };

        Self {
            job_id: job.id,
            status: job.status,
            filename: job.filename.clone(),
            format: job.output_format,
            voice,
            language: job.language.clone(),
            resolved_language: job.resolved_language,
            progress: Progress::of(job, now),
            error: job.error_kind.map(|kind| JobErrorResponse {
                kind,
                message: job.error_message.clone().unwrap_or_default(),
            }),
            output_path: job.output_path.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.ended_at,
        }
    }
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self::from_job(&job, Utc::now())
    }
}
