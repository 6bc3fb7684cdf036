use super::model::ErrorKind;
use crate::domain::cache::ChunkCacheError;
use crate::domain::tts::{SynthesisError, TranscriptionError};
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("assembly failed: {0}")]
    Assembly(String),
    #[error("job not found")]
    JobNotFound,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("dependency error: {0}")]
    Dependency(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobServiceError {
    /// Category recorded on the job when this error fails it
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobServiceError::Extraction(_) => ErrorKind::ExtractionError,
            JobServiceError::Transcription(_) => ErrorKind::TranscriptionError,
            JobServiceError::Synthesis(_) => ErrorKind::SynthesisError,
            JobServiceError::Assembly(_) => ErrorKind::AssemblyError,
            JobServiceError::Validation(_) => ErrorKind::ValidationError,
            JobServiceError::JobNotFound
            | JobServiceError::Dependency(_)
            | JobServiceError::Other(_) => ErrorKind::InternalError,
        }
    }
}

impl From<ChunkCacheError> for JobServiceError {
    fn from(err: ChunkCacheError) -> Self {
        match err {
            ChunkCacheError::Synthesis(e) => JobServiceError::Synthesis(e),
            ChunkCacheError::Storage(msg) => JobServiceError::Dependency(msg),
        }
    }
}

impl From<AppError> for JobServiceError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadRequest(msg) => JobServiceError::Validation(msg),
            AppError::NotFound(_) => JobServiceError::JobNotFound,
            _ => JobServiceError::Dependency(err.to_string()),
        }
    }
}

impl From<JobServiceError> for AppError {
    fn from(err: JobServiceError) -> Self {
        match err {
            JobServiceError::Validation(msg) => AppError::BadRequest(msg),
            JobServiceError::JobNotFound => AppError::NotFound("Job not found".to_string()),
            JobServiceError::Transcription(e) => AppError::ExternalService(e.to_string()),
            JobServiceError::Synthesis(e) => AppError::ExternalService(e.to_string()),
            JobServiceError::Extraction(msg)
            | JobServiceError::Assembly(msg)
            | JobServiceError::Dependency(msg) => AppError::Internal(msg),
            JobServiceError::Other(e) => AppError::Internal(e.to_string()),
        }
    }
}
