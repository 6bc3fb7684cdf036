use crate::domain::tts::{LanguageCode, LanguageSelection, VoiceSelector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a job.
///
/// `queued → extracting → chunking → generating → assembling → completed`;
/// `failed` and `canceled` are reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Extracting,
    Chunking,
    Generating,
    Assembling,
    Completed,
    Failed,
    Canceled,
}

pub const TERMINAL_STATUSES: [JobStatus; 3] =
    [JobStatus::Completed, JobStatus::Failed, JobStatus::Canceled];

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATUSES.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Extracting => "extracting",
            JobStatus::Chunking => "chunking",
            JobStatus::Generating => "generating",
            JobStatus::Assembling => "assembling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure category recorded on a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ExtractionError,
    TranscriptionError,
    SynthesisError,
    AssemblyError,
    ValidationError,
    /// The process stopped while the job was running
    Interrupted,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ExtractionError => "extraction_error",
            ErrorKind::TranscriptionError => "transcription_error",
            ErrorKind::SynthesisError => "synthesis_error",
            ErrorKind::AssemblyError => "assembly_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested artifact type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Chaptered audiobook container with embedded art and lyrics
    M4b,
    /// Per-chapter MP3 archive with companion lyric files
    Mp3,
    /// Per-chapter WAV bundle with a JSON timing manifest
    Wav,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::M4b, OutputFormat::Mp3, OutputFormat::Wav];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::M4b => "m4b",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m4b" => Ok(OutputFormat::M4b),
            "mp3" => Ok(OutputFormat::Mp3),
            "wav" => Ok(OutputFormat::Wav),
            other => Err(format!("unsupported output format '{}'", other)),
        }
    }
}

/// Declared type of an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Epub,
    Pdf,
    Docx,
    Txt,
    Html,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Epub,
        SourceKind::Pdf,
        SourceKind::Docx,
        SourceKind::Txt,
        SourceKind::Html,
    ];

    /// Infer the document type from the uploaded file name
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();

        match extension.as_str() {
            "epub" => Some(SourceKind::Epub),
            "pdf" => Some(SourceKind::Pdf),
            "docx" => Some(SourceKind::Docx),
            "txt" | "text" => Some(SourceKind::Txt),
            "html" | "htm" | "xhtml" => Some(SourceKind::Html),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SourceKind::Epub => "epub",
            SourceKind::Pdf => "pdf",
            SourceKind::Docx => "docx",
            SourceKind::Txt => "txt",
            SourceKind::Html => "html",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VoiceKind {
    Preset,
    Clone,
}

/// Resolution state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    CachedHit,
    Synthesized,
    Failed,
}

/// Validated job configuration
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub voice: VoiceSelector,
    pub language: LanguageSelection,
    pub output_format: OutputFormat,
    /// Transcript of the reference audio; transcribed automatically when absent
    pub reference_transcript: Option<String>,
}

/// Everything the store needs to open a job record
#[derive(Debug, Clone)]
pub struct NewJob {
    pub filename: String,
    pub source_kind: SourceKind,
    pub config: JobConfig,
}

/// Durable job record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub filename: String,
    pub source_kind: SourceKind,
    pub voice_kind: VoiceKind,
    pub voice_name: Option<String>,
    pub reference_audio_hash: Option<String>,
    pub reference_transcript: Option<String>,
    /// Requested language: an ISO code or `auto`
    pub language: String,
    pub resolved_language: Option<LanguageCode>,
    pub output_format: OutputFormat,
    pub status: JobStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub chapters_total: i64,
    pub chapters_done: i64,
    pub current_chapter_index: i64,
    pub chunks_current_done: i64,
    pub chunks_current_total: i64,
    pub units_total: i64,
    pub units_resolved: i64,
    pub units_synthesized: i64,
    pub synthesis_secs_total: f64,
    pub output_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn language_selection(&self) -> LanguageSelection {
        self.language.parse().unwrap_or(LanguageSelection::Auto)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChapterRecord {
    pub job_id: Uuid,
    pub chapter_index: i64,
    pub title: String,
    pub units_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UnitRecord {
    pub job_id: Uuid,
    pub chapter_index: i64,
    pub unit_index: i64,
    pub text: String,
    pub ends_paragraph: bool,
    pub cache_key: String,
    pub state: UnitState,
    pub duration_secs: Option<f64>,
}

/// A chapter as planned at chunking time; order is fixed from here on
#[derive(Debug, Clone)]
pub struct ChapterPlan {
    pub index: usize,
    pub title: String,
    pub units: Vec<UnitPlan>,
}

#[derive(Debug, Clone)]
pub struct UnitPlan {
    pub index: usize,
    pub text: String,
    pub ends_paragraph: bool,
    pub cache_key: String,
}

/// Outcome of one unit, written together with the job's progress counters
#[derive(Debug, Clone, Copy)]
pub struct UnitResolution {
    pub chapter_index: usize,
    pub unit_index: usize,
    pub state: UnitState,
    pub duration_secs: Option<f64>,
    /// Wall-clock time of a fresh synthesis; `None` for hits and failures
    pub synthesis_secs: Option<f64>,
    pub chunks_done: usize,
    pub chunks_total: usize,
}
