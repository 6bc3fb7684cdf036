use crate::domain::cache::AudioSegment;
use crate::domain::job::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Descriptive metadata of a book as found in the source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub const UNKNOWN_TITLE: &str = "Unknown";

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            author: None,
            genre: None,
            year: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl CoverImage {
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedChapter {
    pub title: String,
    pub text: String,
}

/// What the extraction collaborator hands back for one upload
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub chapters: Vec<ExtractedChapter>,
    pub cover: Option<CoverImage>,
    pub metadata: BookMetadata,
}

/// One timed line of scrolling text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub start_secs: f64,
    pub text: String,
}

/// A resolved unit as assembly sees it
#[derive(Debug, Clone)]
pub struct UnitAudio {
    pub segment: AudioSegment,
    pub ends_paragraph: bool,
    pub sentences: Vec<String>,
}

/// Ordered audio of one chapter plus its timing, relative to the chapter start
#[derive(Debug, Clone)]
pub struct ChapterAudio {
    pub index: usize,
    pub title: String,
    pub units: Vec<UnitAudio>,
    pub duration_secs: f64,
    pub lyrics: Vec<LyricLine>,
}

/// Everything the assembly collaborator needs to build the artifact
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub job_id: Uuid,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub metadata: BookMetadata,
    pub cover: Option<CoverImage>,
    pub chapters: Vec<ChapterAudio>,
}
