use crate::domain::assembly::{chapter_offsets, AssemblyRequest, ChapterAudio, LyricLine};
use crate::domain::assembly::timing::gap_after;
use crate::domain::job::OutputFormat;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AssemblyFailure {
    #[error("output format {0} is not supported by this assembler")]
    UnsupportedFormat(String),
    #[error("segment {path} is unreadable: {message}")]
    Segment { path: String, message: String },
    #[error("incompatible audio: {0}")]
    Incompatible(String),
    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("assembly task failed: {0}")]
    Task(String),
}

/// Assembly collaborator: turns ordered chapter audio into the final artifact
/// and returns where it was written
#[async_trait]
pub trait AudiobookAssembler: Send + Sync {
    async fn assemble(&self, request: AssemblyRequest) -> Result<PathBuf, AssemblyFailure>;
}

/// Writes one WAV file per chapter (units joined with their pauses), the cover
/// image, and a `timings.json` manifest with chapter offsets and lyric lines.
/// Chaptered containers (M4B, MP3) are produced by an external muxer.
#[derive(Debug, Default, Clone)]
pub struct WavBundleAssembler;

#[derive(Serialize)]
struct Manifest<'a> {
    job_id: String,
    #[serde(flatten)]
    metadata: &'a crate::domain::assembly::BookMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    cover: Option<String>,
    duration_secs: f64,
    chapters: Vec<ManifestChapter<'a>>,
}

#[derive(Serialize)]
struct ManifestChapter<'a> {
    index: usize,
    title: &'a str,
    file: String,
    start_secs: f64,
    duration_secs: f64,
    lyrics: &'a [LyricLine],
}

fn chapter_file_name(chapter: &ChapterAudio) -> String {
    let slug: String = chapter
        .title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .take(8)
        .collect::<Vec<_>>()
        .join("-");
    format!("{:03}-{}.wav", chapter.index + 1, if slug.is_empty() { "chapter" } else { &slug })
}

/// Concatenate a chapter's unit segments with silence between them.
/// Runs on a blocking thread: this is pure sample copying.
fn write_chapter_wav(chapter: &ChapterAudio, path: &Path) -> Result<(), AssemblyFailure> {
    let mut writer: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>> = None;
    let mut spec: Option<hound::WavSpec> = None;

    for (i, unit) in chapter.units.iter().enumerate() {
        let segment_path = unit.segment.path.display().to_string();
        let segment_error = |e: hound::Error| AssemblyFailure::Segment {
            path: segment_path.clone(),
            message: e.to_string(),
        };

        let mut reader = hound::WavReader::open(&unit.segment.path).map_err(segment_error)?;
        let unit_spec = reader.spec();

        match spec {
            None => {
                spec = Some(unit_spec);
                writer = Some(hound::WavWriter::create(path, unit_spec).map_err(|e| {
                    AssemblyFailure::Task(format!("cannot create {}: {}", path.display(), e))
                })?);
            }
            Some(first) if first != unit_spec => {
                return Err(AssemblyFailure::Incompatible(format!(
                    "{} is {} Hz / {} ch / {} bit, chapter started with {} Hz / {} ch / {} bit",
                    segment_path,
                    unit_spec.sample_rate,
                    unit_spec.channels,
                    unit_spec.bits_per_sample,
                    first.sample_rate,
                    first.channels,
                    first.bits_per_sample
                )));
            }
            Some(_) => {}
        }

        let Some(out) = writer.as_mut() else {
            continue;
        };

        match unit_spec.sample_format {
            hound::SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    out.write_sample(sample.map_err(segment_error)?)
                        .map_err(|e| AssemblyFailure::Task(e.to_string()))?;
                }
            }
            hound::SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    out.write_sample(sample.map_err(segment_error)?)
                        .map_err(|e| AssemblyFailure::Task(e.to_string()))?;
                }
            }
        }

        let gap = gap_after(unit, i + 1 == chapter.units.len());
        let silent_samples =
            (gap * unit_spec.sample_rate as f64).round() as u64 * unit_spec.channels as u64;
        for _ in 0..silent_samples {
            match unit_spec.sample_format {
                hound::SampleFormat::Float => out.write_sample(0.0f32),
                hound::SampleFormat::Int => out.write_sample(0i32),
            }
            .map_err(|e| AssemblyFailure::Task(e.to_string()))?;
        }
    }

    match writer {
        Some(writer) => writer
            .finalize()
            .map_err(|e| AssemblyFailure::Task(e.to_string())),
        None => Err(AssemblyFailure::Incompatible(format!(
            "chapter {} has no audio",
            chapter.index + 1
        ))),
    }
}

#[async_trait]
impl AudiobookAssembler for WavBundleAssembler {
    async fn assemble(&self, request: AssemblyRequest) -> Result<PathBuf, AssemblyFailure> {
        if request.output_format != OutputFormat::Wav {
            return Err(AssemblyFailure::UnsupportedFormat(
                request.output_format.as_str().to_string(),
            ));
        }

        tokio::fs::create_dir_all(&request.output_dir).await?;

        let mut files = Vec::with_capacity(request.chapters.len());
        for chapter in &request.chapters {
            let file = chapter_file_name(chapter);
            let path = request.output_dir.join(&file);
            let chapter_owned = chapter.clone();

            tokio::task::spawn_blocking(move || write_chapter_wav(&chapter_owned, &path))
                .await
                .map_err(|e| AssemblyFailure::Task(e.to_string()))??;

            tracing::debug!(
                job_id = %request.job_id,
                chapter_index = chapter.index,
                file = %file,
                duration_secs = chapter.duration_secs,
                "Chapter audio written"
            );
            files.push(file);
        }

        let cover = match &request.cover {
            Some(cover) => {
                let name = format!("cover.{}", cover.extension());
                tokio::fs::write(request.output_dir.join(&name), &cover.bytes).await?;
                Some(name)
            }
            None => None,
        };

        let offsets = chapter_offsets(&request.chapters);
        let manifest = Manifest {
            job_id: request.job_id.to_string(),
            metadata: &request.metadata,
            cover,
            duration_secs: request
                .chapters
                .last()
                .zip(offsets.last())
                .map(|(chapter, start)| start + chapter.duration_secs)
                .unwrap_or(0.0),
            chapters: request
                .chapters
                .iter()
                .zip(files)
                .zip(&offsets)
                .map(|((chapter, file), start)| ManifestChapter {
                    index: chapter.index,
                    title: &chapter.title,
                    file,
                    start_secs: *start,
                    duration_secs: chapter.duration_secs,
                    lyrics: &chapter.lyrics,
                })
                .collect(),
        };

        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| AssemblyFailure::Task(e.to_string()))?;
        tokio::fs::write(request.output_dir.join("timings.json"), json).await?;

        tracing::info!(
            job_id = %request.job_id,
            output_dir = %request.output_dir.display(),
            chapters = request.chapters.len(),
            "Audiobook bundle assembled"
        );

        Ok(request.output_dir)
    }
}
