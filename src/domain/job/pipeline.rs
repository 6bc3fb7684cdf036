use super::error::JobServiceError;
use super::model::{ChapterPlan, Job, JobStatus, UnitPlan, UnitResolution, UnitState};
use crate::domain::assembly::{
    chapter_timing, AssemblyRequest, BookMetadata, ChapterAudio, ExtractedDocument, UnitAudio,
    UNKNOWN_TITLE,
};
use crate::domain::cache::{CacheKey, CacheOutcome, ChunkCache};
use crate::domain::chunking::{segmenter_for, Unit, UnitSplitter};
use crate::domain::tts::{
    detect_language, LanguageCode, LanguageSelection, SynthesisGateway, VoiceSelector,
};
use crate::error::AppError;
use crate::infrastructure::repositories::{AudiobookAssembler, DocumentExtractor, JobRepository};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Characters of document text handed to language detection
const DETECTION_SAMPLE_CHARS: usize = 4_000;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunk_target_words: usize,
    pub chunk_max_words: usize,
    pub output_dir: PathBuf,
}

/// What a run needs beyond the job record: the stored upload and the full
/// voice selector (reference audio bytes are not kept in the record)
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub job: Job,
    pub source_path: PathBuf,
    pub voice: VoiceSelector,
}

/// Why a run stopped before completing
#[derive(Debug)]
enum Stop {
    Canceled,
    Failed(JobServiceError),
}

impl From<JobServiceError> for Stop {
    fn from(err: JobServiceError) -> Self {
        Stop::Failed(err)
    }
}

impl From<AppError> for Stop {
    fn from(err: AppError) -> Self {
        Stop::Failed(err.into())
    }
}

/// A chapter after chunking, with the keys its units resolve through
struct PlannedChapter {
    title: String,
    units: Vec<Unit>,
    keys: Vec<CacheKey>,
}

/// Drives one job from extraction to assembly.
///
/// Every transition and progress change is written to the job store before
/// the next step starts. Cancellation is cooperative: the token (or a
/// `canceled` status written by another process) is checked before each unit
/// and before assembly, never in the middle of a remote call.
pub struct Pipeline {
    job_repo: Arc<JobRepository>,
    extractor: Arc<dyn DocumentExtractor>,
    assembler: Arc<dyn AudiobookAssembler>,
    gateway: Arc<SynthesisGateway>,
    cache: Arc<ChunkCache>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        job_repo: Arc<JobRepository>,
        extractor: Arc<dyn DocumentExtractor>,
        assembler: Arc<dyn AudiobookAssembler>,
        gateway: Arc<SynthesisGateway>,
        cache: Arc<ChunkCache>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            job_repo,
            extractor,
            assembler,
            gateway,
            cache,
            settings,
        }
    }

    pub fn output_dir(&self, job_id: Uuid) -> PathBuf {
        self.settings.output_dir.join(job_id.to_string())
    }

    /// Run the job to a terminal status. Never returns an error: failures are
    /// recorded on the job instead.
    pub async fn run(&self, input: PipelineInput, cancel: CancellationToken) {
        let job_id = input.job.id;
        tracing::info!(job_id = %job_id, filename = %input.job.filename, "Job started");

        let outcome = match self.execute(&input, &cancel).await {
            Ok(()) => Ok(()),
            Err(Stop::Canceled) => {
                tracing::info!(job_id = %job_id, "Job canceled");
                self.job_repo.mark_canceled(job_id).await.map(|_| ())
            }
            Err(Stop::Failed(err)) => {
                tracing::error!(
                    job_id = %job_id,
                    error_kind = %err.kind(),
                    error = %err,
                    "Job failed"
                );
                let message = err.to_string();
                self.job_repo
                    .update_status(job_id, JobStatus::Failed, Some((err.kind(), &message)))
                    .await
                    .map(|_| ())
            }
        };

        if let Err(e) = outcome {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record final job status");
        }
    }

    async fn execute(&self, input: &PipelineInput, cancel: &CancellationToken) -> Result<(), Stop> {
        let job = &input.job;

        self.transition(job.id, JobStatus::Extracting).await?;
        let document = self
            .extractor
            .extract(&input.source_path, job.source_kind)
            .await
            .map_err(|e| JobServiceError::Extraction(e.to_string()))?;

        let language = self.resolve_language(job, &document).await?;
        let transcript = self.reference_transcript(job, &input.voice).await?;
        self.checkpoint(job.id, cancel).await?;

        self.transition(job.id, JobStatus::Chunking).await?;
        let chapters = self.plan(job.id, &document, &input.voice, language).await?;
        self.checkpoint(job.id, cancel).await?;

        self.transition(job.id, JobStatus::Generating).await?;
        let mut chapter_audio = Vec::with_capacity(chapters.len());
        for (ci, chapter) in chapters.iter().enumerate() {
            let units = self
                .generate_chapter(
                    job.id,
                    ci,
                    chapter,
                    &input.voice,
                    language,
                    transcript.as_deref(),
                    cancel,
                )
                .await?;
            let (lyrics, duration_secs) = chapter_timing(&units);
            chapter_audio.push(ChapterAudio {
                index: ci,
                title: chapter.title.clone(),
                units,
                duration_secs,
                lyrics,
            });

            self.job_repo.update_progress(job.id, ci + 1, 0, 0).await?;
            tracing::info!(
                job_id = %job.id,
                chapter = ci + 1,
                chapters_total = chapters.len(),
                "Chapter complete"
            );
        }

        self.checkpoint(job.id, cancel).await?;
        self.transition(job.id, JobStatus::Assembling).await?;

        let output_dir = self.output_dir(job.id);
        let request = AssemblyRequest {
            job_id: job.id,
            output_dir,
            output_format: job.output_format,
            metadata: metadata_with_fallback_title(document.metadata, &job.filename),
            cover: document.cover,
            chapters: chapter_audio,
        };
        let artifact = self
            .assembler
            .assemble(request)
            .await
            .map_err(|e| JobServiceError::Assembly(e.to_string()))?;

        let artifact = artifact.display().to_string();
        if self.job_repo.complete(job.id, &artifact).await? {
            tracing::info!(job_id = %job.id, output = %artifact, "Job completed");
        } else {
            tracing::warn!(job_id = %job.id, "Job reached a terminal status during assembly");
        }
        Ok(())
    }

    /// Move to `status`; a job already terminal (canceled elsewhere) stops here
    async fn transition(&self, job_id: Uuid, status: JobStatus) -> Result<(), Stop> {
        if self.job_repo.update_status(job_id, status, None).await? {
            Ok(())
        } else {
            Err(Stop::Canceled)
        }
    }

    async fn checkpoint(&self, job_id: Uuid, cancel: &CancellationToken) -> Result<(), Stop> {
        if cancel.is_cancelled() {
            return Err(Stop::Canceled);
        }
        match self.job_repo.status(job_id).await? {
            Some(status) if !status.is_terminal() => Ok(()),
            _ => Err(Stop::Canceled),
        }
    }

    async fn resolve_language(
        &self,
        job: &Job,
        document: &ExtractedDocument,
    ) -> Result<LanguageCode, Stop> {
        let language = match job.language_selection() {
            LanguageSelection::Fixed(code) => code,
            LanguageSelection::Auto => {
                let sample = detection_sample(document);
                let detected = tokio::task::spawn_blocking(move || detect_language(&sample))
                    .await
                    .map_err(|e| JobServiceError::Other(e.into()))?;
                tracing::info!(
                    job_id = %job.id,
                    language = %detected.as_str(),
                    "Language detected"
                );
                detected
            }
        };

        self.job_repo.set_resolved_language(job.id, language).await?;
        Ok(language)
    }

    /// Transcript used with a cloned voice: the one supplied with the job, or
    /// a transcription of the reference audio stored for later runs
    async fn reference_transcript(
        &self,
        job: &Job,
        voice: &VoiceSelector,
    ) -> Result<Option<String>, Stop> {
        let reference = match voice {
            VoiceSelector::ClonedFrom(reference) => reference,
            VoiceSelector::Preset(_) => return Ok(None),
        };
        if let Some(transcript) = &job.reference_transcript {
            return Ok(Some(transcript.clone()));
        }

        let transcript = self
            .gateway
            .transcribe(reference.bytes())
            .await
            .map_err(JobServiceError::from)?;
        self.job_repo.set_reference_transcript(job.id, &transcript).await?;

        tracing::info!(
            job_id = %job.id,
            transcript_chars = transcript.chars().count(),
            "Reference audio transcribed"
        );
        Ok(Some(transcript))
    }

    /// Split every chapter into units, derive their keys and persist the plan.
    /// Chapters without speakable text are dropped.
    async fn plan(
        &self,
        job_id: Uuid,
        document: &ExtractedDocument,
        voice: &VoiceSelector,
        language: LanguageCode,
    ) -> Result<Vec<PlannedChapter>, Stop> {
        let splitter = UnitSplitter::new(
            self.settings.chunk_target_words,
            self.settings.chunk_max_words,
            segmenter_for(language),
        );

        let chapters: Vec<PlannedChapter> = document
            .chapters
            .iter()
            .filter_map(|chapter| {
                let units = splitter.split(&chapter.text);
                if units.is_empty() {
                    tracing::debug!(
                        job_id = %job_id,
                        title = %chapter.title,
                        "Skipping empty chapter"
                    );
                    return None;
                }
                let keys = units
                    .iter()
                    .map(|unit| CacheKey::derive(&unit.text, voice, language))
                    .collect();
                Some(PlannedChapter {
                    title: chapter.title.clone(),
                    units,
                    keys,
                })
            })
            .collect();

        if chapters.is_empty() {
            let message = "document contains no speakable text".to_string();
            return Err(JobServiceError::Extraction(message).into());
        }

        let plan: Vec<ChapterPlan> = chapters
            .iter()
            .enumerate()
            .map(|(index, chapter)| ChapterPlan {
                index,
                title: chapter.title.clone(),
                units: chapter
                    .units
                    .iter()
                    .zip(&chapter.keys)
                    .map(|(unit, key)| UnitPlan {
                        index: unit.index,
                        text: unit.text.clone(),
                        ends_paragraph: unit.ends_paragraph,
                        cache_key: key.to_string(),
                    })
                    .collect(),
            })
            .collect();
        self.job_repo.save_plan(job_id, &plan).await?;

        tracing::info!(
            job_id = %job_id,
            chapters = plan.len(),
            units = plan.iter().map(|c| c.units.len()).sum::<usize>(),
            target_words = splitter.target_words(),
            "Document chunked"
        );
        Ok(chapters)
    }

    /// Resolve a chapter's units in order through the chunk cache
    #[allow(clippy::too_many_arguments)]
    async fn generate_chapter(
        &self,
        job_id: Uuid,
        chapter_index: usize,
        chapter: &PlannedChapter,
        voice: &VoiceSelector,
        language: LanguageCode,
        transcript: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<UnitAudio>, Stop> {
        let total = chapter.units.len();
        self.job_repo.update_progress(job_id, chapter_index, 0, total).await?;

        let mut audio = Vec::with_capacity(total);
        for (unit, key) in chapter.units.iter().zip(&chapter.keys) {
            self.checkpoint(job_id, cancel).await?;

            let text = unit.speech_text();
            let gateway = self.gateway.as_ref();
            let text_ref = text.as_str();
            let resolved = self
                .cache
                .get_or_compute(key, move || {
                    gateway.synthesize(text_ref, voice, language, transcript)
                })
                .await;

            let mut resolution = UnitResolution {
                chapter_index,
                unit_index: unit.index,
                state: UnitState::Failed,
                duration_secs: None,
                synthesis_secs: None,
                chunks_done: unit.index + 1,
                chunks_total: total,
            };

            let resolved = match resolved {
                Ok(resolved) => resolved,
                Err(err) => {
                    self.job_repo.record_unit_resolution(job_id, &resolution).await?;
                    return Err(JobServiceError::from(err).into());
                }
            };

            resolution.duration_secs = Some(resolved.segment.duration_secs);
            match resolved.outcome {
                CacheOutcome::Hit => {
                    resolution.state = UnitState::CachedHit;
                }
                CacheOutcome::Computed { elapsed } => {
                    resolution.state = UnitState::Synthesized;
                    resolution.synthesis_secs = Some(elapsed.as_secs_f64());
                }
            }
            self.job_repo.record_unit_resolution(job_id, &resolution).await?;

            tracing::debug!(
                job_id = %job_id,
                chapter = chapter_index + 1,
                unit = unit.index + 1,
                units = total,
                words = unit.word_count,
                cached = resolution.state == UnitState::CachedHit,
                "Unit resolved"
            );

            audio.push(UnitAudio {
                segment: resolved.segment,
                ends_paragraph: unit.ends_paragraph,
                sentences: unit.sentences.clone(),
            });
        }

        Ok(audio)
    }
}

fn detection_sample(document: &ExtractedDocument) -> String {
    let mut sample = String::new();
    for chapter in &document.chapters {
        if sample.chars().count() >= DETECTION_SAMPLE_CHARS {
            break;
        }
        sample.push_str(&chapter.text);
        sample.push('\n');
    }
    sample.chars().take(DETECTION_SAMPLE_CHARS).collect()
}

/// Books without an embedded title are named after the uploaded file
fn metadata_with_fallback_title(metadata: BookMetadata, filename: &str) -> BookMetadata {
    if metadata.title != UNKNOWN_TITLE && !metadata.title.trim().is_empty() {
        return metadata;
    }
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_TITLE)
        .to_string();
    BookMetadata {
        title: stem,
        ..metadata
    }
}
