use super::model::{Job, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest percentage reported before the job has actually completed
const MAX_PERCENT_BEFORE_COMPLETION: f64 = 99.9;

/// Point-in-time progress of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub chapters_total: i64,
    pub chapters_done: i64,
    pub current_chapter_chunks_done: i64,
    pub current_chapter_chunks_total: i64,
    /// 0.0..=100.0 with one decimal; exactly 100 only once completed
    pub percent: f64,
    pub elapsed_secs: f64,
    /// Remaining fresh synthesis time; `None` until one unit was synthesized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<f64>,
}

impl Progress {
    pub fn of(job: &Job, now: DateTime<Utc>) -> Self {
        Self {
            chapters_total: job.chapters_total,
            chapters_done: job.chapters_done,
            current_chapter_chunks_done: job.chunks_current_done,
            current_chapter_chunks_total: job.chunks_current_total,
            percent: percent(job),
            elapsed_secs: elapsed_secs(job, now),
            eta_secs: eta_secs(job),
        }
    }
}

/// `(chapters_done * 100 + current chapter fraction * 100) / chapters_total`,
/// floored to one decimal so it never runs ahead of the counters
pub fn percent(job: &Job) -> f64 {
    if job.status == JobStatus::Completed {
        return 100.0;
    }
    if job.chapters_total <= 0 {
        return 0.0;
    }

    let fraction = if job.chunks_current_total > 0 {
        job.chunks_current_done as f64 / job.chunks_current_total as f64
    } else {
        0.0
    };

    let raw = (job.chapters_done as f64 * 100.0 + fraction * 100.0) / job.chapters_total as f64;
    ((raw * 10.0).floor() / 10.0).clamp(0.0, MAX_PERCENT_BEFORE_COMPLETION)
}

/// Wall-clock seconds since creation; the clock stops when the job ends
pub fn elapsed_secs(job: &Job, now: DateTime<Utc>) -> f64 {
    let end = job.ended_at.unwrap_or(now);
    ((end - job.created_at).num_milliseconds().max(0) as f64) / 1000.0
}

/// Remaining units times the mean fresh synthesis time.
/// Cache hits resolve near-instantly and are left out of the rate.
pub fn eta_secs(job: &Job) -> Option<f64> {
    if job.status.is_terminal() || job.units_synthesized <= 0 {
        return None;
    }

    let remaining = (job.units_total - job.units_resolved).max(0) as f64;
    let mean = job.synthesis_secs_total / job.units_synthesized as f64;
    Some(remaining * mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::model::{OutputFormat, SourceKind, VoiceKind};
    use chrono::Duration;
    use uuid::Uuid;

    fn job() -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            filename: "book.txt".to_string(),
            source_kind: SourceKind::Txt,
            voice_kind: VoiceKind::Preset,
            voice_name: Some("Aiden".to_string()),
            reference_audio_hash: None,
            reference_transcript: None,
            language: "en".to_string(),
            resolved_language: None,
            output_format: OutputFormat::Wav,
            status: JobStatus::Generating,
            error_kind: None,
            error_message: None,
            chapters_total: 2,
            chapters_done: 0,
            current_chapter_index: 0,
            chunks_current_done: 0,
            chunks_current_total: 0,
            units_total: 5,
            units_resolved: 0,
            units_synthesized: 0,
            synthesis_secs_total: 0.0,
            output_path: None,
            created_at: now,
            started_at: Some(now),
            updated_at: now,
            ended_at: None,
        }
    }

    #[test]
    fn test_percent_combines_chapters_and_current_fraction() {
        let mut job = job();
        job.chapters_done = 1;
        job.chunks_current_done = 1;
        job.chunks_current_total = 2;
        assert_eq!(percent(&job), 75.0);
    }

    #[test]
    fn test_percent_is_floored_to_one_decimal() {
        let mut job = job();
        job.chapters_total = 3;
        job.chunks_current_done = 1;
        job.chunks_current_total = 1;
        assert_eq!(percent(&job), 33.3);
    }

    #[test]
    fn test_percent_reaches_100_only_when_completed() {
        let mut job = job();
        job.chapters_done = 2;
        assert_eq!(percent(&job), 99.9);

        job.status = JobStatus::Completed;
        assert_eq!(percent(&job), 100.0);
    }

    #[test]
    fn test_percent_before_planning_is_zero() {
        let mut job = job();
        job.chapters_total = 0;
        assert_eq!(percent(&job), 0.0);
    }

    #[test]
    fn test_eta_ignores_cache_hits() {
        let mut job = job();
        job.units_total = 10;
        job.units_resolved = 6;
        // 4 hits + 2 fresh syntheses of 30s each
        job.units_synthesized = 2;
        job.synthesis_secs_total = 60.0;
        assert_eq!(eta_secs(&job), Some(120.0));
    }

    #[test]
    fn test_eta_unknown_without_fresh_synthesis() {
        let mut job = job();
        job.units_resolved = 3;
        assert_eq!(eta_secs(&job), None);
    }

    #[test]
    fn test_elapsed_stops_at_end() {
        let mut job = job();
        job.created_at = Utc::now() - Duration::seconds(90);
        job.ended_at = Some(job.created_at + Duration::seconds(30));
        job.status = JobStatus::Failed;

        assert_eq!(elapsed_secs(&job, Utc::now()), 30.0);
        assert_eq!(eta_secs(&job), None);
    }
}
