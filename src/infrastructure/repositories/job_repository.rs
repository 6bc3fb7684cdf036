use crate::domain::job::{
    ChapterPlan, ChapterRecord, ErrorKind, Job, JobStatus, NewJob, UnitRecord, UnitResolution,
    UnitState, VoiceKind,
};
use crate::domain::tts::{LanguageCode, VoiceSelector};
use crate::error::{AppError, AppResult};
use crate::infrastructure::db::DbPool;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const JOB_COLUMNS: &str = r#"
    id, filename, source_kind, voice_kind, voice_name, reference_audio_hash,
    reference_transcript, language, resolved_language, output_format, status,
    error_kind, error_message, chapters_total, chapters_done, current_chapter_index,
    chunks_current_done, chunks_current_total, units_total, units_resolved,
    units_synthesized, synthesis_secs_total, output_path, created_at, started_at,
    updated_at, ended_at
"#;

/// Only non-terminal jobs accept mutations
const NOT_TERMINAL: &str = "status NOT IN ('completed', 'failed', 'canceled')";

/// Durable job store.
///
/// Every method awaits the SQLite commit before returning, and the pool runs
/// with `synchronous = FULL`, so an acknowledged transition survives a crash.
/// Terminal statuses are sticky: mutations against a completed, failed or
/// canceled job are ignored and reported as `false`.
///
/// Each repository instance has its own owner id. Jobs it creates are stamped
/// with that id and kept alive through `heartbeat`, so several processes can
/// share one store without failing each other's work.
pub struct JobRepository {
    pool: Arc<DbPool>,
    owner_id: Uuid,
}

impl JobRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self {
            pool,
            owner_id: Uuid::new_v4(),
        }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Open a new job record in `queued`
    pub async fn create(&self, new_job: &NewJob) -> AppResult<Job> {
        let pool = self.pool.as_ref();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let config = &new_job.config;

        let (voice_kind, voice_name, reference_hash) = match &config.voice {
            VoiceSelector::Preset(name) => (VoiceKind::Preset, Some(name.clone()), None),
            VoiceSelector::ClonedFrom(reference) => {
                (VoiceKind::Clone, None, Some(reference.content_hash().to_string()))
            }
        };

        // Plain `execute` so the insert commits before the id is handed out
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, filename, source_kind, voice_kind, voice_name, reference_audio_hash,
                reference_transcript, language, output_format, status, owner_id,
                heartbeat_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'queued', ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&new_job.filename)
        .bind(new_job.source_kind)
        .bind(voice_kind)
        .bind(voice_name)
        .bind(reference_hash)
        .bind(&config.reference_transcript)
        .bind(config.language.as_str())
        .bind(config.output_format)
        .bind(self.owner_id)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        let job = self.get(id).await?;

        tracing::info!(job_id = %job.id, filename = %job.filename, "Job created");
        Ok(job)
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Job>> {
        let pool = self.pool.as_ref();

        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(job)
    }

    /// Like `find_by_id`, but a missing job is an error
    pub async fn get(&self, id: Uuid) -> AppResult<Job> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))
    }

    /// Current status only; lets a running pipeline notice a cancel written
    /// by another process
    pub async fn status(&self, id: Uuid) -> AppResult<Option<JobStatus>> {
        let pool = self.pool.as_ref();

        let status = sqlx::query_scalar::<_, JobStatus>("SELECT status FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(status)
    }

    /// All jobs, newest first
    pub async fn list(&self) -> AppResult<Vec<Job>> {
        let pool = self.pool.as_ref();

        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs ORDER BY created_at DESC, rowid DESC",
            JOB_COLUMNS
        ))
        .fetch_all(pool)
        .await?;

        Ok(jobs)
    }

    /// Move a job to `status`, recording the error when it fails.
    /// Returns `false` when the job was already terminal.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<(ErrorKind, &str)>,
    ) -> AppResult<bool> {
        let pool = self.pool.as_ref();
        let now = Utc::now();
        let started_at = (status != JobStatus::Queued).then_some(now);
        let ended_at = status.is_terminal().then_some(now);

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = ?,
                error_kind = ?,
                error_message = ?,
                started_at = COALESCE(started_at, ?),
                ended_at = COALESCE(?, ended_at),
                updated_at = ?
            WHERE id = ? AND {}
            "#,
            NOT_TERMINAL
        ))
        .bind(status)
        .bind(error.map(|(kind, _)| kind))
        .bind(error.map(|(_, message)| message))
        .bind(started_at)
        .bind(ended_at)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if applied {
            tracing::info!(job_id = %id, status = %status, "Job status updated");
        } else {
            tracing::debug!(
                job_id = %id,
                status = %status,
                "Status update ignored for terminal job"
            );
        }
        Ok(applied)
    }

    /// Mark a job completed with the location of its artifact
    pub async fn complete(&self, id: Uuid, output_path: &str) -> AppResult<bool> {
        let pool = self.pool.as_ref();
        let now = Utc::now();

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'completed',
                output_path = ?,
                error_kind = NULL,
                error_message = NULL,
                started_at = COALESCE(started_at, ?),
                ended_at = ?,
                updated_at = ?
            WHERE id = ? AND {}
            "#,
            NOT_TERMINAL
        ))
        .bind(output_path)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_canceled(&self, id: Uuid) -> AppResult<bool> {
        self.update_status(id, JobStatus::Canceled, None).await
    }

    /// Remove the record together with its chapters and units.
    /// Cache entries are shared between jobs and stay untouched.
    pub async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let pool = self.pool.as_ref();

        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_resolved_language(&self, id: Uuid, language: LanguageCode) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query("UPDATE jobs SET resolved_language = ?, updated_at = ? WHERE id = ?")
            .bind(language)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn set_reference_transcript(&self, id: Uuid, transcript: &str) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query("UPDATE jobs SET reference_transcript = ?, updated_at = ? WHERE id = ?")
            .bind(transcript)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Persist the chapter and unit layout of a job in one transaction
    pub async fn save_plan(&self, id: Uuid, chapters: &[ChapterPlan]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM job_units WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM job_chapters WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let mut units_total = 0i64;
        for chapter in chapters {
            sqlx::query(
                r#"
                INSERT INTO job_chapters (job_id, chapter_index, title, units_total)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(chapter.index as i64)
            .bind(&chapter.title)
            .bind(chapter.units.len() as i64)
            .execute(&mut *tx)
            .await?;

            for unit in &chapter.units {
                sqlx::query(
                    r#"
                    INSERT INTO job_units (
                        job_id, chapter_index, unit_index, text, ends_paragraph, cache_key
                    )
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(id)
                .bind(chapter.index as i64)
                .bind(unit.index as i64)
                .bind(&unit.text)
                .bind(unit.ends_paragraph)
                .bind(&unit.cache_key)
                .execute(&mut *tx)
                .await?;
            }
            units_total += chapter.units.len() as i64;
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET chapters_total = ?, units_total = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(chapters.len() as i64)
        .bind(units_total)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            job_id = %id,
            chapters = chapters.len(),
            units = units_total,
            "Job plan saved"
        );
        Ok(())
    }

    /// Set the progress counters.
    ///
    /// Rejected (returns `false`) when the job is terminal or when
    /// `(chapters_done, chunks_done)` would move backwards.
    pub async fn update_progress(
        &self,
        id: Uuid,
        chapters_done: usize,
        chunks_done: usize,
        chunks_total: usize,
    ) -> AppResult<bool> {
        let pool = self.pool.as_ref();

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET chapters_done = ?1,
                current_chapter_index = ?1,
                chunks_current_done = ?2,
                chunks_current_total = ?3,
                updated_at = ?4
            WHERE id = ?5 AND {}
              AND (chapters_done < ?1 OR (chapters_done = ?1 AND chunks_current_done <= ?2))
            "#,
            NOT_TERMINAL
        ))
        .bind(chapters_done as i64)
        .bind(chunks_done as i64)
        .bind(chunks_total as i64)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if !applied {
            tracing::debug!(
                job_id = %id,
                chapters_done,
                chunks_done,
                "Progress update rejected"
            );
        }
        Ok(applied)
    }

    /// Record a unit's outcome and advance the job counters atomically
    pub async fn record_unit_resolution(
        &self,
        id: Uuid,
        resolution: &UnitResolution,
    ) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE job_units
            SET state = ?, duration_secs = ?
            WHERE job_id = ? AND chapter_index = ? AND unit_index = ?
            "#,
        )
        .bind(resolution.state)
        .bind(resolution.duration_secs)
        .bind(id)
        .bind(resolution.chapter_index as i64)
        .bind(resolution.unit_index as i64)
        .execute(&mut *tx)
        .await?;

        // Failed units advance progress but are not resolved
        let resolved = matches!(
            resolution.state,
            UnitState::CachedHit | UnitState::Synthesized
        ) as i64;
        let synthesized = (resolution.state == UnitState::Synthesized) as i64;

        sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET units_resolved = units_resolved + ?1,
                units_synthesized = units_synthesized + ?2,
                synthesis_secs_total = synthesis_secs_total + ?3,
                chapters_done = ?4,
                current_chapter_index = ?4,
                chunks_current_done = ?5,
                chunks_current_total = ?6,
                updated_at = ?7
            WHERE id = ?8 AND {}
              AND (chapters_done < ?4 OR (chapters_done = ?4 AND chunks_current_done <= ?5))
            "#,
            NOT_TERMINAL
        ))
        .bind(resolved)
        .bind(synthesized)
        .bind(resolution.synthesis_secs.unwrap_or(0.0))
        .bind(resolution.chapter_index as i64)
        .bind(resolution.chunks_done as i64)
        .bind(resolution.chunks_total as i64)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn chapters(&self, id: Uuid) -> AppResult<Vec<ChapterRecord>> {
        let pool = self.pool.as_ref();

        let chapters = sqlx::query_as::<_, ChapterRecord>(
            r#"
            SELECT job_id, chapter_index, title, units_total
            FROM job_chapters
            WHERE job_id = ?
            ORDER BY chapter_index
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(chapters)
    }

    pub async fn units(&self, id: Uuid) -> AppResult<Vec<UnitRecord>> {
        let pool = self.pool.as_ref();

        let units = sqlx::query_as::<_, UnitRecord>(
            r#"
            SELECT job_id, chapter_index, unit_index, text, ends_paragraph, cache_key,
                   state, duration_secs
            FROM job_units
            WHERE job_id = ?
            ORDER BY chapter_index, unit_index
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(units)
    }

    /// Prove that the process running `id` is still alive
    pub async fn heartbeat(&self, id: Uuid) -> AppResult<()> {
        let pool = self.pool.as_ref();

        sqlx::query(&format!(
            "UPDATE jobs SET heartbeat_at = ? WHERE id = ? AND owner_id = ? AND {}",
            NOT_TERMINAL
        ))
        .bind(Utc::now())
        .bind(id)
        .bind(self.owner_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Fail every unfinished job whose owner stopped sending heartbeats.
    ///
    /// Jobs owned by this repository and jobs whose owner beat within
    /// `stale_after` are left alone; another live process may be running them.
    pub async fn fail_interrupted(&self, stale_after: Duration) -> AppResult<u64> {
        let pool = self.pool.as_ref();
        let now = Utc::now();
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::weeks(52));
        let cutoff = now - stale_after;

        let result = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = 'failed',
                error_kind = ?,
                error_message = 'Process stopped while the job was running; resubmit to resume',
                ended_at = ?,
                updated_at = ?
            WHERE {}
              AND (owner_id IS NULL OR owner_id != ?)
              AND (heartbeat_at IS NULL OR heartbeat_at <= ?)
            "#,
            NOT_TERMINAL
        ))
        .bind(ErrorKind::Interrupted)
        .bind(now)
        .bind(now)
        .bind(self.owner_id)
        .bind(cutoff)
        .execute(pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count, "Marked interrupted jobs as failed");
        }
        Ok(count)
    }

    /// Close the underlying pool; pending writes are flushed first
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
