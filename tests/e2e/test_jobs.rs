use crate::helpers::{fixtures, TestContext};

use audiobook_pipeline::domain::job::{
    ErrorKind, JobServiceApi, JobServiceError, JobStatus, SubmitJobRequest, UnitState,
    OWNER_STALE_AFTER,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;
use test_context::test_context;
use uuid::Uuid;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_convert_a_two_chapter_book(ctx: &TestContext) {
    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.voice, "Aiden");

    let job = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress.percent, 100.0);
    assert_eq!(job.progress.chapters_total, 2);
    assert_eq!(job.progress.chapters_done, 2);
    assert!(job.progress.eta_secs.is_none());
    assert!(job.completed_at.is_some());
    assert_eq!(ctx.tts.calls().len(), 5);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 5);

    let output = PathBuf::from(job.output_path.expect("Missing output path"));
    assert!(output.join("001-chapter-1.wav").exists());
    assert!(output.join("002-chapter-2.wav").exists());

    let manifest_bytes = tokio::fs::read(output.join("timings.json")).await.unwrap();
    let manifest: serde_json::Value = serde_json::from_slice(&manifest_bytes).unwrap();
    assert_eq!(manifest["title"], "two_chapters");
    assert_eq!(manifest["chapters"][0]["lyrics"][0]["text"], "One two three four five.");
    assert_eq!(manifest["chapters"][1]["lyrics"].as_array().unwrap().len(), 2);

    let units = ctx.job_repo.units(job.job_id).await.unwrap();
    assert_eq!(units.len(), 5);
    assert!(units.iter().all(|u| u.state == UnitState::Synthesized));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_resume_a_failed_job_from_cache(ctx: &TestContext) {
    // Unit 4 is the first unit of chapter 2
    ctx.tts.fail_when_containing("Alpha");

    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();
    let failed = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    let error = failed.error.expect("Missing error");
    assert_eq!(error.kind, ErrorKind::SynthesisError);
    assert!(error.message.contains("Alpha"), "unexpected message: {}", error.message);
    assert_eq!(
        (
            failed.progress.chapters_done,
            failed.progress.current_chapter_chunks_done,
            failed.progress.current_chapter_chunks_total
        ),
        (1, 1, 2)
    );
    assert!(failed.progress.percent < 100.0);
    assert_eq!(ctx.tts.calls().len(), 4);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 3);

    ctx.tts.clear_failures();
    ctx.tts.reset_calls();

    let resumed = ctx.service.resubmit(job.job_id).await.unwrap();
    assert_ne!(resumed.job_id, job.job_id);
    let resumed = ctx.service.wait(resumed.job_id).await.unwrap();

    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(
        ctx.tts.calls(),
        vec![
            "Alpha beta gamma delta epsilon.".to_string(),
            "Zeta eta theta iota kappa.".to_string()
        ]
    );

    let states: Vec<UnitState> = ctx
        .job_repo
        .units(resumed.job_id)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.state)
        .collect();
    assert_eq!(
        states,
        vec![
            UnitState::CachedHit,
            UnitState::CachedHit,
            UnitState::CachedHit,
            UnitState::Synthesized,
            UnitState::Synthesized
        ]
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_cancel_mid_chapter_and_keep_cache_on_delete(ctx: &TestContext) {
    ctx.tts.hold();

    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();

    // First unit arrives and is let through
    ctx.tts.started.notified().await;
    ctx.tts.release(1);

    // Second unit is in flight when cancellation is requested
    ctx.tts.started.notified().await;
    let requested = ctx.service.cancel(job.job_id).await.unwrap();
    assert!(!requested.status.is_terminal());
    ctx.tts.release_all();

    let canceled = ctx.service.wait(job.job_id).await.unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);
    assert!(canceled.error.is_none());
    assert!(canceled.progress.percent < 100.0);

    // The in-flight unit finished and was cached; nothing after it started
    assert_eq!(ctx.tts.calls().len(), 2);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 2);

    ctx.service.delete(job.job_id).await.unwrap();

    let err = ctx.service.get(job.job_id).await.unwrap_err();
    assert!(matches!(err, JobServiceError::JobNotFound));
    assert!(!ctx.config.uploads_dir().join(job.job_id.to_string()).exists());
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 2);
    assert_eq!(fixtures::segment_files(&ctx.config.cache_dir()).len(), 2);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_report_monotonic_progress(ctx: &TestContext) {
    ctx.tts.set_delay(Duration::from_millis(20));

    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();

    let mut percents = Vec::new();
    loop {
        let view = ctx.service.get(job.job_id).await.unwrap();
        percents.push(view.progress.percent);
        if view.status.is_terminal() {
            assert_eq!(view.status, JobStatus::Completed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert!(
        percents.windows(2).all(|pair| pair[0] <= pair[1]),
        "progress moved backwards: {:?}",
        percents
    );
    let (last, before) = percents.split_last().unwrap();
    assert_eq!(*last, 100.0);
    assert!(before.iter().all(|p| *p < 100.0));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_invalid_requests(ctx: &TestContext) {
    let cases = vec![
        fixtures::text_request("archive.zip", "data"),
        fixtures::text_request("empty.txt", ""),
        SubmitJobRequest {
            output_format: Some("ogg".to_string()),
            ..fixtures::book_request()
        },
        SubmitJobRequest {
            language: Some("klingon".to_string()),
            ..fixtures::book_request()
        },
        SubmitJobRequest {
            voice: Some("   ".to_string()),
            ..fixtures::book_request()
        },
        SubmitJobRequest {
            reference_audio: Some(Vec::new()),
            ..fixtures::book_request()
        },
        fixtures::text_request("big.txt", &"x".repeat(ctx.config.max_upload_bytes + 1)),
    ];

    for request in cases {
        let description = format!("{:?}", request);
        let err = ctx.service.submit(request).await.unwrap_err();
        assert!(
            matches!(err, JobServiceError::Validation(_)),
            "expected validation error for {}, got {:?}",
            description,
            err
        );
    }

    assert!(ctx.service.list().await.unwrap().is_empty());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_unknown_jobs(ctx: &TestContext) {
    let id = Uuid::new_v4();

    assert!(matches!(ctx.service.get(id).await, Err(JobServiceError::JobNotFound)));
    assert!(matches!(ctx.service.cancel(id).await, Err(JobServiceError::JobNotFound)));
    assert!(matches!(ctx.service.delete(id).await, Err(JobServiceError::JobNotFound)));
    assert!(matches!(ctx.service.resubmit(id).await, Err(JobServiceError::JobNotFound)));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_leave_finished_jobs_unchanged_on_cancel(ctx: &TestContext) {
    let job = ctx
        .service
        .submit(fixtures::text_request("note.txt", fixtures::SHORT_NOTE))
        .await
        .unwrap();
    let done = ctx.service.wait(job.job_id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);

    let after = ctx.service.cancel(job.job_id).await.unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.completed_at, done.completed_at);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_list_jobs_newest_first(ctx: &TestContext) {
    let first = ctx
        .service
        .submit(fixtures::text_request("first.txt", fixtures::SHORT_NOTE))
        .await
        .unwrap();
    ctx.service.wait(first.job_id).await.unwrap();
    let second = ctx.service.submit(fixtures::book_request()).await.unwrap();
    ctx.service.wait(second.job_id).await.unwrap();

    let ids: Vec<Uuid> = ctx.service.list().await.unwrap().into_iter().map(|j| j.job_id).collect();
    assert_eq!(ids, vec![second.job_id, first.job_id]);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_transcribe_reference_audio_once(ctx: &TestContext) {
    let request = SubmitJobRequest {
        reference_audio: Some(fixtures::wav_bytes(1.0)),
        ..fixtures::text_request("note.txt", fixtures::SHORT_NOTE)
    };

    let job = ctx.service.submit(request).await.unwrap();
    assert_eq!(job.voice, "clone");
    let job = ctx.service.wait(job.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(ctx.tts.transcriptions(), 1);

    let record = ctx.job_repo.get(job.job_id).await.unwrap();
    assert_eq!(record.reference_transcript.as_deref(), Some("This is my reading voice."));
    assert!(ctx.config.uploads_dir().join(job.job_id.to_string()).join("reference.wav").exists());

    ctx.tts.reset_calls();
    let again = ctx.service.resubmit(job.job_id).await.unwrap();
    let again = ctx.service.wait(again.job_id).await.unwrap();

    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(ctx.tts.transcriptions(), 1);
    assert!(ctx.tts.calls().is_empty());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_detect_the_document_language(ctx: &TestContext) {
    let request = SubmitJobRequest {
        language: Some("auto".to_string()),
        ..fixtures::text_request(
            "conte.txt",
            "Il était une fois une petite fille qui vivait dans un village au bord de la forêt.\n",
        )
    };

    let job = ctx.service.submit(request).await.unwrap();
    let job = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.language, "auto");
    assert_eq!(job.resolved_language.map(|l| l.as_str()), Some("fr"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_with_extraction_error_for_unreadable_documents(ctx: &TestContext) {
    let request = SubmitJobRequest {
        source: b"PK\x03\x04 not really a book".to_vec(),
        ..fixtures::text_request("book.epub", "")
    };

    let job = ctx.service.submit(request).await.unwrap();
    let job = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, ErrorKind::ExtractionError);
    assert!(ctx.tts.calls().is_empty());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_with_assembly_error_and_keep_synthesized_audio(ctx: &TestContext) {
    let request = SubmitJobRequest {
        output_format: Some("m4b".to_string()),
        ..fixtures::book_request()
    };

    let job = ctx.service.submit(request).await.unwrap();
    let job = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, ErrorKind::AssemblyError);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 5);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_interrupted_jobs_on_restart(ctx: &mut TestContext) {
    ctx.tts.hold();
    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();
    ctx.tts.started.notified().await;

    ctx.restart().await;
    ctx.tts.release_all();

    let job = ctx.service.get(job.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Interrupted);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_leave_jobs_of_a_live_process_alone(ctx: &TestContext) {
    ctx.tts.hold();
    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();
    ctx.tts.started.notified().await;

    // A second process starting up while the first one is mid-job
    let other = ctx.open_process().await;
    let failed = other.job_repo.fail_interrupted(OWNER_STALE_AFTER).await.unwrap();
    assert_eq!(failed, 0);

    ctx.tts.release_all();
    let job = ctx.service.wait(job.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error.is_none());

    other.pool.close().await;
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_stop_a_job_canceled_from_another_process(ctx: &TestContext) {
    ctx.tts.hold();
    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();
    ctx.tts.started.notified().await;

    let other = ctx.open_process().await;
    let requested = other.service.cancel(job.job_id).await.unwrap();
    assert_eq!(requested.status, JobStatus::Canceled);
    ctx.tts.release_all();

    let canceled = ctx.service.wait(job.job_id).await.unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);

    // The in-flight unit was kept; nothing after it was synthesized
    assert_eq!(ctx.tts.calls().len(), 1);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 1);
    let units = ctx.job_repo.units(job.job_id).await.unwrap();
    assert!(units[1..].iter().all(|u| u.state == UnitState::Pending));

    other.pool.close().await;
}
