use crate::helpers::{fixtures, TestContext};

use audiobook_pipeline::domain::job::{JobServiceApi, JobStatus, SubmitJobRequest, UnitState};
use pretty_assertions::assert_eq;
use test_context::test_context;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_synthesize_shared_units_once_for_concurrent_jobs(ctx: &TestContext) {
    let first = ctx.service.submit(fixtures::book_request()).await.unwrap();
    let second = ctx.service.submit(fixtures::book_request()).await.unwrap();

    let (first, second) = futures::join!(
        ctx.service.wait(first.job_id),
        ctx.service.wait(second.job_id)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(second.status, JobStatus::Completed);

    let mut calls = ctx.tts.calls();
    calls.sort();
    calls.dedup();
    assert_eq!(calls.len(), 5);
    assert_eq!(ctx.tts.calls().len(), 5);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 5);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reuse_cached_audio_after_restart(ctx: &mut TestContext) {
    let job = ctx.service.submit(fixtures::book_request()).await.unwrap();
    let done = ctx.service.wait(job.job_id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(ctx.tts.calls().len(), 5);

    ctx.restart().await;
    ctx.tts.reset_calls();

    let again = ctx.service.resubmit(job.job_id).await.unwrap();
    let again = ctx.service.wait(again.job_id).await.unwrap();

    assert_eq!(again.status, JobStatus::Completed);
    assert!(ctx.tts.calls().is_empty());

    let units = ctx.job_repo.units(again.job_id).await.unwrap();
    assert_eq!(units.len(), 5);
    assert!(units.iter().all(|u| u.state == UnitState::CachedHit));
    assert_eq!(fixtures::segment_files(&ctx.config.cache_dir()).len(), 5);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_keep_separate_entries_per_voice(ctx: &TestContext) {
    let aiden = ctx.service.submit(fixtures::book_request()).await.unwrap();
    let serena = ctx
        .service
        .submit(SubmitJobRequest {
            voice: Some("Serena".to_string()),
            ..fixtures::book_request()
        })
        .await
        .unwrap();

    assert_eq!(ctx.service.wait(aiden.job_id).await.unwrap().status, JobStatus::Completed);
    assert_eq!(ctx.service.wait(serena.job_id).await.unwrap().status, JobStatus::Completed);

    assert_eq!(ctx.tts.calls().len(), 10);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 10);
}
