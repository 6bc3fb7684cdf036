use crate::helpers::{fixtures, TestContext};

use audiobook_pipeline::domain::job::{ErrorKind, JobServiceApi, JobStatus};
use audiobook_pipeline::infrastructure::repositories::QwenTtsRepository;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn context_for(server: &MockServer) -> TestContext {
    let repo = QwenTtsRepository::new(
        server.uri(),
        server.uri(),
        "large-v3-turbo".to_string(),
        Duration::from_secs(5),
    )
    .expect("Failed to build speech client");

    TestContext::with_tts_repository(Arc::new(repo)).await
}

#[tokio::test]
async fn it_should_retry_a_transient_speech_service_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fixtures::wav_bytes(0.5)))
        .mount(&server)
        .await;

    let ctx = context_for(&server).await;

    let job = ctx
        .service
        .submit(fixtures::text_request("note.txt", fixtures::SHORT_NOTE))
        .await
        .unwrap();
    let job = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    ctx.pool.close().await;
}

#[tokio::test]
async fn it_should_fail_the_job_when_retries_run_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let ctx = context_for(&server).await;

    let job = ctx
        .service
        .submit(fixtures::text_request("note.txt", fixtures::SHORT_NOTE))
        .await
        .unwrap();
    let job = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("Missing error");
    assert_eq!(error.kind, ErrorKind::SynthesisError);
    assert!(error.message.contains("3 attempt"), "unexpected message: {}", error.message);
    assert_eq!(ctx.chunk_store.count().await.unwrap(), 0);

    ctx.pool.close().await;
}

#[tokio::test]
async fn it_should_not_retry_a_rejected_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tts"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unsupported voice"))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_for(&server).await;

    let job = ctx
        .service
        .submit(fixtures::text_request("note.txt", fixtures::SHORT_NOTE))
        .await
        .unwrap();
    let job = ctx.service.wait(job.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.expect("Missing error").kind, ErrorKind::SynthesisError);

    ctx.pool.close().await;
}
