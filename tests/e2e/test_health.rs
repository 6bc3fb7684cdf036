use crate::helpers::TestContext;

use test_context::test_context;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_report_ready_when_store_and_speech_service_are_up(ctx: &TestContext) {
    let (ready, report) = ctx.health.health_ready().await;

    assert!(ready);
    assert_eq!(report["status"], "ready");
    assert_eq!(report["database"], "connected");
    assert_eq!(report["tts_server"]["status"], "ok");
    assert_eq!(report["max_upload_bytes"], ctx.config.max_upload_bytes);

    let formats = report["supported_formats"].as_array().expect("Missing formats");
    assert!(formats.iter().any(|f| f == "txt"));
    assert!(formats.iter().any(|f| f == "epub"));
    let outputs = report["output_formats"].as_array().expect("Missing output formats");
    assert!(outputs.iter().any(|f| f == "wav"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_report_not_ready_when_speech_service_is_down(ctx: &TestContext) {
    ctx.tts.set_healthy(false);

    let (ready, report) = ctx.health.health_ready().await;

    assert!(!ready);
    assert_eq!(report["status"], "not_ready");
    assert_eq!(report["database"], "connected");
    assert_eq!(report["tts_server"]["status"], "unavailable");
}
