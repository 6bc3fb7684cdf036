use serde_json::json;
use std::sync::Arc;

use crate::domain::job::{OutputFormat, SourceKind};
use crate::infrastructure::db::{check_connection, DbPool};
use crate::infrastructure::repositories::TtsRepository;

pub struct HealthController {
    pool: Arc<DbPool>,
    tts_repo: Arc<dyn TtsRepository>,
    max_upload_bytes: usize,
}

impl HealthController {
    pub fn new(
        pool: Arc<DbPool>,
        tts_repo: Arc<dyn TtsRepository>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            pool,
            tts_repo,
            max_upload_bytes,
        }
    }

    /// health - Job store and speech service readiness.
    /// Returns whether both are available, plus a report.
    pub async fn health_ready(&self) -> (bool, serde_json::Value) {
        let database = check_connection(&self.pool).await.is_ok();
        let tts = match self.tts_repo.health().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Speech service health check failed");
                None
            }
        };
        let ready = database && tts.is_some();

        let report = json!({
            "status": if ready { "ready" } else { "not_ready" },
            "database": if database { "connected" } else { "disconnected" },
            "tts_server": tts.unwrap_or_else(|| json!({ "status": "unavailable" })),
            "max_upload_bytes": self.max_upload_bytes,
            "supported_formats": SourceKind::ALL.iter().map(|k| k.extension()).collect::<Vec<_>>(),
            "output_formats": OutputFormat::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
        });

        (ready, report)
    }
}
