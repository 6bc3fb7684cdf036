use super::fixtures::wav_bytes;
use async_trait::async_trait;
use audiobook_pipeline::domain::tts::{LanguageCode, VoiceSelector};
use audiobook_pipeline::infrastructure::repositories::{TtsRepository, TtsRepositoryError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// In-process speech service.
///
/// Records every synthesis request, fails requests whose text contains a
/// configured marker, and can hold requests until the test releases them.
pub struct FakeTts {
    calls: Mutex<Vec<String>>,
    transcriptions: AtomicUsize,
    failing: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    healthy: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
    /// Signaled each time a synthesis request arrives
    pub started: Notify,
}

impl FakeTts {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            transcriptions: AtomicUsize::new(0),
            failing: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            healthy: AtomicBool::new(true),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            started: Notify::new(),
        }
    }

    /// Texts of all synthesis requests so far, in arrival order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn transcriptions(&self) -> usize {
        self.transcriptions.load(Ordering::SeqCst)
    }

    pub fn fail_when_containing(&self, marker: &str) {
        self.failing.lock().push(marker.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Park every following request until `release` lets it through
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, requests: usize) {
        self.gate.add_permits(requests);
    }

    pub fn release_all(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }
}

#[async_trait]
impl TtsRepository for FakeTts {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSelector,
        _language: LanguageCode,
        _reference_transcript: Option<&str>,
    ) -> Result<Vec<u8>, TtsRepositoryError> {
        self.calls.lock().push(text.to_string());
        self.started.notify_one();

        if self.held.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .expect("gate closed")
                .forget();
        }

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing.lock().iter().any(|marker| text.contains(marker.as_str()));
        if failing {
            return Err(TtsRepositoryError::Permanent(format!("400: cannot synthesize '{}'", text)));
        }

        // Duration grows with the text so timings differ per unit
        let words = text.split_whitespace().count() as f64;
        Ok(wav_bytes(0.2 + words * 0.1))
    }

    async fn transcribe(&self, _audio: &[u8]) -> Result<String, TtsRepositoryError> {
        self.transcriptions.fetch_add(1, Ordering::SeqCst);
        Ok("This is my reading voice.".to_string())
    }

    async fn health(&self) -> Result<serde_json::Value, TtsRepositoryError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(serde_json::json!({ "status": "ok", "model": "fake" }))
        } else {
            Err(TtsRepositoryError::Transient("connection refused".to_string()))
        }
    }
}
