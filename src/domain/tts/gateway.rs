use super::audio::wav_duration_secs;
use super::error::{SynthesisError, TranscriptionError};
use super::language::LanguageCode;
use super::voice::VoiceSelector;
use crate::infrastructure::repositories::{TtsRepository, TtsRepositoryError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Exponential backoff: `base`, `2 * base`, `4 * base`, ... between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Audio for one unit as returned by the speech service
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub duration_secs: f64,
}

/// Why the last attempt failed, and whether another one may help
struct AttemptFailure {
    message: String,
    retriable: bool,
}

/// Retry wrapper around the remote speech capabilities.
///
/// Holds no state besides the policy, so it is safe to share across jobs and
/// call concurrently for different units.
pub struct SynthesisGateway {
    tts_repo: Arc<dyn TtsRepository>,
    retry: RetryPolicy,
}

impl SynthesisGateway {
    pub fn new(tts_repo: Arc<dyn TtsRepository>, retry: RetryPolicy) -> Self {
        Self { tts_repo, retry }
    }

    pub fn repository(&self) -> &Arc<dyn TtsRepository> {
        &self.tts_repo
    }

    pub async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelector,
        language: LanguageCode,
        reference_transcript: Option<&str>,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        self.with_retry("synthesize", move || async move {
            let bytes = self
                .tts_repo
                .synthesize(text, voice, language, reference_transcript)
                .await
                .map_err(AttemptFailure::from)?;

            // A garbled body from a struggling server is as retriable as a 5xx
            let duration_secs = wav_duration_secs(&bytes).map_err(|e| AttemptFailure {
                message: format!("speech service returned unreadable audio: {}", e),
                retriable: true,
            })?;

            Ok(SynthesizedAudio {
                bytes,
                duration_secs,
            })
        })
        .await
        .map_err(|(attempts, failure)| {
            if failure.retriable {
                SynthesisError::Exhausted {
                    attempts,
                    message: failure.message,
                }
            } else {
                SynthesisError::Rejected(failure.message)
            }
        })
    }

    pub async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        let text = self
            .with_retry("transcribe", move || async move {
                self.tts_repo
                    .transcribe(audio)
                    .await
                    .map_err(AttemptFailure::from)
            })
            .await
            .map_err(|(attempts, failure)| {
                if failure.retriable {
                    TranscriptionError::Exhausted {
                        attempts,
                        message: failure.message,
                    }
                } else {
                    TranscriptionError::Rejected(failure.message)
                }
            })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(TranscriptionError::Empty);
        }
        Ok(text)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    /// On failure returns the number of attempts made and the last failure.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, (u32, AttemptFailure)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptFailure>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(failure) if !failure.retriable || attempt >= self.retry.max_attempts => {
                    tracing::error!(
                        operation,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %failure.message,
                        "Speech service call failed"
                    );
                    return Err((attempt, failure));
                }
                Err(failure) => {
                    let wait = self.retry.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        retry_in_ms = wait.as_millis() as u64,
                        error = %failure.message,
                        "Speech service call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl From<TtsRepositoryError> for AttemptFailure {
    fn from(err: TtsRepositoryError) -> Self {
        AttemptFailure {
            retriable: err.is_transient(),
            message: err.to_string(),
        }
    }
}
