use crate::domain::tts::{LanguageCode, VoiceSelector};
use async_trait::async_trait;

/// Failure reported by a speech provider.
///
/// Transient failures (timeouts, connection errors, 5xx, unreadable audio)
/// are worth retrying; permanent ones (4xx) are not.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TtsRepositoryError {
    #[error("transient speech service failure: {0}")]
    Transient(String),
    #[error("speech service rejected the request: {0}")]
    Permanent(String),
}

impl TtsRepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TtsRepositoryError::Transient(_))
    }
}

/// Repository for the remote speech capabilities.
/// Abstracts the underlying synthesis and transcription servers.
///
/// Implementations perform exactly one remote call per method invocation:
/// retries and caching live above this layer.
#[async_trait]
pub trait TtsRepository: Send + Sync {
    /// Synthesize one unit of text
    ///
    /// Returns WAV audio bytes
    ///
    /// # Arguments
    /// * `text` - The unit text, already trimmed
    /// * `voice` - Preset voice name or reference audio for cloning
    /// * `language` - The target language for synthesis
    /// * `reference_transcript` - Transcript of the reference audio when cloning
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelector,
        language: LanguageCode,
        reference_transcript: Option<&str>,
    ) -> Result<Vec<u8>, TtsRepositoryError>;

    /// Transcribe a reference recording to text
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TtsRepositoryError>;

    /// Probe the synthesis server
    async fn health(&self) -> Result<serde_json::Value, TtsRepositoryError>;
}
