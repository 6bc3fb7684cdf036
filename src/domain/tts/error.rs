/// Unit synthesis failed after the gateway gave up
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis failed after {attempts} attempt(s): {message}")]
    Exhausted { attempts: u32, message: String },
    #[error("synthesis rejected by the speech service: {0}")]
    Rejected(String),
}

/// Reference-audio transcription failed after the gateway gave up
#[derive(Debug, Clone, thiserror::Error)]
pub enum TranscriptionError {
    #[error("transcription failed after {attempts} attempt(s): {message}")]
    Exhausted { attempts: u32, message: String },
    #[error("transcription rejected by the speech service: {0}")]
    Rejected(String),
    #[error("transcription returned no text")]
    Empty,
}
