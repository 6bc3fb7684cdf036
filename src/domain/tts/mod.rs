pub mod audio;
pub mod error;
pub mod gateway;
pub mod language;
pub mod voice;

pub use audio::wav_duration_secs;
pub use error::{SynthesisError, TranscriptionError};
pub use gateway::{RetryPolicy, SynthesisGateway, SynthesizedAudio};
pub use language::{detect_language, LanguageCode, LanguageSelection};
pub use voice::{ReferenceAudio, VoiceSelector};
