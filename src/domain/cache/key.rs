use crate::domain::chunking::normalize_text;
use crate::domain::tts::{LanguageCode, VoiceSelector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped whenever the derivation below changes, so old entries stop matching
const KEY_VERSION: &str = "v1";
const FIELD_SEPARATOR: &[u8] = b"\x1f";

/// Content address of one synthesized unit (64 lowercase hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a unit.
    ///
    /// `sha256("v1" 0x1F normalized_text 0x1F voice_identity 0x1F language_code)`,
    /// where voice identity is `preset:<name>` or `clone:<sha256 of reference audio>`.
    pub fn derive(text: &str, voice: &VoiceSelector, language: LanguageCode) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_VERSION.as_bytes());
        hasher.update(FIELD_SEPARATOR);
        hasher.update(normalize_text(text).as_bytes());
        hasher.update(FIELD_SEPARATOR);
        hasher.update(voice.identity().as_bytes());
        hasher.update(FIELD_SEPARATOR);
        hasher.update(language.as_str().as_bytes());

        CacheKey(format!("{:x}", hasher.finalize()))
    }

    /// Wrap a key read back from storage
    pub fn from_stored(value: String) -> Self {
        CacheKey(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character fan-out directory for segment files
    pub fn shard(&self) -> &str {
        &self.0[..2.min(self.0.len())]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
