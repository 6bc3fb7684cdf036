use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Reference recording used for voice cloning.
///
/// The content hash is what identifies the voice in cache keys; the bytes
/// are only shipped to the speech service.
#[derive(Clone)]
pub struct ReferenceAudio {
    content_hash: String,
    bytes: Arc<Vec<u8>>,
}

impl ReferenceAudio {
    pub fn new(bytes: Vec<u8>) -> Self {
        let content_hash = format!("{:x}", Sha256::digest(&bytes));
        Self {
            content_hash,
            bytes: Arc::new(bytes),
        }
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for ReferenceAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceAudio")
            .field("content_hash", &self.content_hash)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Which voice reads the book
#[derive(Debug, Clone)]
pub enum VoiceSelector {
    Preset(String),
    ClonedFrom(ReferenceAudio),
}

impl VoiceSelector {
    /// Stable identity used in cache keys
    pub fn identity(&self) -> String {
        match self {
            VoiceSelector::Preset(name) => format!("preset:{}", name),
            VoiceSelector::ClonedFrom(reference) => format!("clone:{}", reference.content_hash()),
        }
    }

    pub fn is_clone(&self) -> bool {
        matches!(self, VoiceSelector::ClonedFrom(_))
    }
}
