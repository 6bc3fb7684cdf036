pub mod assembly;
pub mod cache;
pub mod chunking;
pub mod job;
pub mod tts;
