pub mod assembly_repository;
pub mod chunk_store_repository;
pub mod document_repository;
pub mod job_repository;
pub mod qwen_tts_repository;
pub mod tts_repository;

pub use assembly_repository::{AssemblyFailure, AudiobookAssembler, WavBundleAssembler};
pub use chunk_store_repository::{CacheEntryRecord, ChunkStoreRepository};
pub use document_repository::{DocumentError, DocumentExtractor, PlainTextExtractor};
pub use job_repository::JobRepository;
pub use qwen_tts_repository::QwenTtsRepository;
pub use tts_repository::{TtsRepository, TtsRepositoryError};
