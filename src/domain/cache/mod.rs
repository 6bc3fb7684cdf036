pub mod chunk_cache;
pub mod key;

pub use chunk_cache::{AudioSegment, CacheOutcome, ChunkCache, ChunkCacheError, Resolved};
pub use key::CacheKey;
