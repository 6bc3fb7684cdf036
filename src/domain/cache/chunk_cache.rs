use super::key::CacheKey;
use crate::domain::tts::{wav_duration_secs, SynthesisError, SynthesizedAudio};
use crate::infrastructure::repositories::{CacheEntryRecord, ChunkStoreRepository};
use moka::future::Cache;
use parking_lot::Mutex;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A resolved unit: where its audio lives and how long it plays
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub cache_key: CacheKey,
    pub path: PathBuf,
    pub duration_secs: f64,
    pub byte_len: u64,
}

impl From<CacheEntryRecord> for AudioSegment {
    fn from(entry: CacheEntryRecord) -> Self {
        Self {
            cache_key: CacheKey::from_stored(entry.cache_key),
            path: PathBuf::from(entry.path),
            duration_secs: entry.duration_secs,
            byte_len: entry.byte_len.max(0) as u64,
        }
    }
}

/// How a `get_or_compute` call was satisfied
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheOutcome {
    /// Served from memory, from disk, or from another caller's computation
    Hit,
    /// This call ran the computation
    Computed { elapsed: Duration },
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub segment: AudioSegment,
    pub outcome: CacheOutcome,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChunkCacheError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("chunk store failure: {0}")]
    Storage(String),
}

/// Content-addressed cache of synthesized segments.
///
/// Durable entries live in the chunk store; a bounded in-memory map sits in
/// front of it and coalesces concurrent requests, so at most one computation
/// runs per key across every job sharing this cache.
pub struct ChunkCache {
    store: Arc<ChunkStoreRepository>,
    memory: Cache<String, AudioSegment>,
}

impl ChunkCache {
    pub fn new(store: Arc<ChunkStoreRepository>, memory_capacity: u64) -> Self {
        Self {
            store,
            memory: Cache::builder().max_capacity(memory_capacity).build(),
        }
    }

    pub fn store(&self) -> &Arc<ChunkStoreRepository> {
        &self.store
    }

    /// Return the segment for `key`, running `compute` only when neither memory
    /// nor the durable store holds a readable entry.
    ///
    /// Concurrent callers for the same key wait on a single computation and all
    /// receive its result; only the caller that ran it sees `Computed`. Failed
    /// computations are not cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<Resolved, ChunkCacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SynthesizedAudio, SynthesisError>>,
    {
        if let Some(segment) = self.memory.get(key.as_str()).await {
            let on_disk = tokio::fs::metadata(&segment.path).await.map(|m| m.len()).ok();
            if on_disk == Some(segment.byte_len) {
                tracing::debug!(cache_key = %key, "Chunk cache memory hit");
                return Ok(Resolved {
                    segment,
                    outcome: CacheOutcome::Hit,
                });
            }
            tracing::warn!(
                cache_key = %key,
                path = %segment.path.display(),
                expected_bytes = segment.byte_len,
                found_bytes = ?on_disk,
                "Cached segment file changed on disk, reloading"
            );
            self.memory.invalidate(key.as_str()).await;
        }

        let computed: Mutex<Option<Duration>> = Mutex::new(None);

        let segment = self
            .memory
            .try_get_with(
                key.as_str().to_string(),
                self.load_or_compute(key, compute, &computed),
            )
            .await
            .map_err(|e| (*e).clone())?;

        let outcome = match computed.into_inner() {
            Some(elapsed) => CacheOutcome::Computed { elapsed },
            None => CacheOutcome::Hit,
        };

        Ok(Resolved { segment, outcome })
    }

    async fn load_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
        computed: &Mutex<Option<Duration>>,
    ) -> Result<AudioSegment, ChunkCacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SynthesizedAudio, SynthesisError>>,
    {
        if let Some(segment) = self.load_verified(key).await? {
            tracing::debug!(cache_key = %key, "Chunk cache disk hit");
            return Ok(segment);
        }

        let started = Instant::now();
        let audio = compute().await?;
        let elapsed = started.elapsed();

        let entry = self
            .store
            .put(key, &audio.bytes, audio.duration_secs)
            .await
            .map_err(|e| ChunkCacheError::Storage(e.to_string()))?;

        *computed.lock() = Some(elapsed);
        Ok(AudioSegment::from(entry))
    }

    /// Disk lookup that treats an unreadable, resized or truncated segment
    /// as a miss
    async fn load_verified(&self, key: &CacheKey) -> Result<Option<AudioSegment>, ChunkCacheError> {
        let entry = match self.store.find(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e) => return Err(ChunkCacheError::Storage(e.to_string())),
        };

        let readable = match self.store.read_audio(&entry).await {
            Ok(bytes) if bytes.len() as i64 != entry.byte_len => Err(format!(
                "file holds {} bytes, index recorded {}",
                bytes.len(),
                entry.byte_len
            )),
            Ok(bytes) => wav_duration_secs(&bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match readable {
            Ok(_) => Ok(Some(AudioSegment::from(entry))),
            Err(reason) => {
                tracing::warn!(
                    cache_key = %key,
                    path = %entry.path,
                    reason = %reason,
                    "Cache entry corrupted, recomputing"
                );
                Ok(None)
            }
        }
    }
}
