use crate::domain::cache::CacheKey;
use crate::error::AppResult;
use crate::infrastructure::db::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Row of the cache entry index
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntryRecord {
    pub cache_key: String,
    pub path: String,
    pub duration_secs: f64,
    pub byte_len: i64,
    pub created_at: DateTime<Utc>,
}

/// Durable side of the chunk cache: one WAV file per key under
/// `<root>/<first two hex chars>/<key>.wav`, indexed in `cache_entries`.
pub struct ChunkStoreRepository {
    pool: Arc<DbPool>,
    root: PathBuf,
}

impl ChunkStoreRepository {
    pub fn new(pool: Arc<DbPool>, root: PathBuf) -> Self {
        Self { pool, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the segment for `key` lives on disk
    pub fn segment_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(key.shard())
            .join(format!("{}.wav", key.as_str()))
    }

    /// Find the index entry for a key
    pub async fn find(&self, key: &CacheKey) -> AppResult<Option<CacheEntryRecord>> {
        let pool = self.pool.as_ref();

        let entry = sqlx::query_as::<_, CacheEntryRecord>(
            r#"
            SELECT cache_key, path, duration_secs, byte_len, created_at
            FROM cache_entries
            WHERE cache_key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(pool)
        .await?;

        Ok(entry)
    }

    /// Read the audio bytes an entry points at
    pub async fn read_audio(&self, entry: &CacheEntryRecord) -> AppResult<Vec<u8>> {
        Ok(tokio::fs::read(&entry.path).await?)
    }

    /// Write a segment file and record it in the index.
    ///
    /// The file is written to a temporary name, synced and renamed into place,
    /// so readers never observe a partially written segment. An existing entry
    /// for the key (a corrupted one being repaired) is overwritten.
    pub async fn put(
        &self,
        key: &CacheKey,
        audio: &[u8],
        duration_secs: f64,
    ) -> AppResult<CacheEntryRecord> {
        let path = self.segment_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension(format!("wav.{}.tmp", Uuid::new_v4().simple()));
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(audio).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &path).await?;

        let pool = self.pool.as_ref();
        let now = Utc::now();
        let path_str = path.to_string_lossy().into_owned();

        // Plain `execute` so the statement completes and commits before returning
        sqlx::query(
            r#"
            INSERT INTO cache_entries (cache_key, path, duration_secs, byte_len, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (cache_key) DO UPDATE SET
                path = excluded.path,
                duration_secs = excluded.duration_secs,
                byte_len = excluded.byte_len,
                created_at = excluded.created_at
            "#,
        )
        .bind(key.as_str())
        .bind(&path_str)
        .bind(duration_secs)
        .bind(audio.len() as i64)
        .bind(now)
        .execute(pool)
        .await?;

        let entry = CacheEntryRecord {
            cache_key: key.as_str().to_string(),
            path: path_str.clone(),
            duration_secs,
            byte_len: audio.len() as i64,
            created_at: now,
        };

        tracing::debug!(
            cache_key = %key,
            path = %path_str,
            byte_len = audio.len(),
            duration_secs,
            "Stored audio segment"
        );

        Ok(entry)
    }

    /// Number of entries in the index
    pub async fn count(&self) -> AppResult<i64> {
        let pool = self.pool.as_ref();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(pool)
            .await?;
        Ok(count.0)
    }
}
