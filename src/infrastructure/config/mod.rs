use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    // Speech service
    pub tts_base_url: String,
    pub stt_base_url: String,
    pub stt_model: String,
    pub tts_request_timeout_secs: u64,
    pub tts_max_attempts: u32,
    pub tts_backoff_base_secs: u64,
    // Chunking
    pub chunk_target_words: usize,
    pub chunk_max_words: usize,
    // Chunk cache
    pub cache_memory_capacity: u64,
    // Uploads
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/jobs.db".to_string()),
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                })?,
            tts_base_url: env::var("TTS_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8765".to_string()),
            stt_base_url: env::var("STT_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8766".to_string()),
            stt_model: env::var("STT_MODEL").unwrap_or_else(|_| "large-v3-turbo".to_string()),
            tts_request_timeout_secs: env::var("TTS_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()?,
            tts_max_attempts: env::var("TTS_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            tts_backoff_base_secs: env::var("TTS_BACKOFF_BASE_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            chunk_target_words: env::var("CHUNK_TARGET_WORDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            chunk_max_words: env::var("CHUNK_MAX_WORDS")
                .unwrap_or_else(|_| "400".to_string())
                .parse()?,
            cache_memory_capacity: env::var("CACHE_MEMORY_CAPACITY")
                .unwrap_or_else(|_| "1024".to_string())
                .parse()?,
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| (100 * 1024 * 1024).to_string())
                .parse()?,
        };

        if config.chunk_max_words < config.chunk_target_words {
            return Err(format!(
                "CHUNK_MAX_WORDS ({}) must not be smaller than CHUNK_TARGET_WORDS ({})",
                config.chunk_max_words, config.chunk_target_words
            )
            .into());
        }

        Ok(config)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn tts_request_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_request_timeout_secs)
    }

    pub fn tts_backoff_base(&self) -> Duration {
        Duration::from_secs(self.tts_backoff_base_secs)
    }
}
