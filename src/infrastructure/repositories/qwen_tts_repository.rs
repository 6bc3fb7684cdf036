use super::tts_repository::{TtsRepository, TtsRepositoryError};
use crate::domain::tts::{LanguageCode, VoiceSelector};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// ~300 words ≈ 2 min audio at the 12Hz codec; cloning runs with a tighter budget
const MAX_NEW_TOKENS_CLONE: u32 = 1440;
/// ~5 min audio
const MAX_NEW_TOKENS_PRESET: u32 = 3600;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(60);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a Qwen3-TTS synthesis server paired with a
/// Whisper-compatible transcription server
pub struct QwenTtsRepository {
    client: Client,
    tts_base_url: String,
    stt_base_url: String,
    stt_model: String,
}

#[derive(Serialize)]
struct PresetRequest<'a> {
    text: &'a str,
    voice: &'a str,
    language: &'a str,
    max_new_tokens: u32,
}

#[derive(Serialize)]
struct CloneRequest<'a> {
    text: &'a str,
    ref_audio: String,
    language: &'a str,
    max_new_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_text: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl QwenTtsRepository {
    pub fn new(
        tts_base_url: String,
        stt_base_url: String,
        stt_model: String,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()?;

        Ok(Self {
            client,
            tts_base_url: tts_base_url.trim_end_matches('/').to_string(),
            stt_base_url: stt_base_url.trim_end_matches('/').to_string(),
            stt_model,
        })
    }

    /// Turn a non-success response into a classified error
    async fn check_status(response: Response) -> Result<Response, TtsRepositoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = format!("{}: {}", status, body);

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(TtsRepositoryError::Transient(message))
        } else {
            Err(TtsRepositoryError::Permanent(message))
        }
    }

    /// Network-level failures (timeouts, refused connections, broken bodies) are retriable
    fn transport_error(e: reqwest::Error) -> TtsRepositoryError {
        TtsRepositoryError::Transient(e.to_string())
    }
}

#[async_trait]
impl TtsRepository for QwenTtsRepository {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelector,
        language: LanguageCode,
        reference_transcript: Option<&str>,
    ) -> Result<Vec<u8>, TtsRepositoryError> {
        let start_time = Instant::now();

        let request = match voice {
            VoiceSelector::Preset(name) => self
                .client
                .post(format!("{}/tts", self.tts_base_url))
                .json(&PresetRequest {
                    text,
                    voice: name,
                    language: language.service_name(),
                    max_new_tokens: MAX_NEW_TOKENS_PRESET,
                }),
            VoiceSelector::ClonedFrom(reference) => self
                .client
                .post(format!("{}/tts/clone", self.tts_base_url))
                .json(&CloneRequest {
                    text,
                    ref_audio: base64::engine::general_purpose::STANDARD.encode(reference.bytes()),
                    language: language.service_name(),
                    max_new_tokens: MAX_NEW_TOKENS_CLONE,
                    ref_text: reference_transcript,
                }),
        };

        tracing::debug!(
            voice = %voice.identity(),
            language = %language,
            text_length = text.len(),
            "Calling speech synthesis server"
        );

        let response = request.send().await.map_err(Self::transport_error)?;
        let response = Self::check_status(response).await?;
        let audio_bytes = response.bytes().await.map_err(Self::transport_error)?.to_vec();

        let duration = start_time.elapsed();
        let throughput_chars_per_sec = if duration.as_secs_f64() > 0.0 {
            text.len() as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        tracing::info!(
            provider = "qwen",
            voice = %voice.identity(),
            language = %language,
            latency_ms = duration.as_millis() as u64,
            characters_count = text.len(),
            audio_size_bytes = audio_bytes.len(),
            throughput_chars_per_sec = format!("{:.2}", throughput_chars_per_sec),
            "Speech synthesis call completed"
        );

        Ok(audio_bytes)
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String, TtsRepositoryError> {
        let file = multipart::Part::bytes(audio.to_vec())
            .file_name("reference.wav")
            .mime_str("audio/wav")
            .map_err(|e| TtsRepositoryError::Permanent(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("model", self.stt_model.clone());

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.stt_base_url))
            .timeout(TRANSCRIBE_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check_status(response).await?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| {
                TtsRepositoryError::Permanent(format!("invalid transcription body: {}", e))
            })?;

        tracing::info!(
            model = %self.stt_model,
            transcript_length = body.text.len(),
            "Reference audio transcribed"
        );

        Ok(body.text)
    }

    async fn health(&self) -> Result<serde_json::Value, TtsRepositoryError> {
        let response = self
            .client
            .get(format!("{}/health", self.tts_base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| TtsRepositoryError::Permanent(format!("invalid health body: {}", e)))
    }
}
