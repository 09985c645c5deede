use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::TranscriptionSection;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transcription provider rejected credentials")]
    Credential,
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("provider rejected request: {0}")]
    Rejected(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptRequest<'a> {
    pub asset_id: &'a str,
    pub playback_url: Option<&'a str>,
    pub source_language: &'a str,
    pub target_language: &'a str,
}

/// Text plus timing data already rendered as WebVTT; `dubbed_audio_url`
/// is present only when the provider also synthesized audio.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub vtt: String,
    #[serde(default)]
    pub dubbed_audio_url: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "speech-to-text".to_string()
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn transcribe(
        &self,
        request: &TranscriptRequest<'_>,
    ) -> Result<Transcript, ProviderError>;
}

pub struct HttpTranscriptionProvider {
    client: Client,
    base: String,
    api_key: String,
}

impl HttpTranscriptionProvider {
    pub fn new(section: &TranscriptionSection) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent("vodsync/0.1")
            .timeout(Duration::from_secs(section.request_timeout_seconds))
            .build()
            .map_err(|err| ProviderError::Transient(err.to_string()))?;
        Ok(Self {
            client,
            base: section.provider_base.trim_end_matches('/').to_string(),
            api_key: section.provider_api_key.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for HttpTranscriptionProvider {
    async fn transcribe(
        &self,
        request: &TranscriptRequest<'_>,
    ) -> Result<Transcript, ProviderError> {
        let payload = serde_json::json!({
            "asset_id": request.asset_id,
            "audio_url": request.playback_url,
            "source_language": request.source_language,
            "target_language": request.target_language,
        });
        let response = self
            .client
            .post(format!("{}/v1/transcriptions", self.base))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    ProviderError::Transient(err.to_string())
                } else {
                    ProviderError::Rejected(err.to_string())
                }
            })?;
        match response.status() {
            status if status.is_success() => response
                .json::<Transcript>()
                .await
                .map_err(|err| ProviderError::InvalidResponse(err.to_string())),
            StatusCode::UNAUTHORIZED => Err(ProviderError::Credential),
            status if status.is_server_error() => Err(ProviderError::Transient(format!(
                "provider returned http {status}"
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::Rejected(format!("http {status}: {body}")))
            }
        }
    }
}
