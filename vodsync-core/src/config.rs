use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VodsyncConfig {
    pub cdn: CdnSection,
    pub playback: PlaybackSection,
    pub refresh: RefreshSection,
    pub transcription: TranscriptionSection,
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdnSection {
    pub api_base: String,
    pub api_key: String,
    pub library_id: String,
    pub cdn_host: String,
    pub stream_host: String,
    pub embed_host: String,
    pub api_timeout_seconds: u64,
    pub scrape_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackSection {
    pub token_auth_enabled: bool,
    pub token_signing_key: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
}

fn default_token_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshSection {
    pub inter_call_delay_ms: u64,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSection {
    pub provider_base: String,
    pub provider_api_key: String,
    pub source_language: String,
    pub target_languages: Vec<String>,
    pub request_timeout_seconds: u64,
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub database_path: String,
}

pub fn load_vodsync_config<P: AsRef<Path>>(path: P) -> Result<VodsyncConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
