mod access;
mod resolver;
mod store;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use access::{can_access, should_show_lock};
pub use resolver::AssetIdResolver;
pub use store::{AssetRef, CollectionSummary, SqliteAssetStore, SqliteAssetStoreBuilder};

/// Longest signed URL the store accepts; the CDN never issues longer ones.
pub const SIGNED_URL_MAX_CHARS: usize = 1000;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to open asset database {path}: {source}")]
    Open {
        source: rusqlite::Error,
        path: PathBuf,
    },
    #[error("failed to execute statement on asset database: {0}")]
    Execute(#[from] rusqlite::Error),
    #[error("asset store path not configured")]
    MissingStore,
    #[error("asset record not found: {0}")]
    NotFound(i64),
    #[error("invalid pipeline status: {0}")]
    InvalidStatus(String),
    #[error("invalid visibility tier: {0}")]
    InvalidTier(String),
    #[error("invalid entitlement: {0}")]
    InvalidEntitlement(String),
    #[error("signed url exceeds the 1000 char cap ({0})")]
    UrlTooLong(usize),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type AssetResult<T> = Result<T, AssetError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityTier {
    Freemium,
    Basic,
    Premium,
    Exclusive,
}

impl VisibilityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityTier::Freemium => "freemium",
            VisibilityTier::Basic => "basic",
            VisibilityTier::Premium => "premium",
            VisibilityTier::Exclusive => "exclusive",
        }
    }
}

impl std::fmt::Display for VisibilityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VisibilityTier {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "freemium" => Ok(Self::Freemium),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "exclusive" => Ok(Self::Exclusive),
            other => Err(AssetError::InvalidTier(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entitlement {
    None,
    Basic,
    Premium,
    Admin,
}

impl std::str::FromStr for Entitlement {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "admin" => Ok(Self::Admin),
            other => Err(AssetError::InvalidEntitlement(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Processing => "processing",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(AssetError::InvalidStatus(other.to_string())),
        }
    }
}

/// One transcribed language for an asset, keyed by ISO language code in
/// `AssetRecord::transcriptions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionEntry {
    pub text: String,
    pub vtt: String,
    #[serde(default)]
    pub caption_url: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub method: String,
}

#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub id: i64,
    pub collection: String,
    pub title: Option<String>,
    pub external_asset_id: Option<String>,
    pub embed_reference_url: Option<String>,
    pub signed_playlist_url: Option<String>,
    pub visibility_tier: VisibilityTier,
    pub duration_seconds: i64,
    pub source_language: String,
    pub transcriptions: HashMap<String, TranscriptionEntry>,
    pub caption_urls: HashMap<String, String>,
    pub audio_urls: HashMap<String, String>,
    pub transcription_status: PipelineStatus,
    pub transcription_error: Option<String>,
    pub transcription_processed_at: Option<DateTime<Utc>>,
    pub url_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload; the ingestion flow owns the rest of the record.
#[derive(Debug, Clone, Default)]
pub struct NewAsset {
    pub collection: String,
    pub title: Option<String>,
    pub embed_reference_url: Option<String>,
    pub external_asset_id: Option<String>,
    pub visibility_tier: Option<VisibilityTier>,
    pub source_language: Option<String>,
}
