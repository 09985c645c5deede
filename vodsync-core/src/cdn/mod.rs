mod embed;
mod token;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CdnSection;

pub use embed::extract_playlist_url;
pub use token::{TokenError, TokenSigner};

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("cdn rejected credentials (http 401)")]
    Credential,
    #[error("cdn asset not found: {0}")]
    NotFound(String),
    #[error("transient cdn failure: {0}")]
    Transient(String),
    #[error("unexpected cdn response (http {status}): {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("invalid cdn response: {0}")]
    InvalidResponse(String),
    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl CdnError {
    /// Eligible for a bounded retry by the caller; this client itself
    /// never retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, CdnError::Transient(_))
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            CdnError::Transient(err.to_string())
        } else {
            CdnError::Http(err)
        }
    }
}

pub type CdnResult<T> = Result<T, CdnError>;

#[derive(Debug, Clone, Serialize)]
pub struct AssetMetadata {
    pub duration_seconds: i64,
    pub file_size_bytes: u64,
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
}

/// CDN-side caption track; never persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptionTrack {
    pub track_id: String,
    pub language: String,
    pub label: String,
    pub is_default: bool,
}

/// Seam over the CDN REST API plus the embed-page fallback, so batch
/// callers can be exercised against a mock.
#[async_trait]
pub trait CdnApi: Send + Sync {
    async fn fetch_metadata(&self, asset_id: &str) -> CdnResult<AssetMetadata>;
    async fn list_captions(&self, asset_id: &str) -> CdnResult<Vec<CaptionTrack>>;
    async fn upload_caption(
        &self,
        asset_id: &str,
        vtt: &str,
        language: &str,
        label: &str,
    ) -> CdnResult<()>;
    async fn delete_all_captions(&self, asset_id: &str) -> CdnResult<usize>;
    /// Degraded-mode path: scrape the public embed page for a signed
    /// playlist URL and validate it with a HEAD probe. Absent means no
    /// working URL could be produced, which batch callers skip.
    async fn resolve_playlist_url(&self, asset_id: &str) -> CdnResult<Option<String>>;
}

pub struct CdnClient {
    api: Client,
    scraper: Client,
    config: CdnSection,
}

impl CdnClient {
    pub fn new(config: CdnSection) -> CdnResult<Self> {
        let api = Client::builder()
            .user_agent("vodsync/0.1")
            .timeout(Duration::from_secs(config.api_timeout_seconds))
            .build()
            .map_err(CdnError::from_reqwest)?;
        // Embed pages are full HTML documents; give the scrape a looser bound.
        let scraper = Client::builder()
            .user_agent("vodsync/0.1")
            .timeout(Duration::from_secs(config.scrape_timeout_seconds))
            .build()
            .map_err(CdnError::from_reqwest)?;
        Ok(Self {
            api,
            scraper,
            config,
        })
    }

    fn video_url(&self, asset_id: &str) -> String {
        format!(
            "{}/library/{}/videos/{}",
            self.config.api_base, self.config.library_id, asset_id
        )
    }

    fn embed_url(&self, asset_id: &str) -> String {
        format!(
            "https://{}/embed/{}/{}",
            self.config.embed_host, self.config.library_id, asset_id
        )
    }

    async fn check(&self, response: Response, asset_id: &str) -> CdnResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED => Err(CdnError::Credential),
            StatusCode::NOT_FOUND => Err(CdnError::NotFound(asset_id.to_string())),
            status if status.is_server_error() => Err(CdnError::Transient(format!(
                "cdn returned http {status} for {asset_id}"
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(CdnError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn fetch_video(&self, asset_id: &str) -> CdnResult<VideoPayload> {
        let response = self
            .api
            .get(self.video_url(asset_id))
            .header("AccessKey", &self.config.api_key)
            .send()
            .await
            .map_err(CdnError::from_reqwest)?;
        self.check(response, asset_id)
            .await?
            .json::<VideoPayload>()
            .await
            .map_err(|err| CdnError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl CdnApi for CdnClient {
    async fn fetch_metadata(&self, asset_id: &str) -> CdnResult<AssetMetadata> {
        let payload = self.fetch_video(asset_id).await?;
        Ok(AssetMetadata {
            duration_seconds: payload.length,
            file_size_bytes: payload.storage_size,
            thumbnail_url: payload.thumbnail_file_name.map(|name| {
                format!("https://{}/{}/{}", self.config.cdn_host, asset_id, name)
            }),
            title: payload.title,
        })
    }

    async fn list_captions(&self, asset_id: &str) -> CdnResult<Vec<CaptionTrack>> {
        let payload = self.fetch_video(asset_id).await?;
        Ok(payload
            .captions
            .into_iter()
            .map(|caption| CaptionTrack {
                track_id: caption.srclang.clone(),
                language: caption.srclang,
                label: caption.label,
                is_default: false,
            })
            .collect())
    }

    async fn upload_caption(
        &self,
        asset_id: &str,
        vtt: &str,
        language: &str,
        label: &str,
    ) -> CdnResult<()> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let url = format!("{}/captions/{}", self.video_url(asset_id), language);
        let payload = serde_json::json!({
            "srclang": language,
            "label": label,
            "captionsFile": STANDARD.encode(vtt.as_bytes()),
        });
        let response = self
            .api
            .post(url)
            .header("AccessKey", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(CdnError::from_reqwest)?;
        self.check(response, asset_id).await?;
        debug!(asset_id, language, "uploaded caption track");
        Ok(())
    }

    async fn delete_all_captions(&self, asset_id: &str) -> CdnResult<usize> {
        let tracks = self.list_captions(asset_id).await?;
        let mut deleted = 0usize;
        for track in &tracks {
            let url = format!("{}/captions/{}", self.video_url(asset_id), track.language);
            let response = self
                .api
                .delete(url)
                .header("AccessKey", &self.config.api_key)
                .send()
                .await
                .map_err(CdnError::from_reqwest)?;
            self.check(response, asset_id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn resolve_playlist_url(&self, asset_id: &str) -> CdnResult<Option<String>> {
        let response = self
            .scraper
            .get(self.embed_url(asset_id))
            .send()
            .await
            .map_err(CdnError::from_reqwest)?;
        let html = self
            .check(response, asset_id)
            .await?
            .text()
            .await
            .map_err(CdnError::from_reqwest)?;
        let Some(candidate) = extract_playlist_url(&html) else {
            debug!(asset_id, "embed page exposed no tokenized playlist url");
            return Ok(None);
        };
        // The scraped URL is only trusted after the CDN answers for it.
        let probe = self
            .scraper
            .head(&candidate)
            .send()
            .await
            .map_err(CdnError::from_reqwest)?;
        if probe.status() == StatusCode::OK {
            Ok(Some(candidate))
        } else {
            warn!(
                asset_id,
                status = probe.status().as_u16(),
                "scraped playlist url failed validation probe"
            );
            Ok(None)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    length: i64,
    #[serde(default)]
    storage_size: u64,
    #[serde(default)]
    thumbnail_file_name: Option<String>,
    #[serde(default)]
    captions: Vec<CaptionPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionPayload {
    srclang: String,
    #[serde(default)]
    label: String,
}
