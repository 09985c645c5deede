use chrono::Utc;
use thiserror::Error;
use url::Url;

use crate::asset::{AssetIdResolver, AssetRecord};
use crate::cdn::{TokenError, TokenSigner};
use crate::config::{CdnSection, PlaybackSection};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("asset has no resolvable cdn id")]
    UnresolvedAsset,
    #[error("invalid playback url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Token,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackHost {
    /// Direct CDN host, asset id in the first path segment.
    Cdn,
    /// Stream gateway, which additionally requires the library id segment.
    Gateway,
}

/// Mints playback URLs on demand. Token-authenticated URLs are never
/// persisted; they are generated fresh per request because the token is
/// time-limited.
pub struct PlaybackUrlService {
    resolver: AssetIdResolver,
    signer: Option<TokenSigner>,
    cdn_host: String,
    stream_host: String,
    library_id: String,
    token_ttl_seconds: u64,
}

impl PlaybackUrlService {
    pub fn new(cdn: &CdnSection, playback: &PlaybackSection) -> Result<Self, PlaybackError> {
        let signer = if playback.token_auth_enabled {
            Some(TokenSigner::new(playback.token_signing_key.as_bytes())?)
        } else {
            None
        };
        Ok(Self {
            resolver: AssetIdResolver::new(),
            signer,
            cdn_host: cdn.cdn_host.clone(),
            stream_host: cdn.stream_host.clone(),
            library_id: cdn.library_id.clone(),
            token_ttl_seconds: playback.token_ttl_seconds,
        })
    }

    pub fn auth_mode(&self) -> AuthMode {
        if self.signer.is_some() {
            AuthMode::Token
        } else {
            AuthMode::None
        }
    }

    pub fn playback_url(
        &self,
        record: &AssetRecord,
        host: PlaybackHost,
    ) -> Result<String, PlaybackError> {
        let asset_id = self
            .resolver
            .resolve(
                record.embed_reference_url.as_deref(),
                record.external_asset_id.as_deref(),
            )
            .ok_or(PlaybackError::UnresolvedAsset)?;
        self.url_for_asset(&asset_id, host)
    }

    pub fn url_for_asset(
        &self,
        asset_id: &str,
        host: PlaybackHost,
    ) -> Result<String, PlaybackError> {
        let base = match host {
            PlaybackHost::Cdn => {
                format!("https://{}/{}/playlist.m3u8", self.cdn_host, asset_id)
            }
            PlaybackHost::Gateway => format!(
                "https://{}/{}/{}/playlist.m3u8",
                self.stream_host, self.library_id, asset_id
            ),
        };
        let Some(signer) = &self.signer else {
            return Ok(base);
        };
        let parsed =
            Url::parse(&base).map_err(|err| PlaybackError::InvalidUrl(err.to_string()))?;
        let expires_at = Utc::now().timestamp() + self.token_ttl_seconds as i64;
        let token = signer.sign(parsed.path(), expires_at);
        Ok(format!("{base}?token={token}"))
    }
}
