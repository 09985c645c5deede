pub mod asset;
pub mod cdn;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod refresh;
pub mod retry;
pub mod sqlite;

pub use asset::{
    can_access, should_show_lock, AssetError, AssetRecord, AssetRef, AssetResult, AssetIdResolver,
    CollectionSummary, Entitlement, NewAsset, PipelineStatus, SqliteAssetStore,
    SqliteAssetStoreBuilder, TranscriptionEntry, VisibilityTier,
};
pub use cdn::{
    AssetMetadata, CaptionTrack, CdnApi, CdnClient, CdnError, CdnResult, TokenError, TokenSigner,
};
pub use config::{
    load_vodsync_config, CdnSection, PlaybackSection, RefreshSection, StorageSection,
    TranscriptionSection, VodsyncConfig,
};
pub use error::{ConfigError, Result};
pub use pipeline::{
    CaptionSyncReport, CaptionSynchronizer, HttpTranscriptionProvider, PipelineError,
    PipelineReport, PipelineResult, ProviderError, Transcript, TranscriptRequest,
    TranscriptionPipeline, TranscriptionProvider,
};
pub use playback::{AuthMode, PlaybackError, PlaybackHost, PlaybackUrlService};
pub use refresh::{RefreshError, RefreshReport, UrlRefreshJob};
pub use retry::RetryPolicy;
