use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;
use vodsync_core::{
    can_access, load_vodsync_config, AssetIdResolver, CaptionSynchronizer, CdnApi, CdnClient,
    Entitlement, HttpTranscriptionProvider, PipelineStatus, PlaybackError, PlaybackHost,
    PlaybackUrlService, RetryPolicy, SqliteAssetStore, TranscriptionPipeline,
    TranscriptionProvider, UrlRefreshJob, VodsyncConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vodsync_core::ConfigError),
    #[error("asset store error: {0}")]
    Asset(#[from] vodsync_core::AssetError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] vodsync_core::PipelineError),
    #[error("refresh error: {0}")]
    Refresh(#[from] vodsync_core::RefreshError),
    #[error("cdn error: {0}")]
    Cdn(#[from] vodsync_core::CdnError),
    #[error("provider error: {0}")]
    Provider(#[from] vodsync_core::ProviderError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("video unavailable: {0}")]
    Unavailable(String),
    #[error("access denied: viewer entitlement does not cover tier {0}")]
    AccessDenied(String),
}

impl From<PlaybackError> for AppError {
    fn from(error: PlaybackError) -> Self {
        match error {
            PlaybackError::UnresolvedAsset => {
                AppError::Unavailable("asset id not resolvable yet".to_string())
            }
            other => AppError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "vodsync command-line control interface", long_about = None)]
pub struct Cli {
    /// Path to vodsync.toml
    #[arg(long, default_value = "configs/vodsync.toml")]
    pub config: PathBuf,
    /// Override for the asset database path
    #[arg(long)]
    pub database: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the CDN asset id from a pasted URL or explicit id
    Resolve(ResolveArgs),
    /// Mint a playback URL for a stored asset record
    PlaybackUrl(PlaybackUrlArgs),
    /// Refresh cached signed playlist URLs across all collections
    Refresh,
    /// Run the transcription pipeline for an asset record
    Transcribe(TranscribeArgs),
    /// Reconcile CDN caption tracks with stored transcriptions
    SyncCaptions(SyncCaptionsArgs),
    /// Reset a record stuck in processing back to pending
    Reset(ResetArgs),
    /// Per-collection summary of asset and pipeline state
    Status,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Embed or reference URL pasted by an operator
    #[arg(long)]
    pub url: Option<String>,
    /// Explicit asset id (short-circuits URL parsing)
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct PlaybackUrlArgs {
    pub record_id: i64,
    /// Use the stream gateway instead of the direct CDN host
    #[arg(long)]
    pub gateway: bool,
    /// Viewer entitlement: none, basic, premium or admin
    #[arg(long, default_value = "none")]
    pub entitlement: String,
}

#[derive(Args, Debug)]
pub struct TranscribeArgs {
    pub record_id: i64,
    /// Languages to process; defaults to source plus configured targets
    #[arg(long = "language")]
    pub languages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SyncCaptionsArgs {
    pub record_id: i64,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    pub record_id: i64,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    asset_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlaybackOutput {
    record_id: i64,
    url: String,
    locked: bool,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();
    let config = load_vodsync_config(&cli.config)?;
    let store = open_store(&cli, &config)?;

    match &cli.command {
        Commands::Resolve(args) => {
            let resolver = AssetIdResolver::new();
            let asset_id = resolver.resolve(args.url.as_deref(), args.id.as_deref());
            render(&ResolveOutput { asset_id })?;
        }
        Commands::PlaybackUrl(args) => {
            let record = store.get(args.record_id)?;
            let entitlement: Entitlement = args.entitlement.parse()?;
            if !can_access(record.visibility_tier, entitlement) {
                return Err(AppError::AccessDenied(
                    record.visibility_tier.to_string(),
                ));
            }
            let service = PlaybackUrlService::new(&config.cdn, &config.playback)?;
            let host = if args.gateway {
                PlaybackHost::Gateway
            } else {
                PlaybackHost::Cdn
            };
            let url = service.playback_url(&record, host)?;
            render(&PlaybackOutput {
                record_id: record.id,
                url,
                locked: vodsync_core::should_show_lock(record.visibility_tier),
            })?;
        }
        Commands::Refresh => {
            let cdn: Arc<dyn CdnApi> = Arc::new(CdnClient::new(config.cdn.clone())?);
            let job = UrlRefreshJob::new(store, cdn, &config.refresh);
            let report = runtime()?.block_on(job.run())?;
            render(&report)?;
        }
        Commands::Transcribe(args) => {
            let cdn: Arc<dyn CdnApi> = Arc::new(CdnClient::new(config.cdn.clone())?);
            let provider: Arc<dyn TranscriptionProvider> =
                Arc::new(HttpTranscriptionProvider::new(&config.transcription)?);
            let pipeline = TranscriptionPipeline::new(
                store,
                cdn,
                provider,
                RetryPolicy::from_section(&config.transcription),
                config.cdn.cdn_host.clone(),
            );
            let languages = requested_languages(&args.languages, &config);
            let report = runtime()?.block_on(pipeline.run(args.record_id, &languages))?;
            render(&report)?;
        }
        Commands::SyncCaptions(args) => {
            let record = store.get(args.record_id)?;
            let resolver = AssetIdResolver::new();
            let asset_id = resolver
                .resolve(
                    record.embed_reference_url.as_deref(),
                    record.external_asset_id.as_deref(),
                )
                .ok_or_else(|| {
                    AppError::Unavailable("asset id not resolvable yet".to_string())
                })?;
            let cdn: Arc<dyn CdnApi> = Arc::new(CdnClient::new(config.cdn.clone())?);
            let synchronizer = CaptionSynchronizer::new(cdn);
            let report =
                runtime()?.block_on(synchronizer.synchronize(&asset_id, &record.transcriptions))?;
            for locale in &report.uploaded {
                let url = format!(
                    "https://{}/{}/captions/{}.vtt",
                    config.cdn.cdn_host, asset_id, locale
                );
                store.set_caption_url(record.id, locale, &url)?;
            }
            render(&report)?;
        }
        Commands::Reset(args) => {
            store.set_transcription_status(args.record_id, PipelineStatus::Pending, None)?;
            println!("record {} reset to pending", args.record_id);
        }
        Commands::Status => {
            let summaries = store.status_summary()?;
            render(&summaries)?;
        }
    }
    Ok(())
}

fn open_store(cli: &Cli, config: &VodsyncConfig) -> Result<SqliteAssetStore> {
    let path = cli
        .database
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.database_path));
    let store = SqliteAssetStore::builder().path(path).build()?;
    store.initialize()?;
    Ok(store)
}

/// Explicit `--language` flags win; otherwise process the source language
/// plus every configured target.
fn requested_languages(explicit: &[String], config: &VodsyncConfig) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    let mut languages = vec![config.transcription.source_language.clone()];
    for target in &config.transcription.target_languages {
        if !languages.contains(target) {
            languages.push(target.clone());
        }
    }
    languages
}

fn render<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use vodsync_core::NewAsset;

    fn fixture_config() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/vodsync.toml")
    }

    #[test]
    fn default_languages_combine_source_and_targets() {
        let config = load_vodsync_config(fixture_config()).unwrap();
        let languages = requested_languages(&[], &config);
        assert_eq!(languages, vec!["en", "es", "pt"]);
        let explicit = requested_languages(&["es".to_string()], &config);
        assert_eq!(explicit, vec!["es"]);
    }

    #[test]
    fn reset_command_flips_status_back_to_pending() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("assets.sqlite");
        let store = SqliteAssetStore::builder().path(&db).build().unwrap();
        store.initialize().unwrap();
        let id = store
            .insert(&NewAsset {
                collection: "courses".into(),
                external_asset_id: Some("asset-1".into()),
                ..NewAsset::default()
            })
            .unwrap();
        store
            .set_transcription_status(id, PipelineStatus::Processing, None)
            .unwrap();

        let cli = Cli {
            config: fixture_config(),
            database: Some(db),
            command: Commands::Reset(ResetArgs { record_id: id }),
        };
        run(cli).unwrap();
        assert_eq!(
            store.get(id).unwrap().transcription_status,
            PipelineStatus::Pending
        );
    }
}
