mod captions;
mod provider;
pub mod vtt;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::asset::{
    AssetError, AssetIdResolver, AssetRecord, PipelineStatus, SqliteAssetStore, TranscriptionEntry,
};
use crate::cdn::{CdnApi, CdnError};
use crate::retry::RetryPolicy;

pub use captions::{CaptionSyncReport, CaptionSynchronizer};
pub use provider::{
    HttpTranscriptionProvider, ProviderError, Transcript, TranscriptRequest, TranscriptionProvider,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("asset record {0} has no resolvable cdn id")]
    UnresolvedAsset(i64),
    #[error("transcription already running for asset {asset_id} language {language}")]
    AlreadyProcessing { asset_id: String, language: String },
    #[error("no languages requested")]
    NoLanguages,
    #[error("store error: {0}")]
    Store(#[from] AssetError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Serialize)]
pub struct LanguageFailure {
    pub language: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub record_id: i64,
    pub asset_id: String,
    pub status: PipelineStatus,
    pub completed: Vec<String>,
    pub failed: Vec<LanguageFailure>,
    pub captions_uploaded: usize,
}

/// Per-asset, per-language transcription state machine. Languages are
/// independent: one language failing never discards another language's
/// completed entry, and a re-run overwrites only its own entry.
pub struct TranscriptionPipeline {
    store: SqliteAssetStore,
    cdn: Arc<dyn CdnApi>,
    provider: Arc<dyn TranscriptionProvider>,
    resolver: AssetIdResolver,
    synchronizer: CaptionSynchronizer,
    retry: RetryPolicy,
    cdn_host: String,
    in_flight: Mutex<HashSet<(String, String)>>,
}

impl TranscriptionPipeline {
    pub fn new(
        store: SqliteAssetStore,
        cdn: Arc<dyn CdnApi>,
        provider: Arc<dyn TranscriptionProvider>,
        retry: RetryPolicy,
        cdn_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cdn: Arc::clone(&cdn),
            provider,
            resolver: AssetIdResolver::new(),
            synchronizer: CaptionSynchronizer::new(cdn),
            retry,
            cdn_host: cdn_host.into(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Runs the pipeline for the requested languages. Infrastructure
    /// problems surface as `Err`; per-language provider failures land in
    /// the report and flip the record to `failed` without rolling back
    /// languages that succeeded.
    pub async fn run(
        &self,
        record_id: i64,
        languages: &[String],
    ) -> PipelineResult<PipelineReport> {
        if languages.is_empty() {
            return Err(PipelineError::NoLanguages);
        }
        let record = self.store.get(record_id)?;
        let asset_id = self
            .resolver
            .resolve(
                record.embed_reference_url.as_deref(),
                record.external_asset_id.as_deref(),
            )
            .ok_or(PipelineError::UnresolvedAsset(record_id))?;
        if record.external_asset_id.as_deref().unwrap_or_default().is_empty() {
            self.store.cache_external_asset_id(record_id, &asset_id)?;
        }
        let _guard = self.acquire(&asset_id, languages)?;

        // Status must read `processing` before the first external call so a
        // crash mid-run is observable as stuck-in-processing.
        self.store
            .set_transcription_status(record_id, PipelineStatus::Processing, None)?;

        let mut completed = Vec::new();
        let mut failed: Vec<LanguageFailure> = Vec::new();
        for language in languages {
            match self.process_language(&record, &asset_id, language).await {
                Ok(()) => completed.push(language.clone()),
                Err(reason) => {
                    warn!(%asset_id, %language, error = %reason, "language processing failed");
                    failed.push(LanguageFailure {
                        language: language.clone(),
                        error: reason,
                    });
                }
            }
        }

        let mut captions_uploaded = 0usize;
        let refreshed = self.store.get(record_id)?;
        if !refreshed.transcriptions.is_empty() {
            match self
                .synchronizer
                .synchronize(&asset_id, &refreshed.transcriptions)
                .await
            {
                Ok(report) => {
                    captions_uploaded = report.uploaded.len();
                    for locale in &report.uploaded {
                        let url = format!(
                            "https://{}/{}/captions/{}.vtt",
                            self.cdn_host, asset_id, locale
                        );
                        self.store.set_caption_url(record_id, locale, &url)?;
                    }
                }
                Err(error) => failed.push(LanguageFailure {
                    language: "captions".to_string(),
                    error: format!("caption upload failed: {error}"),
                }),
            }
        }

        if refreshed.duration_seconds == 0 {
            self.touch_duration(record_id, &asset_id).await;
        }

        let status = if failed.is_empty() {
            self.store
                .set_transcription_status(record_id, PipelineStatus::Completed, None)?;
            PipelineStatus::Completed
        } else {
            let summary = failed
                .iter()
                .map(|f| format!("{}: {}", f.language, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            self.store
                .set_transcription_status(record_id, PipelineStatus::Failed, Some(&summary))?;
            PipelineStatus::Failed
        };
        info!(
            record_id,
            %asset_id,
            %status,
            completed = completed.len(),
            failed = failed.len(),
            "transcription pipeline finished"
        );
        Ok(PipelineReport {
            record_id,
            asset_id,
            status,
            completed,
            failed,
            captions_uploaded,
        })
    }

    /// Operator-triggered escape hatch for a run that died mid-flight and
    /// left the record stuck in `processing`.
    pub fn reset(&self, record_id: i64) -> PipelineResult<()> {
        self.store
            .set_transcription_status(record_id, PipelineStatus::Pending, None)?;
        Ok(())
    }

    async fn process_language(
        &self,
        record: &AssetRecord,
        asset_id: &str,
        language: &str,
    ) -> Result<(), String> {
        let request = TranscriptRequest {
            asset_id,
            playback_url: record.signed_playlist_url.as_deref(),
            source_language: &record.source_language,
            target_language: language,
        };
        let transcript = self
            .retry
            .run("transcription request", ProviderError::is_transient, || {
                self.provider.transcribe(&request)
            })
            .await
            .map_err(|err| err.to_string())?;
        if transcript.text.trim().is_empty() {
            return Err("provider returned empty transcription text".to_string());
        }
        if !transcript.vtt.trim().is_empty() {
            vtt::validate(&transcript.vtt).map_err(|err| format!("invalid webvtt: {err}"))?;
        }
        let entry = TranscriptionEntry {
            text: transcript.text,
            vtt: transcript.vtt,
            caption_url: None,
            processed_at: Utc::now(),
            method: transcript.method,
        };
        self.store
            .upsert_transcription_entry(record.id, language, &entry)
            .map_err(|err| err.to_string())?;
        if let Some(dub_url) = transcript.dubbed_audio_url {
            self.store
                .set_audio_url(record.id, language, &dub_url)
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    }

    /// Best effort: a metadata failure never fails the pipeline run.
    async fn touch_duration(&self, record_id: i64, asset_id: &str) {
        match self.cdn.fetch_metadata(asset_id).await {
            Ok(metadata) if metadata.duration_seconds > 0 => {
                if let Err(error) = self.store.set_duration(record_id, metadata.duration_seconds) {
                    warn!(record_id, %error, "failed to persist duration");
                }
            }
            Ok(_) => {}
            Err(CdnError::NotFound(_)) => {}
            Err(error) => warn!(asset_id, %error, "metadata fetch failed"),
        }
    }

    fn acquire(&self, asset_id: &str, languages: &[String]) -> PipelineResult<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().expect("in-flight lock poisoned");
        for language in languages {
            if set.contains(&(asset_id.to_string(), language.clone())) {
                return Err(PipelineError::AlreadyProcessing {
                    asset_id: asset_id.to_string(),
                    language: language.clone(),
                });
            }
        }
        let keys: Vec<(String, String)> = languages
            .iter()
            .map(|language| (asset_id.to_string(), language.clone()))
            .collect();
        for key in &keys {
            set.insert(key.clone());
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            keys,
        })
    }
}

/// Serializes concurrent runs for the same (asset, language) pair within
/// this process. Horizontal scaling needs external mutual exclusion keyed
/// the same way.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(String, String)>>,
    keys: Vec<(String, String)>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            for key in &self.keys {
                set.remove(key);
            }
        }
    }
}
