use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::asset::{AssetError, SqliteAssetStore};
use crate::cdn::{CdnApi, CdnError};
use crate::config::RefreshSection;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("cdn credentials rejected, aborting refresh run")]
    Credential,
    #[error("store error: {0}")]
    Store(#[from] AssetError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub scanned: usize,
    pub unique_assets: usize,
    pub updated: usize,
    pub errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Periodic batch refresh of cached signed playlist URLs. One asset's
/// failure never prevents the rest of the batch from updating; only a
/// credential rejection aborts the run.
pub struct UrlRefreshJob {
    store: SqliteAssetStore,
    cdn: Arc<dyn CdnApi>,
    inter_call_delay: Duration,
    max_concurrency: usize,
}

impl UrlRefreshJob {
    pub fn new(store: SqliteAssetStore, cdn: Arc<dyn CdnApi>, section: &RefreshSection) -> Self {
        Self {
            store,
            cdn,
            inter_call_delay: Duration::from_millis(section.inter_call_delay_ms),
            max_concurrency: section.max_concurrency.max(1),
        }
    }

    pub async fn run(&self) -> Result<RefreshReport, RefreshError> {
        let started_at = Utc::now();
        let refs = self.store.list_asset_refs()?;
        let unique: BTreeSet<String> = refs.iter().map(|r| r.asset_id.clone()).collect();
        info!(
            records = refs.len(),
            unique_assets = unique.len(),
            "starting signed url refresh"
        );

        let delay = self.inter_call_delay;
        let outcomes: Vec<(String, Result<Option<String>, CdnError>)> =
            stream::iter(unique.iter().cloned())
                .map(|asset_id| {
                    let cdn = Arc::clone(&self.cdn);
                    async move {
                        // Minimum spacing between external calls per worker.
                        sleep(delay).await;
                        let outcome = cdn.resolve_playlist_url(&asset_id).await;
                        (asset_id, outcome)
                    }
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;

        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut errors = 0usize;
        for (asset_id, outcome) in outcomes {
            match outcome {
                Ok(Some(url)) => {
                    resolved.insert(asset_id, url);
                }
                Ok(None) => {
                    warn!(%asset_id, "no working playlist url obtained, records left untouched");
                    errors += 1;
                }
                Err(CdnError::Credential) => return Err(RefreshError::Credential),
                Err(CdnError::NotFound(_)) => {
                    // Asset gone on the CDN side; skip, keep the batch going.
                    warn!(%asset_id, "asset missing on cdn, skipping");
                    errors += 1;
                }
                Err(error) => {
                    warn!(%asset_id, %error, "playlist url refresh failed");
                    errors += 1;
                }
            }
        }

        let mut updated = 0usize;
        for reference in &refs {
            let Some(url) = resolved.get(&reference.asset_id) else {
                continue;
            };
            match self
                .store
                .set_signed_playlist_url(reference.record_id, url)
            {
                Ok(()) => updated += 1,
                Err(error) => {
                    warn!(
                        collection = %reference.collection,
                        record_id = reference.record_id,
                        %error,
                        "failed to persist refreshed url"
                    );
                    errors += 1;
                }
            }
        }

        let report = RefreshReport {
            scanned: refs.len(),
            unique_assets: unique.len(),
            updated,
            errors,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            updated = report.updated,
            errors = report.errors,
            "signed url refresh finished"
        );
        Ok(report)
    }
}
