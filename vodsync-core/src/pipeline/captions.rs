use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::asset::TranscriptionEntry;
use crate::cdn::{CdnApi, CdnResult};

#[derive(Debug, Clone, Serialize)]
pub struct CaptionSyncReport {
    pub deleted: usize,
    pub uploaded: Vec<String>,
}

/// Reconciles the CDN's caption list with locally stored transcriptions.
/// Always delete-then-recreate, never an incremental diff: after a run the
/// CDN holds exactly one track per populated locale, regardless of what
/// earlier runs or label conventions left behind.
pub struct CaptionSynchronizer {
    cdn: Arc<dyn CdnApi>,
}

impl CaptionSynchronizer {
    pub fn new(cdn: Arc<dyn CdnApi>) -> Self {
        Self { cdn }
    }

    pub async fn synchronize(
        &self,
        asset_id: &str,
        transcriptions: &HashMap<String, TranscriptionEntry>,
    ) -> CdnResult<CaptionSyncReport> {
        let deleted = self.cdn.delete_all_captions(asset_id).await?;
        let mut locales: Vec<&String> = transcriptions
            .iter()
            .filter(|(_, entry)| !entry.vtt.trim().is_empty())
            .map(|(locale, _)| locale)
            .collect();
        locales.sort();
        let mut uploaded = Vec::with_capacity(locales.len());
        for locale in locales {
            let entry = &transcriptions[locale];
            self.cdn
                .upload_caption(asset_id, &entry.vtt, locale, &locale.to_uppercase())
                .await?;
            uploaded.push(locale.clone());
        }
        info!(asset_id, deleted, uploaded = uploaded.len(), "caption tracks synchronized");
        Ok(CaptionSyncReport { deleted, uploaded })
    }
}
