use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use vodsync_core::{
    AssetMetadata, CaptionTrack, CdnApi, CdnError, CdnResult, NewAsset, RefreshSection,
    SqliteAssetStore, UrlRefreshJob,
};

struct MockCdn {
    playlists: Mutex<HashMap<String, Option<String>>>,
    calls: AtomicUsize,
}

impl MockCdn {
    fn new(playlists: HashMap<String, Option<String>>) -> Self {
        Self {
            playlists: Mutex::new(playlists),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CdnApi for MockCdn {
    async fn fetch_metadata(&self, asset_id: &str) -> CdnResult<AssetMetadata> {
        Err(CdnError::NotFound(asset_id.to_string()))
    }

    async fn list_captions(&self, _asset_id: &str) -> CdnResult<Vec<CaptionTrack>> {
        Ok(Vec::new())
    }

    async fn upload_caption(
        &self,
        _asset_id: &str,
        _vtt: &str,
        _language: &str,
        _label: &str,
    ) -> CdnResult<()> {
        Ok(())
    }

    async fn delete_all_captions(&self, _asset_id: &str) -> CdnResult<usize> {
        Ok(0)
    }

    async fn resolve_playlist_url(&self, asset_id: &str) -> CdnResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let playlists = self.playlists.lock().unwrap();
        match playlists.get(asset_id) {
            Some(url) => Ok(url.clone()),
            None => Err(CdnError::Transient(format!("embed fetch failed for {asset_id}"))),
        }
    }
}

fn temp_store(dir: &TempDir) -> SqliteAssetStore {
    let store = SqliteAssetStore::builder()
        .path(dir.path().join("assets.sqlite"))
        .build()
        .expect("create store");
    store.initialize().expect("initialize store");
    store
}

fn asset(collection: &str, asset_id: &str) -> NewAsset {
    NewAsset {
        collection: collection.into(),
        external_asset_id: Some(asset_id.into()),
        ..NewAsset::default()
    }
}

fn section() -> RefreshSection {
    RefreshSection {
        inter_call_delay_ms: 0,
        max_concurrency: 2,
    }
}

#[tokio::test]
async fn shared_asset_id_updates_every_record_once_resolved() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);
    let course = store.insert(&asset("courses", "asset-a")).unwrap();
    let lesson = store.insert(&asset("lessons", "asset-a")).unwrap();

    let signed = "https://vz-1.b-cdn.net/bcdn_token=SIG/asset-a/playlist.m3u8";
    let cdn = Arc::new(MockCdn::new(HashMap::from([(
        "asset-a".to_string(),
        Some(signed.to_string()),
    )])));
    let job = UrlRefreshJob::new(store.clone(), Arc::clone(&cdn) as Arc<dyn CdnApi>, &section());

    let report = job.run().await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.unique_assets, 1);
    assert_eq!(report.updated, 2);
    assert_eq!(report.errors, 0);
    // One scrape per distinct asset id, not per record.
    assert_eq!(cdn.calls.load(Ordering::SeqCst), 1);

    let course = store.get(course).unwrap();
    let lesson = store.get(lesson).unwrap();
    assert_eq!(course.signed_playlist_url.as_deref(), Some(signed));
    assert_eq!(lesson.signed_playlist_url, course.signed_playlist_url);
    assert!(course.url_refreshed_at.is_some());
}

#[tokio::test]
async fn failing_asset_keeps_prior_url_and_does_not_poison_batch() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);
    let healthy = store.insert(&asset("courses", "asset-a")).unwrap();
    let broken = store.insert(&asset("courses", "asset-b")).unwrap();
    let stale = "https://vz-1.b-cdn.net/bcdn_token=OLD/asset-b/playlist.m3u8";
    store.set_signed_playlist_url(broken, stale).unwrap();

    let fresh = "https://vz-1.b-cdn.net/bcdn_token=NEW/asset-a/playlist.m3u8";
    let cdn = Arc::new(MockCdn::new(HashMap::from([
        ("asset-a".to_string(), Some(fresh.to_string())),
        ("asset-b".to_string(), None),
    ])));
    let job = UrlRefreshJob::new(store.clone(), cdn as Arc<dyn CdnApi>, &section());

    let report = job.run().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.errors, 1);

    assert_eq!(
        store.get(healthy).unwrap().signed_playlist_url.as_deref(),
        Some(fresh)
    );
    assert_eq!(
        store.get(broken).unwrap().signed_playlist_url.as_deref(),
        Some(stale)
    );
}

#[tokio::test]
async fn transient_scrape_error_counts_as_error_not_abort() {
    let dir = TempDir::new().unwrap();
    let store = temp_store(&dir);
    store.insert(&asset("courses", "asset-a")).unwrap();
    store.insert(&asset("courses", "asset-missing")).unwrap();

    let fresh = "https://vz-1.b-cdn.net/bcdn_token=NEW/asset-a/playlist.m3u8";
    // asset-missing has no mock entry, so the scrape errors out.
    let cdn = Arc::new(MockCdn::new(HashMap::from([(
        "asset-a".to_string(),
        Some(fresh.to_string()),
    )])));
    let job = UrlRefreshJob::new(store.clone(), cdn as Arc<dyn CdnApi>, &section());

    let report = job.run().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.errors, 1);
}
