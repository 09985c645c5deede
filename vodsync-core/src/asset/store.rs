use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, Row, TransactionBehavior};
use serde::Serialize;

use crate::sqlite::configure_connection;

use super::{
    AssetError, AssetRecord, AssetResult, NewAsset, PipelineStatus, TranscriptionEntry,
    VisibilityTier, SIGNED_URL_MAX_CHARS,
};

const ASSET_SCHEMA: &str = include_str!("../../../sql/assets.sql");

/// `(collection, record id, asset id)` tuple consumed by the refresh job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub collection: String,
    pub record_id: i64,
    pub asset_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub collection: String,
    pub total: i64,
    pub with_asset_id: i64,
    pub with_signed_url: i64,
    pub completed: i64,
    pub failed: i64,
    pub processing: i64,
}

#[derive(Debug, Clone)]
pub struct SqliteAssetStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteAssetStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteAssetStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> AssetResult<SqliteAssetStore> {
        let path = self.path.ok_or(AssetError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteAssetStore { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteAssetStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteAssetStore {
    pub fn builder() -> SqliteAssetStoreBuilder {
        SqliteAssetStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> AssetResult<Self> {
        SqliteAssetStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> AssetResult<Connection> {
        let conn =
            Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
                AssetError::Open {
                    source,
                    path: self.path.clone(),
                }
            })?;
        configure_connection(&conn)?;
        Ok(conn)
    }

    pub fn initialize(&self) -> AssetResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = self.open()?;
        conn.execute_batch(ASSET_SCHEMA)?;
        Ok(())
    }

    pub fn insert(&self, asset: &NewAsset) -> AssetResult<i64> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO assets (collection, title, embed_reference_url, external_asset_id,
                                 visibility_tier, source_language)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                asset.collection,
                asset.title,
                asset.embed_reference_url,
                asset.external_asset_id,
                asset
                    .visibility_tier
                    .unwrap_or(VisibilityTier::Freemium)
                    .as_str(),
                asset.source_language.as_deref().unwrap_or("en"),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get(&self, id: i64) -> AssetResult<AssetRecord> {
        let conn = self.open()?;
        let mut statement = conn.prepare("SELECT * FROM assets WHERE id = ?1")?;
        let mut rows = statement.query(params![id])?;
        match rows.next()? {
            Some(row) => AssetRecord::from_row(row),
            None => Err(AssetError::NotFound(id)),
        }
    }

    /// Every record carrying a non-empty asset id, across all collections.
    pub fn list_asset_refs(&self) -> AssetResult<Vec<AssetRef>> {
        let conn = self.open()?;
        let mut statement = conn.prepare(
            "SELECT collection, id, external_asset_id FROM assets
             WHERE external_asset_id IS NOT NULL AND external_asset_id != ''
             ORDER BY collection, id",
        )?;
        let refs = statement
            .query_map([], |row| {
                Ok(AssetRef {
                    collection: row.get(0)?,
                    record_id: row.get(1)?,
                    asset_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    /// Caches a lazily resolved id; never overwrites an existing one, since
    /// the id is structurally embedded in the reference URL.
    pub fn cache_external_asset_id(&self, id: i64, asset_id: &str) -> AssetResult<()> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE assets SET external_asset_id = ?2, updated_at = ?3
             WHERE id = ?1 AND (external_asset_id IS NULL OR external_asset_id = '')",
            params![id, asset_id, Utc::now()],
        )?;
        if changed == 0 && !self.exists(&conn, id)? {
            return Err(AssetError::NotFound(id));
        }
        Ok(())
    }

    pub fn set_signed_playlist_url(&self, id: i64, url: &str) -> AssetResult<()> {
        if url.chars().count() > SIGNED_URL_MAX_CHARS {
            return Err(AssetError::UrlTooLong(url.chars().count()));
        }
        let conn = self.open()?;
        let now = Utc::now();
        let changed = conn.execute(
            "UPDATE assets SET signed_playlist_url = ?2, url_refreshed_at = ?3, updated_at = ?3
             WHERE id = ?1",
            params![id, url, now],
        )?;
        if changed == 0 {
            return Err(AssetError::NotFound(id));
        }
        Ok(())
    }

    pub fn set_duration(&self, id: i64, duration_seconds: i64) -> AssetResult<()> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE assets SET duration_seconds = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, duration_seconds, Utc::now()],
        )?;
        if changed == 0 {
            return Err(AssetError::NotFound(id));
        }
        Ok(())
    }

    pub fn set_transcription_status(
        &self,
        id: i64,
        status: PipelineStatus,
        error: Option<&str>,
    ) -> AssetResult<()> {
        let conn = self.open()?;
        let now = Utc::now();
        let processed_at = matches!(
            status,
            PipelineStatus::Completed | PipelineStatus::Failed
        )
        .then_some(now);
        let changed = conn.execute(
            "UPDATE assets SET transcription_status = ?2, transcription_error = ?3,
                    transcription_processed_at = COALESCE(?4, transcription_processed_at),
                    updated_at = ?5
             WHERE id = ?1",
            params![id, status.as_str(), error, processed_at, now],
        )?;
        if changed == 0 {
            return Err(AssetError::NotFound(id));
        }
        Ok(())
    }

    /// Overwrites the entry for one language only; other languages are
    /// never touched by a re-run.
    pub fn upsert_transcription_entry(
        &self,
        id: i64,
        language: &str,
        entry: &TranscriptionEntry,
    ) -> AssetResult<()> {
        self.update_json_map(id, "transcriptions", |map| {
            map.insert(language.to_string(), entry.clone());
        })
    }

    pub fn set_caption_url(&self, id: i64, language: &str, url: &str) -> AssetResult<()> {
        self.update_json_map(id, "caption_urls", |map| {
            map.insert(language.to_string(), url.to_string());
        })
    }

    pub fn set_audio_url(&self, id: i64, language: &str, url: &str) -> AssetResult<()> {
        self.update_json_map(id, "audio_urls", |map| {
            map.insert(language.to_string(), url.to_string());
        })
    }

    /// Read-modify-write of a JSON map column. The IMMEDIATE transaction
    /// holds the write lock from the read, so concurrent writers to
    /// disjoint keys of the same column cannot drop each other's entries.
    fn update_json_map<T>(
        &self,
        id: i64,
        column: &str,
        apply: impl FnOnce(&mut HashMap<String, T>),
    ) -> AssetResult<()>
    where
        T: Serialize + serde::de::DeserializeOwned,
    {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut map = self.read_json_map::<T>(&tx, id, column)?;
        apply(&mut map);
        self.write_json_column(&tx, id, column, &map)?;
        tx.commit()?;
        Ok(())
    }

    pub fn status_summary(&self) -> AssetResult<Vec<CollectionSummary>> {
        let conn = self.open()?;
        let mut statement = conn.prepare(
            "SELECT collection,
                    COUNT(*),
                    SUM(CASE WHEN external_asset_id IS NOT NULL AND external_asset_id != ''
                        THEN 1 ELSE 0 END),
                    SUM(CASE WHEN signed_playlist_url IS NOT NULL AND signed_playlist_url != ''
                        THEN 1 ELSE 0 END),
                    SUM(CASE WHEN transcription_status = 'completed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN transcription_status = 'failed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN transcription_status = 'processing' THEN 1 ELSE 0 END)
             FROM assets GROUP BY collection ORDER BY collection",
        )?;
        let summaries = statement
            .query_map([], |row| {
                Ok(CollectionSummary {
                    collection: row.get(0)?,
                    total: row.get(1)?,
                    with_asset_id: row.get(2)?,
                    with_signed_url: row.get(3)?,
                    completed: row.get(4)?,
                    failed: row.get(5)?,
                    processing: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    fn exists(&self, conn: &Connection, id: i64) -> AssetResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM assets WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn read_json_map<T: serde::de::DeserializeOwned>(
        &self,
        conn: &Connection,
        id: i64,
        column: &str,
    ) -> AssetResult<HashMap<String, T>> {
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT {column} FROM assets WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => AssetError::NotFound(id),
                other => AssetError::Execute(other),
            })?;
        match raw {
            Some(raw) if !raw.is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(HashMap::new()),
        }
    }

    fn write_json_column<T: Serialize>(
        &self,
        conn: &Connection,
        id: i64,
        column: &str,
        map: &HashMap<String, T>,
    ) -> AssetResult<()> {
        let json = serde_json::to_string(map)?;
        conn.execute(
            &format!("UPDATE assets SET {column} = ?2, updated_at = ?3 WHERE id = ?1"),
            params![id, json, Utc::now()],
        )?;
        Ok(())
    }
}

impl AssetRecord {
    fn from_row(row: &Row<'_>) -> AssetResult<Self> {
        let transcriptions: String = row.get("transcriptions")?;
        let caption_urls: String = row.get("caption_urls")?;
        let audio_urls: String = row.get("audio_urls")?;
        Ok(Self {
            id: row.get("id")?,
            collection: row.get("collection")?,
            title: row.get("title")?,
            external_asset_id: row.get("external_asset_id")?,
            embed_reference_url: row.get("embed_reference_url")?,
            signed_playlist_url: row.get("signed_playlist_url")?,
            visibility_tier: row.get::<_, String>("visibility_tier")?.parse()?,
            duration_seconds: row.get("duration_seconds")?,
            source_language: row.get("source_language")?,
            transcriptions: serde_json::from_str(&transcriptions)?,
            caption_urls: serde_json::from_str(&caption_urls)?,
            audio_urls: serde_json::from_str(&audio_urls)?,
            transcription_status: row.get::<_, String>("transcription_status")?.parse()?,
            transcription_error: row.get("transcription_error")?,
            transcription_processed_at: row.get("transcription_processed_at")?,
            url_refreshed_at: row.get("url_refreshed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}
