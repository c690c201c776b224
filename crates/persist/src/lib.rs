//! community-solr persistence: plugin settings blobs plus a small catalog of
//! entities and users standing in for the CMS tables.
//! Synchronous SQLite behind a mutex; every call is a single short statement.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use csolr_core::{CoreError, Entity, EntityKind, EntityStore, Guid, StoreResult, UserDirectory};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Plugin that owns the search settings blob.
pub const SETTINGS_PLUGIN: &str = "community_plugins";
/// Setting name of the facet switches.
pub const SEARCH_SETTINGS: &str = "search-settings";
/// Guids bound per `IN (...)` statement; stays under SQLite's variable limit.
pub const ENTITY_CHUNK: usize = 500;

/// Plugin-scoped key/value settings.
pub trait SettingsStore: Send + Sync {
    fn get_setting(&self, plugin: &str, name: &str) -> Result<Option<String>>;
    fn set_setting(&self, plugin: &str, name: &str, value: &str) -> Result<()>;
}

/// Option lists shown in the search sidebar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCatalog {
    pub categories: Vec<String>,
    pub licenses: Vec<String>,
    pub versions: Vec<String>,
}

pub struct SqliteStore {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open `CSOLR_DB_PATH`, or `~/.csolr/csolr.db`.
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("CSOLR_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        let me = Self::init(db)?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(me)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(rusqlite::Connection::open_in_memory().context("opening in-memory sqlite")?)
    }

    fn init(db: rusqlite::Connection) -> Result<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS plugin_settings (
                plugin TEXT NOT NULL,
                name   TEXT NOT NULL,
                value  TEXT NOT NULL,
                PRIMARY KEY (plugin, name)
            );
            CREATE TABLE IF NOT EXISTS entities (
                guid    INTEGER PRIMARY KEY,
                type    TEXT NOT NULL,
                subtype TEXT NOT NULL,
                body    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(type, subtype);
            CREATE TABLE IF NOT EXISTS users (
                guid     INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE
            );",
        )
        .context("creating tables")?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }

    /// Insert or replace an entity row.
    pub fn put_entity(&self, entity: &Entity) -> Result<()> {
        let body = serde_json::to_string(entity).context("encoding entity")?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO entities(guid, type, subtype, body) VALUES (?1, ?2, ?3, ?4)",
            (entity.guid, &entity.kind.type_, &entity.kind.subtype, &body),
        )?;
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    pub fn get_entity(&self, guid: Guid) -> Result<Option<Entity>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT body FROM entities WHERE guid = ?1")?;
        let mut rows = stmt.query([guid])?;
        let body: Option<String> = match rows.next()? { Some(r) => Some(r.get(0)?), None => None };
        match body {
            Some(b) => Ok(Some(serde_json::from_str(&b).with_context(|| format!("decoding entity {}", guid))?)),
            None => Ok(None),
        }
    }

    /// Returns whether a row was removed.
    pub fn delete_entity(&self, guid: Guid) -> Result<bool> {
        Ok(self.conn()?.execute("DELETE FROM entities WHERE guid = ?1", [guid])? > 0)
    }

    /// Guids of every stored entity of `kind`, ascending.
    pub fn entity_guids(&self, kind: &EntityKind) -> Result<Vec<Guid>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT guid FROM entities WHERE type = ?1 AND subtype = ?2 ORDER BY guid")?;
        let rows = stmt.query_map((&kind.type_, &kind.subtype), |r| r.get::<_, i64>(0))?;
        let mut out = Vec::new();
        for g in rows { out.push(g?); }
        Ok(out)
    }

    pub fn put_user(&self, guid: Guid, username: &str) -> Result<()> {
        self.conn()?.execute("INSERT OR REPLACE INTO users(guid, username) VALUES (?1, ?2)", (guid, username))?;
        Ok(())
    }

    pub fn user_guid(&self, username: &str) -> Result<Option<Guid>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT guid FROM users WHERE username = ?1")?;
        let mut rows = stmt.query([username])?;
        let guid = match rows.next()? { Some(r) => Some(r.get(0)?), None => None };
        Ok(guid)
    }

    /// Load entities by guid, `ENTITY_CHUNK` guids per statement. Undecodable
    /// rows are skipped.
    pub fn entities(&self, guids: &[Guid]) -> Result<Vec<Entity>> {
        if guids.is_empty() { return Ok(Vec::new()); }
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let mut out = Vec::with_capacity(guids.len());
        for chunk in guids.chunks(ENTITY_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT guid, body FROM entities WHERE guid IN ({})", placeholders);
            let mut stmt = db.prepare_cached(&sql)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let guid: i64 = row.get(0)?;
                let body: String = row.get(1)?;
                if let Some(e) = decode_row(guid, &body) { out.push(e); }
            }
        }
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    /// Distinct categories, licenses and release versions across stored
    /// entities of `kind`, sorted.
    pub fn facet_catalog(&self, kind: &EntityKind) -> Result<FacetCatalog> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT guid, body FROM entities WHERE type = ?1 AND subtype = ?2")?;
        let mut rows = stmt.query((&kind.type_, &kind.subtype))?;
        let (mut cats, mut lics, mut vers) = (BTreeSet::new(), BTreeSet::new(), BTreeSet::new());
        while let Some(row) = rows.next()? {
            let guid: i64 = row.get(0)?;
            let body: String = row.get(1)?;
            let Some(e) = decode_row(guid, &body) else { continue };
            cats.extend(e.category.filter(|c| !c.is_empty()));
            lics.extend(e.license.filter(|l| !l.is_empty()));
            vers.extend(e.releases.into_iter().flat_map(|r| r.elgg_versions).filter(|v| !v.is_empty()));
        }
        Ok(FacetCatalog {
            categories: cats.into_iter().collect(),
            licenses: lics.into_iter().collect(),
            versions: vers.into_iter().collect(),
        })
    }
}

fn decode_row(guid: Guid, body: &str) -> Option<Entity> {
    match serde_json::from_str::<Entity>(body) {
        Ok(e) => Some(e),
        Err(e) => {
            warn!(guid, error = %e, "catalog row undecodable; skipped");
            None
        }
    }
}

impl SettingsStore for SqliteStore {
    fn get_setting(&self, plugin: &str, name: &str) -> Result<Option<String>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT value FROM plugin_settings WHERE plugin = ?1 AND name = ?2")?;
        let mut rows = stmt.query((plugin, name))?;
        let value = match rows.next()? { Some(r) => Some(r.get(0)?), None => None };
        Ok(value)
    }

    fn set_setting(&self, plugin: &str, name: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO plugin_settings(plugin, name, value) VALUES (?1, ?2, ?3)",
            (plugin, name, value),
        )?;
        debug!(plugin, name, bytes = value.len(), "setting stored");
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for SqliteStore {
    async fn get_many(&self, guids: &[Guid]) -> StoreResult<Vec<Entity>> {
        self.entities(guids).map_err(|e| CoreError::Store(format!("{:#}", e)))
    }
}

#[async_trait::async_trait]
impl UserDirectory for SqliteStore {
    async fn guid_by_username(&self, username: &str) -> Option<Guid> {
        match self.user_guid(username) {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "user lookup failed");
                None
            }
        }
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".csolr");
        let _ = std::fs::create_dir_all(&p);
        p.push("csolr.db");
        return p.to_string_lossy().to_string();
    }
    "csolr.db".to_string()
}
