use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use claim_core::table::lock;
use contracts::{StoreSnapshot, SCHEMA_VERSION_V1};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

/// How many checkpoints the SQLite store keeps before pruning the oldest.
const RETAINED_SNAPSHOTS: i64 = 5;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("durable store is not attached")]
    NotAttached,
    #[error("unsupported snapshot schema_version={0}")]
    SchemaUnsupported(String),
    #[error("store rejected write: {0}")]
    Rejected(String),
}

/// Whole-state checkpoint storage. Implementations serialize their own writes.
pub trait DurableStore: fmt::Debug + Send + Sync {
    fn load_all(&self) -> Result<Option<StoreSnapshot>, PersistenceError>;

    fn save_all(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError>;

    fn describe(&self) -> String;
}

fn check_schema(snapshot: StoreSnapshot) -> Result<StoreSnapshot, PersistenceError> {
    if snapshot.schema_version == SCHEMA_VERSION_V1 {
        Ok(snapshot)
    } else {
        Err(PersistenceError::SchemaUnsupported(snapshot.schema_version))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistedSnapshotSummary {
    pub snapshot_id: i64,
    pub schema_version: String,
    pub saved_at: String,
    pub player_count: i64,
    pub spot_count: i64,
    pub log_count: i64,
    pub route_count: i64,
}

#[derive(Debug)]
pub struct SqliteSnapshotStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        let store = Self {
            path,
            conn: Mutex::new(conn),
        };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn list_snapshots(
        &self,
        limit: usize,
    ) -> Result<Vec<PersistedSnapshotSummary>, PersistenceError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT snapshot_id, schema_version, saved_at,
                    player_count, spot_count, log_count, route_count
             FROM store_snapshots
             ORDER BY snapshot_id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            Ok(PersistedSnapshotSummary {
                snapshot_id: row.get(0)?,
                schema_version: row.get(1)?,
                saved_at: row.get(2)?,
                player_count: row.get(3)?,
                spot_count: row.get(4)?,
                log_count: row.get(5)?,
                route_count: row.get(6)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    fn configure(&self) -> Result<(), PersistenceError> {
        let conn = lock(&self.conn);
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        let conn = lock(&self.conn);
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS store_snapshots (
                snapshot_id INTEGER PRIMARY KEY AUTOINCREMENT,
                schema_version TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                player_count INTEGER NOT NULL,
                spot_count INTEGER NOT NULL,
                log_count INTEGER NOT NULL,
                route_count INTEGER NOT NULL,
                payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_store_snapshots_saved_at ON store_snapshots(saved_at);
            ",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'whole_snapshot_v1', datetime('now'))",
            [],
        )?;

        Ok(())
    }
}

impl DurableStore for SqliteSnapshotStore {
    fn load_all(&self) -> Result<Option<StoreSnapshot>, PersistenceError> {
        let payload: Option<String> = lock(&self.conn)
            .query_row(
                "SELECT payload_json
                 FROM store_snapshots
                 ORDER BY snapshot_id DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(raw) => Ok(Some(check_schema(serde_json::from_str(&raw)?)?)),
            None => Ok(None),
        }
    }

    fn save_all(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        let payload_json = serde_json::to_string(snapshot)?;
        let count = |len: usize| i64::try_from(len).unwrap_or(i64::MAX);

        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO store_snapshots (
                schema_version,
                saved_at,
                player_count,
                spot_count,
                log_count,
                route_count,
                payload_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                snapshot.schema_version.as_str(),
                snapshot.saved_at.to_rfc3339(),
                count(snapshot.players.len()),
                count(snapshot.spots.len()),
                count(snapshot.logs.len()),
                count(snapshot.routes.len()),
                payload_json,
            ],
        )?;
        tx.execute(
            "DELETE FROM store_snapshots
             WHERE snapshot_id NOT IN (
                SELECT snapshot_id FROM store_snapshots ORDER BY snapshot_id DESC LIMIT ?1
             )",
            params![RETAINED_SNAPSHOTS],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl DurableStore for JsonFileStore {
    fn load_all(&self) -> Result<Option<StoreSnapshot>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(check_schema(serde_json::from_str(&raw)?)?))
    }

    fn save_all(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        let _guard = lock(&self.write_lock);
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// Keeps the last checkpoint in memory. `failing` builds a store whose writes
/// always error, for exercising the degraded path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    latest: Mutex<Option<StoreSnapshot>>,
    saves: Mutex<u64>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            latest: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn save_count(&self) -> u64 {
        *lock(&self.saves)
    }

    pub fn latest(&self) -> Option<StoreSnapshot> {
        lock(&self.latest).clone()
    }
}

impl DurableStore for MemoryStore {
    fn load_all(&self) -> Result<Option<StoreSnapshot>, PersistenceError> {
        Ok(self.latest())
    }

    fn save_all(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Rejected("memory store is read-only".to_string()));
        }
        *lock(&self.latest) = Some(snapshot.clone());
        *lock(&self.saves) += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use contracts::{Position, Spot};

    use super::*;

    fn sample_snapshot() -> StoreSnapshot {
        let mut snapshot = StoreSnapshot::empty(Utc::now());
        snapshot.spots.insert(
            "spot-1".to_string(),
            Spot {
                id: "spot-1".to_string(),
                name: "Brandenburger Tor".to_string(),
                description: String::new(),
                position: Position::new(52.52, 13.405),
                base_xp: 20,
                auto_xp: 5,
                created_by: None,
                created_at: Utc::now(),
                claim_info: Default::default(),
            },
        );
        snapshot
    }

    #[test]
    fn sqlite_store_returns_latest_snapshot_and_prunes_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteSnapshotStore::open(dir.path().join("claims.sqlite")).expect("open");
        assert!(store.load_all().expect("empty load").is_none());

        let mut snapshot = sample_snapshot();
        for round in 0..8 {
            snapshot.spots.get_mut("spot-1").expect("spot").base_xp = 20 + round;
            store.save_all(&snapshot).expect("save");
        }

        let loaded = store.load_all().expect("load").expect("snapshot present");
        assert_eq!(loaded.spots["spot-1"].base_xp, 27);
        let history = store.list_snapshots(100).expect("history");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].spot_count, 1);
    }

    #[test]
    fn sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("claims.sqlite");
        {
            let store = SqliteSnapshotStore::open(&path).expect("open");
            store.save_all(&sample_snapshot()).expect("save");
        }
        let reopened = SqliteSnapshotStore::open(&path).expect("reopen");
        let loaded = reopened.load_all().expect("load").expect("present");
        assert!(loaded.spots.contains_key("spot-1"));
    }

    #[test]
    fn json_store_round_trips_through_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("data").join("store.json"));
        assert!(store.load_all().expect("missing file").is_none());

        let snapshot = sample_snapshot();
        store.save_all(&snapshot).expect("save");
        assert_eq!(store.load_all().expect("load"), Some(snapshot));
    }

    #[test]
    fn unknown_schema_version_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("store.json"));
        let mut snapshot = sample_snapshot();
        snapshot.schema_version = "9.9".to_string();
        store.save_all(&snapshot).expect("save");

        assert!(matches!(
            store.load_all(),
            Err(PersistenceError::SchemaUnsupported(version)) if version == "9.9"
        ));
    }

    #[test]
    fn failing_memory_store_rejects_writes() {
        let store = MemoryStore::failing();
        assert!(store.save_all(&sample_snapshot()).is_err());
        assert_eq!(store.save_count(), 0);
    }
}
