//! SQLite metadata backend (`<root>/metadata.db`).
//!
//! Two tables: `schema_version` holds a single `(major, minor)` row with
//! `id = 0`, and `repository_metadata` holds one row per normalized URI.
//! Dependents are stored as a JSON array of paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{fold_events, schema_action, EventBuffer, MetadataStore, RepoRecord, SchemaAction};
use super::{SchemaVersion, SCHEMA_VERSION};
use crate::error::{Error, Result};

const VERSION_TABLE: &str = "schema_version";
const RECORD_TABLE: &str = "repository_metadata";

const COLUMNS: &str = "normalized_uri, repo_dir, added_date, removed_date, \
     last_fetched_date, last_pruned_date, last_used_date, total_num_used, \
     clone_time_sec, avg_ref_clone_time_sec, disk_usage_kb, potential_dependents";

/// Metadata store backed by a SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// An in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(10))?;
        ensure_schema(&mut conn)?;
        Ok(Self { conn })
    }

    /// Schema version currently stored in the database.
    pub fn schema_version(&self) -> Result<Option<SchemaVersion>> {
        read_schema_version(&self.conn)
    }
}

impl MetadataStore for SqliteStore {
    fn select(&mut self, key: &str) -> Result<Option<RepoRecord>> {
        select_record(&self.conn, key)
    }

    fn select_all(&mut self) -> Result<Vec<RepoRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY normalized_uri",
            COLUMNS, RECORD_TABLE
        ))?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn apply_events(&mut self, events: &EventBuffer) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let records = fold_events(events, |key| select_record(&tx, key))?;
        for record in &records {
            upsert_record(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn ensure_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    match schema_action(read_schema_version(&tx)?)? {
        SchemaAction::Create => {
            debug!("creating metadata schema {}", SCHEMA_VERSION);
            create_schema(&tx)?;
        }
        SchemaAction::Migrate(from) => {
            info!("migrating metadata schema {} -> {}", from, SCHEMA_VERSION);
            migrate(&tx, from)?;
        }
        SchemaAction::Ready => {}
    }
    tx.commit()?;
    Ok(())
}

fn read_schema_version(conn: &Connection) -> Result<Option<SchemaVersion>> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [VERSION_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    let version = conn
        .query_row(
            &format!("SELECT major, minor FROM {} WHERE id = 0", VERSION_TABLE),
            [],
            |row| {
                Ok(SchemaVersion {
                    major: row.get(0)?,
                    minor: row.get(1)?,
                })
            },
        )
        .optional()?;
    version
        .map(Some)
        .ok_or_else(|| Error::db("schema_version table has no entries"))
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE {version_table} (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            major INTEGER NOT NULL,
            minor INTEGER NOT NULL
        );
        INSERT INTO {version_table} (id, major, minor) VALUES (0, {major}, {minor});
        CREATE TABLE IF NOT EXISTS {record_table} (
            normalized_uri TEXT NOT NULL PRIMARY KEY,
            repo_dir TEXT,
            added_date TEXT,
            removed_date TEXT,
            last_fetched_date TEXT,
            last_pruned_date TEXT,
            last_used_date TEXT,
            total_num_used INTEGER,
            clone_time_sec REAL,
            avg_ref_clone_time_sec REAL,
            disk_usage_kb INTEGER,
            potential_dependents TEXT
        );",
        version_table = VERSION_TABLE,
        record_table = RECORD_TABLE,
        major = SCHEMA_VERSION.major,
        minor = SCHEMA_VERSION.minor,
    ))?;
    Ok(())
}

fn migrate(conn: &Connection, from: SchemaVersion) -> Result<()> {
    // 1.0 -> 1.1: records gained `repo_dir`.
    if from < (SchemaVersion { major: 1, minor: 1 }) {
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN repo_dir TEXT;",
            RECORD_TABLE
        ))?;
    }
    conn.execute(
        &format!(
            "UPDATE {} SET major = ?1, minor = ?2 WHERE id = 0",
            VERSION_TABLE
        ),
        params![SCHEMA_VERSION.major, SCHEMA_VERSION.minor],
    )?;
    Ok(())
}

fn select_record(conn: &Connection, key: &str) -> Result<Option<RepoRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE normalized_uri = ?1",
                COLUMNS, RECORD_TABLE
            ),
            [key],
            record_from_row,
        )
        .optional()?;
    Ok(record)
}

fn upsert_record(conn: &Connection, record: &RepoRecord) -> Result<()> {
    let dependents = serde_json::to_string(&record.potential_dependents)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {} ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            RECORD_TABLE, COLUMNS
        ),
        params![
            record.normalized_uri,
            record
                .repo_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            record.added_date,
            record.removed_date,
            record.last_fetched_date,
            record.last_pruned_date,
            record.last_used_date,
            record.total_num_used.map(|v| v as i64),
            record.clone_time_sec,
            record.avg_ref_clone_time_sec,
            record.disk_usage_kb.map(|v| v as i64),
            dependents,
        ],
    )?;
    Ok(())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RepoRecord> {
    let repo_dir: Option<String> = row.get(1)?;
    let total_num_used: Option<i64> = row.get(7)?;
    let disk_usage_kb: Option<i64> = row.get(10)?;
    let dependents: Option<String> = row.get(11)?;
    let potential_dependents = match dependents {
        Some(text) => serde_json::from_str::<Vec<PathBuf>>(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?,
        None => Vec::new(),
    };

    Ok(RepoRecord {
        normalized_uri: row.get(0)?,
        repo_dir: repo_dir.map(PathBuf::from),
        added_date: row.get(2)?,
        removed_date: row.get(3)?,
        last_fetched_date: row.get(4)?,
        last_pruned_date: row.get(5)?,
        last_used_date: row.get(6)?,
        total_num_used: total_num_used.map(|v| v.max(0) as u64),
        clone_time_sec: row.get(8)?,
        avg_ref_clone_time_sec: row.get(9)?,
        disk_usage_kb: disk_usage_kb.map(|v| v.max(0) as u64),
        potential_dependents,
    })
}
