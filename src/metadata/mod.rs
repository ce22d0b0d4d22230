//! # Metadata Store
//!
//! Usage statistics per cached repository, kept out of the hot path in two
//! phases:
//!
//! 1. **Buffering.** While a command runs, the lifecycle manager appends
//!    [`Event`]s to an in-memory [`EventBuffer`]. Appending does no I/O and
//!    takes no lock.
//! 2. **Commit.** At the end of the command [`Metadata::commit`] takes the
//!    store's own lock file (exclusive, one second wait), loads each touched
//!    record (or starts an empty one), folds its events in arrival order and
//!    writes it back in a single transaction.
//!
//! Commit failures never fail the cache operation that produced the events;
//! [`Metadata::commit_or_warn`] logs them instead.
//!
//! ## Backends
//!
//! | [`MetadataStoreKind`] | File | Lock file |
//! |---|---|---|
//! | `None` | - | - |
//! | `Json` | `<root>/metadata.json` | `<root>/metadata.json.lock` |
//! | `Sqlite` | `<root>/metadata.db` | `<root>/metadata.db.lock` |
//!
//! Both persisted backends carry a `major.minor` schema version. A missing
//! version means a fresh store, an older minor version is migrated in place,
//! and a newer major version is an incompatibility error.

pub mod json;
pub mod record;
pub mod sqlite;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::MetadataStoreKind;
use crate::error::{Error, Result};
use crate::lock::{FileLock, LockMode, LockWait, DEFAULT_RETRY_COUNT};
use crate::uri::NormalizedUri;

pub use json::JsonStore;
pub use record::{Event, RepoRecord};
pub use sqlite::SqliteStore;

/// Schema version written by this build.
pub const SCHEMA_VERSION: SchemaVersion = SchemaVersion { major: 1, minor: 1 };

const COMMIT_LOCK_WAIT: Duration = Duration::from_secs(1);

/// A `major.minor` schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What to do with a store found at `found`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchemaAction {
    Create,
    Migrate(SchemaVersion),
    Ready,
}

pub(crate) fn schema_action(found: Option<SchemaVersion>) -> Result<SchemaAction> {
    match found {
        None => Ok(SchemaAction::Create),
        Some(v) if v.major > SCHEMA_VERSION.major => Err(Error::db(format!(
            "metadata schema has incompatible version {} (supported: {})",
            v, SCHEMA_VERSION
        ))),
        Some(v) if v < SCHEMA_VERSION => Ok(SchemaAction::Migrate(v)),
        Some(_) => Ok(SchemaAction::Ready),
    }
}

/// Events recorded during one command, grouped by normalized URI.
#[derive(Debug, Default, Clone)]
pub struct EventBuffer {
    events: BTreeMap<String, Vec<Event>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event for `key`.
    pub fn push(&mut self, key: &NormalizedUri, event: Event) {
        self.events
            .entry(key.as_str().to_string())
            .or_default()
            .push(event);
    }

    /// Events recorded for `key`, in arrival order.
    pub fn events_for(&self, key: &str) -> &[Event] {
        self.events.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Each key with its events.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Event])> {
        self.events.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of keys with at least one event.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// A persisted metadata backend.
pub trait MetadataStore {
    /// The record for `key`, if any.
    fn select(&mut self, key: &str) -> Result<Option<RepoRecord>>;

    /// Every record, ordered by key.
    fn select_all(&mut self) -> Result<Vec<RepoRecord>>;

    /// Fold every buffered event into its record and persist, atomically.
    fn apply_events(&mut self, events: &EventBuffer) -> Result<()>;
}

/// Fold buffered events into the records loaded through `load`.
pub(crate) fn fold_events(
    events: &EventBuffer,
    mut load: impl FnMut(&str) -> Result<Option<RepoRecord>>,
) -> Result<Vec<RepoRecord>> {
    let mut records = Vec::with_capacity(events.len());
    for (key, key_events) in events.iter() {
        let mut record = load(key)?.unwrap_or_else(|| RepoRecord::new(key));
        record.apply_all(key_events);
        records.push(record);
    }
    Ok(records)
}

/// Handle on the metadata store configured for a cache root.
#[derive(Debug, Clone)]
pub struct Metadata {
    root: PathBuf,
    kind: MetadataStoreKind,
}

impl Metadata {
    pub fn new(root: impl Into<PathBuf>, kind: MetadataStoreKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    pub fn kind(&self) -> MetadataStoreKind {
        self.kind
    }

    /// Path of the store file, `None` for [`MetadataStoreKind::None`].
    pub fn store_path(&self) -> Option<PathBuf> {
        match self.kind {
            MetadataStoreKind::None => None,
            MetadataStoreKind::Json => Some(self.root.join("metadata.json")),
            MetadataStoreKind::Sqlite => Some(self.root.join("metadata.db")),
        }
    }

    /// Path of the commit lock file, `None` for [`MetadataStoreKind::None`].
    pub fn lock_path(&self) -> Option<PathBuf> {
        self.store_path().map(|path| {
            let mut name = path.into_os_string();
            name.push(".lock");
            PathBuf::from(name)
        })
    }

    /// Apply buffered events to the store under the commit lock.
    pub fn commit(&self, events: &EventBuffer) -> Result<()> {
        let (Some(store_path), Some(lock_path)) = (self.store_path(), self.lock_path()) else {
            debug!("metadata store disabled, dropping {} record(s)", events.len());
            return Ok(());
        };
        if events.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.root)?;
        let _guard = self.lock(&lock_path, LockMode::Exclusive)?;
        debug!("committing metadata for {} repo(s)", events.len());
        self.open(&store_path)?.apply_events(events)
    }

    /// [`Metadata::commit`], logging instead of returning a failure.
    pub fn commit_or_warn(&self, events: &EventBuffer) {
        if let Err(e) = self.commit(events) {
            warn!("failed to commit cache metadata: {}", e);
        }
    }

    /// The record for `key`. A store that does not exist yet has no records.
    pub fn record(&self, key: &NormalizedUri) -> Result<Option<RepoRecord>> {
        match self.open_for_read()? {
            Some((_guard, mut store)) => store.select(key.as_str()),
            None => Ok(None),
        }
    }

    /// Every record in the store.
    pub fn records(&self) -> Result<Vec<RepoRecord>> {
        match self.open_for_read()? {
            Some((_guard, mut store)) => store.select_all(),
            None => Ok(Vec::new()),
        }
    }

    fn open_for_read(&self) -> Result<Option<(crate::lock::LockGuard, Box<dyn MetadataStore>)>> {
        let (Some(store_path), Some(lock_path)) = (self.store_path(), self.lock_path()) else {
            return Ok(None);
        };
        if !store_path.exists() {
            return Ok(None);
        }
        let guard = self.lock(&lock_path, LockMode::Shared)?;
        let store = self.open(&store_path)?;
        Ok(Some((guard, store)))
    }

    fn lock(&self, lock_path: &Path, mode: LockMode) -> Result<crate::lock::LockGuard> {
        FileLock::new(lock_path, mode)
            .wait(LockWait::Timeout(COMMIT_LOCK_WAIT))
            .retry_on_missing(true)
            .retry_count(DEFAULT_RETRY_COUNT)
            .acquire()
            .map_err(Error::from)
    }

    fn open(&self, store_path: &Path) -> Result<Box<dyn MetadataStore>> {
        Ok(match self.kind {
            MetadataStoreKind::Json => Box::new(JsonStore::new(store_path)),
            MetadataStoreKind::Sqlite => Box::new(SqliteStore::open(store_path)?),
            MetadataStoreKind::None => {
                return Err(Error::db("metadata store is disabled"));
            }
        })
    }
}
