//! JSON metadata backend (`<root>/metadata.json`).
//!
//! The whole document is rewritten on every commit through a temporary file
//! and an atomic rename, so readers never see a partially written file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{fold_events, schema_action, EventBuffer, MetadataStore, RepoRecord, SchemaAction};
use super::{SchemaVersion, SCHEMA_VERSION};
use crate::error::Result;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    schema_version: Option<SchemaVersion>,
    #[serde(default)]
    repos: BTreeMap<String, RepoRecord>,
}

impl Document {
    fn empty() -> Self {
        Self {
            schema_version: Some(SCHEMA_VERSION),
            repos: BTreeMap::new(),
        }
    }
}

/// Metadata store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, bringing it to the current schema in memory.
    fn load(&self) -> Result<Document> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Document::empty()),
            Err(e) => return Err(e.into()),
        };

        let mut doc: Document = serde_json::from_str(&text)?;
        match schema_action(doc.schema_version)? {
            SchemaAction::Create => {
                debug!("{} has no schema version, starting fresh", self.path.display());
                doc.schema_version = Some(SCHEMA_VERSION);
            }
            SchemaAction::Migrate(from) => {
                // 1.0 -> 1.1 only added the optional `repo_dir` field.
                info!("migrating metadata schema {} -> {}", from, SCHEMA_VERSION);
                doc.schema_version = Some(SCHEMA_VERSION);
            }
            SchemaAction::Ready => {}
        }
        Ok(doc)
    }

    fn save(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MetadataStore for JsonStore {
    fn select(&mut self, key: &str) -> Result<Option<RepoRecord>> {
        Ok(self.load()?.repos.remove(key))
    }

    fn select_all(&mut self) -> Result<Vec<RepoRecord>> {
        Ok(self.load()?.repos.into_values().collect())
    }

    fn apply_events(&mut self, events: &EventBuffer) -> Result<()> {
        let mut doc = self.load()?;
        let records = fold_events(events, |key| Ok(doc.repos.get(key).cloned()))?;
        for record in records {
            doc.repos.insert(record.normalized_uri.clone(), record);
        }
        self.save(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metadata::Event;
    use crate::uri::normalize;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> JsonStore {
        JsonStore::new(temp.path().join("metadata.json"))
    }

    fn used(uri: &str, duration: f64) -> EventBuffer {
        let mut buffer = EventBuffer::new();
        buffer.push(&normalize(uri).unwrap(), Event::used(duration, None));
        buffer
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        assert!(store.select("h.com/a").unwrap().is_none());
        assert!(store.select_all().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_apply_writes_versioned_document() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        store.apply_events(&used("https://h.com/a", 2.0)).unwrap();
        store.apply_events(&used("https://h.com/a", 4.0)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value["schema_version"]["major"], 1);
        assert_eq!(value["schema_version"]["minor"], 1);
        assert_eq!(value["repos"]["h.com/a"]["total_num_used"], 2);
        assert_eq!(value["repos"]["h.com/a"]["avg_ref_clone_time_sec"], 3.0);

        // No temp file is left behind.
        assert!(!temp.path().join("metadata.json.tmp").exists());
    }

    #[test]
    fn test_migrates_version_1_0() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        fs::write(
            store.path(),
            r#"{
                "schema_version": {"major": 1, "minor": 0},
                "repos": {"h.com/a": {"normalized_uri": "h.com/a", "total_num_used": 5}}
            }"#,
        )
        .unwrap();

        store.apply_events(&used("https://h.com/a", 1.0)).unwrap();
        let record = store.select("h.com/a").unwrap().unwrap();
        assert_eq!(record.total_num_used, Some(6));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(value["schema_version"]["minor"], 1);
    }

    #[test]
    fn test_newer_major_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        fs::write(
            store.path(),
            r#"{"schema_version": {"major": 2, "minor": 0}, "repos": {}}"#,
        )
        .unwrap();
        assert!(matches!(store.select_all(), Err(Error::Db { .. })));
        assert!(store.apply_events(&used("https://h.com/a", 1.0)).is_err());
    }

    #[test]
    fn test_corrupt_file_is_a_db_error() {
        let temp = TempDir::new().unwrap();
        let mut store = store(&temp);
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.select("h.com/a"), Err(Error::Db { .. })));
    }
}
