//! Per-repository usage record and the events folded into it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage statistics for one cached repository, keyed by its normalized URI.
///
/// Records are never deleted: a removed pod keeps its record with
/// `removed_date` set and `disk_usage_kb` zeroed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub normalized_uri: String,
    /// Clone directory at the time of the last add.
    pub repo_dir: Option<PathBuf>,
    pub added_date: Option<DateTime<Utc>>,
    pub removed_date: Option<DateTime<Utc>>,
    pub last_fetched_date: Option<DateTime<Utc>>,
    pub last_pruned_date: Option<DateTime<Utc>>,
    pub last_used_date: Option<DateTime<Utc>>,
    pub total_num_used: Option<u64>,
    pub clone_time_sec: Option<f64>,
    pub avg_ref_clone_time_sec: Option<f64>,
    pub disk_usage_kb: Option<u64>,
    /// Reference clones made without `--dissociate`; they borrow objects from
    /// the pod and break if it is removed.
    #[serde(default)]
    pub potential_dependents: Vec<PathBuf>,
}

impl RepoRecord {
    /// An empty record for `normalized_uri`.
    pub fn new(normalized_uri: impl Into<String>) -> Self {
        Self {
            normalized_uri: normalized_uri.into(),
            ..Default::default()
        }
    }

    /// Whether the last recorded lifecycle event was an add rather than a removal.
    pub fn is_cached(&self) -> bool {
        self.added_date.is_some() && self.removed_date.is_none()
    }

    /// Fold `events` into this record, in order.
    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) {
        for event in events {
            event.apply_to(self);
        }
    }
}

/// Something that happened to a pod during one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The pod was populated by a clone.
    Add {
        time: DateTime<Utc>,
        repo_dir: PathBuf,
        clone_time_sec: f64,
        disk_usage_kb: u64,
    },
    /// The pod was fetched.
    Fetch {
        time: DateTime<Utc>,
        disk_usage_kb: u64,
        pruned: bool,
    },
    /// The pod served a reference clone.
    Use {
        time: DateTime<Utc>,
        duration_sec: f64,
        dependent_path: Option<PathBuf>,
    },
    /// The pod was deleted.
    Remove { time: DateTime<Utc> },
}

impl Event {
    pub fn add(repo_dir: impl Into<PathBuf>, clone_time_sec: f64, disk_usage_kb: u64) -> Self {
        Event::Add {
            time: Utc::now(),
            repo_dir: repo_dir.into(),
            clone_time_sec,
            disk_usage_kb,
        }
    }

    pub fn fetch(disk_usage_kb: u64, pruned: bool) -> Self {
        Event::Fetch {
            time: Utc::now(),
            disk_usage_kb,
            pruned,
        }
    }

    pub fn used(duration_sec: f64, dependent_path: Option<PathBuf>) -> Self {
        Event::Use {
            time: Utc::now(),
            duration_sec,
            dependent_path,
        }
    }

    pub fn remove() -> Self {
        Event::Remove { time: Utc::now() }
    }

    /// When the event happened.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Event::Add { time, .. }
            | Event::Fetch { time, .. }
            | Event::Use { time, .. }
            | Event::Remove { time } => *time,
        }
    }

    /// Fold this event into `record`.
    pub fn apply_to(&self, record: &mut RepoRecord) {
        match self {
            Event::Add {
                time,
                repo_dir,
                clone_time_sec,
                disk_usage_kb,
            } => {
                record.added_date = Some(*time);
                record.last_fetched_date = Some(*time);
                record.repo_dir = Some(repo_dir.clone());
                record.clone_time_sec = Some(*clone_time_sec);
                record.disk_usage_kb = Some(*disk_usage_kb);
                record.removed_date = None;
            }
            Event::Fetch {
                time,
                disk_usage_kb,
                pruned,
            } => {
                record.last_fetched_date = Some(*time);
                record.disk_usage_kb = Some(*disk_usage_kb);
                if *pruned {
                    record.last_pruned_date = Some(*time);
                }
            }
            Event::Use {
                time,
                duration_sec,
                dependent_path,
            } => {
                let count = record.total_num_used.unwrap_or(0) + 1;
                let avg = record.avg_ref_clone_time_sec.unwrap_or(0.0);
                record.total_num_used = Some(count);
                record.avg_ref_clone_time_sec = Some(avg + (duration_sec - avg) / count as f64);
                record.last_used_date = Some(*time);

                if let Some(path) = dependent_path {
                    if !record.potential_dependents.contains(path) {
                        record.potential_dependents.push(path.clone());
                    }
                }
            }
            Event::Remove { time } => {
                record.removed_date = Some(*time);
                record.disk_usage_kb = Some(0);
            }
        }
    }
}
