use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::logging;

/// Two weeks. Sprint membership changes rarely, so the board/sprint lookup
/// result stays useful across many editor sessions.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1_209_600);

/// A resolved board/sprint pair for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprintRef {
    pub board_id: u64,
    pub sprint_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    #[serde(default)]
    board_id: u64,
    #[serde(default)]
    sprint_id: u64,
    #[serde(default)]
    timestamp: i64,
}

/// Persistent project → {board, sprint} table with lazy TTL expiry.
///
/// The whole table lives in one JSON file, rewritten in full on every
/// mutation. Mutations happen once per sprint resolution, not per page, so
/// the full rewrite stays cheap. A missing or malformed file loads as an
/// empty table; read problems never surface to callers.
#[derive(Debug)]
pub struct SprintCache {
    path: PathBuf,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SprintCache {
    pub fn load(path: &Path, ttl: Duration) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    logging::warn(format!(
                        "sprint cache at {} is malformed, starting empty: {}",
                        path.display(),
                        err
                    ));
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path: path.to_path_buf(),
            ttl,
            entries: Mutex::new(entries),
        }
    }

    /// Returns the stored pair only while it is fresh. Stale entries are
    /// treated as absent but left in place.
    pub fn get(&self, project: &str) -> Option<SprintRef> {
        let entries = self.entries.lock().expect("sprint cache mutex poisoned");
        let entry = entries.get(project)?;

        let age = Utc::now().timestamp().saturating_sub(entry.timestamp);
        if age >= self.ttl.as_secs() as i64 {
            return None;
        }

        Some(SprintRef {
            board_id: entry.board_id,
            sprint_id: entry.sprint_id,
        })
    }

    pub fn put(&self, project: &str, board_id: u64, sprint_id: u64) {
        let mut entries = self.entries.lock().expect("sprint cache mutex poisoned");
        entries.insert(
            project.to_string(),
            CacheEntry {
                board_id,
                sprint_id,
                timestamp: Utc::now().timestamp(),
            },
        );
        self.persist(&entries);
    }

    /// Removes one project's entry, or every entry when no project is given.
    pub fn clear(&self, project: Option<&str>) {
        let mut entries = self.entries.lock().expect("sprint cache mutex poisoned");
        match project {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
        self.persist(&entries);
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        let serialized = match serde_json::to_string(entries) {
            Ok(serialized) => serialized,
            Err(err) => {
                logging::warn(format!("failed to serialize sprint cache: {err}"));
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = std::fs::write(&self.path, serialized) {
            logging::warn(format!(
                "failed to write sprint cache to {}: {}",
                self.path.display(),
                err
            ));
        }
    }

    #[cfg(test)]
    fn backdate(&self, project: &str, seconds: i64) {
        let mut entries = self.entries.lock().expect("sprint cache mutex poisoned");
        if let Some(entry) = entries.get_mut(project) {
            entry.timestamp -= seconds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_at(dir: &Path, ttl: Duration) -> SprintCache {
        SprintCache::load(&dir.join("sprints.json"), ttl)
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(dir.path(), DEFAULT_TTL);
        assert_eq!(cache.get("PROJ"), None);
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sprints.json");
        std::fs::write(&path, "{not json").expect("write");

        let cache = SprintCache::load(&path, DEFAULT_TTL);
        assert_eq!(cache.get("PROJ"), None);
    }

    #[test]
    fn put_then_get_round_trips_through_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(dir.path(), DEFAULT_TTL);
        cache.put("PROJ", 7, 31);

        let reloaded = cache_at(dir.path(), DEFAULT_TTL);
        assert_eq!(
            reloaded.get("PROJ"),
            Some(SprintRef {
                board_id: 7,
                sprint_id: 31
            })
        );
    }

    #[test]
    fn expires_after_ttl_without_deleting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(dir.path(), Duration::from_secs(100));
        cache.put("PROJ", 7, 31);

        cache.backdate("PROJ", 99);
        assert!(cache.get("PROJ").is_some());

        cache.backdate("PROJ", 1);
        assert_eq!(cache.get("PROJ"), None);

        // The stale entry is still on disk, only ignored.
        let raw = std::fs::read_to_string(dir.path().join("sprints.json")).expect("read");
        assert!(raw.contains("PROJ"));
    }

    #[test]
    fn clear_removes_one_or_all() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_at(dir.path(), DEFAULT_TTL);
        cache.put("A", 1, 10);
        cache.put("B", 2, 20);

        cache.clear(Some("A"));
        assert_eq!(cache.get("A"), None);
        assert!(cache.get("B").is_some());

        cache.clear(None);
        assert_eq!(cache.get("B"), None);

        let reloaded = cache_at(dir.path(), DEFAULT_TTL);
        assert_eq!(reloaded.get("B"), None);
    }

    #[test]
    fn unknown_keys_in_the_file_are_tolerated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sprints.json");
        std::fs::write(
            &path,
            r#"{"PROJ": {"board_id": 7, "sprint_id": 31, "timestamp": 0, "schema_rev": 2}}"#,
        )
        .expect("write");

        // Decodes despite the extra field; timestamp 0 makes it stale.
        let cache = SprintCache::load(&path, DEFAULT_TTL);
        assert_eq!(cache.get("PROJ"), None);
    }
}
