use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use super::{SeenSet, SeenStore};
use crate::error::{Result, WatchError};

/// Seen-set as a sorted, pretty-printed JSON array of strings.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "sent_ids.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SeenStore for JsonFileStore {
    fn load(&self) -> SeenSet {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting empty", self.path);
                return SeenSet::new();
            }
            Err(e) => {
                warn!("Cannot read {:?} ({}), starting empty", self.path, e);
                return SeenSet::new();
            }
        };
        parse_ids(&raw).unwrap_or_else(|e| {
            warn!("Ignoring unreadable state in {:?}: {}", self.path, e);
            SeenSet::new()
        })
    }

    fn save(&self, seen: &SeenSet) -> Result<()> {
        let ids: Vec<&str> = seen.iter().collect();
        let body = serde_json::to_string_pretty(&ids)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // write-then-rename so a crash never leaves a half-written state file
        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!("Saved {} ids to {:?}", seen.len(), self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

fn parse_ids(raw: &str) -> Result<SeenSet> {
    if raw.trim().is_empty() {
        return Ok(SeenSet::new());
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect()),
        _ => Err(WatchError::Store("expected a JSON array of ids".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(list: &[&str]) -> SeenSet {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_file_is_empty() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("sent_ids.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_or_foreign_state_is_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sent_ids.json");
        let store = JsonFileStore::new(&path);

        for raw in ["{not json", "   \n", r#"{"ids": ["A1"]}"#, "42"] {
            fs::write(&path, raw).unwrap();
            assert!(store.load().is_empty(), "{raw}");
        }
    }

    #[test]
    fn non_string_entries_are_stringified() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sent_ids.json");
        fs::write(&path, r#"["A1", 17]"#).unwrap();
        let seen = JsonFileStore::new(&path).load();
        assert!(seen.contains("A1"));
        assert!(seen.contains("17"));
    }

    #[test]
    fn save_is_sorted_and_leaves_no_temp_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state").join("sent_ids.json");
        let store = JsonFileStore::new(&path);
        store.save(&ids(&["c", "a", "b"])).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, vec!["a", "b", "c"]);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn save_load_is_a_fixed_point() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sent_ids.json");
        fs::write(&path, r#"["Z9", "A1", "A1", "https://ted.example/n/5"]"#).unwrap();
        let store = JsonFileStore::new(&path);

        let first = store.load();
        store.save(&first).unwrap();
        let second = store.load();
        assert_eq!(first, second);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn save_overwrites_previous_state() {
        let temp = tempdir().unwrap();
        let store = JsonFileStore::new(temp.path().join("sent_ids.json"));
        store.save(&ids(&["A1"])).unwrap();
        store.save(&ids(&["A1", "B2"])).unwrap();
        assert_eq!(store.load(), ids(&["A1", "B2"]));
    }
}
