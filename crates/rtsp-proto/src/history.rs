//! Previously used camera base URLs, fed back to the URL input as suggestions.
//!
//! Persisted as a plain JSON array of strings. Order carries no meaning;
//! each URL appears at most once.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct ConnectionHistory {
    path: PathBuf,
    entries: Vec<String>,
}

impl ConnectionHistory {
    /// Open the history stored at `path`. A missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        Self { path, entries }
    }

    /// Read the entries stored at `path`.
    ///
    /// An unreadable or corrupt file yields an empty list; it is overwritten
    /// by the next `append`.
    pub fn load(path: &Path) -> Vec<String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("history: cannot read {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(list) => dedup(list),
            Err(e) => {
                warn!("history: ignoring corrupt {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.iter().any(|e| e == url.trim())
    }

    /// Record `url` and persist the list. Returns `false` when it was already known.
    pub fn append(&mut self, url: &str) -> anyhow::Result<bool> {
        let url = url.trim();
        if url.is_empty() || self.contains(url) {
            return Ok(false);
        }
        self.entries.push(url.to_string());
        // Only keep what reached the disk, so a later append retries the write.
        if let Err(e) = self.save() {
            self.entries.pop();
            return Err(e);
        }
        debug!("history: added {}", url);
        Ok(true)
    }

    /// Entries that start with `prefix`, ignoring ASCII case.
    pub fn suggestions(&self, prefix: &str) -> Vec<&str> {
        let prefix = prefix.trim().to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.to_ascii_lowercase().starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string(&self.entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

fn dedup(list: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(list.len());
    for item in list {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_url_twice_is_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("config.json");

        let mut history = ConnectionHistory::open(&path);
        assert!(history.append("rtsp://cam").unwrap());
        assert!(!history.append(" rtsp://cam ").unwrap());

        let stored = ConnectionHistory::load(&path);
        assert_eq!(stored, vec!["rtsp://cam".to_string()]);
    }

    #[test]
    fn test_distinct_urls_are_both_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut history = ConnectionHistory::open(&path);
        history.append("rtsp://a").unwrap();
        history.append("rtsp://b").unwrap();

        let reopened = ConnectionHistory::open(&path);
        assert!(reopened.contains("rtsp://a"));
        assert!(reopened.contains("rtsp://b"));
        assert_eq!(reopened.entries().len(), 2);
    }

    #[test]
    fn test_existing_duplicates_collapse_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"["rtsp://a", "rtsp://a", "rtsp://b"]"#).unwrap();

        let history = ConnectionHistory::open(&path);
        assert_eq!(history.entries().len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_empty_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut history = ConnectionHistory::open(&path);
        assert!(history.entries().is_empty());

        history.append("rtsp://cam").unwrap();
        assert_eq!(ConnectionHistory::load(&path), vec!["rtsp://cam".to_string()]);
    }

    #[test]
    fn test_failed_save_is_retried_on_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("config");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("config.json");

        let mut history = ConnectionHistory::open(&path);
        assert!(history.append("rtsp://cam").is_err());
        assert!(!history.contains("rtsp://cam"));
        assert!(history.suggestions("rtsp").is_empty());

        std::fs::remove_file(&blocker).unwrap();
        assert!(history.append("rtsp://cam").unwrap());
        assert_eq!(ConnectionHistory::load(&path), vec!["rtsp://cam".to_string()]);
    }

    #[test]
    fn test_blank_url_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut history = ConnectionHistory::open(&path);
        assert!(!history.append("   ").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_suggestions_match_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"["rtsp://10.0.0.5", "RTSP://10.0.0.6", "rtsp://cam"]"#).unwrap();

        let history = ConnectionHistory::open(&path);
        let hits = history.suggestions("rtsp://10.");
        assert_eq!(hits, vec!["rtsp://10.0.0.5", "RTSP://10.0.0.6"]);
        assert_eq!(history.suggestions("").len(), 3);
    }
}
