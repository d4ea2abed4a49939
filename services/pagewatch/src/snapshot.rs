//! Persisted per-resource snapshot state

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// One fetched observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub timestamp_epoch_ms: u64,
    pub content: String,
    pub hash: String,
    /// HTTP status of the fetch; 0 marks a failed fetch
    pub status: u16,
}

/// Last-known state for one monitored resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub name: String,
    pub current: SnapshotEntry,
    #[serde(default)]
    pub previous: Option<SnapshotEntry>,
    pub last_check_epoch_ms: u64,
    pub change_count: u64,
    pub error_count: u32,
    pub enabled: bool,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub last_error_notification_epoch_ms: Option<u64>,
}

/// Stores one pretty-printed JSON file per (url, name) identity
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, url: &str, name: &str) -> PathBuf {
        self.dir.join(snapshot_file_name(url, name))
    }

    /// Load the snapshot for an identity. A missing file is not an error;
    /// it signals first-run.
    pub fn load(&self, url: &str, name: &str) -> crate::Result<Option<Snapshot>> {
        let path = self.path_for(url, name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(crate::WatchError::Snapshot(format!(
                    "Failed to read snapshot {:?}: {}",
                    path, e
                )));
            }
        };

        let snapshot = serde_json::from_str(&content).map_err(|e| {
            crate::WatchError::Snapshot(format!("Failed to parse snapshot {:?}: {}", path, e))
        })?;
        Ok(Some(snapshot))
    }

    /// Overwrite the full snapshot record for its identity
    pub fn save(&self, snapshot: &Snapshot) -> crate::Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            crate::WatchError::Snapshot(format!(
                "Failed to create snapshot directory {:?}: {}",
                self.dir, e
            ))
        })?;

        let path = self.path_for(&snapshot.url, &snapshot.name);
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&path, content).map_err(|e| {
            crate::WatchError::Snapshot(format!("Failed to write snapshot {:?}: {}", path, e))
        })?;

        tracing::debug!("Saved snapshot for '{}' to {:?}", snapshot.name, path);
        Ok(())
    }
}

/// Deterministic, filesystem-safe file name for a (url, name) identity.
///
/// The readable part comes from the URL's host and path; the digest suffix
/// keys the full (url, name) pair so resources sharing a URL never collide.
pub fn snapshot_file_name(url: &str, name: &str) -> String {
    let readable = match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("unknown");
            format!("{}{}", host, parsed.path())
        }
        Err(_) => url.to_string(),
    };

    let sanitized: String = readable
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('-');
    let truncated: String = sanitized.chars().take(80).collect();

    let digest = Sha256::digest(format!("{}|{}", url, name).as_bytes());
    let key = &hex::encode(digest)[..10];

    format!("{}-{}.json", truncated, key)
}
