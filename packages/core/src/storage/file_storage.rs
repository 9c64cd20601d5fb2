//! File-backed client storage
//!
//! Stores every key in one JSON object. Writes go to a temp file that is then
//! renamed over the target so a crash never leaves a half-written file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::collaborators::{ClientStorage, CollabResult};
use crate::error::CollaboratorError;
use crate::models::NodeId;

const STATE_FILE: &str = "client-storage.json";

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    write_gate: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default storage file location
    ///
    /// Checks `NAVTREE_STATE_PATH` first, then falls back to
    /// `~/.navtree/state/client-storage.json`.
    pub fn default_path() -> CollabResult<PathBuf> {
        if let Ok(env_path) = std::env::var("NAVTREE_STATE_PATH") {
            tracing::info!("Using client storage path from NAVTREE_STATE_PATH: {}", env_path);
            return Ok(PathBuf::from(env_path));
        }

        let home_dir = dirs::home_dir()
            .ok_or_else(|| CollaboratorError::Io("Failed to get home directory".to_string()))?;

        Ok(home_dir.join(".navtree").join("state").join(STATE_FILE))
    }

    async fn load(&self) -> CollabResult<HashMap<String, Vec<NodeId>>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&self.path).await?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    async fn store(&self, entries: &HashMap<String, Vec<NodeId>>) -> CollabResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let serialized = serde_json::to_string_pretty(entries)?;
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_file = PathBuf::from(temp_name);

        fs::write(&temp_file, serialized).await?;
        fs::rename(&temp_file, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ClientStorage for FileStorage {
    async fn get_ids(&self, key: &str) -> CollabResult<Option<Vec<NodeId>>> {
        let _guard = self.write_gate.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set_ids(&self, key: &str, ids: &[NodeId]) -> CollabResult<()> {
        let _guard = self.write_gate.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), ids.to_vec());
        self.store(&entries).await
    }
}
