//! Block-height checkpoint.
//!
//! The file holds `{"lastProcessedHeight": n}`. Files written by older
//! deployments used `{"last_block": n}`, which is still accepted on read.
//! Writes go to a sibling temp file that is then renamed over the target, so
//! a crash mid-write leaves the previous checkpoint intact.

use crate::error::{PersistenceError, PersistenceResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Last fully processed block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "lastProcessedHeight", alias = "last_block")]
    pub last_processed_height: u64,
}

impl Checkpoint {
    pub fn new(last_processed_height: u64) -> Self {
        Self {
            last_processed_height,
        }
    }
}

/// Persists and restores the follower checkpoint.
///
/// `save` refuses to move the checkpoint backwards.
pub trait CheckpointStore: Send + Sync {
    /// Stored checkpoint, or `None` on first start.
    fn load(&self) -> PersistenceResult<Option<Checkpoint>>;

    fn save(&self, checkpoint: Checkpoint) -> PersistenceResult<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Arc<S> {
    fn load(&self) -> PersistenceResult<Option<Checkpoint>> {
        (**self).load()
    }

    fn save(&self, checkpoint: Checkpoint) -> PersistenceResult<()> {
        (**self).save(checkpoint)
    }
}

fn check_forward(stored: Option<u64>, attempted: u64) -> PersistenceResult<()> {
    match stored {
        Some(stored) if attempted < stored => {
            Err(PersistenceError::Regression { stored, attempted })
        }
        _ => Ok(()),
    }
}

/// JSON file checkpoint store.
pub struct FileCheckpointStore {
    path: PathBuf,
    /// Height of the last successful save or load.
    last_saved: Mutex<Option<u64>>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_saved: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> PersistenceResult<Option<Checkpoint>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No checkpoint file, starting fresh");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_str(&contents)?;
        *self.last_saved.lock() = Some(checkpoint.last_processed_height);
        info!(
            path = %self.path.display(),
            height = checkpoint.last_processed_height,
            "Loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: Checkpoint) -> PersistenceResult<()> {
        let mut last_saved = self.last_saved.lock();
        check_forward(*last_saved, checkpoint.last_processed_height)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer(&mut file, &checkpoint)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        *last_saved = Some(checkpoint.last_processed_height);
        debug!(height = checkpoint.last_processed_height, "Saved checkpoint");
        Ok(())
    }
}

/// In-process store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<Option<Checkpoint>>,
    saves: Mutex<Vec<u64>>,
}

impl MemoryCheckpointStore {
    pub fn new(initial: Option<Checkpoint>) -> Self {
        Self {
            inner: Mutex::new(initial),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Every height passed to a successful `save`, in order.
    pub fn saved_heights(&self) -> Vec<u64> {
        self.saves.lock().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> PersistenceResult<Option<Checkpoint>> {
        Ok(*self.inner.lock())
    }

    fn save(&self, checkpoint: Checkpoint) -> PersistenceResult<()> {
        let mut inner = self.inner.lock();
        check_forward(
            inner.map(|c| c.last_processed_height),
            checkpoint.last_processed_height,
        )?;
        *inner = Some(checkpoint);
        self.saves.lock().push(checkpoint.last_processed_height);
        Ok(())
    }
}
