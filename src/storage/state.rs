//! State store: loads and atomically saves a source's [`SyncState`].
//!
//! Saves never write the target in place. The serialized state goes to a
//! temporary sibling, is flushed and synced, and only then renamed over the
//! target, so the file on disk is always a complete, valid version.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::SyncState;
use crate::storage::write_temp;

/// Sole reader/writer of one state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

/// A fully written temp file waiting to replace the state file.
///
/// Dropping it without [`StagedSave::commit`] discards the temp file and
/// leaves the previous state in place.
#[derive(Debug)]
pub struct StagedSave {
    tmp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedSave {
    /// Rename the temp file over the target.
    pub async fn commit(mut self) -> Result<()> {
        tokio::fs::rename(&self.tmp, &self.target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedSave {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.tmp);
        }
    }
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, or a fresh one if the file does not exist yet.
    ///
    /// A file that exists but does not parse is an error; it is never
    /// replaced with an empty state. Files written by older tools get their
    /// missing lookup entries filled in memory.
    pub async fn load(&self) -> Result<SyncState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "No state file at {}, starting fresh",
                    self.path.display()
                );
                return Ok(SyncState::default());
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut state: SyncState = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::corrupt_state(&self.path, e))?;
        let restored = state.restore_invariants();
        if restored > 0 {
            log::info!(
                "Filled {restored} missing lookup entries in {}",
                self.path.display()
            );
        }
        Ok(state)
    }

    /// Serialize the state into a temp file without touching the target.
    pub async fn stage(&self, state: &SyncState) -> Result<StagedSave> {
        let bytes = Self::serialize(state)?;
        let tmp = write_temp(&self.path, &bytes).await?;
        Ok(StagedSave {
            tmp,
            target: self.path.clone(),
            committed: false,
        })
    }

    /// Atomically replace the state file.
    pub async fn save(&self, state: &SyncState) -> Result<()> {
        self.stage(state).await?.commit().await?;
        log::debug!("State saved to {}", self.path.display());
        Ok(())
    }

    /// Canonical on-disk bytes for a state.
    pub fn serialize(state: &SyncState) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(state)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
