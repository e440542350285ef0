//! Cross-process run lock.
//!
//! Every sync run holds an exclusive advisory lock on `<state file>.lock`
//! for its whole duration. A second run against the same state file fails
//! immediately instead of waiting, so overlapping cron invocations can never
//! load the same state and clobber each other's saves.
//!
//! The lock file also records who holds it, for the contention message.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;

use crate::error::{AppError, Result};

/// A held run lock. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Lock file path for a state file.
    pub fn path_for(state_path: &Path) -> PathBuf {
        let mut name = state_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        state_path.with_file_name(name)
    }

    /// Try to take the lock for a state file without blocking.
    pub fn acquire(state_path: &Path) -> Result<Self> {
        let path = Self::path_for(state_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
                || e.kind() == std::io::ErrorKind::WouldBlock
            {
                let mut holder = String::new();
                let _ = file.read_to_string(&mut holder);
                let holder = holder.trim();
                let holder = if holder.is_empty() {
                    "unknown holder"
                } else {
                    holder
                };
                return Err(AppError::lock_contention(&path, holder));
            }
            return Err(AppError::Io(e));
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(
            file,
            "pid {} since {}",
            std::process::id(),
            Utc::now().to_rfc3339()
        )?;
        file.sync_all()?;

        log::debug!("Acquired run lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // The file stays behind; only the advisory lock is released.
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
        log::debug!("Released run lock {}", self.path.display());
    }
}
