//! # Data Directory Lock
//!
//! One `LOCK` file per data directory, held with an exclusive advisory
//! lock (`fs2`) for as long as the node owns the Apex Log. The file holds
//! the owner's process id so a refused start can name it.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const FIRST_RETRY: Duration = Duration::from_millis(20);
const MAX_RETRY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Another process kept the lock past the timeout.
    #[error("Data directory lock {} is held by pid {holder:?}", .path.display())]
    Held { path: PathBuf, holder: Option<u32> },
}

/// The Apex Log's claim on its data directory. Dropping it unlocks and
/// removes the lock file.
#[derive(Debug)]
pub struct DatabaseLock {
    file: File,
    path: PathBuf,
    pid: u32,
}

impl DatabaseLock {
    /// Lock `data_dir`, creating it if needed. A held lock is retried with
    /// doubling pauses until `timeout` has passed.
    pub fn acquire(data_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = data_dir.join(LOCK_FILE);
        std::fs::create_dir_all(data_dir).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;

        let deadline = Instant::now() + timeout;
        let mut pause = FIRST_RETRY;
        loop {
            if let Some(lock) = Self::try_claim(&path)? {
                debug!(path = %path.display(), "[qc-01] Data directory locked");
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                let holder = holder_pid(&path);
                warn!(path = %path.display(), ?holder, "[qc-01] Data directory is in use");
                return Err(LockError::Held { path, holder });
            }
            std::thread::sleep(pause);
            pause = (pause * 2).min(MAX_RETRY);
        }
    }

    /// One attempt. `None` while another handle holds the lock.
    fn try_claim(path: &Path) -> Result<Option<Self>, LockError> {
        let io_error = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        // Opened without truncation so a holder's pid survives a failed claim.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(io_error)?;
        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }

        let pid = std::process::id();
        file.set_len(0)
            .and_then(|()| writeln!(file, "{}", pid))
            .and_then(|()| file.sync_all())
            .map_err(io_error)?;
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
            pid,
        }))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn holder_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
