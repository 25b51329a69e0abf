// src/recovery/lock.rs

//! Process-level exclusive lock on the organizer directory
//!
//! Single-writer discipline for the audit store: one process owns
//! `organizer.lock` at a time. The lock combines flock (same-host
//! exclusion while the holder lives) with the holder's PID written into
//! the file. A lock file whose PID is no longer alive is stale and gets
//! reclaimed; a live holder makes acquisition refuse.

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Exclusive lock on the organizer directory
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Acquire the lock or refuse if a live process holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::fs("create lock directory", parent.to_path_buf(), e))?;
        }

        let previous_pid = Self::holder_pid(path);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::fs("open lock file", path.to_path_buf(), e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                if let Some(pid) = previous_pid {
                    if pid != std::process::id() && !pid_alive(pid) {
                        info!("Reclaiming stale lock left by dead PID {pid}");
                    }
                }
                // Record ourselves as the holder
                file.set_len(0)
                    .and_then(|_| file.seek(SeekFrom::Start(0)).map(|_| ()))
                    .and_then(|_| write!(file, "{}", std::process::id()))
                    .and_then(|_| file.flush())
                    .map_err(|e| Error::fs("write lock file", path.to_path_buf(), e))?;

                debug!("Acquired process lock at {}", path.display());
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let holder = previous_pid
                    .map(|pid| format!(" (PID {pid})"))
                    .unwrap_or_default();
                Err(Error::audit(
                    "acquire process lock",
                    std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        format!("another organizer process is running{holder}"),
                    ),
                ))
            }
            Err(e) => Err(Error::fs("lock file", path.to_path_buf(), e)),
        }
    }

    /// PID recorded in a lock file, if any
    pub fn holder_pid(path: &Path) -> Option<u32> {
        let mut content = String::new();
        File::open(path)
            .ok()?
            .read_to_string(&mut content)
            .ok()?;
        content.trim().parse().ok()
    }

    /// True when a lock file exists and its recorded PID is alive
    pub fn held_by_live_process(path: &Path) -> bool {
        Self::holder_pid(path)
            .is_some_and(|pid| pid != std::process::id() && pid_alive(pid))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file: {err}");
        }
        let _ = fs2::FileExt::unlock(&self.file);
        debug!("Released process lock at {}", self.path.display());
    }
}

/// Liveness probe: signal 0 checks existence without touching the process
fn pid_alive(pid: u32) -> bool {
    if unsafe { libc::kill(pid as libc::pid_t, 0) } == 0 {
        return true;
    }
    // EPERM still means the process exists
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
