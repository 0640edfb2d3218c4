use crate::ExecutorError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

pub const LOCK_FILE_NAME: &str = ".shipwright.lock";

/// Exclusive advisory lock on a builder working directory.
///
/// Held for the duration of one executor call so a standalone `shipwright`
/// invocation and a running server never drive docker in the same directory
/// at the same time. Released on drop.
pub struct WorkdirLock {
    lock_file: File,
}

impl WorkdirLock {
    pub fn acquire(workdir: &Path) -> Result<Self, ExecutorError> {
        let file = Self::open(workdir)?;
        file.lock_exclusive()
            .map_err(|e| ExecutorError::Lock(format!("{}: {e}", workdir.display())))?;
        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(workdir: &Path) -> Result<Option<Self>, ExecutorError> {
        let file = Self::open(workdir)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }

    fn open(workdir: &Path) -> Result<File, ExecutorError> {
        std::fs::create_dir_all(workdir)?;
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(workdir.join(LOCK_FILE_NAME))?)
    }
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}
