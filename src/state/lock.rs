use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DrError, Result};

/// File-based lock guarding a resource-state document.
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Acquire `<working_dir>/locks/<name>.lock`. Fails if the lock already
    /// exists.
    pub fn acquire(working_dir: &Path, name: &str) -> Result<Self> {
        let locks = working_dir.join("locks");
        fs::create_dir_all(&locks)?;
        let lock_path = locks.join(format!("{}.lock", name));

        let lock_info = format!(
            "pid={}\ntime={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );
        match fs::OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(lock_info.as_bytes())?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&lock_path).unwrap_or_default();
                return Err(DrError::config(format!(
                    "'{}' is locked by another run ({}). Remove {} if that run is gone.",
                    name,
                    holder.replace('\n', ", "),
                    lock_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(lock = %lock_path.display(), "Lock acquired");
        Ok(Self { lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// Release the lock file.
    pub fn release(self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::acquire(dir.path(), "sysconfig").unwrap();
        assert!(FileLock::acquire(dir.path(), "sysconfig").is_err());
        lock.release().unwrap();
        let again = FileLock::acquire(dir.path(), "sysconfig").unwrap();
        drop(again);
        assert!(!dir.path().join("locks/sysconfig.lock").exists());
    }
}
