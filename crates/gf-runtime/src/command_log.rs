use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use orion_error::prelude::*;

use crate::error::{RuntimeReason, RuntimeResult};

/// Append-only record of mutating commands and synthesized sweep events.
///
/// Narrow by design: appending is the only operation a caller needs
/// (replay/compaction are out of scope — see the crate's Non-goals).
pub trait CommandLog: Send + Sync {
    fn append(&self, record: &[u8]) -> RuntimeResult<()>;
}

/// Default file-backed implementation: one newline-terminated record per
/// call, opened in append mode for the lifetime of the server.
pub struct FileCommandLog {
    file: Mutex<File>,
}

impl FileCommandLog {
    pub fn open(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StructError::from(RuntimeReason::Bootstrap)
                    .with_detail(format!("creating command log dir: {e}"))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                StructError::from(RuntimeReason::Bootstrap)
                    .with_detail(format!("opening command log {}: {e}", path.display()))
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl CommandLog for FileCommandLog {
    fn append(&self, record: &[u8]) -> RuntimeResult<()> {
        let mut file = self.file.lock().expect("command log mutex poisoned");
        file.write_all(record)
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| {
                StructError::from(RuntimeReason::Bootstrap)
                    .with_detail(format!("appending to command log: {e}"))
            })
    }
}

/// No-op implementation for tests that don't care about the command log.
pub struct NullCommandLog;

impl CommandLog for NullCommandLog {
    fn append(&self, _record: &[u8]) -> RuntimeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_newline_terminated_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd.log");
        let log = FileCommandLog::open(&path).unwrap();
        log.append(b"SET fleet truck1 POINT 33.5 -112.1").unwrap();
        log.append(b"DEL fleet truck1").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "SET fleet truck1 POINT 33.5 -112.1\nDEL fleet truck1\n"
        );
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/cmd.log");
        let log = FileCommandLog::open(&path).unwrap();
        log.append(b"PING").unwrap();
        assert!(path.exists());
    }
}
