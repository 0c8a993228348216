use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};

/// A uniquely named file in the export scratch directory. The file is removed
/// when the handle drops, whether or not anything was ever written to it.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn reserve(dir: &Path, report: &str) -> AppResult<Self> {
        fs::create_dir_all(dir).map_err(|error| {
            tracing::error!(dir = %dir.display(), error = %error, "Could not create export scratch directory");
            AppError::Render("Could not prepare export file.".to_string())
        })?;
        let name = format!(
            "{report}_report_{}_{}.xlsx",
            Utc::now().format("%Y%m%dT%H%M%S%3fZ"),
            uuid::Uuid::new_v4().simple()
        );
        Ok(Self {
            path: dir.join(name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> AppResult<Vec<u8>> {
        fs::read(&self.path).map_err(|error| {
            tracing::error!(path = %self.path.display(), error = %error, "Could not read rendered export");
            AppError::Render("Could not read export file.".to_string())
        })
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(path = %self.path.display(), error = %error, "Could not remove export scratch file");
            }
        }
    }
}

/// Download name offered to the client, e.g. `deposits_report_2026-03-31.xlsx`.
pub fn attachment_filename(report: &str, generated_at: DateTime<Utc>) -> String {
    format!("{report}_report_{}.xlsx", generated_at.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{attachment_filename, ScratchFile};

    fn scratch_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("vaultline-scratch-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn file_is_removed_when_the_handle_drops() {
        let dir = scratch_dir();
        let path = {
            let file = ScratchFile::reserve(&dir, "deposits").expect("reserve");
            std::fs::write(file.path(), b"PK").expect("write");
            assert_eq!(file.read().expect("read"), b"PK");
            file.path().to_path_buf()
        };
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn names_never_collide() {
        let dir = scratch_dir();
        let first = ScratchFile::reserve(&dir, "wallets").expect("reserve");
        let second = ScratchFile::reserve(&dir, "wallets").expect("reserve");
        assert_ne!(first.path(), second.path());
        let name = first.path().file_name().and_then(|name| name.to_str()).unwrap_or_default();
        assert!(name.starts_with("wallets_report_"));
        assert!(name.ends_with(".xlsx"));
        drop((first, second));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unwritten_files_drop_quietly() {
        let dir = scratch_dir();
        drop(ScratchFile::reserve(&dir, "comprehensive").expect("reserve"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn attachment_name_carries_the_date() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 18, 0, 0).unwrap();
        assert_eq!(attachment_filename("deposits", at), "deposits_report_2026-03-31.xlsx");
    }
}
