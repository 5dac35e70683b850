use std::path::{Path, PathBuf};

use super::ArchiveStore;
use crate::error::{Result, StorageError};
use crate::models::ArchiveEntry;
use crate::patch::read_archive;

const ORIGINAL_ARCHIVE: &str = "original.zip";
const FIXED_ARCHIVE: &str = "fixed.zip";

/// Stores archives under `<root>/repo/<job_id>/`.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the archives of `job_id`.
    pub fn job_directory(&self, job_id: &str) -> std::result::Result<PathBuf, StorageError> {
        validate_job_id(job_id)?;
        Ok(self.root.join("repo").join(job_id))
    }

    fn write(&self, job_id: &str, name: &str, bytes: &[u8]) -> std::result::Result<(), StorageError> {
        let dir = self.job_directory(job_id)?;
        ensure_directory(&dir)?;

        // Write next to the target then rename, so readers never see a
        // half-written archive.
        let target = dir.join(name);
        let staging = dir.join(format!("{}.tmp", name));
        std::fs::write(&staging, bytes).map_err(|e| StorageError::WriteFile {
            path: staging.clone(),
            source: e,
        })?;
        std::fs::rename(&staging, &target).map_err(|e| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        })?;

        log::debug!("Stored {} bytes at {}", bytes.len(), target.display());
        Ok(())
    }

    fn read(&self, job_id: &str, name: &str) -> std::result::Result<Vec<u8>, StorageError> {
        let path = self.job_directory(job_id)?.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(path)),
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }
}

impl ArchiveStore for FilesystemStore {
    fn save_original(&self, job_id: &str, bytes: &[u8]) -> Result<()> {
        Ok(self.write(job_id, ORIGINAL_ARCHIVE, bytes)?)
    }

    fn load_entries(&self, job_id: &str) -> Result<Vec<ArchiveEntry>> {
        let bytes = self.read(job_id, ORIGINAL_ARCHIVE)?;
        Ok(read_archive(&bytes)?)
    }

    fn save_archive(&self, job_id: &str, bytes: &[u8]) -> Result<()> {
        Ok(self.write(job_id, FIXED_ARCHIVE, bytes)?)
    }

    fn load_archive(&self, job_id: &str) -> Result<Vec<u8>> {
        Ok(self.read(job_id, FIXED_ARCHIVE)?)
    }
}

fn ensure_directory(path: &Path) -> std::result::Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Job ids become directory names, so only a conservative alphabet is allowed.
fn validate_job_id(job_id: &str) -> std::result::Result<(), StorageError> {
    let valid = !job_id.is_empty()
        && job_id.len() <= 128
        && job_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidJobId(job_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepairError;
    use crate::models::SourceFile;
    use crate::patch::{write_archive, write_zip};
    use tempfile::TempDir;

    #[test]
    fn test_original_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path());
        let files = vec![SourceFile::new("main.py", "print('hi')")];

        store
            .save_original("job-1", &write_zip(&files).unwrap())
            .unwrap();

        assert!(temp_dir.path().join("repo/job-1/original.zip").exists());
        assert_eq!(store.load_files("job-1").unwrap(), files);
    }

    #[test]
    fn test_binary_entries_survive_storage() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path());
        let entries = vec![
            ArchiveEntry::Binary {
                path: "icon.ico".to_string(),
                bytes: vec![0x00, 0x00, 0x01, 0x00, 0xff],
            },
            ArchiveEntry::Text(SourceFile::new("main.py", "print('hi')")),
        ];

        store
            .save_original("job-1", &write_archive(&entries).unwrap())
            .unwrap();

        assert_eq!(store.load_entries("job-1").unwrap(), entries);
        assert_eq!(
            store.load_files("job-1").unwrap(),
            vec![SourceFile::new("main.py", "print('hi')")]
        );
    }

    #[test]
    fn test_fixed_archive_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path());

        store.save_archive("job-1", b"PK-ish").unwrap();
        store.save_archive("job-1", b"replaced").unwrap();

        assert_eq!(store.load_archive("job-1").unwrap(), b"replaced");
        assert!(!temp_dir.path().join("repo/job-1/fixed.zip.tmp").exists());
    }

    #[test]
    fn test_missing_archive_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path());

        let err = store.load_archive("nobody").unwrap_err();
        assert!(matches!(
            err,
            RepairError::Storage(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_path_like_job_ids_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp_dir.path());

        for bad in ["", "../escape", "a/b", "dot.dot"] {
            assert!(
                matches!(
                    store.save_original(bad, b"x"),
                    Err(RepairError::Storage(StorageError::InvalidJobId(_)))
                ),
                "accepted {:?}",
                bad
            );
        }
    }
}
