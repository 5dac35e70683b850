pub mod filesystem;

pub use filesystem::FilesystemStore;

use crate::error::Result;
use crate::models::{ArchiveEntry, SourceFile};
use crate::patch::text_files;

/// Where job archives live.
///
/// Each job owns one uploaded archive and at most one rebuilt archive.
/// Implementations must be safe to share between concurrently running stages.
pub trait ArchiveStore: Send + Sync {
    /// Persists the uploaded archive for `job_id`, replacing any previous one.
    fn save_original(&self, job_id: &str, bytes: &[u8]) -> Result<()>;

    /// Every file entry of the uploaded archive, in archive order.
    fn load_entries(&self, job_id: &str) -> Result<Vec<ArchiveEntry>>;

    /// Text files of the uploaded archive, in archive order.
    fn load_files(&self, job_id: &str) -> Result<Vec<SourceFile>> {
        Ok(text_files(&self.load_entries(job_id)?))
    }

    /// Persists the rebuilt archive for `job_id`.
    fn save_archive(&self, job_id: &str, bytes: &[u8]) -> Result<()>;

    /// Returns the rebuilt archive for `job_id`.
    fn load_archive(&self, job_id: &str) -> Result<Vec<u8>>;
}
