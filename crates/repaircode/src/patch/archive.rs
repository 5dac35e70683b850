//! Zip intake and rebuild.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::apply::apply_patch;
use crate::error::ArchiveError;
use crate::models::{ArchiveEntry, FilePatch, PatchSet, SourceFile};
use crate::storage::ArchiveStore;

/// Largest uncompressed entry accepted from an upload.
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Extracts every file entry from a zip archive, in archive order.
///
/// Directory entries are dropped and entries whose names escape the archive
/// root are skipped with a warning. Entries that are not valid UTF-8 are kept
/// as [`ArchiveEntry::Binary`].
pub fn read_archive(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    read_entries(bytes, MAX_ENTRY_BYTES)
}

/// Text files of a zip archive, in archive order.
pub fn read_zip(bytes: &[u8]) -> Result<Vec<SourceFile>, ArchiveError> {
    Ok(text_files(&read_archive(bytes)?))
}

/// The text entries of `entries`, in order.
pub fn text_files(entries: &[ArchiveEntry]) -> Vec<SourceFile> {
    entries
        .iter()
        .filter_map(ArchiveEntry::as_text)
        .cloned()
        .collect()
}

fn read_entries(bytes: &[u8], limit: u64) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        if entry.enclosed_name().is_none() {
            log::warn!("Skipping archive entry with unsafe path '{}'", name);
            continue;
        }

        // The declared size comes from the upload, so it only bounds the read.
        let mut raw = Vec::new();
        entry.by_ref().take(limit + 1).read_to_end(&mut raw)?;
        if raw.len() as u64 > limit {
            return Err(ArchiveError::EntryTooLarge { path: name, limit });
        }

        match String::from_utf8(raw) {
            Ok(content) => entries.push(ArchiveEntry::Text(SourceFile {
                path: name,
                content,
            })),
            Err(e) => {
                log::debug!("Keeping '{}' as a binary entry", name);
                entries.push(ArchiveEntry::Binary {
                    path: name,
                    bytes: e.into_bytes(),
                });
            }
        }
    }

    Ok(entries)
}

/// Writes `entries` into a deflated zip archive, one entry each, in order.
pub fn write_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        let body = match entry {
            ArchiveEntry::Text(file) => file.content.as_bytes(),
            ArchiveEntry::Binary { bytes, .. } => bytes.as_slice(),
        };
        writer.start_file(entry.path(), options)?;
        writer.write_all(body)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Writes text files into a deflated zip archive.
pub fn write_zip(files: &[SourceFile]) -> Result<Vec<u8>, ArchiveError> {
    let entries: Vec<ArchiveEntry> = files.iter().cloned().map(ArchiveEntry::Text).collect();
    write_archive(&entries)
}

/// Output of [`rebuild_entries`].
#[derive(Debug, Clone, Default)]
pub struct RebuiltEntries {
    pub entries: Vec<ArchiveEntry>,
    /// Text originals that had a patch applied.
    pub patched: usize,
    /// New files created from `newFile` patches.
    pub created: usize,
}

/// Applies `patch_set` to `originals`.
///
/// Every original appears exactly once, in its original order, patched or
/// verbatim. Binary entries are never patched. Patches marked `newFile` for
/// paths not among the originals are appended afterwards, each once, built
/// from an empty buffer. When several patches name the same path the last
/// one wins. Patches for unknown paths without `newFile` are ignored.
pub fn rebuild_entries(originals: &[ArchiveEntry], patch_set: &PatchSet) -> RebuiltEntries {
    let mut by_path: HashMap<&str, &FilePatch> = HashMap::new();
    for patch in &patch_set.patches {
        if by_path.insert(patch.file.as_str(), patch).is_some() {
            log::warn!(
                "Multiple patches target '{}', keeping the last one",
                patch.file
            );
        }
    }

    let mut rebuilt = RebuiltEntries::default();
    let mut emitted: HashSet<&str> = HashSet::new();

    for original in originals {
        let path = original.path();
        if !emitted.insert(path) {
            log::warn!("Duplicate archive entry '{}' dropped", path);
            continue;
        }
        let entry = match (original, by_path.get(path)) {
            (ArchiveEntry::Text(file), Some(patch)) => {
                rebuilt.patched += 1;
                ArchiveEntry::Text(SourceFile {
                    path: file.path.clone(),
                    content: apply_patch(&file.content, &patch.changes),
                })
            }
            (ArchiveEntry::Binary { .. }, Some(_)) => {
                log::warn!("Ignoring patch for binary entry '{}'", path);
                original.clone()
            }
            (_, None) => original.clone(),
        };
        rebuilt.entries.push(entry);
    }

    for patch in &patch_set.patches {
        let path = patch.file.as_str();
        if emitted.contains(path) {
            continue;
        }
        // Resolve to the winning patch for this path.
        let patch = by_path.get(path).copied().unwrap_or(patch);
        emitted.insert(path);

        if !patch.new_file {
            log::warn!(
                "Ignoring patch for '{}': not in the archive and not marked as a new file",
                path
            );
            continue;
        }

        rebuilt.created += 1;
        rebuilt.entries.push(ArchiveEntry::Text(SourceFile {
            path: patch.file.clone(),
            content: apply_patch("", &patch.changes),
        }));
    }

    rebuilt
}

/// A rebuilt archive together with what went into it.
#[derive(Debug, Clone)]
pub struct RebuiltArchive {
    pub bytes: Vec<u8>,
    pub entries: usize,
    pub patched: usize,
    pub created: usize,
}

/// Applies `patch_set` to `originals` and zips the result. Nothing is
/// persisted here.
pub fn render_archive(
    originals: &[ArchiveEntry],
    patch_set: &PatchSet,
) -> Result<RebuiltArchive, ArchiveError> {
    let rebuilt = rebuild_entries(originals, patch_set);
    let bytes = write_archive(&rebuilt.entries)?;
    Ok(RebuiltArchive {
        bytes,
        entries: rebuilt.entries.len(),
        patched: rebuilt.patched,
        created: rebuilt.created,
    })
}

/// Rebuilds the archive for `job_id` and persists it through `store`.
pub fn build_archive(
    job_id: &str,
    originals: &[ArchiveEntry],
    patch_set: &PatchSet,
    store: &dyn ArchiveStore,
) -> crate::error::Result<RebuiltArchive> {
    let rebuilt = render_archive(originals, patch_set)?;
    store.save_archive(job_id, &rebuilt.bytes)?;

    log::info!(
        "Rebuilt archive for job {}: {} entries ({} patched, {} new)",
        job_id,
        rebuilt.entries,
        rebuilt.patched,
        rebuilt.created
    );
    Ok(rebuilt)
}
