//! Splits a file collection into size-bounded batches for model calls.

use crate::models::SourceFile;

/// Default upper bound on files per model call.
pub const DEFAULT_MAX_FILES_PER_CHUNK: usize = 20;
/// Default upper bound on characters per model call.
pub const DEFAULT_MAX_CHARS_PER_CHUNK: usize = 40_000;

/// Greedily groups `files` into contiguous chunks.
///
/// A chunk is closed before the next file when it already holds
/// `max_files_per_chunk` files, or when adding the file would exceed
/// `max_chars_per_chunk` and the chunk is not empty. A file larger than the
/// character budget is never split; it ends up alone in its own chunk.
/// Concatenating the returned slices yields `files` unchanged.
pub fn chunk_files(
    files: &[SourceFile],
    max_files_per_chunk: usize,
    max_chars_per_chunk: usize,
) -> Vec<&[SourceFile]> {
    let max_files = max_files_per_chunk.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = 0;

    for (index, file) in files.iter().enumerate() {
        let len = file.char_len();
        let count = index - start;
        if count >= max_files || (size + len > max_chars_per_chunk && count > 0) {
            chunks.push(&files[start..index]);
            start = index;
            size = 0;
        }
        size += len;
    }

    if start < files.len() {
        chunks.push(&files[start..]);
    }

    log::debug!(
        "Planned {} chunk(s) for {} file(s) (max {} files / {} chars)",
        chunks.len(),
        files.len(),
        max_files,
        max_chars_per_chunk
    );

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, len: usize) -> SourceFile {
        SourceFile::new(name, "x".repeat(len))
    }

    fn names(chunk: &[SourceFile]) -> Vec<&str> {
        chunk.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_files(&[], 20, 40_000).is_empty());
    }

    #[test]
    fn test_file_count_bound() {
        let files: Vec<SourceFile> = (0..5).map(|i| file(&format!("f{}", i), 1)).collect();
        let chunks = chunk_files(&files, 2, 1_000);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_char_bound_closes_chunk() {
        let files = vec![file("a", 30), file("b", 30), file("c", 30)];
        let chunks = chunk_files(&files, 20, 60);
        assert_eq!(names(chunks[0]), vec!["a", "b"]);
        assert_eq!(names(chunks[1]), vec!["c"]);
    }

    #[test]
    fn test_oversize_file_sits_alone() {
        let files = vec![file("small", 10), file("huge", 500), file("tail", 10)];
        let chunks = chunk_files(&files, 20, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(names(chunks[1]), vec!["huge"]);
    }

    #[test]
    fn test_oversize_first_file_is_accepted() {
        let files = vec![file("huge", 500)];
        let chunks = chunk_files(&files, 20, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1);
    }

    #[test]
    fn test_multibyte_content_counts_characters() {
        // Four characters, twelve bytes.
        let files = vec![SourceFile::new("a", "ééé\n"), SourceFile::new("b", "ééé\n")];
        let chunks = chunk_files(&files, 20, 8);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_bounds_and_order_hold_for_mixed_sizes() {
        let sizes = [5, 90, 3, 3, 200, 40, 40, 40, 1, 0, 77, 12, 12, 12, 12];
        let files: Vec<SourceFile> = sizes
            .iter()
            .enumerate()
            .map(|(i, len)| file(&format!("f{}", i), *len))
            .collect();

        for max_files in 1..5 {
            for max_chars in [1, 50, 100, 250] {
                let chunks = chunk_files(&files, max_files, max_chars);
                for chunk in &chunks {
                    assert!(!chunk.is_empty());
                    assert!(chunk.len() <= max_files);
                    let total: usize = chunk.iter().map(|f| f.char_len()).sum();
                    assert!(total <= max_chars || chunk.len() == 1);
                }
                assert_eq!(chunks.concat(), files);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let files: Vec<SourceFile> = (0..30).map(|i| file(&format!("f{}", i), i * 7)).collect();
        assert_eq!(chunk_files(&files, 4, 90), chunk_files(&files, 4, 90));
    }
}
