use crate::models::{Change, ChangeKind};

/// Applies line edits to `content` and returns the new text.
///
/// Changes are applied bottom-up (descending `start_line`, stable for equal
/// starts) so that splicing one region never shifts the coordinates of a
/// region that is still to be processed. Overlapping ranges are not
/// reconciled: a later-processed change sees the buffer as already modified
/// by the earlier ones. Coordinates past the end of the buffer are clamped.
pub fn apply_patch(content: &str, changes: &[Change]) -> String {
    if changes.is_empty() {
        return content.to_string();
    }

    let mut lines: Vec<&str> = content.split('\n').collect();
    let mut ordered: Vec<&Change> = changes.iter().collect();
    ordered.sort_by(|a, b| b.start_line.cmp(&a.start_line));

    for change in ordered {
        let (start, end) = line_span(lines.len(), change);
        match change.kind {
            ChangeKind::Delete => {
                lines.drain(start..end);
            }
            ChangeKind::Replace => {
                lines.splice(start..end, change.new_code.split('\n'));
            }
            ChangeKind::Insert => {
                lines.splice(start..start, change.new_code.split('\n'));
            }
            ChangeKind::Unknown => {
                log::warn!(
                    "Skipping change with unknown type at line {}",
                    change.start_line
                );
            }
        }
    }

    lines.join("\n")
}

/// Zero-indexed half-open range `[start, end)` covered by `change`, clamped
/// to a buffer of `len` lines.
fn line_span(len: usize, change: &Change) -> (usize, usize) {
    let start = (change.start_line.saturating_sub(1) as usize).min(len);
    let end = (change.last_line() as usize).min(len).max(start);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_order_keeps_changes_independent() {
        let content = "1\n2\n3\n4\n5";
        let forward = vec![Change::replace(2, 2, "B"), Change::delete(4, 4)];
        let backward = vec![Change::delete(4, 4), Change::replace(2, 2, "B")];

        assert_eq!(apply_patch(content, &forward), "1\nB\n3\n5");
        assert_eq!(apply_patch(content, &backward), "1\nB\n3\n5");
    }

    #[test]
    fn test_insert_goes_before_the_line() {
        assert_eq!(
            apply_patch("a\nb", &[Change::insert(2, "X")]),
            "a\nX\nb"
        );
    }

    #[test]
    fn test_empty_changes_is_identity() {
        let content = "fn main() {}\r\n\n";
        assert_eq!(apply_patch(content, &[]), content);
    }

    #[test]
    fn test_deterministic() {
        let content = "a\nb\nc\nd";
        let changes = vec![
            Change::insert(1, "// header"),
            Change::replace(3, 4, "C\nD\nE"),
            Change::delete(2, 2),
        ];
        assert_eq!(
            apply_patch(content, &changes),
            apply_patch(content, &changes)
        );
        assert_eq!(apply_patch(content, &changes), "// header\na\nC\nD\nE");
    }

    #[test]
    fn test_replace_with_multiple_lines() {
        let out = apply_patch("a\nb\nc", &[Change::replace(2, 2, "x\ny\nz")]);
        assert_eq!(out, "a\nx\ny\nz\nc");
    }

    #[test]
    fn test_delete_range_is_inclusive() {
        assert_eq!(apply_patch("1\n2\n3\n4", &[Change::delete(2, 3)]), "1\n4");
    }

    #[test]
    fn test_end_line_defaults_to_start_line() {
        let change = Change {
            end_line: None,
            ..Change::delete(2, 2)
        };
        assert_eq!(apply_patch("a\nb\nc", &[change]), "a\nc");
    }

    #[test]
    fn test_trailing_newline_survives() {
        assert_eq!(apply_patch("a\nb\n", &[Change::delete(1, 1)]), "b\n");
    }

    #[test]
    fn test_unknown_change_is_skipped() {
        let unknown = Change {
            kind: ChangeKind::Unknown,
            ..Change::replace(1, 1, "never")
        };
        let out = apply_patch("a\nb", &[unknown, Change::replace(2, 2, "B")]);
        assert_eq!(out, "a\nB");
    }

    #[test]
    fn test_insert_into_empty_buffer() {
        assert_eq!(apply_patch("", &[Change::insert(1, "x\ny")]), "x\ny\n");
    }

    #[test]
    fn test_out_of_range_coordinates_are_clamped() {
        assert_eq!(apply_patch("a\nb", &[Change::insert(10, "z")]), "a\nb\nz");
        assert_eq!(apply_patch("a\nb", &[Change::delete(5, 9)]), "a\nb");
        assert_eq!(apply_patch("a\nb", &[Change::delete(2, 9)]), "a");
    }

    #[test]
    fn test_end_before_start_removes_nothing() {
        assert_eq!(
            apply_patch("a\nb\nc", &[Change::replace(3, 1, "X")]),
            "a\nb\nX\nc"
        );
    }

    #[test]
    fn test_overlapping_changes_are_applied_naively() {
        // Delete line 3 first, then replace what are now lines 2..4.
        let out = apply_patch(
            "1\n2\n3\n4\n5",
            &[Change::replace(2, 4, "X"), Change::delete(3, 3)],
        );
        assert_eq!(out, "1\nX");
    }
}
