/// Idempotent, atomic file writes for generated artifacts.
///
/// Every write compares against what is already on disk and skips identical
/// content, so repeated codegen runs leave mtimes (and file watchers)
/// alone. Real writes go through a temp file and rename.
use crate::error::{UdlError, UdlResult};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// What a write attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Content differed (or the file was new) and was written.
    Written,
    /// Content was identical; nothing touched.
    Unchanged,
}

/// Write `content` to `path` unless the file already holds it.
pub fn write_if_changed(path: &Path, content: &str) -> UdlResult<WriteOutcome> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == content {
            debug!(file = %path.display(), "unchanged");
            return Ok(WriteOutcome::Unchanged);
        }
    }

    let parent = path
        .parent()
        .ok_or_else(|| UdlError::invalid_input(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)?;

    // Write-then-rename keeps readers from ever seeing a torn file.
    let tmp = parent.join(format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Uuid::new_v4()
    ));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    debug!(file = %path.display(), bytes = content.len(), "written");
    Ok(WriteOutcome::Written)
}

/// Unified-diff-style preview of what a write would change. Used by
/// `--dry-run`.
pub fn diff_preview(path: &Path, new_content: &str) -> String {
    let existing = fs::read_to_string(path).unwrap_or_default();
    if existing == new_content {
        return String::new();
    }

    let diff = TextDiff::from_lines(existing.as_str(), new_content);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        out.push_str(sign);
        out.push_str(change.value());
        if !change.value().ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_write_creates_then_identical_write_skips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generated/types.ts");

        assert_eq!(
            write_if_changed(&path, "export {};\n").unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(
            write_if_changed(&path, "export {};\n").unwrap(),
            WriteOutcome::Unchanged
        );
        assert_eq!(
            write_if_changed(&path, "export { x };\n").unwrap(),
            WriteOutcome::Written
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "export { x };\n");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.ts");
        write_if_changed(&path, "a\n").unwrap();
        write_if_changed(&path, "b\n").unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn diff_preview_marks_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("types.ts");
        fs::write(&path, "old line\nshared\n").unwrap();

        let preview = diff_preview(&path, "new line\nshared\n");
        assert!(preview.contains("-old line"));
        assert!(preview.contains("+new line"));
        assert!(!preview.contains("shared"));

        assert!(diff_preview(&path, "old line\nshared\n").is_empty());
    }
}
