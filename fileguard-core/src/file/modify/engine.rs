use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::FileGuardError;
use crate::file::encoding::{self, DetectedEncoding};
use crate::file::modify::edit::{validate_batch, EditDescriptor};
use crate::file::resolver::PathResolver;

/// Outcome of one edit batch. Produced once per batch, never partially;
/// `edit_count` can be lower than the batch size when anchors were not found.
#[derive(Debug, Clone, Serialize)]
pub struct EditResult {
    pub success: bool,
    pub message: String,
    pub diff: Option<String>,
    pub edit_count: usize,
    pub new_content_hash: Option<String>,
    pub preserved_encoding: Option<String>,
}

/// Applies replace-style edit batches to a file.
///
/// Edits apply sequentially as a fold over the batch: each descriptor sees
/// the output of the previous one, so order is significant and overlapping
/// edits compose. A per-path async mutex serializes the read-modify-write
/// against concurrent batches for the same file.
pub struct EditEngine {
    resolver: PathResolver,
    write_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl EditEngine {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Validates, applies, and (unless `dry_run`) writes back an edit batch.
    ///
    /// Structural problems reject the whole batch before any I/O. Anchors
    /// that are not found in the current content are silently skipped and
    /// only lower the resulting `edit_count`.
    pub async fn apply(
        &self,
        file_path: &str,
        edits: &[EditDescriptor],
        dry_run: bool,
        preserve_encoding: bool,
    ) -> Result<EditResult, FileGuardError> {
        let edits = validate_batch(edits)?;
        let path = self.resolver.resolve(file_path)?;

        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        if !path.is_file() {
            return Err(FileGuardError::NotFound {
                path: file_path.to_string(),
            });
        }

        let detected = encoding::detect(&path).await;
        let original = encoding::read_to_string(&path, detected).await?;

        let (content, applied) = edits.iter().fold(
            (original.clone(), 0usize),
            |(content, applied), edit| match apply_one(&content, edit) {
                Some(next) => (next, applied + 1),
                None => (content, applied),
            },
        );

        let diff = first_difference_diff(&original, &content);
        let mut new_content_hash = None;
        if applied > 0 && !dry_run {
            let write_encoding = if preserve_encoding {
                detected
            } else {
                DetectedEncoding::Utf8NoBom
            };
            encoding::write_string(&path, &content, write_encoding).await?;
            new_content_hash = Some(sha256_hex(&content));
            tracing::info!(
                path = %path.display(),
                edits = applied,
                encoding = write_encoding.name(),
                "applied file edits"
            );
        }

        let mut message = format!("Applied {applied} of {} edits", edits.len());
        if dry_run {
            message.push_str(" (dry run, no changes written)");
        }

        Ok(EditResult {
            success: true,
            message,
            diff,
            edit_count: applied,
            new_content_hash,
            preserved_encoding: preserve_encoding.then(|| detected.name().to_string()),
        })
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.write_locks.lock().expect("edit lock map poisoned");
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

/// Applies a single descriptor to `content`, returning the new content or
/// `None` when the anchor was not found.
fn apply_one(content: &str, edit: &EditDescriptor) -> Option<String> {
    match edit.line_number {
        Some(line_number) => apply_line_edit(content, line_number as usize, edit),
        None => apply_text_edit(content, edit),
    }
}

/// Line mode: with `old_text`, replace that substring within the addressed
/// line; without it, replace the whole line. Line numbers outside the current
/// file are failed matches; the edit surface never inserts or appends lines.
fn apply_line_edit(content: &str, line_number: usize, edit: &EditDescriptor) -> Option<String> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    if line_number == 0 || line_number > lines.len() {
        return None;
    }

    let raw = lines[line_number - 1];
    let (body, terminator) = split_line_terminator(raw);
    let new_body = match &edit.old_text {
        Some(old_text) => replace_first(body, old_text, &edit.text)?,
        None => edit.text.clone(),
    };

    let mut out = String::with_capacity(content.len());
    for (index, line) in lines.iter().enumerate() {
        if index == line_number - 1 {
            out.push_str(&new_body);
            out.push_str(terminator);
        } else {
            out.push_str(line);
        }
    }
    Some(out)
}

/// Whole-file mode: replace the first occurrence of `old_text` anywhere in
/// the content, which may span multiple lines.
fn apply_text_edit(content: &str, edit: &EditDescriptor) -> Option<String> {
    let old_text = edit.old_text.as_deref()?;
    replace_first(content, old_text, &edit.text)
}

/// First-occurrence replacement, retrying line-ending variants of `old_text`
/// (`\n`, `\r\n`, `\r`) before giving up. `old_text` arrives normalized to
/// `\n` but the file content keeps whatever endings it had on disk.
fn replace_first(haystack: &str, old_text: &str, new_text: &str) -> Option<String> {
    for candidate in ending_variants(old_text) {
        if haystack.contains(candidate.as_str()) {
            return Some(haystack.replacen(&candidate, new_text, 1));
        }
    }
    None
}

fn ending_variants(normalized: &str) -> Vec<String> {
    let mut variants = vec![normalized.to_string()];
    if normalized.contains('\n') {
        variants.push(normalized.replace('\n', "\r\n"));
        variants.push(normalized.replace('\n', "\r"));
    }
    variants
}

fn split_line_terminator(raw: &str) -> (&str, &str) {
    if let Some(body) = raw.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = raw.strip_suffix('\n') {
        (body, "\n")
    } else {
        (raw, "")
    }
}

/// First-difference spotlight: the first divergent line with up to two lines
/// of context either side, plus a note when the total line counts differ.
/// Deliberately not a multi-hunk diff.
pub fn first_difference_diff(old: &str, new: &str) -> Option<String> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let shorter = old_lines.len().min(new_lines.len());
    let first = (0..shorter).find(|&i| old_lines[i] != new_lines[i]);

    let mut diff = String::new();
    if let Some(index) = first {
        let _ = writeln!(diff, "First difference at line {}:", index + 1);
        for j in index.saturating_sub(2)..index {
            let _ = writeln!(diff, "  {}: {}", j + 1, old_lines[j]);
        }
        let _ = writeln!(diff, "- {}: {}", index + 1, old_lines[index]);
        let _ = writeln!(diff, "+ {}: {}", index + 1, new_lines[index]);
        for j in (index + 1)..(index + 3).min(old_lines.len()) {
            let _ = writeln!(diff, "  {}: {}", j + 1, old_lines[j]);
        }
    }
    if old_lines.len() != new_lines.len() {
        let _ = writeln!(
            diff,
            "Line count changed from {} to {}.",
            old_lines.len(),
            new_lines.len()
        );
    }
    (!diff.is_empty()).then_some(diff)
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::roots::AccessRootRegistry;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn engine_in(temp: &TempDir) -> EditEngine {
        let registry = Arc::new(AccessRootRegistry::new(temp.path(), false).unwrap());
        EditEngine::new(PathResolver::new(registry))
    }

    #[tokio::test]
    async fn test_line_replace() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("file.txt"),
            "This is line 1.\nThis is line 2.\nThis is line 3.\n",
        )
        .unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "file.txt",
                &[EditDescriptor::replace_line(2, "This is MODIFIED line 2.")],
                false,
                false,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.edit_count, 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("file.txt")).unwrap(),
            "This is line 1.\nThis is MODIFIED line 2.\nThis is line 3.\n"
        );
    }

    #[tokio::test]
    async fn test_whole_file_replace_found() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("config.txt"),
            "server = localhost:3000\nretries = 3\n",
        )
        .unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "config.txt",
                &[EditDescriptor::replace_text(
                    "localhost:3000",
                    "production.example.com",
                )],
                false,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 1);
        assert!(result.new_content_hash.is_some());
        assert!(fs::read_to_string(temp.path().join("config.txt"))
            .unwrap()
            .contains("production.example.com"));
    }

    #[tokio::test]
    async fn test_whole_file_replace_not_found_is_soft() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.txt");
        fs::write(&path, "server = example.org\n").unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "config.txt",
                &[EditDescriptor::replace_text("localhost:3000", "prod")],
                false,
                false,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.edit_count, 0);
        assert!(result.new_content_hash.is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), "server = example.org\n");
    }

    #[tokio::test]
    async fn test_dry_run_leaves_bytes_untouched() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("file.txt");
        fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();
        let before = fs::read(&path).unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "file.txt",
                &[EditDescriptor::replace_line(2, "BETA")],
                true,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 1);
        assert!(result.diff.is_some());
        assert!(result.new_content_hash.is_none());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_edits_apply_sequentially_in_order() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "one\n").unwrap();

        let engine = engine_in(&temp);
        // The second edit only matches after the first has run.
        let result = engine
            .apply(
                "f.txt",
                &[
                    EditDescriptor::replace_text("one", "two"),
                    EditDescriptor::replace_text("two", "three"),
                ],
                false,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("f.txt")).unwrap(),
            "three\n"
        );
    }

    #[tokio::test]
    async fn test_line_mode_with_old_text_replaces_within_line() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "let x = 1;\nlet x = 1;\n").unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "f.txt",
                &[EditDescriptor::replace_in_line(2, "x = 1", "x = 2")],
                false,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("f.txt")).unwrap(),
            "let x = 1;\nlet x = 2;\n"
        );
    }

    #[tokio::test]
    async fn test_out_of_range_line_is_skipped_not_fatal() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "only line\n").unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "f.txt",
                &[
                    EditDescriptor::replace_line(5, "never lands"),
                    EditDescriptor::replace_line(1, "replaced"),
                ],
                false,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("f.txt")).unwrap(),
            "replaced\n"
        );
    }

    #[tokio::test]
    async fn test_crlf_content_matches_normalized_old_text() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "first\r\nsecond\r\nthird\r\n").unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "f.txt",
                &[EditDescriptor::replace_text("first\nsecond", "start")],
                false,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("f.txt")).unwrap(),
            "start\r\nthird\r\n"
        );
    }

    #[tokio::test]
    async fn test_multiline_old_text_spans_lines() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "a\nb\nc\nd\n").unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "f.txt",
                &[EditDescriptor::replace_text("b\nc", "bc")],
                false,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 1);
        assert_eq!(
            fs::read_to_string(temp.path().join("f.txt")).unwrap(),
            "a\nbc\nd\n"
        );
    }

    #[tokio::test]
    async fn test_preserve_encoding_round_trips_utf16() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("wide.txt");
        encoding::write_string(&path, "alpha\nbeta\n", DetectedEncoding::Utf16Le)
            .await
            .unwrap();

        let engine = engine_in(&temp);
        let result = engine
            .apply(
                "wide.txt",
                &[EditDescriptor::replace_text("beta", "BETA")],
                false,
                true,
            )
            .await
            .unwrap();

        assert_eq!(result.edit_count, 1);
        assert_eq!(result.preserved_encoding.as_deref(), Some("utf-16le"));
        assert_eq!(encoding::detect(&path).await, DetectedEncoding::Utf16Le);
        let text = encoding::read_to_string(&path, DetectedEncoding::AutoDetect)
            .await
            .unwrap();
        assert_eq!(text, "alpha\nBETA\n");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let temp = tempdir().unwrap();
        let engine = engine_in(&temp);
        let err = engine
            .apply(
                "absent.txt",
                &[EditDescriptor::replace_line(1, "x")],
                false,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FileGuardError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_batch_rejected_before_any_io() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("f.txt");
        fs::write(&path, "content\n").unwrap();

        let engine = engine_in(&temp);
        let err = engine
            .apply(
                "f.txt",
                &[
                    EditDescriptor::replace_line(1, "valid"),
                    EditDescriptor {
                        line_number: None,
                        edit_type: "Delete".to_string(),
                        text: "x".to_string(),
                        old_text: Some("content".to_string()),
                    },
                ],
                false,
                false,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FileGuardError::Validation(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "content\n");
    }

    #[test]
    fn test_first_difference_diff_spotlight_shape() {
        let old = "a\nb\nc\nd\ne\n";
        let new = "a\nb\nC\nd\ne\n";
        let diff = first_difference_diff(old, new).unwrap();
        assert!(diff.contains("First difference at line 3:"));
        assert!(diff.contains("  1: a"));
        assert!(diff.contains("  2: b"));
        assert!(diff.contains("- 3: c"));
        assert!(diff.contains("+ 3: C"));
        assert!(diff.contains("  4: d"));
        assert!(diff.contains("  5: e"));
        assert!(!diff.contains("Line count changed"));
    }

    #[test]
    fn test_first_difference_diff_line_count_note() {
        let diff = first_difference_diff("a\nb\n", "a\n").unwrap();
        assert!(diff.contains("Line count changed from 2 to 1."));
    }

    #[test]
    fn test_first_difference_diff_identical_is_none() {
        assert!(first_difference_diff("same\n", "same\n").is_none());
    }
}
