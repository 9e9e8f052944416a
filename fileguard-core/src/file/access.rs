use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use tokio::fs;

use crate::error::FileGuardError;
use crate::file::encoding::{self, DetectedEncoding};
use crate::file::ignore::IgnoreRuleEngine;
use crate::file::resolver::PathResolver;
use crate::file::roots::AccessRootRegistry;

/// One search hit with its location and optional surrounding context.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub path: PathBuf,
    pub line_number: usize,
    pub line: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

/// High-level facade over the sandbox: every operation resolves its path
/// through the registry and listings/searches are filtered through the
/// ignore-rule engine. The registry and rule cache are owned here and
/// injected into the components, never global.
#[derive(Clone)]
pub struct FileAccessManager {
    resolver: PathResolver,
    ignore: Arc<IgnoreRuleEngine>,
}

impl FileAccessManager {
    pub fn new(registry: Arc<AccessRootRegistry>) -> Self {
        Self {
            resolver: PathResolver::new(registry),
            ignore: Arc::new(IgnoreRuleEngine::new()),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn ignore_engine(&self) -> &Arc<IgnoreRuleEngine> {
        &self.ignore
    }

    /// Reads a file as text, detecting its encoding first.
    pub async fn read_file(&self, file_path: &str) -> Result<String, FileGuardError> {
        let path = self.resolver.resolve(file_path)?;
        if !path.exists() || !path.is_file() {
            return Err(FileGuardError::NotFound {
                path: file_path.to_string(),
            });
        }
        encoding::read_to_string(&path, DetectedEncoding::AutoDetect).await
    }

    /// Writes a file as UTF-8, creating parent directories as needed.
    pub async fn write_file(&self, file_path: &str, content: &str) -> Result<(), FileGuardError> {
        let path = self.resolver.resolve(file_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(FileGuardError::io(parent))?;
        }
        encoding::write_string(&path, content, DetectedEncoding::Utf8NoBom).await
    }

    pub async fn file_exists(&self, file_path: &str) -> Result<bool, FileGuardError> {
        let path = self.resolver.resolve(file_path)?;
        Ok(path.exists())
    }

    /// Lists a directory's entries as absolute paths, dropping anything the
    /// ignore rules exclude.
    pub async fn list_directory(
        &self,
        directory_path: &str,
    ) -> Result<Vec<PathBuf>, FileGuardError> {
        let dir = self.resolver.resolve(directory_path)?;
        if !dir.exists() || !dir.is_dir() {
            return Err(FileGuardError::NotFound {
                path: directory_path.to_string(),
            });
        }

        let rules = self.ignore.load_rules(&dir);
        let mut reader = fs::read_dir(&dir).await.map_err(FileGuardError::io(&dir))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(FileGuardError::io(&dir))?
        {
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if self.ignore.is_ignored(&path, is_dir, &rules) {
                continue;
            }
            entries.push(path);
        }
        entries.sort();
        Ok(entries)
    }

    /// Recursively searches for a regex pattern beneath `directory_path`,
    /// honoring ignore rules. `file_pattern` is a simple wildcard over file
    /// names; `context_lines` of 0 disables context capture. Returns the
    /// matches and whether the result set was truncated at `max_results`.
    pub async fn search_files(
        &self,
        directory_path: &str,
        pattern: &str,
        file_pattern: Option<&str>,
        max_results: usize,
        context_lines: usize,
    ) -> Result<(Vec<SearchMatch>, bool), FileGuardError> {
        let regex = Regex::new(pattern)
            .map_err(|e| FileGuardError::Validation(format!("invalid search pattern: {e}")))?;
        let file_regex = file_pattern
            .map(|fp| Regex::new(&wildcard_to_regex(fp)))
            .transpose()
            .map_err(|e| FileGuardError::Validation(format!("invalid file pattern: {e}")))?;

        let mut files = Vec::new();
        let mut queue = VecDeque::from([directory_path.to_string()]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Ok(entries) = self.list_directory(&current).await else {
                // Inaccessible directories are skipped, not fatal.
                continue;
            };
            for entry in entries {
                if entry.is_dir() {
                    queue.push_back(entry.to_string_lossy().into_owned());
                } else {
                    if let Some(ref file_regex) = file_regex {
                        let name = entry
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        if !file_regex.is_match(&name) {
                            continue;
                        }
                    }
                    files.push(entry);
                }
            }
        }

        let mut matches = Vec::new();
        let mut truncated = false;
        'files: for file in files {
            let Ok(content) =
                encoding::read_to_string(&file, DetectedEncoding::AutoDetect).await
            else {
                continue; // Unreadable files are skipped.
            };
            let lines: Vec<&str> = content.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                if matches.len() >= max_results {
                    truncated = true;
                    break 'files;
                }
                let before_start = i.saturating_sub(context_lines);
                let after_end = (i + 1 + context_lines).min(lines.len());
                matches.push(SearchMatch {
                    path: file.clone(),
                    line_number: i + 1,
                    line: line.to_string(),
                    context_before: lines[before_start..i]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    context_after: lines[i + 1..after_end]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                });
            }
        }

        Ok((matches, truncated))
    }
}

/// Converts a simple wildcard (e.g. `*.rs`) to an anchored regex.
fn wildcard_to_regex(pattern: &str) -> String {
    let translated = pattern
        .replace('.', r"\.")
        .replace('*', ".*")
        .replace('?', ".");
    format!("^{translated}$")
}
