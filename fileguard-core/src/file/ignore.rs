use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use regex::Regex;

const IGNORE_FILE_NAME: &str = ".gitignore";

/// One parsed line of an ignore file.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pub pattern: String,
    pub negated: bool,
    pub directory_only: bool,
    /// Directory containing the ignore file the rule came from.
    pub base_path: PathBuf,
    matcher: Regex,
}

/// Loads and evaluates gitignore-style rules.
///
/// Rule lists are collected by walking from the queried directory up through
/// every ancestor: the starting directory's rules come first, each ancestor's
/// after. Combined with last-match-wins evaluation this lets an ancestor's
/// broad rule override a child's negation; that ordering is preserved from
/// the observed behavior of the system this replaces, not corrected.
///
/// Lists are cached per canonical starting directory for the life of the
/// process; editing an ignore file does not invalidate the cache.
#[derive(Debug, Default)]
pub struct IgnoreRuleEngine {
    cache: Mutex<HashMap<PathBuf, Arc<Vec<IgnoreRule>>>>,
}

impl IgnoreRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ordered rule list governing `directory`. Two concurrent
    /// callers may race to parse the same directory; the first insert wins.
    pub fn load_rules(&self, directory: &Path) -> Arc<Vec<IgnoreRule>> {
        let key = directory.to_path_buf();
        if let Some(rules) = self.cache.lock().expect("ignore cache poisoned").get(&key) {
            return rules.clone();
        }

        let rules = Arc::new(collect_rules(directory));
        tracing::debug!(
            directory = %directory.display(),
            rules = rules.len(),
            "cached ignore rules"
        );
        self.cache
            .lock()
            .expect("ignore cache poisoned")
            .entry(key)
            .or_insert(rules)
            .clone()
    }

    /// Evaluates `path` against `rules` in list order; every matching rule
    /// overwrites the verdict, so the last match in list order wins.
    pub fn is_ignored(&self, path: &Path, is_directory: bool, rules: &[IgnoreRule]) -> bool {
        let mut ignored = false;
        for rule in rules {
            if rule.matches(path, is_directory) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

/// Iterative upward walk: the starting directory contributes its rules
/// first, then each ancestor in turn, until the filesystem root.
fn collect_rules(directory: &Path) -> Vec<IgnoreRule> {
    let mut rules = Vec::new();
    let mut current = Some(directory);
    while let Some(dir) = current {
        let ignore_file = dir.join(IGNORE_FILE_NAME);
        if ignore_file.is_file() {
            match parse_ignore_file(&ignore_file, dir) {
                Ok(parsed) => rules.extend(parsed),
                Err(error) => {
                    // One unreadable ignore file never aborts the load.
                    tracing::warn!(
                        file = %ignore_file.display(),
                        %error,
                        "skipping unparseable ignore file"
                    );
                }
            }
        }
        current = dir.parent();
    }
    rules
}

fn parse_ignore_file(ignore_file: &Path, base: &Path) -> anyhow::Result<Vec<IgnoreRule>> {
    let content = std::fs::read_to_string(ignore_file)?;
    let mut rules = Vec::new();
    for line in content.lines() {
        if let Some(rule) = parse_rule_line(line, base)? {
            rules.push(rule);
        }
    }
    Ok(rules)
}

/// Parses one line of an ignore file. Blank lines and `#` comments yield
/// `None`; a leading `!` negates; a trailing `/` marks directory-only.
fn parse_rule_line(line: &str, base: &Path) -> anyhow::Result<Option<IgnoreRule>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (negated, rest) = match trimmed.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (directory_only, pattern) = match rest.strip_suffix('/') {
        Some(stripped) => (true, stripped),
        None => (false, rest),
    };
    if pattern.is_empty() {
        return Ok(None);
    }

    let matcher = pattern_to_regex(pattern)?;
    Ok(Some(IgnoreRule {
        pattern: pattern.to_string(),
        negated,
        directory_only,
        base_path: base.to_path_buf(),
        matcher,
    }))
}

/// Translates a gitignore-style pattern into an anchored regex: every regex
/// metacharacter is escaped, `**` matches across separators, `*` and `?`
/// match within a single path segment.
pub fn pattern_to_regex(pattern: &str) -> anyhow::Result<Regex> {
    let mut translated = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    translated.push_str(".*");
                } else {
                    translated.push_str("[^/]*");
                }
            }
            '?' => translated.push_str("[^/]"),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    Ok(Regex::new(&translated)?)
}

impl IgnoreRule {
    /// A rule is tested against the path relative to its base directory, the
    /// bare file name, and the absolute path; any hit counts. Directory-only
    /// rules match directories by name and anything beneath a matching
    /// directory.
    fn matches(&self, path: &Path, is_directory: bool) -> bool {
        let absolute = slashed(path);
        let relative = path
            .strip_prefix(&self.base_path)
            .ok()
            .map(slashed)
            .unwrap_or_else(|| absolute.clone());
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if self.directory_only {
            if is_directory && self.matches_any(&[&relative, &file_name, &absolute]) {
                return true;
            }
            // A path beneath an ignored directory is itself ignored.
            self.matches_ancestor_dir(&relative)
        } else {
            self.matches_any(&[&relative, &file_name, &absolute])
        }
    }

    fn matches_any(&self, candidates: &[&str]) -> bool {
        candidates.iter().any(|c| self.matcher.is_match(c))
    }

    fn matches_ancestor_dir(&self, relative: &str) -> bool {
        let segments: Vec<&str> = relative.split('/').collect();
        if segments.len() < 2 {
            return false;
        }
        let mut prefix = String::new();
        for segment in &segments[..segments.len() - 1] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self.matcher.is_match(&prefix) || self.matcher.is_match(segment) {
                return true;
            }
        }
        false
    }
}

fn slashed(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
