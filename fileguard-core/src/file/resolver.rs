use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::FileGuardError;
use crate::file::roots::{AccessRoot, AccessRootRegistry};

/// Maps untrusted path strings to validated absolute paths inside the
/// registered access roots.
///
/// Accepted grammar: `""` | `"."` | `"./" + relative` | `alias + ":" +
/// separator + relative` | OS-absolute | OS-relative (resolved against the
/// default root). The alias may be a root's registered alias, its directory
/// name, `.` for the default root, or a positional `rootN` token; all alias
/// matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct PathResolver {
    registry: Arc<AccessRootRegistry>,
}

impl PathResolver {
    pub fn new(registry: Arc<AccessRootRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AccessRootRegistry> {
        &self.registry
    }

    /// Resolves a raw path string to a canonical absolute path, or
    /// `AccessDenied` when the result escapes every registered root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, FileGuardError> {
        let snapshot = self.registry.snapshot();
        resolve_with(&snapshot, raw)
    }
}

/// Pure resolution against a fixed registry snapshot. Performs no disk I/O;
/// normalization is lexical and symlinks are deliberately not chased.
pub fn resolve_with(roots: &[AccessRoot], raw: &str) -> Result<PathBuf, FileGuardError> {
    let default_root = &roots
        .first()
        .expect("registry is never empty")
        .absolute_path;
    let trimmed = raw.trim();

    let candidate = if matches!(trimmed, "" | "." | "./" | ".\\") {
        default_root.clone()
    } else if let Some(rest) = trimmed.strip_prefix("./").or_else(|| trimmed.strip_prefix(".\\")) {
        default_root.join(normalize_separators(rest))
    } else if let Some((alias, rest)) = split_alias(trimmed) {
        match find_root(roots, alias) {
            Some(root) => root.absolute_path.join(normalize_separators(rest)),
            // Not a known alias (e.g. a Windows drive letter); fall through
            // to plain path handling.
            None => plain_candidate(default_root, trimmed),
        }
    } else {
        plain_candidate(default_root, trimmed)
    };

    let canonical = lexical_normalize(&candidate);
    if roots.iter().any(|r| is_within(&r.absolute_path, &canonical)) {
        Ok(canonical)
    } else {
        Err(FileGuardError::AccessDenied {
            path: raw.to_string(),
        })
    }
}

fn plain_candidate(default_root: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        default_root.join(path)
    }
}

/// Splits `alias:rest` where the alias contains no separator and the
/// remainder may start with `/` or `\`.
fn split_alias(raw: &str) -> Option<(&str, &str)> {
    let idx = raw.find(':')?;
    let alias = &raw[..idx];
    if alias.is_empty() || alias.contains('/') || alias.contains('\\') {
        return None;
    }
    let rest = &raw[idx + 1..];
    let rest = rest
        .strip_prefix('/')
        .or_else(|| rest.strip_prefix('\\'))
        .unwrap_or(rest);
    Some((alias, rest))
}

fn find_root<'a>(roots: &'a [AccessRoot], alias: &str) -> Option<&'a AccessRoot> {
    if alias == "." {
        return roots.first();
    }
    for (index, root) in roots.iter().enumerate() {
        let positional = format!("root{}", index + 1);
        if alias.eq_ignore_ascii_case(&positional) {
            return Some(root);
        }
        if let Some(registered) = &root.alias {
            if alias.eq_ignore_ascii_case(registered) {
                return Some(root);
            }
        }
        let name = root.absolute_path.file_name().and_then(|n| n.to_str());
        if let Some(name) = name {
            if alias.eq_ignore_ascii_case(name) {
                return Some(root);
            }
        }
    }
    None
}

fn normalize_separators(rest: &str) -> PathBuf {
    PathBuf::from(rest.replace('\\', "/"))
}

/// Resolves `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping above the filesystem root is a no-op; the safety
                // check below rejects anything that escaped.
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Case-insensitive, separator-bounded prefix test. Comparing whole
/// components keeps `/root2` from matching `/root20`.
fn is_within(root: &Path, candidate: &Path) -> bool {
    let root: Vec<String> = lower_components(root);
    let candidate: Vec<String> = lower_components(candidate);
    candidate.len() >= root.len() && candidate[..root.len()] == root[..]
}

fn lower_components(path: &Path) -> Vec<String> {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect()
}
