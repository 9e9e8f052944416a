use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::FileGuardError;

/// A directory the system is permitted to operate within.
#[derive(Debug, Clone)]
pub struct AccessRoot {
    /// Optional name used for `alias:/...` path lookups, in addition to the
    /// directory's own name and the positional `rootN` tokens.
    pub alias: Option<String>,
    /// Canonical absolute path. Always exists on disk at registration time.
    pub absolute_path: PathBuf,
}

/// Ordered, always non-empty list of access roots.
///
/// The root at index 0 is the implicit default: every relative path resolves
/// against it, and it can only be replaced, never removed. Mutations take the
/// write lock; readers grab a copy-on-write snapshot so path resolution never
/// blocks on configuration changes.
#[derive(Debug)]
pub struct AccessRootRegistry {
    roots: RwLock<Arc<Vec<AccessRoot>>>,
}

impl AccessRootRegistry {
    /// Creates a registry with its default root. When `create` is set the
    /// directory is created first (bootstrap scenario).
    pub fn new(default_root: impl AsRef<Path>, create: bool) -> Result<Self, FileGuardError> {
        let registry = Self {
            roots: RwLock::new(Arc::new(Vec::new())),
        };
        registry.set_default_root(default_root, create)?;
        Ok(registry)
    }

    /// Replaces the default root. Any existing entry with the same canonical
    /// path is removed before the new default is inserted at index 0.
    pub fn set_default_root(
        &self,
        path: impl AsRef<Path>,
        create: bool,
    ) -> Result<(), FileGuardError> {
        let path = path.as_ref();
        if create && !path.exists() {
            std::fs::create_dir_all(path).map_err(FileGuardError::io(path))?;
        }
        let canonical = canonicalize_dir(path)?;

        let mut guard = self.roots.write().expect("root registry lock poisoned");
        let mut roots: Vec<AccessRoot> = guard
            .iter()
            .filter(|r| r.absolute_path != canonical)
            .cloned()
            .collect();
        roots.insert(
            0,
            AccessRoot {
                alias: None,
                absolute_path: canonical,
            },
        );
        *guard = Arc::new(roots);
        Ok(())
    }

    /// Appends an additional root. Returns `false` (no-op) when the directory
    /// is already registered, including as the default root.
    pub fn add_root(&self, path: impl AsRef<Path>) -> Result<bool, FileGuardError> {
        self.add_root_aliased(path, None)
    }

    /// Appends an additional root under an explicit alias.
    pub fn add_root_aliased(
        &self,
        path: impl AsRef<Path>,
        alias: Option<String>,
    ) -> Result<bool, FileGuardError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(FileGuardError::NotFound {
                path: path.display().to_string(),
            });
        }
        let canonical = canonicalize_dir(path)?;

        let mut guard = self.roots.write().expect("root registry lock poisoned");
        if guard.iter().any(|r| r.absolute_path == canonical) {
            return Ok(false);
        }
        let mut roots = guard.as_ref().clone();
        roots.push(AccessRoot {
            alias,
            absolute_path: canonical,
        });
        *guard = Arc::new(roots);
        Ok(true)
    }

    /// Cheap copy-on-write snapshot of the current root list. The snapshot is
    /// immutable and stays valid across concurrent mutations.
    pub fn snapshot(&self) -> Arc<Vec<AccessRoot>> {
        self.roots
            .read()
            .expect("root registry lock poisoned")
            .clone()
    }

    /// Stable snapshot of the registered roots, default first.
    pub fn list_roots(&self) -> Vec<AccessRoot> {
        self.snapshot().as_ref().clone()
    }
}

fn canonicalize_dir(path: &Path) -> Result<PathBuf, FileGuardError> {
    if !path.is_dir() {
        return Err(FileGuardError::NotFound {
            path: path.display().to_string(),
        });
    }
    path.canonicalize().map_err(FileGuardError::io(path))
}
