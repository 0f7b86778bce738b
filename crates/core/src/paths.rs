//! Save-path portability.
//!
//! The database stores paths in portable (profile-relative) form so it stays
//! relocatable across machines and installations. The store itself only ever
//! goes through [`PathPorter`]; the translation rules live behind it.

use std::path::{Path, PathBuf};

/// Translates save paths between absolute and portable form.
///
/// Both directions are pure: no filesystem access, no side effects.
pub trait PathPorter: Send + Sync {
    /// Render a path in the portable form persisted in the database.
    fn to_portable(&self, path: &Path) -> String;

    /// Resolve a persisted portable path back to an absolute one.
    fn from_portable(&self, value: &str) -> PathBuf;
}

/// Portable paths relative to a profile root directory.
///
/// Paths under the root are stored relative to it; anything else is stored
/// verbatim. Empty maps to empty in both directions.
#[derive(Debug, Clone)]
pub struct ProfilePaths {
    root: PathBuf,
}

impl ProfilePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathPorter for ProfilePaths {
    fn to_portable(&self, path: &Path) -> String {
        if path.as_os_str().is_empty() {
            return String::new();
        }
        match path.strip_prefix(&self.root) {
            Ok(relative) => relative.to_string_lossy().into_owned(),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    fn from_portable(&self, value: &str) -> PathBuf {
        if value.is_empty() {
            return PathBuf::new();
        }
        let path = Path::new(value);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
