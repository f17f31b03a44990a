//! Locating external commands on the search path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Resolves command names against a search path, caching hits. The cache
/// lives for the life of the interpreter; `clear` drops it after anything
/// that may have changed the filesystem view.
#[derive(Debug, Default)]
pub struct PathSearcher {
    cache: RwLock<HashMap<String, PathBuf>>,
}

impl PathSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the executable for `name` in `paths`, consulting the cache
    /// first.
    pub fn search(&self, name: &str, paths: &[PathBuf]) -> Option<PathBuf> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
        {
            return Some(hit.clone());
        }
        let found = search_uncached(name, paths)?;
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string(), found.clone());
        Some(found)
    }

    pub fn clear(&self) {
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

fn search_uncached(name: &str, paths: &[PathBuf]) -> Option<PathBuf> {
    paths.iter().map(|dir| dir.join(name)).find(|p| is_executable(p))
}

/// The directories named by `$PATH`, in order.
pub fn default_paths() -> Vec<PathBuf> {
    match std::env::var_os("PATH") {
        Some(path) => std::env::split_paths(&path).collect(),
        None => vec![],
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    path.metadata()
        .map(|md| md.is_file() && md.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn finds_sh_on_the_default_path() {
        let searcher = PathSearcher::new();
        let paths = default_paths();
        let found = searcher.search("sh", &paths);
        assert!(found.is_some(), "sh should exist on PATH");
        // Second lookup hits the cache and agrees.
        assert_eq!(searcher.search("sh", &paths), found);
    }

    #[test]
    fn missing_command_is_not_found() {
        let searcher = PathSearcher::new();
        assert!(searcher
            .search("definitely-not-a-command-4729", &default_paths())
            .is_none());
    }
}
