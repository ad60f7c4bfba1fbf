//! Source file discovery.
//!
//! Produces the ordered path list the loader consumes. The walk is sorted by
//! file name at every level, so the same tree always yields the same order.
//!
//! Skipped:
//! - entries whose name starts with `.` or `_` (`.git`, `_quire.yml`, `_drafts/`)
//! - excluded directories (the output root and static directories)
//! - files whose extension is not in the configured list

use crate::config::BuildConfig;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Lists the document paths under a root directory.
pub trait FileLoader: Send + Sync {
    fn load(&self, root: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Recursive, sorted directory walk filtered by extension.
#[derive(Debug, Clone)]
pub struct WalkLoader {
    extensions: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl Default for WalkLoader {
    fn default() -> Self {
        Self::new(["md", "markdown"])
    }
}

impl WalkLoader {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            excluded: Vec::new(),
        }
    }

    /// Loader for `root` as configured: its extensions, with the output and
    /// static directories excluded.
    pub fn from_config(root: &Path, config: &BuildConfig) -> Self {
        config
            .static_dirs
            .iter()
            .fold(Self::new(&config.extensions), |loader, dir| {
                loader.excluding(root.join(dir))
            })
            .excluding(root.join(&config.output_dir))
    }

    /// Never descend into `dir`.
    pub fn excluding(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    fn wanted(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn skipped(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.')
            || name.starts_with('_')
            || self.excluded.iter().any(|dir| entry.path() == dir)
    }
}

impl FileLoader for WalkLoader {
    fn load(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.skipped(e));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && self.wanted(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        tracing::debug!(root = %root.display(), files = paths.len(), "discovered sources");
        Ok(paths)
    }
}
