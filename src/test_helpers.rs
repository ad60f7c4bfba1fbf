//! Shared test utilities for the quire test suite.
//!
//! Fixture writers for source documents, an mtime setter for ordering tests,
//! and an in-memory [`Page`] constructor for partition and build tests that
//! should not touch the filesystem.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let a = write_page(tmp.path(), "blog/a.md", "---\nsection: blog\n---\nhi");
//! set_mtime(&a, at(10));
//!
//! let b = page_with("b.md", &[("section", Value::from("blog"))], at(5));
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::types::{BodySource, Page, PageRef};
use crate::value::Value;

// =========================================================================
// Filesystem fixtures
// =========================================================================

/// Write `content` to `dir/name`, creating parent directories. Returns the
/// full path.
pub fn write_page(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Set the modification time of an existing file.
pub fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(time))
        .unwrap_or_else(|e| panic!("cannot set mtime of {}: {e}", path.display()));
}

/// A fixed point in time, `secs` seconds after the epoch.
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

// =========================================================================
// In-memory pages
// =========================================================================

/// A page with the given metadata and an inline body derived from its path.
pub fn page_with(path: &str, meta: &[(&str, Value)], modified: SystemTime) -> Page {
    Page::new(
        path,
        meta.iter().cloned().collect(),
        modified,
        BodySource::inline(format!("body of {path}")),
    )
}

/// Shared variant of [`page_with`].
pub fn page_ref(path: &str, meta: &[(&str, Value)], modified: SystemTime) -> PageRef {
    Arc::new(page_with(path, meta, modified))
}

/// Source paths of `pages`, in order, as strings.
pub fn page_paths(pages: &[PageRef]) -> Vec<String> {
    pages
        .iter()
        .map(|p| p.path.to_string_lossy().into_owned())
        .collect()
}
