//! Concurrent page loading.
//!
//! Turns an ordered list of source paths into an ordered list of [`Page`]s.
//! Every path is an independent unit of work on the rayon pool:
//!
//! ```text
//! open source  →  scan + decode front matter  →  stat mtime  →  Page
//! ```
//!
//! ## Fan-in
//!
//! Units report `(index, Result<Page, LoadError>)` over a channel buffered to
//! the number of units, so a send never blocks, even after the collector has
//! gone away. The collector blocks on `recv` (no polling) and:
//!
//! - places each page at its input index, so the output order is the input
//!   order no matter which unit finishes first;
//! - returns the first error it receives immediately. Units still running
//!   finish on their own and their results are dropped with the channel.
//!
//! A failed load never returns a partial page list.
//!
//! ## Handles
//!
//! A unit's file handle lives only inside that unit and is closed on every
//! exit path. The page keeps the body's byte offset instead
//! ([`BodySource::File`]) and reopens the file when the body is read.
//!
//! The collector blocks the calling thread, so call [`load`] from outside the
//! rayon pool (the CLI and tests do).

use crate::matter::{Matter, MatterError};
use crate::types::{BodySource, Page};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read modification time of {path}: {source}")]
    MetadataUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: MatterError,
    },
    #[error("load stopped after {received} of {expected} pages")]
    Incomplete { expected: usize, received: usize },
}

impl LoadError {
    /// The source path the error is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            LoadError::SourceUnavailable { path, .. }
            | LoadError::MetadataUnavailable { path, .. }
            | LoadError::Parse { path, .. } => Some(path),
            LoadError::Incomplete { .. } => None,
        }
    }
}

/// Where page bytes come from.
///
/// [`FsSource`] reads the filesystem; tests substitute sources that delay or
/// fail specific paths.
pub trait Source: Send + Sync {
    type Handle: Read;

    fn open(&self, path: &Path) -> io::Result<Self::Handle>;

    /// Modification time of an open handle.
    fn modified(&self, handle: &Self::Handle) -> io::Result<SystemTime>;
}

/// Plain filesystem source.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl Source for FsSource {
    type Handle = File;

    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn modified(&self, handle: &File) -> io::Result<SystemTime> {
        handle.metadata()?.modified()
    }
}

/// Load `paths` from the filesystem.
pub fn load(paths: &[PathBuf], matter: &Matter) -> Result<Vec<Page>, LoadError> {
    load_with_source(Arc::new(FsSource), paths, matter)
}

/// Load `paths` through `source` (allows testing with a mock).
pub fn load_with_source<S: Source + 'static>(
    source: Arc<S>,
    paths: &[PathBuf],
    matter: &Matter,
) -> Result<Vec<Page>, LoadError> {
    let expected = paths.len();
    if expected == 0 {
        return Ok(Vec::new());
    }

    let (tx, rx) = mpsc::sync_channel(expected);
    for (index, path) in paths.iter().enumerate() {
        let tx = tx.clone();
        let source = Arc::clone(&source);
        let mut matter = matter.fresh();
        let path = path.clone();
        rayon::spawn(move || {
            let result = load_page(source.as_ref(), &mut matter, path);
            // The collector may already have returned on another unit's error
            let _ = tx.send((index, result));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<Page>> = (0..expected).map(|_| None).collect();
    let mut received = 0;
    while received < expected {
        let Ok((index, result)) = rx.recv() else {
            return Err(LoadError::Incomplete { expected, received });
        };
        match result {
            Ok(page) => {
                tracing::debug!(path = %page.path.display(), "loaded page");
                slots[index] = Some(page);
                received += 1;
            }
            Err(e) => {
                tracing::debug!(error = %e, "load failed, abandoning remaining pages");
                return Err(e);
            }
        }
    }

    tracing::info!(pages = expected, "loaded pages");
    Ok(slots.into_iter().flatten().collect())
}

/// Load one page. The handle is dropped before returning on every path.
fn load_page<S: Source>(source: &S, matter: &mut Matter, path: PathBuf) -> Result<Page, LoadError> {
    let mut handle = source
        .open(&path)
        .map_err(|source| LoadError::SourceUnavailable {
            path: path.clone(),
            source,
        })?;

    let (metadata, offset) = match matter.parse(&mut handle) {
        Ok(parsed) => (parsed.metadata, parsed.body.offset()),
        Err(source) => return Err(LoadError::Parse { path, source }),
    };

    let modified = source
        .modified(&handle)
        .map_err(|source| LoadError::MetadataUnavailable {
            path: path.clone(),
            source,
        })?;

    let body = BodySource::file(path.clone(), offset);
    Ok(Page::new(path, metadata, modified, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use crate::test_helpers::{at, set_mtime, write_page};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// Filesystem source that sleeps before opening one path.
    struct SlowSource {
        slow: PathBuf,
        delay: Duration,
    }

    impl Source for SlowSource {
        type Handle = File;

        fn open(&self, path: &Path) -> io::Result<File> {
            if path == self.slow {
                std::thread::sleep(self.delay);
            }
            File::open(path)
        }

        fn modified(&self, handle: &File) -> io::Result<SystemTime> {
            FsSource.modified(handle)
        }
    }

    /// Filesystem source whose open of one path waits for a release signal.
    struct GatedSource {
        gated: PathBuf,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl Source for GatedSource {
        type Handle = File;

        fn open(&self, path: &Path) -> io::Result<File> {
            if path == self.gated {
                let gate = self.gate.lock().unwrap();
                let _ = gate.recv_timeout(Duration::from_secs(10));
            }
            File::open(path)
        }

        fn modified(&self, handle: &File) -> io::Result<SystemTime> {
            FsSource.modified(handle)
        }
    }

    /// Opens fine, but can never report a modification time.
    struct NoStatSource;

    impl Source for NoStatSource {
        type Handle = File;

        fn open(&self, path: &Path) -> io::Result<File> {
            File::open(path)
        }

        fn modified(&self, _handle: &File) -> io::Result<SystemTime> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "no mtime here"))
        }
    }

    fn three_pages(tmp: &TempDir) -> Vec<PathBuf> {
        vec![
            write_page(tmp.path(), "a.md", "---\ntitle: A\n---\nalpha"),
            write_page(tmp.path(), "b.md", "---\ntitle: B\n---\nbravo"),
            write_page(tmp.path(), "c.md", "---\ntitle: C\n---\ncharlie"),
        ]
    }

    fn titles(pages: &[Page]) -> Vec<String> {
        pages.iter().map(Page::title).collect()
    }

    #[test]
    fn loads_pages_with_metadata_and_body() {
        let tmp = TempDir::new().unwrap();
        let paths = three_pages(&tmp);
        let pages = load(&paths, &Matter::standard()).unwrap();

        assert_eq!(titles(&pages), vec!["A", "B", "C"]);
        assert_eq!(pages[1].path, paths[1]);
        assert_eq!(pages[1].read_body().unwrap(), "\nbravo");
        assert!(pages[0].modified > SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn empty_path_list_loads_nothing() {
        assert!(load(&[], &Matter::standard()).unwrap().is_empty());
    }

    #[test]
    fn output_follows_input_order_not_completion_order() {
        let tmp = TempDir::new().unwrap();
        let paths = three_pages(&tmp);
        let source = Arc::new(SlowSource {
            slow: paths[0].clone(),
            delay: Duration::from_millis(150),
        });
        let pages = load_with_source(source, &paths, &Matter::standard()).unwrap();
        assert_eq!(titles(&pages), vec!["A", "B", "C"]);
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let tmp = TempDir::new().unwrap();
        let mut paths = three_pages(&tmp);
        paths[1] = tmp.path().join("missing.md");

        let err = load(&paths, &Matter::standard()).unwrap_err();
        match err {
            LoadError::SourceUnavailable { path, source } => {
                assert_eq!(path, paths[1]);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn first_failure_returns_without_waiting_for_slow_units() {
        let tmp = TempDir::new().unwrap();
        let mut paths = three_pages(&tmp);
        paths[1] = tmp.path().join("missing.md");
        let (release, gate) = mpsc::channel();
        let source = Arc::new(GatedSource {
            gated: paths[0].clone(),
            gate: Mutex::new(gate),
        });

        // Own pool so the gated unit and the collector cannot starve the rest
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        let started = Instant::now();
        let result = pool.install(|| load_with_source(source, &paths, &Matter::standard()));
        let elapsed = started.elapsed();
        let _ = release.send(());

        assert!(matches!(result, Err(LoadError::SourceUnavailable { .. })));
        assert!(elapsed < Duration::from_secs(5), "collector waited {elapsed:?}");
    }

    #[test]
    fn scanner_error_carries_path_and_cause() {
        let tmp = TempDir::new().unwrap();
        let good = write_page(tmp.path(), "good.md", "---\ntitle: ok\n---\n");
        let bad = write_page(tmp.path(), "bad.md", "---\ntitle: [oops\n---\n");

        let err = load(&[good, bad.clone()], &Matter::standard()).unwrap_err();
        assert_eq!(err.path(), Some(bad.as_path()));
        assert!(matches!(
            err,
            LoadError::Parse {
                source: MatterError::MalformedMetadata {
                    cause: DecodeError::Yaml(_),
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn each_unit_sniffs_its_own_delimiter() {
        let tmp = TempDir::new().unwrap();
        let paths = vec![
            write_page(tmp.path(), "y.md", "---\ntitle: yaml\n---\n"),
            write_page(tmp.path(), "t.md", "+++\ntitle = \"toml\"\n+++\n"),
            write_page(tmp.path(), "j.md", ";;;\n{\"title\": \"json\"}\n;;;\n"),
        ];
        let pages = load(&paths, &Matter::standard()).unwrap();
        assert_eq!(titles(&pages), vec!["yaml", "toml", "json"]);
    }

    #[test]
    fn stat_failure_is_metadata_unavailable() {
        let tmp = TempDir::new().unwrap();
        let paths = three_pages(&tmp);
        let err = load_with_source(Arc::new(NoStatSource), &paths, &Matter::standard())
            .unwrap_err();
        assert!(matches!(err, LoadError::MetadataUnavailable { .. }));
    }

    #[test]
    fn document_without_front_matter_loads_whole_body() {
        let tmp = TempDir::new().unwrap();
        let path = write_page(tmp.path(), "plain.md", "# Plain\n\nno metadata");
        let pages = load(&[path], &Matter::yaml(None)).unwrap();
        assert!(pages[0].metadata.is_empty());
        assert_eq!(pages[0].read_body().unwrap(), "# Plain\n\nno metadata");
    }

    #[test]
    fn pages_carry_file_modification_time() {
        let tmp = TempDir::new().unwrap();
        let path = write_page(tmp.path(), "dated.md", "---\ntitle: dated\n---\nbody");
        set_mtime(&path, at(1_000_000));
        let pages = load(&[path], &Matter::standard()).unwrap();
        assert_eq!(pages[0].modified, at(1_000_000));
        assert_eq!(pages[0].read_body().unwrap(), "\nbody");
    }

    #[test]
    fn parse_error_keeps_the_scanner_error() {
        let tmp = TempDir::new().unwrap();
        let path = write_page(tmp.path(), "bad.md", "---\ntitle: [oops\n---\n");
        let err = load(std::slice::from_ref(&path), &Matter::standard()).unwrap_err();

        let inner = std::error::Error::source(&err)
            .and_then(|e| e.downcast_ref::<MatterError>())
            .unwrap();
        assert!(matches!(inner, MatterError::MalformedMetadata { .. }));
        assert_eq!(err.to_string(), format!("{}: {inner}", path.display()));
    }
}
