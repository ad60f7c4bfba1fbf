//! Shared types passed between the load, partition and build stages.

use crate::value::Metadata;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// A page after loading, shared between its section and any number of tags.
pub type PageRef = Arc<Page>;

/// One source document: decoded front matter plus a handle on its body.
///
/// Pages are identified by their source path. The body is not held in
/// memory; [`Page::read_body`] goes back to the source on demand.
#[derive(Debug, Clone)]
pub struct Page {
    /// Source path, as given to the loader.
    pub path: PathBuf,
    /// Decoded front matter (empty when the document has none).
    pub metadata: Metadata,
    /// Modification time of the source file at load time.
    pub modified: SystemTime,
    /// Tags, filled in by the partitioner from `metadata`.
    pub tags: Vec<String>,
    body: BodySource,
}

/// Where a page's body lives.
#[derive(Debug, Clone)]
pub enum BodySource {
    /// The tail of a file, starting `offset` bytes in (just past the closing
    /// front-matter delimiter).
    File { path: PathBuf, offset: u64 },
    /// Body text held in memory.
    Inline(Arc<str>),
}

impl BodySource {
    pub fn file(path: impl Into<PathBuf>, offset: u64) -> Self {
        BodySource::File {
            path: path.into(),
            offset,
        }
    }

    pub fn inline(text: impl Into<Arc<str>>) -> Self {
        BodySource::Inline(text.into())
    }

    /// Open a reader positioned at the start of the body.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        match self {
            BodySource::File { path, offset } => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(*offset))?;
                Ok(Box::new(BufReader::new(file)))
            }
            BodySource::Inline(text) => Ok(Box::new(text.as_bytes())),
        }
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        let mut body = String::new();
        self.open()?.read_to_string(&mut body)?;
        Ok(body)
    }
}

impl Page {
    pub fn new(
        path: impl Into<PathBuf>,
        metadata: Metadata,
        modified: SystemTime,
        body: BodySource,
    ) -> Self {
        Self {
            path: path.into(),
            metadata,
            modified,
            tags: Vec::new(),
            body,
        }
    }

    pub fn body(&self) -> &BodySource {
        &self.body
    }

    /// Read the full body text from its source.
    pub fn read_body(&self) -> io::Result<String> {
        self.body.read_to_string()
    }

    /// File stem of the source path (`posts/hello.md` → `hello`).
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Output name: the `slug_field` string from metadata when set and
    /// non-blank, else the file stem.
    pub fn slug(&self, slug_field: &str) -> String {
        match self.metadata.get_str(slug_field).map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => self.stem(),
        }
    }

    /// Template view for this page, falling back to `default` when the
    /// field is absent or not a string.
    pub fn view<'a>(&'a self, view_field: &str, default: &'a str) -> &'a str {
        match self.metadata.get_str(view_field).map(str::trim) {
            Some(view) if !view.is_empty() => view,
            _ => default,
        }
    }

    /// Display title: the `title` string from metadata, else the file stem.
    pub fn title(&self) -> String {
        self.metadata
            .get_str("title")
            .map(str::to_string)
            .unwrap_or_else(|| self.stem())
    }

    /// Source path relative to `root`, for display.
    pub fn relative_path(&self, root: &Path) -> PathBuf {
        self.path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::io::Write;
    use tempfile::TempDir;

    fn page(meta: &[(&str, Value)]) -> Page {
        Page::new(
            "content/posts/hello-world.md",
            meta.iter().cloned().collect(),
            SystemTime::UNIX_EPOCH,
            BodySource::inline("body"),
        )
    }

    #[test]
    fn slug_prefers_metadata() {
        assert_eq!(page(&[]).slug("slug"), "hello-world");
        assert_eq!(page(&[("slug", Value::from("hi"))]).slug("slug"), "hi");
        assert_eq!(page(&[("slug", Value::from("  "))]).slug("slug"), "hello-world");
        assert_eq!(page(&[("slug", Value::from(7_i64))]).slug("slug"), "hello-world");
    }

    #[test]
    fn view_falls_back_to_default() {
        assert_eq!(page(&[]).view("view", "post"), "post");
        assert_eq!(page(&[("view", Value::from("page"))]).view("view", "post"), "page");
        assert_eq!(page(&[("view", Value::Bool(true))]).view("view", "post"), "post");
    }

    #[test]
    fn title_falls_back_to_stem() {
        assert_eq!(page(&[]).title(), "hello-world");
        assert_eq!(page(&[("title", Value::from("Hello"))]).title(), "Hello");
    }

    #[test]
    fn file_body_reads_from_offset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.md");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"---\na: 1\n---\nthe body").unwrap();
        drop(f);

        let body = BodySource::file(&path, 12);
        assert_eq!(body.read_to_string().unwrap(), "\nthe body");
    }

    #[test]
    fn missing_file_body_is_an_error() {
        let body = BodySource::file("/nonexistent/quire/doc.md", 0);
        assert!(body.read_to_string().is_err());
    }
}
