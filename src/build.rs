//! All-or-nothing output tree construction.
//!
//! A [`BuildTransaction`] turns a partitioned site into files under an output
//! root. Callers either get a complete tree or no tree at all.
//!
//! ## States
//!
//! ```text
//! Idle → Preparing → Writing → Committed
//!            │          └────→ RolledBack   (render/write failure, root removed)
//!            └───────────────→ Failed       (nothing written)
//! ```
//!
//! **Preparing** plans every output path first (invalid section keys or slugs
//! and two sources claiming one file are caught here, before anything is
//! touched), then removes any existing output root and recreates it empty with
//! the source root's permissions.
//!
//! **Writing** runs one unit per section, plus one for the tag indexes and
//! one for static directories, on the rayon pool. Each unit renders and
//! writes its files in order. The first failure raises a shared cancel flag;
//! the fan-in returns only once every unit has stopped, then the output root
//! is removed.
//!
//! ## Layout
//!
//! ```text
//! <root>/index.html                  default section index (always written)
//! <root>/home/about.html             page in the default section
//! <root>/blog/index.html             section index
//! <root>/blog/first-post.html        page (slug, else file stem)
//! <root>/tags/rust/index.html        tag index
//! <root>/assets/logo.png             copied from a static directory
//! ```

use crate::config::{BuildConfig, SiteConfig};
use crate::partition::{DEFAULT_SECTION, SectionGroup, TagIndex};
use crate::render::{INDEX_VIEW, RenderContext, RenderError, Renderer, TAG_VIEW, Target};
use crate::types::{Page, PageRef};
use crate::value::Metadata;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, Permissions};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("cannot prepare {path}: {source}")]
    PrepareFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot render {path}: {source}")]
    RenderFailed {
        path: PathBuf,
        #[source]
        source: RenderError,
    },
    #[error("build transaction already ran (state: {state})")]
    AlreadyExecuted { state: BuildState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Preparing,
    Writing,
    Committed,
    RolledBack,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Idle => "idle",
            BuildState::Preparing => "preparing",
            BuildState::Writing => "writing",
            BuildState::Committed => "committed",
            BuildState::RolledBack => "rolled back",
            BuildState::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Layout
// ============================================================================

pub const DEFAULT_EXT: &str = "html";
pub const DEFAULT_TAGS_DIR: &str = "tags";
pub const SLUG_FIELD: &str = "slug";

/// Maps sections, pages and tags to paths relative to the output root.
#[derive(Debug, Clone)]
pub struct Layout {
    default_section: String,
    ext: String,
    tags_dir: String,
    slug_field: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION, DEFAULT_EXT, DEFAULT_TAGS_DIR, SLUG_FIELD)
    }
}

impl Layout {
    pub fn new(
        default_section: impl Into<String>,
        ext: &str,
        tags_dir: impl Into<String>,
        slug_field: impl Into<String>,
    ) -> Self {
        Self {
            default_section: default_section.into(),
            ext: ext.trim_start_matches('.').to_string(),
            tags_dir: tags_dir.into(),
            slug_field: slug_field.into(),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(
            &config.default_section,
            &config.output_ext,
            &config.tags_dir,
            &config.slug_field,
        )
    }

    /// Directory of a section's pages.
    ///
    /// Keys may be nested (`docs/guides`) but must stay inside the root.
    pub fn section_dir(&self, key: &str) -> io::Result<PathBuf> {
        let path = Path::new(key);
        if key.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(invalid(format!("section key {key:?} is not a relative path")));
        }
        Ok(path.components().collect())
    }

    pub fn page_path(&self, section: &str, page: &Page) -> io::Result<PathBuf> {
        let slug = page.slug(&self.slug_field);
        if slug == "." || slug == ".." || slug.contains(['/', '\\']) {
            return Err(invalid(format!(
                "slug {slug:?} of {} is not a file name",
                page.path.display()
            )));
        }
        Ok(self.section_dir(section)?.join(self.file_name(&slug)))
    }

    /// Index of a section. The default section's index is the site's home
    /// page, at the root.
    pub fn section_index(&self, key: &str) -> io::Result<PathBuf> {
        if key == self.default_section {
            return Ok(PathBuf::from(self.file_name("index")));
        }
        Ok(self.section_dir(key)?.join(self.file_name("index")))
    }

    pub fn tag_index(&self, tag: &str) -> io::Result<PathBuf> {
        let slug = slugify(tag);
        if slug.is_empty() {
            return Err(invalid(format!("tag {tag:?} has no usable characters")));
        }
        Ok(Path::new(&self.tags_dir)
            .join(slug)
            .join(self.file_name("index")))
    }

    /// Site-absolute URL of a root-relative output path.
    pub fn url(&self, rel: &Path) -> String {
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("/{}", parts.join("/"))
    }

    fn file_name(&self, stem: &str) -> String {
        if self.ext.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{}", self.ext)
        }
    }
}

/// Lowercase, with every run of non-alphanumerics collapsed to one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

// ============================================================================
// Context
// ============================================================================

pub const DEFAULT_VIEW: &str = "post";
pub const VIEW_FIELD: &str = "view";

/// State for one build run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Directory whose permissions the output tree inherits.
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    /// Site-wide configuration, read-only for renderers.
    pub site: Metadata,
    pub layout: Layout,
    pub view_field: String,
    pub default_view: String,
    /// Directories under `source_root` copied to the same relative path.
    pub static_dirs: Vec<PathBuf>,
}

impl BuildContext {
    pub fn new(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
            site: Metadata::new(),
            layout: Layout::default(),
            view_field: VIEW_FIELD.to_string(),
            default_view: DEFAULT_VIEW.to_string(),
            static_dirs: Vec::new(),
        }
    }

    /// Context for building the project at `source_root` as configured.
    /// A relative `output_dir` is taken relative to the source root.
    pub fn from_config(source_root: impl Into<PathBuf>, config: &SiteConfig) -> Self {
        let source_root = source_root.into();
        let output_root = source_root.join(&config.build.output_dir);
        Self {
            output_root,
            site: config.site.clone(),
            layout: Layout::from_config(&config.build),
            view_field: config.build.view_field.clone(),
            default_view: config.build.default_view.clone(),
            static_dirs: config.build.static_dirs.clone(),
            source_root,
        }
    }

    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = output_root.into();
        self
    }

    pub fn with_site(mut self, site: Metadata) -> Self {
        self.site = site;
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dirs.push(dir.into());
        self
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputKind {
    Page,
    SectionIndex,
    TagIndex,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub kind: OutputKind,
    /// Path relative to the output root.
    pub path: PathBuf,
    /// Source page or copied file, for [`OutputKind::Page`] and
    /// [`OutputKind::Static`] files.
    pub source: Option<PathBuf>,
}

/// Files written by a committed build, sorted by path.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub root: PathBuf,
    pub files: Vec<WrittenFile>,
}

impl BuildReport {
    pub fn count(&self, kind: OutputKind) -> usize {
        self.files.iter().filter(|f| f.kind == kind).count()
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// How a planned file gets its bytes.
enum Job<'a> {
    Render { view: String, target: Target<'a> },
    Copy { from: PathBuf },
}

/// One planned output file.
struct Item<'a> {
    kind: OutputKind,
    rel: PathBuf,
    job: Job<'a>,
}

/// Files written sequentially by one worker.
struct Unit<'a> {
    label: String,
    items: Vec<Item<'a>>,
}

/// A single build run. Executes at most once.
pub struct BuildTransaction<R: Renderer> {
    ctx: BuildContext,
    renderer: R,
    state: BuildState,
}

impl<R: Renderer> BuildTransaction<R> {
    pub fn new(ctx: BuildContext, renderer: R) -> Self {
        Self {
            ctx,
            renderer,
            state: BuildState::Idle,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn execute(
        &mut self,
        sections: &SectionGroup,
        tags: &TagIndex,
    ) -> Result<BuildReport, BuildError> {
        if self.state != BuildState::Idle {
            return Err(BuildError::AlreadyExecuted { state: self.state });
        }

        self.transition(BuildState::Preparing);
        let prepared = self
            .plan(sections, tags)
            .and_then(|units| Ok((units, self.prepare()?)));
        let (units, perms) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                self.transition(BuildState::Failed);
                return Err(e);
            }
        };

        self.transition(BuildState::Writing);
        match self.write(&units, sections, tags, perms.as_ref()) {
            Ok(mut files) => {
                files.sort_by(|a, b| a.path.cmp(&b.path));
                self.transition(BuildState::Committed);
                Ok(BuildReport {
                    root: self.ctx.output_root.clone(),
                    files,
                })
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: BuildState) {
        tracing::info!(
            from = %self.state,
            to = %next,
            root = %self.ctx.output_root.display(),
            "build state"
        );
        self.state = next;
    }

    /// Resolve every output path. Nothing under the output root is touched.
    fn plan<'a>(
        &self,
        sections: &'a SectionGroup,
        tags: &'a TagIndex,
    ) -> Result<Vec<Unit<'a>>, BuildError> {
        let layout = &self.ctx.layout;
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();
        let mut units = Vec::with_capacity(sections.len() + 3);

        // The home page exists even when no page is in the default section
        let home = sections.default_key();
        let no_pages: &[PageRef] = &[];
        let missing_home = sections.get(home).is_none().then_some((home, no_pages));

        for (key, pages) in sections.iter().chain(missing_home) {
            let mut items = Vec::with_capacity(pages.len() + 1);
            for page in pages {
                let rel = layout
                    .page_path(key, page)
                    .map_err(|source| self.prepare_failed(&page.path, source))?;
                self.claim(&mut claimed, &rel, page.path.display().to_string())?;
                let view = page.view(&self.ctx.view_field, &self.ctx.default_view);
                items.push(Item {
                    kind: OutputKind::Page,
                    rel,
                    job: Job::Render {
                        view: view.to_string(),
                        target: Target::Page { page, section: key },
                    },
                });
            }
            let rel = layout
                .section_index(key)
                .map_err(|source| self.prepare_failed(&self.ctx.output_root, source))?;
            self.claim(&mut claimed, &rel, format!("index of section {key:?}"))?;
            items.push(Item {
                kind: OutputKind::SectionIndex,
                rel,
                job: Job::Render {
                    view: INDEX_VIEW.to_string(),
                    target: Target::Section { key, pages },
                },
            });
            units.push(Unit {
                label: key.to_string(),
                items,
            });
        }

        if !tags.is_empty() {
            let mut items = Vec::with_capacity(tags.len());
            for tag in tags.tags() {
                let rel = layout
                    .tag_index(&tag.name)
                    .map_err(|source| self.prepare_failed(&self.ctx.output_root, source))?;
                self.claim(&mut claimed, &rel, format!("tag {:?}", tag.name))?;
                items.push(Item {
                    kind: OutputKind::TagIndex,
                    rel,
                    job: Job::Render {
                        view: TAG_VIEW.to_string(),
                        target: Target::Tag { tag },
                    },
                });
            }
            units.push(Unit {
                label: "tags".to_string(),
                items,
            });
        }

        if !self.ctx.static_dirs.is_empty() {
            let mut items = Vec::new();
            for dir in &self.ctx.static_dirs {
                self.plan_static(dir, &mut claimed, &mut items)?;
            }
            units.push(Unit {
                label: "static".to_string(),
                items,
            });
        }

        Ok(units)
    }

    /// Plan a copy of every file under `source_root/dir` to `dir` in the
    /// output. Only the source tree is read.
    fn plan_static(
        &self,
        dir: &Path,
        claimed: &mut HashMap<PathBuf, String>,
        items: &mut Vec<Item<'_>>,
    ) -> Result<(), BuildError> {
        let from = self.ctx.source_root.join(dir);
        let mut parts = dir.components().peekable();
        if parts.peek().is_none() || !parts.all(|c| matches!(c, Component::Normal(_))) {
            return Err(self.prepare_failed(
                &from,
                invalid(format!("static directory {} is not a relative path", dir.display())),
            ));
        }
        if !from.is_dir() {
            return Err(self.prepare_failed(
                &from,
                io::Error::new(io::ErrorKind::NotFound, "static directory does not exist"),
            ));
        }

        for entry in WalkDir::new(&from).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&from).to_path_buf();
                self.prepare_failed(&path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let inner = entry.path().strip_prefix(&from).unwrap_or(entry.path());
            let rel = dir.join(inner);
            self.claim(claimed, &rel, entry.path().display().to_string())?;
            items.push(Item {
                kind: OutputKind::Static,
                rel,
                job: Job::Copy {
                    from: entry.path().to_path_buf(),
                },
            });
        }
        Ok(())
    }

    fn claim(
        &self,
        claimed: &mut HashMap<PathBuf, String>,
        rel: &Path,
        owner: String,
    ) -> Result<(), BuildError> {
        if let Some(previous) = claimed.get(rel) {
            let msg = format!("both {previous} and {owner} write this file");
            return Err(self.prepare_failed(
                &self.ctx.output_root.join(rel),
                io::Error::new(io::ErrorKind::AlreadyExists, msg),
            ));
        }
        claimed.insert(rel.to_path_buf(), owner);
        Ok(())
    }

    fn prepare_failed(&self, path: &Path, source: io::Error) -> BuildError {
        BuildError::PrepareFailed {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Wipe and recreate the output root. Returns the permissions to give
    /// every directory created under it.
    fn prepare(&self) -> Result<Option<Permissions>, BuildError> {
        let source_root = &self.ctx.source_root;
        let root = &self.ctx.output_root;

        let source_meta =
            fs::metadata(source_root).map_err(|e| self.prepare_failed(source_root, e))?;
        let perms = dir_permissions(&source_meta);

        if fs::symlink_metadata(root).is_ok() {
            let source_abs =
                fs::canonicalize(source_root).map_err(|e| self.prepare_failed(source_root, e))?;
            let root_abs = fs::canonicalize(root).map_err(|e| self.prepare_failed(root, e))?;
            if source_abs.starts_with(&root_abs) {
                return Err(self.prepare_failed(
                    root,
                    invalid(format!(
                        "output directory contains the source directory {}",
                        source_root.display()
                    )),
                ));
            }
            tracing::debug!(root = %root.display(), "removing previous output");
            remove_path(root).map_err(|e| self.prepare_failed(root, e))?;
        }

        fs::create_dir_all(root).map_err(|e| self.prepare_failed(root, e))?;
        if let Some(perms) = &perms {
            fs::set_permissions(root, perms.clone()).map_err(|e| self.prepare_failed(root, e))?;
        }
        Ok(perms)
    }

    fn write(
        &self,
        units: &[Unit<'_>],
        sections: &SectionGroup,
        tags: &TagIndex,
        perms: Option<&Permissions>,
    ) -> Result<Vec<WrittenFile>, BuildError> {
        let cancel = AtomicBool::new(false);

        // Collecting into a Result stops handing out units after the first
        // error; rayon returns only once every started unit has finished.
        let written: Vec<Vec<WrittenFile>> = units
            .par_iter()
            .map(|unit| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.write_unit(unit, sections, tags, perms, &cancel)
                }))
                .unwrap_or_else(|_| {
                    Err(BuildError::WriteFailed {
                        path: self.ctx.output_root.clone(),
                        source: io::Error::other(format!("worker for {} panicked", unit.label)),
                    })
                });
                if let Err(e) = &result {
                    tracing::debug!(
                        unit = %unit.label,
                        error = %e,
                        "write failed, cancelling remaining units"
                    );
                    cancel.store(true, Ordering::Relaxed);
                }
                result
            })
            .collect::<Result<_, _>>()?;

        Ok(written.into_iter().flatten().collect())
    }

    fn write_unit(
        &self,
        unit: &Unit<'_>,
        sections: &SectionGroup,
        tags: &TagIndex,
        perms: Option<&Permissions>,
        cancel: &AtomicBool,
    ) -> Result<Vec<WrittenFile>, BuildError> {
        let root = &self.ctx.output_root;
        let mut written = Vec::with_capacity(unit.items.len());

        for item in &unit.items {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!(unit = %unit.label, "cancelled");
                break;
            }
            let path = root.join(&item.rel);
            if let Some(parent) = item.rel.parent() {
                create_dirs(root, parent, perms).map_err(|source| BuildError::WriteFailed {
                    path: root.join(parent),
                    source,
                })?;
            }

            match &item.job {
                Job::Render { view, target } => {
                    let ctx = RenderContext {
                        target: *target,
                        sections,
                        tags,
                        site: &self.ctx.site,
                        layout: &self.ctx.layout,
                    };
                    let bytes = self.renderer.render(view, &ctx).map_err(|source| {
                        BuildError::RenderFailed {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    fs::write(&path, bytes).map_err(|source| BuildError::WriteFailed {
                        path: path.clone(),
                        source,
                    })?;
                }
                Job::Copy { from } => {
                    fs::copy(from, &path).map_err(|source| BuildError::WriteFailed {
                        path: path.clone(),
                        source,
                    })?;
                }
            }
            tracing::debug!(path = %path.display(), "wrote file");
            written.push(WrittenFile {
                kind: item.kind,
                path: item.rel.clone(),
                source: match &item.job {
                    Job::Render {
                        target: Target::Page { page, .. },
                        ..
                    } => Some(page.path.clone()),
                    Job::Copy { from } => Some(from.clone()),
                    _ => None,
                },
            });
        }
        Ok(written)
    }

    fn rollback(&mut self) {
        let root = &self.ctx.output_root;
        match remove_path(root) {
            Ok(()) => {
                tracing::warn!(root = %root.display(), "build failed, output removed");
                self.transition(BuildState::RolledBack);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.transition(BuildState::RolledBack);
            }
            Err(e) => {
                tracing::warn!(
                    root = %root.display(),
                    error = %e,
                    "rollback failed, output may be incomplete"
                );
                self.transition(BuildState::Failed);
            }
        }
    }
}

/// Run a fresh transaction once.
pub fn execute<R: Renderer>(
    ctx: BuildContext,
    sections: &SectionGroup,
    tags: &TagIndex,
    renderer: R,
) -> Result<BuildReport, BuildError> {
    BuildTransaction::new(ctx, renderer).execute(sections, tags)
}

fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Create `rel` under `root` one level at a time, applying `perms` to each
/// directory this call creates.
fn create_dirs(root: &Path, rel: &Path, perms: Option<&Permissions>) -> io::Result<()> {
    let mut dir = root.to_path_buf();
    for component in rel.components() {
        dir.push(component);
        match fs::create_dir(&dir) {
            Ok(()) => {
                if let Some(perms) = perms {
                    fs::set_permissions(&dir, perms.clone())?;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Directory permissions inherited from the source root. The owner always
/// keeps full access so the build can fill what it creates.
#[cfg(unix)]
fn dir_permissions(source: &fs::Metadata) -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(
        (source.permissions().mode() & 0o777) | 0o700,
    ))
}

#[cfg(not(unix))]
fn dir_permissions(_source: &fs::Metadata) -> Option<Permissions> {
    None
}
