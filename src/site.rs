//! The full pipeline for one project directory.
//!
//! ```text
//! discover  root/         →  paths          (FileLoader)
//! load      paths         →  pages          (Matter + decoders, concurrent)
//! partition pages         →  sections, tags
//! build     sections/tags →  output tree    (Renderer, transactional)
//! ```
//!
//! A [`Generator`] holds the three pluggable parts (file loader, front-matter
//! scanner, renderer) side by side, chosen when it is constructed.
//! [`Generator::standard`] wires the stock ones from the project's config file.

use crate::build::{BuildContext, BuildError, BuildReport, BuildTransaction};
use crate::config::{self, ConfigError, SiteConfig};
use crate::discover::{FileLoader, WalkLoader};
use crate::html::HtmlRenderer;
use crate::load::{self, LoadError};
use crate::matter::Matter;
use crate::partition::{Partitioned, Partitioner};
use crate::render::Renderer;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot list sources in {root}: {source}")]
    Discover {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("load failed: {0}")]
    Load(#[from] LoadError),
    #[error("build failed: {0}")]
    Build(#[from] BuildError),
}

pub struct Generator<L: FileLoader, R: Renderer> {
    root: PathBuf,
    config: SiteConfig,
    output: Option<PathBuf>,
    loader: L,
    matter: Matter,
    renderer: R,
}

impl Generator<WalkLoader, HtmlRenderer> {
    /// Stock generator for the project at `root`: config from `root`, sorted
    /// directory walk, standard decoders, built-in HTML views.
    pub fn standard(root: impl Into<PathBuf>) -> Result<Self, SiteError> {
        let root = root.into();
        let config = config::load_config(&root)?;
        let loader = WalkLoader::from_config(&root, &config.build);
        let matter = matter_for(&config)?;
        Ok(Self::new(root, config, loader, matter, HtmlRenderer))
    }
}

/// Scanner for the configured delimiter, or a sniffing one.
pub fn matter_for(config: &SiteConfig) -> Result<Matter, ConfigError> {
    let matter = Matter::standard();
    match &config.build.delimiter {
        None => Ok(matter),
        Some(delimiter) if matter.registry().contains(delimiter) => {
            Ok(matter.with_delimiter(delimiter.as_str()))
        }
        Some(delimiter) => Err(ConfigError::Validation(format!(
            "build.delimiter {delimiter:?} is not one of {:?}",
            matter.registry().delimiters()
        ))),
    }
}

impl<L: FileLoader, R: Renderer> Generator<L, R> {
    pub fn new(
        root: impl Into<PathBuf>,
        config: SiteConfig,
        loader: L,
        matter: Matter,
        renderer: R,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            output: None,
            loader,
            matter,
            renderer,
        }
    }

    /// Write to `dir` instead of the configured output directory.
    ///
    /// The loader built by [`Generator::standard`] only skips the configured
    /// directory, so an override inside the source tree should start with
    /// `_` or `.`.
    pub fn with_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output = Some(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn output_root(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.root.join(&self.config.build.output_dir))
    }

    /// Discover, load and partition. Nothing is written.
    pub fn collect(&self) -> Result<Partitioned, SiteError> {
        let paths = self
            .loader
            .load(&self.root)
            .map_err(|source| SiteError::Discover {
                root: self.root.clone(),
                source,
            })?;
        let pages = load::load(&paths, &self.matter)?;
        Ok(Partitioner::from_config(&self.config.build).run(pages))
    }

    /// Full run: collect, then build the output tree transactionally.
    pub fn build(&self) -> Result<(Partitioned, BuildReport), SiteError> {
        let site = self.collect()?;
        let ctx = BuildContext::from_config(&self.root, &self.config)
            .with_output_root(self.output_root());
        let report =
            BuildTransaction::new(ctx, &self.renderer).execute(&site.sections, &site.tags)?;
        tracing::info!(
            files = report.files.len(),
            root = %report.root.display(),
            "build committed"
        );
        Ok((site, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::from_fn;
    use crate::test_helpers::write_page;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_page(tmp.path(), "_quire.yml", "title: Test Site\n");
        write_page(
            tmp.path(),
            "about.md",
            "---\ntitle: About\nview: page\n---\nWho we are.\n",
        );
        write_page(
            tmp.path(),
            "posts/first.md",
            "---\ntitle: First\nsection: blog\ntags: [intro]\n---\nHello **there**.\n",
        );
        tmp
    }

    #[test]
    fn standard_generator_builds_site() {
        let tmp = project();
        let generator = Generator::standard(tmp.path()).unwrap();
        let (site, report) = generator.build().unwrap();

        assert_eq!(site.pages.len(), 2);
        let out = tmp.path().join("_site");
        assert_eq!(report.root, out);
        let post = fs::read_to_string(out.join("blog/first.html")).unwrap();
        assert!(post.contains("<strong>there</strong>"));
        assert!(post.contains("Test Site"));
        assert!(out.join("home/about.html").is_file());
        assert!(out.join("index.html").is_file());
        assert!(out.join("tags/intro/index.html").is_file());
    }

    #[test]
    fn home_page_links_sections_without_home_pages() {
        let tmp = TempDir::new().unwrap();
        write_page(tmp.path(), "post.md", "---\ntitle: Post\nsection: blog\n---\nHi\n");
        let (site, _) = Generator::standard(tmp.path()).unwrap().build().unwrap();
        assert!(site.sections.get("home").is_none());

        let home = fs::read_to_string(tmp.path().join("_site/index.html")).unwrap();
        assert!(home.contains(r#"href="/blog/index.html""#));
        assert!(!tmp.path().join("_site/home").exists());
    }

    #[test]
    fn rebuild_ignores_previous_output() {
        let tmp = project();
        let generator = Generator::standard(tmp.path()).unwrap();
        generator.build().unwrap();
        let (site, _) = generator.build().unwrap();
        assert_eq!(site.pages.len(), 2);
    }

    #[test]
    fn collect_writes_nothing() {
        let tmp = project();
        let site = Generator::standard(tmp.path()).unwrap().collect().unwrap();
        assert_eq!(site.sections.keys().collect::<Vec<_>>(), vec!["blog", "home"]);
        assert!(!tmp.path().join("_site").exists());
    }

    #[test]
    fn load_error_aborts_before_output() {
        let tmp = project();
        write_page(tmp.path(), "broken.md", "---\ntitle: [oops\n---\n");
        let err = Generator::standard(tmp.path()).unwrap().build().unwrap_err();
        assert!(matches!(err, SiteError::Load(LoadError::Parse { .. })));
        assert!(!tmp.path().join("_site").exists());
    }

    #[test]
    fn custom_renderer_and_output() {
        let tmp = project();
        let out = tmp.path().join("_elsewhere");
        let config = config::load_config(tmp.path()).unwrap();
        let loader = WalkLoader::from_config(tmp.path(), &config.build);
        let renderer = from_fn(|view, _| Ok(view.as_bytes().to_vec()));
        let generator = Generator::new(tmp.path(), config, loader, Matter::standard(), renderer)
            .with_output(&out);

        generator.build().unwrap();
        assert_eq!(fs::read_to_string(out.join("home/about.html")).unwrap(), "page");
        assert_eq!(fs::read_to_string(out.join("blog/index.html")).unwrap(), "index");
    }

    #[test]
    fn configured_delimiter_must_be_registered() {
        let tmp = TempDir::new().unwrap();
        write_page(tmp.path(), "_quire.yml", "build:\n  delimiter: '***'\n");
        let err = Generator::standard(tmp.path()).err().unwrap();
        assert!(matches!(err, SiteError::Config(ConfigError::Validation(_))));
    }

    #[test]
    fn configured_delimiter_allows_plain_pages() {
        let tmp = TempDir::new().unwrap();
        write_page(tmp.path(), "_quire.yml", "build:\n  delimiter: '---'\n");
        write_page(tmp.path(), "plain.md", "# Just markdown\n");
        let site = Generator::standard(tmp.path()).unwrap().collect().unwrap();
        assert_eq!(site.pages.len(), 1);
        assert!(site.pages[0].metadata.is_empty());
    }
}
