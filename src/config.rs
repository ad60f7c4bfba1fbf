//! Project configuration.
//!
//! An optional config file at the project root, decoded once with the same
//! [`MetadataDecoder`]s that read front matter. The first file found wins:
//!
//! ```text
//! _quire.yml  →  _quire.yaml  →  _quire.json  →  _quire.toml
//! ```
//!
//! The `build` key is typed ([`BuildConfig`]) and controls the build itself.
//! Every other key is free-form site metadata, handed read-only to renderers
//! (`title`, `description`, `author`, ...).
//!
//! ```yaml
//! title: My Notes
//! description: Things I wrote down
//!
//! build:
//!   output_dir: _site       # relative to the project root
//!   output_ext: html
//!   default_section: home   # pages without a section; its index is <output_dir>/index.html
//!   default_view: post      # view for pages without a `view` field
//!   section_field: section
//!   tags_field: tags
//!   view_field: view
//!   slug_field: slug
//!   tags_dir: tags          # tag indexes go to <tags_dir>/<tag>/index.html
//!   extensions: [md, markdown]
//!   static: [assets]        # directories copied to the output as is
//!   # delimiter: "---"      # force one front-matter delimiter (default: sniff)
//!   # max_processes: 4      # worker threads (default: CPU cores)
//! ```
//!
//! Unknown keys under `build` are rejected to catch typos early.

use crate::decode::{DecodeError, JsonDecoder, MetadataDecoder, TomlDecoder, YamlDecoder};
use crate::value::Metadata;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("invalid build settings: {0}")]
    Build(#[from] serde_json::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Config file names, in lookup order.
pub const CONFIG_FILES: &[&str] = &["_quire.yml", "_quire.yaml", "_quire.json", "_quire.toml"];

/// Key holding the typed build settings.
pub const BUILD_KEY: &str = "build";

/// Everything read from the project's config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteConfig {
    pub build: BuildConfig,
    /// All keys except `build`.
    pub site: Metadata,
}

/// Build settings. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Output directory, relative to the project root.
    pub output_dir: PathBuf,
    /// Output file extension, without the dot.
    pub output_ext: String,
    /// Section for pages that do not name one.
    pub default_section: String,
    /// View for pages that do not name one.
    pub default_view: String,
    pub section_field: String,
    pub tags_field: String,
    pub view_field: String,
    pub slug_field: String,
    /// Directory (under the output root) holding tag indexes.
    pub tags_dir: String,
    /// Source file extensions to load.
    pub extensions: Vec<String>,
    /// Directories, relative to the project root, copied into the output
    /// under the same relative path.
    #[serde(rename = "static")]
    pub static_dirs: Vec<PathBuf>,
    /// Front-matter delimiter for every page. When absent each page's
    /// delimiter is sniffed from its first bytes.
    pub delimiter: Option<String>,
    /// Maximum number of worker threads for loading and writing.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("_site"),
            output_ext: "html".to_string(),
            default_section: "home".to_string(),
            default_view: "post".to_string(),
            section_field: "section".to_string(),
            tags_field: "tags".to_string(),
            view_field: "view".to_string(),
            slug_field: "slug".to_string(),
            tags_dir: "tags".to_string(),
            extensions: vec!["md".to_string(), "markdown".to_string()],
            static_dirs: Vec::new(),
            delimiter: None,
            max_processes: None,
        }
    }
}

impl BuildConfig {
    /// Validate values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "build.output_dir must not be empty".into(),
            ));
        }
        for (name, value) in [
            ("default_section", &self.default_section),
            ("default_view", &self.default_view),
            ("section_field", &self.section_field),
            ("tags_field", &self.tags_field),
            ("view_field", &self.view_field),
            ("slug_field", &self.slug_field),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "build.{name} must not be empty"
                )));
            }
        }
        let mut tags_dir = Path::new(&self.tags_dir).components();
        if !matches!((tags_dir.next(), tags_dir.next()), (Some(Component::Normal(_)), None)) {
            return Err(ConfigError::Validation(
                "build.tags_dir must be a single directory name".into(),
            ));
        }
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ConfigError::Validation(
                "build.extensions must name at least one extension".into(),
            ));
        }
        for dir in &self.static_dirs {
            let mut parts = dir.components().peekable();
            if parts.peek().is_none() || !parts.all(|c| matches!(c, Component::Normal(_))) {
                return Err(ConfigError::Validation(format!(
                    "build.static entry {} must be a relative path inside the project",
                    dir.display()
                )));
            }
        }
        if self.delimiter.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "build.delimiter must not be blank".into(),
            ));
        }
        if self.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "build.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &BuildConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// The config file in `root`, if any.
pub fn find_config(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

fn decoder_for(path: &Path) -> &'static dyn MetadataDecoder {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => &JsonDecoder,
        Some("toml") => &TomlDecoder,
        _ => &YamlDecoder,
    }
}

/// Split decoded config metadata into typed build settings and site keys,
/// then validate.
pub fn resolve_config(mut site: Metadata) -> Result<SiteConfig, ConfigError> {
    let build = match site.remove(BUILD_KEY) {
        Some(value) => serde_json::from_value(serde_json::to_value(value)?)?,
        None => BuildConfig::default(),
    };
    build.validate()?;
    Ok(SiteConfig { build, site })
}

/// Load the config from `root`. No config file means all defaults.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let Some(path) = find_config(root) else {
        return Ok(SiteConfig::default());
    };
    let text = fs::read_to_string(&path)?;
    let site = decoder_for(&path)
        .decode(&text)
        .map_err(|source| ConfigError::Decode {
            path: path.clone(),
            source,
        })?;
    tracing::debug!(path = %path.display(), keys = site.len(), "loaded config");
    resolve_config(site)
}

/// Returns a fully-commented stock `_quire.yml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_yaml() -> &'static str {
    r##"# Quire Configuration
# ===================
# Save as _quire.yml in the project root. All settings are optional.
# Values shown below are the defaults.
#
# Top-level keys other than `build` are site metadata: templates see them
# as-is. Add whatever your views need.

title: My Site
description: ""

build:
  # Output directory, relative to the project root. Rebuilt from scratch on
  # every run; it must not contain the project root.
  output_dir: _site

  # Extension of generated files.
  output_ext: html

  # Section for pages without a `section` field. Its pages go to
  # <output_dir>/home/; its index is the site's home page,
  # <output_dir>/index.html, written even when the section is empty.
  default_section: home

  # View used for pages without a `view` field.
  # Built-in views: post, page (pages), index (sections), tag (tags).
  default_view: post

  # Front-matter field names.
  section_field: section
  tags_field: tags
  view_field: view
  slug_field: slug

  # Tag indexes are written to <output_dir>/<tags_dir>/<tag>/index.html
  tags_dir: tags

  # Source files to load. Names starting with . or _ are always skipped.
  extensions: [md, markdown]

  # Directories copied into the output as is, relative to the project root:
  # assets/logo.png becomes <output_dir>/assets/logo.png. A copy failure
  # rolls the build back like any other write.
  static: []

  # Force one front-matter delimiter for all pages:
  #   "---" YAML, "+++" TOML, ";;;" JSON.
  # When absent, each page's delimiter is read from its first three bytes.
  # delimiter: "---"

  # Maximum parallel worker threads for loading and writing (omit for auto = CPU cores).
  # Values above the core count are clamped down.
  # max_processes: 4
"##
}
