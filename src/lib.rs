//! # Quire
//!
//! The core of a static site generator. A project is a directory of Markdown
//! pages, each optionally starting with a front-matter block; quire turns it
//! into a tree of HTML files grouped by section, plus one index per tag.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! ```text
//! 1. Discover   root/          →  paths            (sorted walk, filtered)
//! 2. Load       paths          →  pages            (front matter, concurrent)
//! 3. Partition  pages          →  sections + tags  (pure, no I/O)
//! 4. Build      sections/tags  →  output/          (transactional)
//! ```
//!
//! Each stage only depends on the output of the one before it, so the middle
//! stages are testable without touching the filesystem.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`value`] | Decoded metadata tree (`Value`, `Metadata`) |
//! | [`decode`] | YAML, JSON and TOML metadata decoders, keyed by delimiter |
//! | [`matter`] | Front-matter delimiter scanner; leaves the body unread |
//! | [`types`] | `Page` and its lazily-read body |
//! | [`load`] | Concurrent page loading, fail-fast, input order preserved |
//! | [`discover`] | Source file discovery |
//! | [`partition`] | Section grouping and tag indexing |
//! | [`render`] | The `Renderer` trait and its context |
//! | [`html`] | Built-in Maud views |
//! | [`build`] | Output layout and the all-or-nothing build transaction |
//! | [`config`] | `_quire.yml` loading and validation |
//! | [`site`] | The whole pipeline for one project directory |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Bodies Are Read Late
//!
//! Loading stops reading a file as soon as the closing delimiter is found. A
//! page only remembers where its body starts; renderers read it on demand.
//! Partitioning a large site never holds every body in memory.
//!
//! ## All or Nothing
//!
//! A build either produces the complete output tree or leaves no output tree
//! at all. The previous output is removed before writing, and any failure
//! while writing removes the partial tree. Output paths are planned up front,
//! so collisions are reported before anything is deleted.
//!
//! ## Maud Over Template Engines
//!
//! The built-in views use [Maud](https://maud.lambda.xyz/): malformed HTML is a
//! compile error and interpolation is escaped. Custom views plug in through
//! [`render::Renderer`].

pub mod build;
pub mod config;
pub mod decode;
pub mod discover;
pub mod html;
pub mod load;
pub mod matter;
pub mod output;
pub mod partition;
pub mod render;
pub mod site;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod test_helpers;
