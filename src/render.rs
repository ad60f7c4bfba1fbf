//! The render seam between a build and whatever turns pages into bytes.
//!
//! A [`BuildTransaction`](crate::build::BuildTransaction) calls
//! [`Renderer::render`] once per page and once per section or tag index. The
//! view name says which template to use; the [`RenderContext`] carries the
//! target plus read-only access to the whole site.
//!
//! | Target | View |
//! |--------|------|
//! | page | the page's `view` field, else the configured default (`post`) |
//! | section index | [`INDEX_VIEW`] |
//! | tag index | [`TAG_VIEW`] |
//!
//! Renderers are shared by the section workers, so they must be
//! `Send + Sync`. The stock implementation is
//! [`HtmlRenderer`](crate::html::HtmlRenderer); [`from_fn`] wraps a closure.

use crate::build::Layout;
use crate::partition::{SectionGroup, Tag, TagIndex};
use crate::types::PageRef;
use crate::value::Metadata;
use std::error::Error;

pub const INDEX_VIEW: &str = "index";
pub const TAG_VIEW: &str = "tag";

/// Error returned by a renderer. Carried unchanged inside
/// [`BuildError::RenderFailed`](crate::build::BuildError::RenderFailed).
pub type RenderError = Box<dyn Error + Send + Sync>;

/// What is being rendered.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// One page, within its section.
    Page { page: &'a PageRef, section: &'a str },
    /// The index of a section. Pages are in section order.
    Section { key: &'a str, pages: &'a [PageRef] },
    /// The index of a tag.
    Tag { tag: &'a Tag },
}

/// Everything a renderer may look at for one output file.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub target: Target<'a>,
    pub sections: &'a SectionGroup,
    pub tags: &'a TagIndex,
    /// Site-wide configuration (non-`build` keys of the config file).
    pub site: &'a Metadata,
    pub layout: &'a Layout,
}

impl RenderContext<'_> {
    /// The page being rendered, if the target is a page.
    pub fn page(&self) -> Option<&PageRef> {
        match self.target {
            Target::Page { page, .. } => Some(page),
            _ => None,
        }
    }

    /// The section this output belongs to, if any.
    pub fn section(&self) -> Option<&str> {
        match self.target {
            Target::Page { section, .. } => Some(section),
            Target::Section { key, .. } => Some(key),
            Target::Tag { .. } => None,
        }
    }

    /// Site URL of a page in this build.
    pub fn page_url(&self, page: &PageRef) -> Option<String> {
        let section = self.sections.section_of(page)?;
        let rel = self.layout.page_path(section, page).ok()?;
        Some(self.layout.url(&rel))
    }

    pub fn section_url(&self, key: &str) -> Option<String> {
        let rel = self.layout.section_index(key).ok()?;
        Some(self.layout.url(&rel))
    }

    pub fn tag_url(&self, tag: &str) -> Option<String> {
        let rel = self.layout.tag_index(tag).ok()?;
        Some(self.layout.url(&rel))
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, view: &str, ctx: &RenderContext<'_>) -> Result<Vec<u8>, RenderError>;
}

impl<R: Renderer + ?Sized> Renderer for &R {
    fn render(&self, view: &str, ctx: &RenderContext<'_>) -> Result<Vec<u8>, RenderError> {
        (**self).render(view, ctx)
    }
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&self, view: &str, ctx: &RenderContext<'_>) -> Result<Vec<u8>, RenderError> {
        (**self).render(view, ctx)
    }
}

/// Renderer backed by a closure. See [`from_fn`].
pub struct FnRenderer<F>(F);

impl<F> Renderer for FnRenderer<F>
where
    F: Fn(&str, &RenderContext<'_>) -> Result<Vec<u8>, RenderError> + Send + Sync,
{
    fn render(&self, view: &str, ctx: &RenderContext<'_>) -> Result<Vec<u8>, RenderError> {
        (self.0)(view, ctx)
    }
}

/// Wrap a closure as a [`Renderer`].
///
/// ```rust
/// use quire::render::{from_fn, Target};
///
/// let renderer = from_fn(|view, ctx| match ctx.target {
///     Target::Page { page, .. } => Ok(format!("{view}: {}", page.title()).into_bytes()),
///     _ => Ok(Vec::new()),
/// });
/// # let _ = renderer;
/// ```
pub fn from_fn<F>(f: F) -> FnRenderer<F>
where
    F: Fn(&str, &RenderContext<'_>) -> Result<Vec<u8>, RenderError> + Send + Sync,
{
    FnRenderer(f)
}
