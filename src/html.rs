//! Built-in HTML renderer.
//!
//! Turns pages, section indexes and tag indexes into standalone HTML documents
//! with [maud](https://maud.lambda.xyz/). Page bodies are Markdown, converted
//! with pulldown-cmark.
//!
//! ## Views
//!
//! | View | Target | Output |
//! |------|--------|--------|
//! | `post` | page | title, tags, body |
//! | `page` | page | title, body |
//! | `index` | section | list of the section's pages |
//! | `tag` | tag | list of the tag's pages |
//!
//! Any other view name is a render error, which rolls the build back.
//!
//! Every document carries the site title (`title` in the config file) and a
//! navigation bar with one link per section.

use crate::render::{INDEX_VIEW, RenderContext, RenderError, Renderer, TAG_VIEW, Target};
use crate::types::PageRef;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Options, Parser, html as md_html};
use thiserror::Error;

pub const POST_VIEW: &str = "post";
pub const PAGE_VIEW: &str = "page";

const CSS: &str = include_str!("../static/style.css");

#[derive(Error, Debug)]
pub enum HtmlError {
    #[error("no {target} view named {view:?}")]
    UnknownView { view: String, target: &'static str },
    #[error("cannot read body of {path}: {source}")]
    Body {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The stock renderer: built-in views, embedded stylesheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, view: &str, ctx: &RenderContext<'_>) -> Result<Vec<u8>, RenderError> {
        let markup = match (view, ctx.target) {
            (POST_VIEW | PAGE_VIEW, Target::Page { page, .. }) => {
                render_page(page, view == POST_VIEW, ctx)?
            }
            (INDEX_VIEW, Target::Section { key, pages }) => render_section(key, pages, ctx),
            (TAG_VIEW, Target::Tag { tag }) => {
                render_listing(&format!("Tagged {}", tag.name), &tag.pages, None, ctx)
            }
            (_, target) => {
                return Err(Box::new(HtmlError::UnknownView {
                    view: view.to_string(),
                    target: match target {
                        Target::Page { .. } => "page",
                        Target::Section { .. } => "section",
                        Target::Tag { .. } => "tag",
                    },
                }));
            }
        };
        Ok(markup.into_string().into_bytes())
    }
}

// ============================================================================
// HTML Components
// ============================================================================

/// Renders the base HTML document structure
fn base_document(title: &str, ctx: &RenderContext<'_>, content: Markup) -> Markup {
    let site_title = site_title(ctx);
    let full_title = if title == site_title {
        title.to_string()
    } else {
        format!("{title} · {site_title}")
    };
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                @if let Some(description) = ctx.site.get_str("description") {
                    meta name="description" content=(description);
                }
                title { (full_title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                (site_header(ctx))
                main { (content) }
            }
        }
    }
}

fn site_title<'a>(ctx: &'a RenderContext<'_>) -> &'a str {
    ctx.site.get_str("title").unwrap_or("Home")
}

/// Site title plus one link per section. The current section is marked.
fn site_header(ctx: &RenderContext<'_>) -> Markup {
    let current = ctx.section();
    let home = ctx
        .section_url(ctx.sections.default_key())
        .unwrap_or_else(|| "/".to_string());
    html! {
        header.site-header {
            a.site-title href=(home) { (site_title(ctx)) }
            nav.site-nav {
                ul {
                    @for key in ctx.sections.keys().filter(|k| !ctx.sections.is_default(k)) {
                        @if let Some(url) = ctx.section_url(key) {
                            li class=[(current == Some(key)).then_some("current")] {
                                a href=(url) { (key) }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn tag_list(tags: &[String], ctx: &RenderContext<'_>) -> Markup {
    html! {
        @if !tags.is_empty() {
            ul.tags {
                @for tag in tags {
                    li {
                        @match ctx.tag_url(tag) {
                            Some(url) => {
                                a href=(url) { "#" (tag) }
                            },
                            None => {
                                "#" (tag)
                            },
                        }
                    }
                }
            }
        }
    }
}

fn markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    md_html::push_html(&mut out, parser);
    out
}

// ============================================================================
// Page Renderers
// ============================================================================

fn render_page(
    page: &PageRef,
    with_tags: bool,
    ctx: &RenderContext<'_>,
) -> Result<Markup, HtmlError> {
    let body = page.read_body().map_err(|source| HtmlError::Body {
        path: page.path.clone(),
        source,
    })?;
    let title = page.title();
    let content = html! {
        article {
            h1 { (title) }
            @if with_tags {
                (tag_list(&page.tags, ctx))
            }
            (PreEscaped(markdown(&body)))
        }
    };
    Ok(base_document(&title, ctx, content))
}

fn render_section(key: &str, pages: &[PageRef], ctx: &RenderContext<'_>) -> Markup {
    if ctx.sections.is_default(key) {
        render_listing(site_title(ctx), pages, ctx.site.get_str("description"), ctx)
    } else {
        render_listing(key, pages, None, ctx)
    }
}

/// Newest first.
fn render_listing(
    heading: &str,
    pages: &[PageRef],
    intro: Option<&str>,
    ctx: &RenderContext<'_>,
) -> Markup {
    let content = html! {
        h1 { (heading) }
        @if let Some(intro) = intro {
            p { (intro) }
        }
        ul.page-list {
            @for page in pages.iter().rev() {
                li {
                    @match ctx.page_url(page) {
                        Some(url) => {
                            a href=(url) { (page.title()) }
                        },
                        None => {
                            (page.title())
                        },
                    }
                }
            }
        }
    };
    base_document(heading, ctx, content)
}
