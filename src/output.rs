//! CLI output formatting.
//!
//! Output is **content-centric**: the header line of every entry is what a
//! reader would recognise (page title, section name, tag), with source and
//! output paths as indented context lines.
//!
//! # Output Format
//!
//! ## Check (after loading and partitioning)
//!
//! ```text
//! Sections
//! blog (2 pages)
//!     001 First Post
//!         Source: posts/first.md
//!     002 Second Post
//!         Source: posts/second.md
//! home (1 page)
//!     001 About
//!         Source: about.md
//!
//! Tags
//! intro (1 page)
//! rust (2 pages)
//! Untagged: 1 page
//! ```
//!
//! ## Build
//!
//! ```text
//! 001 First Post → blog/first-post.html
//! ...
//! Wrote 3 pages, 2 section indexes, 2 tag indexes, 1 static file to _site
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::build::{BuildReport, OutputKind};
use crate::partition::Partitioned;
use crate::types::PageRef;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `3 pages`.
fn count(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn page_lines(pages: &[PageRef], source_root: &Path, depth: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(pages.len() * 2);
    for (i, page) in pages.iter().enumerate() {
        lines.push(format!(
            "{}{} {}",
            indent(depth),
            format_index(i + 1),
            page.title()
        ));
        lines.push(format!(
            "{}Source: {}",
            indent(depth + 1),
            display_path(&page.relative_path(source_root))
        ));
    }
    lines
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_output(site: &Partitioned, source_root: &Path) -> Vec<String> {
    let mut lines = vec!["Sections".to_string()];
    for (key, pages) in site.sections.iter() {
        lines.push(format!("{key} ({})", count(pages.len(), "page", "pages")));
        lines.extend(page_lines(pages, source_root, 1));
    }

    if !site.tags.is_empty() || !site.tags.untagged().is_empty() {
        lines.push(String::new());
        lines.push("Tags".to_string());
        for tag in site.tags.tags() {
            lines.push(format!(
                "{} ({})",
                tag.name,
                count(tag.pages.len(), "page", "pages")
            ));
        }
        if !site.tags.untagged().is_empty() {
            lines.push(format!(
                "Untagged: {}",
                count(site.tags.untagged().len(), "page", "pages")
            ));
        }
    }
    lines
}

pub fn print_check_output(site: &Partitioned, source_root: &Path) {
    for line in format_check_output(site, source_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_output(site: &Partitioned, report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();
    let pages = site.sections.iter().flat_map(|(_, pages)| pages);
    for (i, page) in pages.enumerate() {
        let dest = report
            .files
            .iter()
            .find(|f| f.source.as_deref() == Some(page.path.as_path()));
        match dest {
            Some(file) => lines.push(format!(
                "{} {} → {}",
                format_index(i + 1),
                page.title(),
                display_path(&file.path)
            )),
            None => lines.push(format!("{} {}", format_index(i + 1), page.title())),
        }
    }

    let mut written = vec![
        count(report.count(OutputKind::Page), "page", "pages"),
        count(
            report.count(OutputKind::SectionIndex),
            "section index",
            "section indexes",
        ),
        count(report.count(OutputKind::TagIndex), "tag index", "tag indexes"),
    ];
    let statics = report.count(OutputKind::Static);
    if statics > 0 {
        written.push(count(statics, "static file", "static files"));
    }
    lines.push(format!(
        "Wrote {} to {}",
        written.join(", "),
        display_path(&report.root)
    ));
    lines
}

pub fn print_build_output(site: &Partitioned, report: &BuildReport) {
    for line in format_build_output(site, report) {
        println!("{}", line);
    }
}
