//! Section and tag grouping over a loaded page collection.
//!
//! Pure functions: no I/O, no errors. Every page lands in exactly one section
//! and, separately, either in every tag it carries or in the untagged list.
//!
//! ## Section key
//!
//! Read from the `section` field (configurable). Anything other than a
//! non-blank string (absent, a number, a list, `""`) selects the default
//! section. Odd values never fail the build here; the output planner in
//! [`build`](crate::build) rejects keys that cannot be used as paths.
//!
//! ## Ordering
//!
//! ```text
//! input:   A(blog, t1)   B(-, t2)   C(blog, t0)
//! blog:    C  A          ← ascending mtime, ties keep input order
//! home:    B
//! ```
//!
//! Tag names are kept sorted (binary-search insertion). Pages inside a tag
//! keep input order.

use crate::config::BuildConfig;
use crate::types::{Page, PageRef};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_SECTION: &str = "home";
pub const SECTION_FIELD: &str = "section";
pub const TAGS_FIELD: &str = "tags";

/// Groups pages by section key and by tag.
#[derive(Debug, Clone)]
pub struct Partitioner {
    section_field: String,
    tags_field: String,
    default_section: String,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(SECTION_FIELD, TAGS_FIELD, DEFAULT_SECTION)
    }
}

impl Partitioner {
    pub fn new(
        section_field: impl Into<String>,
        tags_field: impl Into<String>,
        default_section: impl Into<String>,
    ) -> Self {
        Self {
            section_field: section_field.into(),
            tags_field: tags_field.into(),
            default_section: default_section.into(),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(
            &config.section_field,
            &config.tags_field,
            &config.default_section,
        )
    }

    pub fn default_section(&self) -> &str {
        &self.default_section
    }

    /// The section a page belongs to.
    pub fn section_key<'a>(&'a self, page: &'a Page) -> &'a str {
        match page.metadata.get_str(&self.section_field).map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => &self.default_section,
        }
    }

    /// Tags declared in a page's metadata.
    ///
    /// Accepts a list of strings or one comma-separated string. Entries are
    /// trimmed; blanks, non-string list items and repeats are dropped.
    pub fn tags_of(&self, page: &Page) -> Vec<String> {
        let raw: Vec<&str> = match page.metadata.get(&self.tags_field) {
            Some(Value::String(s)) => s.split(',').collect(),
            Some(Value::List(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        let mut tags: Vec<String> = Vec::with_capacity(raw.len());
        for tag in raw.into_iter().map(str::trim).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }

    /// Fill in [`Page::tags`] from metadata. Runs before pages are shared.
    pub fn derive_tags(&self, pages: &mut [Page]) {
        for page in pages {
            page.tags = self.tags_of(page);
        }
    }

    /// Group pages by section key, each group sorted by ascending mtime.
    pub fn partition(&self, pages: &[PageRef]) -> SectionGroup {
        let mut groups: BTreeMap<String, Vec<PageRef>> = BTreeMap::new();
        for page in pages {
            groups
                .entry(self.section_key(page).to_string())
                .or_default()
                .push(Arc::clone(page));
        }
        for group in groups.values_mut() {
            // Stable: equal mtimes keep input order
            group.sort_by_key(|p| p.modified);
        }
        SectionGroup {
            groups,
            default_key: self.default_section.clone(),
        }
    }

    /// Index pages by their (already derived) tags.
    pub fn index(&self, pages: &[PageRef]) -> TagIndex {
        let mut index = TagIndex::default();
        for page in pages {
            if page.tags.is_empty() {
                index.untagged.push(Arc::clone(page));
                continue;
            }
            for tag in &page.tags {
                index.insert(tag, page);
            }
        }
        index
    }

    /// Derive tags, share the pages, and build both groupings.
    pub fn run(&self, mut pages: Vec<Page>) -> Partitioned {
        self.derive_tags(&mut pages);
        let pages: Vec<PageRef> = pages.into_iter().map(Arc::new).collect();
        let sections = self.partition(&pages);
        let tags = self.index(&pages);
        tracing::debug!(
            pages = pages.len(),
            sections = sections.len(),
            tags = tags.len(),
            "partitioned pages"
        );
        Partitioned {
            pages,
            sections,
            tags,
        }
    }
}

/// Output of [`Partitioner::run`].
#[derive(Debug, Clone)]
pub struct Partitioned {
    /// All pages in input order.
    pub pages: Vec<PageRef>,
    pub sections: SectionGroup,
    pub tags: TagIndex,
}

// ============================================================================
// Sections
// ============================================================================

/// Section key → pages, iterated in key order.
#[derive(Debug, Clone, Default)]
pub struct SectionGroup {
    groups: BTreeMap<String, Vec<PageRef>>,
    default_key: String,
}

impl SectionGroup {
    pub fn get(&self, key: &str) -> Option<&[PageRef]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PageRef])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The section holding `page` (the same shared page, not an equal one).
    pub fn section_of(&self, page: &PageRef) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, pages)| pages.iter().any(|p| Arc::ptr_eq(p, page)))
            .map(|(key, _)| key.as_str())
    }

    /// The key pages without a section fall into.
    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    pub fn is_default(&self, key: &str) -> bool {
        key == self.default_key
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of pages across all sections.
    pub fn page_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

// ============================================================================
// Tags
// ============================================================================

/// One tag and the pages carrying it.
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    pub pages: Vec<PageRef>,
}

/// Tags sorted by name, plus the pages that carry none.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    tags: Vec<Tag>,
    untagged: Vec<PageRef>,
}

impl TagIndex {
    fn insert(&mut self, name: &str, page: &PageRef) {
        match self.tags.binary_search_by(|t| t.name.as_str().cmp(name)) {
            Ok(pos) => self.tags[pos].pages.push(Arc::clone(page)),
            Err(pos) => self.tags.insert(
                pos,
                Tag {
                    name: name.to_string(),
                    pages: vec![Arc::clone(page)],
                },
            ),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.tags
            .binary_search_by(|t| t.name.as_str().cmp(name))
            .ok()
            .map(|pos| &self.tags[pos])
    }

    /// Tags in name order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }

    pub fn untagged(&self) -> &[PageRef] {
        &self.untagged
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{at, page_paths, page_ref, page_with};

    fn section(name: &str) -> (&'static str, Value) {
        ("section", Value::from(name))
    }

    fn tags(list: &[&str]) -> (&'static str, Value) {
        ("tags", Value::from(list.to_vec()))
    }

    // =========================================================================
    // Sections
    // =========================================================================

    #[test]
    fn groups_by_section_and_sorts_by_mtime() {
        let pages = vec![
            page_ref("A.md", &[section("blog")], at(1)),
            page_ref("B.md", &[], at(2)),
            page_ref("C.md", &[section("blog")], at(0)),
        ];
        let sections = Partitioner::default().partition(&pages);

        assert_eq!(sections.keys().collect::<Vec<_>>(), vec!["blog", "home"]);
        assert_eq!(page_paths(sections.get("blog").unwrap()), vec!["C.md", "A.md"]);
        assert_eq!(page_paths(sections.get("home").unwrap()), vec!["B.md"]);
    }

    #[test]
    fn absent_section_goes_to_default() {
        let pages = vec![
            page_ref("one.md", &[section("blog")], at(20)),
            page_ref("two.md", &[section("blog")], at(10)),
            page_ref("three.md", &[], at(5)),
        ];
        let sections = Partitioner::default().partition(&pages);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections.get("blog").unwrap().len(), 2);
        assert_eq!(sections.get(sections.default_key()).unwrap().len(), 1);
        assert_eq!(page_paths(sections.get("blog").unwrap()), vec!["two.md", "one.md"]);
    }

    #[test]
    fn foreign_typed_section_falls_back_silently() {
        let partitioner = Partitioner::default();
        for value in [
            Value::from(42_i64),
            Value::Bool(true),
            Value::from(vec!["blog"]),
            Value::Null,
            Value::from("   "),
        ] {
            let page = page_with("p.md", &[("section", value.clone())], at(0));
            assert_eq!(partitioner.section_key(&page), "home", "value {value:?}");
        }
    }

    #[test]
    fn section_key_is_trimmed() {
        let page = page_with("p.md", &[section("  notes ")], at(0));
        assert_eq!(Partitioner::default().section_key(&page), "notes");
    }

    #[test]
    fn equal_mtimes_keep_input_order() {
        let pages = vec![
            page_ref("x.md", &[section("s")], at(7)),
            page_ref("y.md", &[section("s")], at(7)),
            page_ref("z.md", &[section("s")], at(3)),
        ];
        let sections = Partitioner::default().partition(&pages);
        assert_eq!(page_paths(sections.get("s").unwrap()), vec!["z.md", "x.md", "y.md"]);
    }

    #[test]
    fn custom_fields_and_default() {
        let partitioner = Partitioner::new("category", "labels", "misc");
        let pages = vec![
            page_ref("a.md", &[("category", Value::from("news"))], at(0)),
            page_ref("b.md", &[section("blog")], at(0)),
        ];
        let sections = partitioner.partition(&pages);
        assert_eq!(sections.keys().collect::<Vec<_>>(), vec!["misc", "news"]);
        assert!(sections.is_default("misc"));
    }

    #[test]
    fn every_page_in_exactly_one_section() {
        let pages: Vec<PageRef> = (0..20)
            .map(|i| {
                let meta = match i % 3 {
                    0 => vec![section("a")],
                    1 => vec![section("b")],
                    _ => vec![],
                };
                page_ref(&format!("{i}.md"), &meta, at(20 - i))
            })
            .collect();
        let sections = Partitioner::default().partition(&pages);
        assert_eq!(sections.page_count(), pages.len());
    }

    // =========================================================================
    // Tags
    // =========================================================================

    #[test]
    fn tags_from_list_and_comma_string() {
        let partitioner = Partitioner::default();
        let listed = page_with("a.md", &[tags(&["rust", " web ", "", "rust"])], at(0));
        assert_eq!(partitioner.tags_of(&listed), vec!["rust", "web"]);

        let joined = page_with("b.md", &[("tags", Value::from("go, rust,,go "))], at(0));
        assert_eq!(partitioner.tags_of(&joined), vec!["go", "rust"]);
    }

    #[test]
    fn malformed_tags_yield_none() {
        let partitioner = Partitioner::default();
        let numeric = page_with("a.md", &[("tags", Value::from(3_i64))], at(0));
        assert!(partitioner.tags_of(&numeric).is_empty());

        let mixed = page_with(
            "b.md",
            &[("tags", Value::List(vec![Value::from(1_i64), Value::from("ok")]))],
            at(0),
        );
        assert_eq!(partitioner.tags_of(&mixed), vec!["ok"]);
    }

    #[test]
    fn index_sorts_names_and_collects_untagged() {
        let result = Partitioner::default().run(vec![
            page_with("a.md", &[tags(&["zeta", "alpha"])], at(0)),
            page_with("b.md", &[], at(0)),
            page_with("c.md", &[tags(&["alpha"])], at(0)),
            page_with("d.md", &[("tags", Value::from(""))], at(0)),
        ]);

        assert_eq!(result.tags.names().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert_eq!(
            page_paths(&result.tags.get("alpha").unwrap().pages),
            vec!["a.md", "c.md"]
        );
        assert_eq!(page_paths(&result.tags.get("zeta").unwrap().pages), vec!["a.md"]);
        assert_eq!(page_paths(result.tags.untagged()), vec!["b.md", "d.md"]);
        assert!(result.tags.get("missing").is_none());
    }

    #[test]
    fn tagged_page_is_never_untagged() {
        let result = Partitioner::default().run(vec![page_with(
            "a.md",
            &[("tags", Value::List(vec![Value::Null, Value::from("keep")]))],
            at(0),
        )]);
        assert!(result.tags.untagged().is_empty());
        assert_eq!(result.tags.len(), 1);
    }

    #[test]
    fn run_shares_pages_between_structures() {
        let result = Partitioner::default().run(vec![page_with(
            "a.md",
            &[section("blog"), tags(&["t"])],
            at(0),
        )]);
        assert_eq!(result.sections.section_of(&result.pages[0]), Some("blog"));
        let stranger = page_ref("a.md", &[section("blog")], at(0));
        assert_eq!(result.sections.section_of(&stranger), None);

        let from_section = &result.sections.get("blog").unwrap()[0];
        let from_tag = &result.tags.get("t").unwrap().pages[0];
        assert!(Arc::ptr_eq(from_section, from_tag));
        assert!(Arc::ptr_eq(from_section, &result.pages[0]));
        assert_eq!(result.pages[0].tags, vec!["t"]);
    }
}
