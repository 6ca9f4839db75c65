//! Allow-list markup sanitizer for model output.
//!
//! Model output is parsed as an HTML fragment and re-serialized with only
//! allow-listed tags, all of them without attributes. `<script>` and
//! `<style>` elements lose their bodies and comments disappear. Text is
//! re-escaped on output, so sanitizing already-sanitized text returns it
//! unchanged.

use std::collections::HashSet;
use std::sync::LazyLock;

use ammonia::Builder;
use regex::Regex;
use tracing::warn;

static TAG_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("Invalid tag name regex"));

/// Tags whose content is never kept, even if configured.
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Strips everything but an allow-list of bare tags.
#[derive(Debug, Clone)]
pub struct ResponseSanitizer {
    allowed: HashSet<String>,
}

impl Default for ResponseSanitizer {
    fn default() -> Self {
        Self::new(["p", "ul", "li", "h3", "strong"])
    }
}

impl ResponseSanitizer {
    /// Build a sanitizer from tag names. Entries that are not tag names
    /// (such as `**`) are ignored with a warning.
    pub fn new<I, S>(allowed_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = HashSet::new();
        for tag in allowed_tags {
            let tag = tag.as_ref().trim();
            if !TAG_NAME.is_match(tag) {
                warn!(entry = tag, "Ignoring sanitizer allow-list entry that is not a tag name");
                continue;
            }
            let tag = tag.to_ascii_lowercase();
            if RAW_TEXT_TAGS.contains(&tag.as_str()) {
                warn!(entry = %tag, "Refusing to allow raw-text tag in model output");
                continue;
            }
            allowed.insert(tag);
        }
        Self { allowed }
    }

    pub fn is_allowed(&self, tag: &str) -> bool {
        self.allowed.contains(&tag.to_ascii_lowercase())
    }

    /// Clean `html`, keeping only allow-listed tags.
    pub fn sanitize(&self, html: &str) -> String {
        self.builder().clean(html).to_string()
    }

    // Raw-text tags are filtered out in `new`; ammonia panics if a tag is
    // both kept and content-cleaned.
    fn builder(&self) -> Builder<'_> {
        let mut builder = Builder::empty();
        builder
            .tags(self.allowed.iter().map(String::as_str).collect())
            .clean_content_tags(RAW_TEXT_TAGS.iter().copied().collect())
            .strip_comments(true)
            .link_rel(None);
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> ResponseSanitizer {
        ResponseSanitizer::default()
    }

    #[test]
    fn test_allowed_tags_survive() {
        let html = "<p>Possible causes:</p><ul><li><strong>Tension</strong></li></ul><h3>Tips</h3>";
        assert_eq!(sanitizer().sanitize(html), html);
    }

    #[test]
    fn test_attributes_are_dropped() {
        let html = r#"<p class="x" onclick="alert(1)">Hi</p><strong style='color:red'>!</strong>"#;
        assert_eq!(sanitizer().sanitize(html), "<p>Hi</p><strong>!</strong>");
    }

    #[test]
    fn test_tag_names_are_lowercased() {
        assert_eq!(sanitizer().sanitize("<P>Hi</P><LI>x</Li>"), "<p>Hi</p><li>x</li>");
    }

    #[test]
    fn test_disallowed_tags_removed_text_kept() {
        let html = r#"<div><a href="http://x">link</a> and <em>emphasis</em><br/></div>"#;
        assert_eq!(sanitizer().sanitize(html), "link and emphasis");
    }

    #[test]
    fn test_script_and_style_bodies_removed() {
        let html = "<p>a</p><script>alert('x')</script><STYLE type=\"text/css\">p{}</style><p>b</p>";
        assert_eq!(sanitizer().sanitize(html), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_comments_removed() {
        assert_eq!(sanitizer().sanitize("<p>a<!-- hidden <b> --></p>"), "<p>a</p>");
        assert_eq!(sanitizer().sanitize("<p>a</p><!-- never closed"), "<p>a</p>");
    }

    #[test]
    fn test_stray_angle_brackets_escaped() {
        assert_eq!(
            sanitizer().sanitize("blood pressure < 120 and > 80"),
            "blood pressure &lt; 120 and &gt; 80"
        );
    }

    #[test]
    fn test_attribute_text_never_reaches_output() {
        let s = sanitizer();
        assert_eq!(s.sanitize(r#"<p class="a>b">x</p>"#), "<p>x</p>");
        assert_eq!(s.sanitize(r#"<p title="x>y">Rest</p>"#), "<p>Rest</p>");
        assert_eq!(
            s.sanitize(r#"<a href="http://x" title="<strong>">link</a>"#),
            "link"
        );
        assert_eq!(s.sanitize(r#"<img alt="a > b" src=x>Drink water"#), "Drink water");
    }

    #[test]
    fn test_ampersands_escaped_once() {
        assert_eq!(sanitizer().sanitize("R&amp;R & rest"), "R&amp;R &amp; rest");
    }

    #[test]
    fn test_plain_text_unchanged() {
        let text = "Drink water and rest.";
        assert_eq!(sanitizer().sanitize(text), text);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "<p>ok</p>",
            "<div onclick=x><p>nested <em>tags</em></p></div>",
            "a < b > c <<>> <3",
            "<script>bad()</script><p>good</p>",
            "<p class=\"a>b\">x</p>",
            "R&amp;R & rest",
            "<!-- c --><ul><li>1</li></ul>",
            "&lt;p&gt; already escaped",
            "unterminated <p",
            "**bold** and *italics*",
        ];
        let s = sanitizer();
        for input in inputs {
            let once = s.sanitize(input);
            assert_eq!(s.sanitize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_output_has_only_allowed_tags() {
        let s = sanitizer();
        let out = s.sanitize("<div><p>x</p><img src=y><iframe></iframe><SCRIPT>z</SCRIPT></div>");
        assert_eq!(out, "<p>x</p>");
    }

    #[test]
    fn test_non_tag_entries_ignored() {
        let s = ResponseSanitizer::new(["p", "**", "*", " LI ", "script"]);
        assert!(s.is_allowed("p"));
        assert!(s.is_allowed("li"));
        assert!(!s.is_allowed("**"));
        assert!(!s.is_allowed("script"));
        assert_eq!(s.sanitize("**bold** <li>x</li>"), "**bold** <li>x</li>");
    }
}
