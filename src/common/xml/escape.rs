use aho_corasick::{AhoCorasick, MatchKind};
use once_cell::sync::Lazy;

// Attribute values need quotes escaped as well; text content only needs the markup characters.
// Whitespace other than a space is written as a reference or the parser would normalize it.
static ATTR_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">", "\"", "\n", "\r", "\t"])
        .expect("Failed to build attribute escaper")
});

static TEXT_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">"])
        .expect("Failed to build text escaper")
});

// LeftmostLongest so that "&amp;lt;" decodes to "&lt;" and not "<".
static UNESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"])
        .expect("Failed to build XML unescaper")
});

/// Escape a value for use inside a double-quoted attribute.
///
/// ```
/// use longan::common::xml::escape_attr;
/// assert_eq!(escape_attr(r#"a "b" & c"#), "a &quot;b&quot; &amp; c");
/// ```
#[inline]
pub fn escape_attr(s: &str) -> String {
    ATTR_ESCAPER.replace_all(s, &["&amp;", "&lt;", "&gt;", "&quot;", "&#10;", "&#13;", "&#9;"])
}

/// Escape character data.
#[inline]
pub fn escape_text(s: &str) -> String {
    TEXT_ESCAPER.replace_all(s, &["&amp;", "&lt;", "&gt;"])
}

/// Decode the five predefined entities and numeric character references.
///
/// A value holding an entity XML does not predefine is decoded for the
/// predefined ones only; the unknown reference is left as-is.
///
/// ```
/// use longan::common::xml::unescape;
/// assert_eq!(unescape("&lt;a &amp; b&gt;"), "<a & b>");
/// assert_eq!(unescape("&amp;lt;"), "&lt;");
/// assert_eq!(unescape("Caf&#233;&#x20;Noir"), "Café Noir");
/// assert_eq!(unescape("&nbsp;"), "&nbsp;");
/// ```
pub fn unescape(s: &str) -> String {
    match quick_xml::escape::unescape(s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => UNESCAPER.replace_all(s, &["&", "<", ">", "\"", "'"]),
    }
}
