//! Attribute-driven lookups over a tree.
//!
//! These mirror the handful of DOM queries composition needs: "is there an
//! element with this attribute value", "which elements carry it", and
//! "rewrite it everywhere".

use super::tree::{ElementPath, XmlElement};

/// Whether any descendant named `tag` has `attr` equal to `value`.
pub fn has_element_with_attr(root: &XmlElement, tag: &str, attr: &str, value: &str) -> bool {
    root.find_path(|el| el.is(tag) && el.attr(attr).as_deref() == Some(value))
        .is_some()
}

/// First element of `elements` whose `attr` equals `value`.
pub fn first_by_attr<'a, I>(elements: I, attr: &str, value: &str) -> Option<&'a XmlElement>
where
    I: IntoIterator<Item = &'a XmlElement>,
{
    elements
        .into_iter()
        .find(|el| el.attr(attr).as_deref() == Some(value))
}

/// All elements of `elements` whose `attr` equals `value`.
pub fn all_by_attr<'a, I>(elements: I, attr: &str, value: &str) -> Vec<&'a XmlElement>
where
    I: IntoIterator<Item = &'a XmlElement>,
{
    elements
        .into_iter()
        .filter(|el| el.attr(attr).as_deref() == Some(value))
        .collect()
}

/// Paths of descendants named `tag` whose `attr` equals `value`.
pub fn paths_by_attr(root: &XmlElement, tag: &str, attr: &str, value: &str) -> Vec<ElementPath> {
    root.find_paths(|el| el.is(tag) && el.attr(attr).as_deref() == Some(value))
}

/// Rewrite `attr` from `value` to `replacement` on every descendant named `tag`.
///
/// Returns the number of attributes changed.
pub fn replace_attr(
    root: &mut XmlElement,
    tag: &str,
    attr: &str,
    value: &str,
    replacement: &str,
) -> usize {
    let paths = paths_by_attr(root, tag, attr, value);
    for path in &paths {
        if let Some(el) = root.at_mut(path) {
            el.set_attr(attr, replacement);
        }
    }
    paths.len()
}
