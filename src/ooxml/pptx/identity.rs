//! Stable identities of slide elements.
//!
//! Every drawable element on a slide carries non-visual properties
//! (`p:cNvPr`) with a display name, and, when written by a recent authoring
//! tool, an `a16:creationId` extension that survives renames. Identities are
//! only ever read here; nothing assigns them.

use crate::common::xml::{ElementPath, XmlElement};
use std::fmt;

/// Non-visual properties element of a shape, picture, frame or group.
pub const NON_VISUAL_PROPS: &str = "p:cNvPr";

/// Extension element carrying the creation id.
pub const CREATION_ID: &str = "a16:creationId";

/// How an element is recognised across packages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StableIdentity {
    /// Authoring-tool id that persists across edits
    CreationId(String),
    /// Display name; neither unique nor stable across edits
    Name(String),
}

impl StableIdentity {
    /// Identity of `element`, preferring its creation id when asked to and present.
    pub fn of(element: &XmlElement, prefer_creation_id: bool) -> Option<Self> {
        let props = non_visual_props(element)?;
        if prefer_creation_id && let Some(id) = creation_id_of(props) {
            return Some(StableIdentity::CreationId(id));
        }
        props.attr("name").map(StableIdentity::Name)
    }

    fn matches(&self, props: &XmlElement) -> bool {
        match self {
            StableIdentity::CreationId(id) => creation_id_of(props).as_deref() == Some(id),
            StableIdentity::Name(name) => props.attr("name").as_deref() == Some(name),
        }
    }
}

impl fmt::Display for StableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StableIdentity::CreationId(id) => write!(f, "creationId {}", id),
            StableIdentity::Name(name) => write!(f, "name \"{}\"", name),
        }
    }
}

/// The element's own `p:cNvPr`, the first one in document order.
pub fn non_visual_props(element: &XmlElement) -> Option<&XmlElement> {
    element.find(NON_VISUAL_PROPS)
}

fn creation_id_of(props: &XmlElement) -> Option<String> {
    props.find(CREATION_ID).and_then(|ext| ext.attr("id"))
}

/// Path of the element identified by `identity`, searched through the whole
/// tree below `root`, groups included.
///
/// The element is the grandparent of its matching `p:cNvPr`
/// (`p:sp/p:nvSpPr/p:cNvPr`). Returns `None` on no match.
pub fn locate(root: &XmlElement, identity: &StableIdentity) -> Option<ElementPath> {
    let mut path = root.find_path(|el| el.is(NON_VISUAL_PROPS) && identity.matches(el))?;
    if path.len() < 2 {
        return None;
    }
    path.truncate(path.len() - 2);
    Some(path)
}

/// One element of a slide as seen by [`inventory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub name: String,
    pub creation_id: Option<String>,
    /// Qualified tag of the element, e.g. "p:graphicFrame"
    pub tag: String,
    /// Nesting depth below the shape tree; 0 for top-level elements
    pub depth: usize,
}

/// Identities of every element below `root`, in document order.
///
/// The shape tree's own non-visual properties are not an element.
pub fn inventory(root: &XmlElement) -> Vec<ElementInfo> {
    let Some(tree_path) = root.find_path(|el| el.is("p:spTree")) else {
        return Vec::new();
    };
    let Some(tree) = root.at(&tree_path) else {
        return Vec::new();
    };

    let mut infos = Vec::new();
    for path in tree.find_paths(|el| el.is(NON_VISUAL_PROPS)) {
        if path.len() < 3 {
            continue;
        }
        let element_path = &path[..path.len() - 2];
        let (Some(element), Some(props)) = (tree.at(element_path), tree.at(&path)) else {
            continue;
        };
        infos.push(ElementInfo {
            name: props.attr("name").unwrap_or_default(),
            creation_id: creation_id_of(props),
            tag: element.name().to_string(),
            // Each nesting level adds one p:grpSp hop.
            depth: element_path.len() - 1,
        });
    }
    infos
}
