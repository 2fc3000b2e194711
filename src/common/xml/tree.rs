//! Owned markup tree for editing package parts.
//!
//! Parts are parsed with `quick-xml` into a small DOM that keeps text and
//! attribute values in their escaped wire form. Serializing a freshly parsed
//! tree therefore reproduces the markup canonically: the declaration is
//! normalized, whitespace outside the root is dropped, and everything inside
//! the root survives untouched.
//!
//! Elements are addressed by [`ElementPath`], a list of child-node indices
//! from some ancestor. Paths let callers locate an element, release the borrow,
//! and then mutate the tree around it.

use super::XmlError;
use super::escape::{escape_attr, escape_text, unescape};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use smallvec::SmallVec;
use std::fmt::Write as FmtWrite;

/// Child-node indices leading from an ancestor to a descendant element.
pub type ElementPath = SmallVec<[usize; 8]>;

/// The `<?xml ...?>` declaration of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }
    }
}

/// A single node in the tree.
///
/// Text and CDATA payloads are stored verbatim (text still escaped).
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

impl XmlNode {
    #[inline]
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Attribute {
    name: String,
    /// Escaped form, exactly as it appeared in the source.
    raw: String,
}

/// An element with its ordered attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create an empty element with a qualified name such as `p:sp`.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Qualified name, e.g. `a:blip`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its namespace prefix.
    #[inline]
    pub fn local_name(&self) -> &str {
        match self.name.rfind(':') {
            Some(pos) => &self.name[pos + 1..],
            None => &self.name,
        }
    }

    #[inline]
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Unescaped attribute value.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attr_raw(name).map(unescape)
    }

    /// Attribute value in its escaped form.
    pub fn attr_raw(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.raw.as_str())
    }

    #[inline]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let raw = escape_attr(value);
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.raw = raw,
            None => self.attributes.push(Attribute {
                name: name.to_string(),
                raw,
            }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|a| a.name == name)?;
        Some(unescape(&self.attributes.remove(pos).raw))
    }

    /// Attribute names and unescaped values, in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, String)> {
        self.attributes
            .iter()
            .map(|a| (a.name.as_str(), unescape(&a.raw)))
    }

    #[inline]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut Vec<XmlNode> {
        &mut self.children
    }

    /// Child elements, skipping text and comments.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    /// First direct child with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.is(name))
    }

    pub fn push(&mut self, node: XmlNode) {
        self.children.push(node);
    }

    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Concatenated, unescaped character data of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(raw) => out.push_str(&unescape(raw)),
                XmlNode::CData(data) => out.push_str(data),
                XmlNode::Element(el) => el.collect_text(out),
                _ => {},
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(escape_text(text)));
        }
    }

    /// First descendant (document order, self excluded) with the given name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        let path = self.find_path(|el| el.is(name))?;
        self.at(&path)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        let path = self.find_path(|el| el.is(name))?;
        self.at_mut(&path)
    }

    /// All descendants with the given name, in document order.
    pub fn find_all(&self, name: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.collect_named(name, &mut out);
        out
    }

    fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for el in self.elements() {
            if el.is(name) {
                out.push(el);
            }
            el.collect_named(name, out);
        }
    }

    /// Path to the first descendant matching `pred`.
    pub fn find_path<F>(&self, mut pred: F) -> Option<ElementPath>
    where
        F: FnMut(&XmlElement) -> bool,
    {
        let mut path = ElementPath::new();
        if self.search(&mut pred, &mut path, &mut None) {
            Some(path)
        } else {
            None
        }
    }

    /// Paths to every descendant matching `pred`, in document order.
    pub fn find_paths<F>(&self, mut pred: F) -> Vec<ElementPath>
    where
        F: FnMut(&XmlElement) -> bool,
    {
        let mut found = Vec::new();
        let mut path = ElementPath::new();
        self.search(&mut pred, &mut path, &mut Some(&mut found));
        found
    }

    // Pre-order walk. With `all` unset it stops at the first hit and leaves its path in `path`.
    fn search<F>(
        &self,
        pred: &mut F,
        path: &mut ElementPath,
        all: &mut Option<&mut Vec<ElementPath>>,
    ) -> bool
    where
        F: FnMut(&XmlElement) -> bool,
    {
        for (idx, node) in self.children.iter().enumerate() {
            let XmlNode::Element(el) = node else {
                continue;
            };
            path.push(idx);
            if pred(el) {
                match all {
                    Some(found) => found.push(path.clone()),
                    None => return true,
                }
            }
            if el.search(pred, path, all) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Resolve a path relative to this element. An empty path is `self`.
    pub fn at(&self, path: &[usize]) -> Option<&XmlElement> {
        let mut current = self;
        for &idx in path {
            current = current.children.get(idx)?.as_element()?;
        }
        Some(current)
    }

    pub fn at_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut current = self;
        for &idx in path {
            current = current.children.get_mut(idx)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Detach and return the element at `path`.
    pub fn remove_at(&mut self, path: &[usize]) -> Option<XmlElement> {
        let (&last, parent) = path.split_last()?;
        let parent = self.at_mut(parent)?;
        if !matches!(parent.children.get(last), Some(XmlNode::Element(_))) {
            return None;
        }
        match parent.children.remove(last) {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Insert `element` as a sibling directly before the element at `path`.
    ///
    /// Returns the path of the inserted element; the original now sits one index later.
    pub fn insert_before(&mut self, path: &[usize], element: XmlElement) -> Option<ElementPath> {
        let (&last, parent_path) = path.split_last()?;
        let parent = self.at_mut(parent_path)?;
        if last > parent.children.len() {
            return None;
        }
        parent.children.insert(last, XmlNode::Element(element));
        Some(path.iter().copied().collect())
    }

    /// Insert `element` as a sibling directly after the element at `path`.
    pub fn insert_after(&mut self, path: &[usize], element: XmlElement) -> Option<ElementPath> {
        let (&last, parent_path) = path.split_last()?;
        let parent = self.at_mut(parent_path)?;
        if last >= parent.children.len() {
            return None;
        }
        parent.children.insert(last + 1, XmlNode::Element(element));
        let mut inserted: ElementPath = parent_path.iter().copied().collect();
        inserted.push(last + 1);
        Some(inserted)
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            // Single-quoted source values may carry a bare double quote.
            let _ = write!(out, " {}=\"{}\"", attr.name, attr.raw.replace('"', "&quot;"));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            write_node(node, out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Serialize this element alone, without a declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(256);
        self.write_to(&mut out);
        out
    }
}

fn write_node(node: &XmlNode, out: &mut String) {
    match node {
        XmlNode::Element(el) => el.write_to(out),
        XmlNode::Text(raw) => out.push_str(raw),
        XmlNode::CData(data) => {
            out.push_str("<![CDATA[");
            out.push_str(data);
            out.push_str("]]>");
        },
        XmlNode::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        },
        XmlNode::ProcessingInstruction(content) => {
            out.push_str("<?");
            out.push_str(content);
            out.push_str("?>");
        },
        XmlNode::DocType(content) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(content);
            out.push('>');
        },
    }
}

/// A parsed part: optional declaration, a single root element, and any
/// comments or processing instructions around it.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    declaration: Option<Declaration>,
    prolog: Vec<XmlNode>,
    root: XmlElement,
    epilog: Vec<XmlNode>,
}

impl XmlDocument {
    /// Wrap a root element with the standard OOXML declaration.
    pub fn from_root(root: XmlElement) -> Self {
        Self {
            declaration: Some(Declaration::default()),
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse UTF-8 markup.
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    return Err(XmlError::Syntax {
                        position: reader.buffer_position() as u64,
                        message: e.to_string(),
                    });
                },
            };

            let node = match event {
                Event::Decl(decl) => {
                    declaration = Some(Declaration {
                        version: match decl.version() {
                            Ok(v) => utf8(&v)?,
                            Err(_) => "1.0".to_string(),
                        },
                        encoding: decl.encoding().and_then(|r| r.ok()).map(|v| utf8(&v)).transpose()?,
                        standalone: decl.standalone().and_then(|r| r.ok()).map(|v| utf8(&v)).transpose()?,
                    });
                    None
                },
                Event::Start(start) => {
                    stack.push(element_from_start(&start)?);
                    None
                },
                Event::Empty(start) => Some(XmlNode::Element(element_from_start(&start)?)),
                Event::End(_) => {
                    let el = stack.pop().ok_or_else(|| XmlError::Syntax {
                        position: reader.buffer_position() as u64,
                        message: "unbalanced end tag".to_string(),
                    })?;
                    Some(XmlNode::Element(el))
                },
                Event::Text(text) => Some(XmlNode::Text(utf8(&text)?)),
                Event::GeneralRef(reference) => Some(XmlNode::Text(format!("&{};", utf8(&reference)?))),
                Event::CData(data) => Some(XmlNode::CData(utf8(&data)?)),
                Event::Comment(comment) => Some(XmlNode::Comment(utf8(&comment)?)),
                Event::PI(pi) => Some(XmlNode::ProcessingInstruction(utf8(&pi)?)),
                Event::DocType(doctype) => Some(XmlNode::DocType(utf8(&doctype)?)),
                Event::Eof => break,
            };

            if let Some(node) = node {
                if let Some(parent) = stack.last_mut() {
                    append_merging_text(&mut parent.children, node);
                } else if root.is_none() {
                    match node {
                        XmlNode::Element(el) => root = Some(el),
                        XmlNode::Text(_) => {},
                        other => prolog.push(other),
                    }
                } else if !matches!(node, XmlNode::Text(_)) {
                    epilog.push(node);
                }
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(XmlError::Syntax {
                position: reader.buffer_position() as u64,
                message: format!("unclosed element <{}>", stack[stack.len() - 1].name),
            });
        }

        Ok(Self {
            declaration,
            prolog,
            root: root.ok_or(XmlError::NoRoot)?,
            epilog,
        })
    }

    #[inline]
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    #[inline]
    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    #[inline]
    pub fn declaration(&self) -> Option<&Declaration> {
        self.declaration.as_ref()
    }

    /// Canonical serialization.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(4096);
        if let Some(decl) = &self.declaration {
            let _ = write!(out, "<?xml version=\"{}\"", decl.version);
            if let Some(encoding) = &decl.encoding {
                let _ = write!(out, " encoding=\"{}\"", encoding);
            }
            if let Some(standalone) = &decl.standalone {
                let _ = write!(out, " standalone=\"{}\"", standalone);
            }
            out.push_str("?>\r\n");
        }
        for node in &self.prolog {
            write_node(node, &mut out);
        }
        self.root.write_to(&mut out);
        for node in &self.epilog {
            write_node(node, &mut out);
        }
        out
    }

    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement::new(utf8(start.name().as_ref())?);
    for attr in start.attributes().with_checks(false) {
        let attr = attr.map_err(|e| XmlError::Attribute(e.to_string()))?;
        element.attributes.push(Attribute {
            name: utf8(attr.key.as_ref())?,
            raw: utf8(attr.value.as_ref())?,
        });
    }
    Ok(element)
}

// Entity references arrive as separate events; fold them back into one text node.
fn append_merging_text(children: &mut Vec<XmlNode>, node: XmlNode) {
    if let XmlNode::Text(text) = &node {
        if let Some(XmlNode::Text(previous)) = children.last_mut() {
            previous.push_str(text);
            return;
        }
    }
    children.push(node);
}

#[inline]
fn utf8(bytes: &[u8]) -> Result<String, XmlError> {
    Ok(std::str::from_utf8(bytes)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:sp><p:nvSpPr><p:cNvPr id="2" name="Title &amp; Co"/></p:nvSpPr><p:txBody><a:p><a:r><a:t>R&amp;D &lt;2024&gt;</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#;

    #[test]
    fn test_parse_and_query() {
        let doc = XmlDocument::parse(SLIDE.as_bytes()).unwrap();
        assert_eq!(doc.root().name(), "p:sld");
        assert_eq!(doc.root().local_name(), "sld");

        let c_nv_pr = doc.root().find("p:cNvPr").unwrap();
        assert_eq!(c_nv_pr.attr("name").as_deref(), Some("Title & Co"));
        assert_eq!(c_nv_pr.attr_raw("name"), Some("Title &amp; Co"));

        let t = doc.root().find("a:t").unwrap();
        assert_eq!(t.text(), "R&D <2024>");
    }

    #[test]
    fn test_serialization_is_canonical() {
        let doc = XmlDocument::parse(SLIDE.as_bytes()).unwrap();
        let once = doc.to_xml();
        let twice = XmlDocument::parse(once.as_bytes()).unwrap().to_xml();
        assert_eq!(once, twice);
        assert!(once.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert!(once.contains("<a:t>R&amp;D &lt;2024&gt;</a:t>"));
    }

    #[test]
    fn test_single_quoted_attribute_survives() {
        let doc = XmlDocument::parse(br#"<root a='say "hi"'/>"#).unwrap();
        assert_eq!(doc.root().attr("a").as_deref(), Some(r#"say "hi""#));
        let again = XmlDocument::parse(doc.to_xml().as_bytes()).unwrap();
        assert_eq!(again.root().attr("a").as_deref(), Some(r#"say "hi""#));
    }

    #[test]
    fn test_paths_and_mutation() {
        let mut doc = XmlDocument::parse(b"<r><a/><b/><c/></r>").unwrap();
        let path = doc.root().find_path(|el| el.is("b")).unwrap();
        assert_eq!(path.as_slice(), &[1]);

        doc.root_mut().insert_before(&path, XmlElement::new("x")).unwrap();
        let names: Vec<_> = doc.root().elements().map(|e| e.name().to_string()).collect();
        assert_eq!(names, ["a", "x", "b", "c"]);

        let removed = doc.root_mut().remove_at(&[2]).unwrap();
        assert_eq!(removed.name(), "b");

        doc.root_mut().insert_after(&[0], XmlElement::new("y")).unwrap();
        assert_eq!(doc.to_xml(), "<r><a/><y/><x/><c/></r>");
    }

    #[test]
    fn test_find_paths_nested() {
        let doc = XmlDocument::parse(b"<r><g><s/><s/></g><s/></r>").unwrap();
        let paths = doc.root().find_paths(|el| el.is("s"));
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0].as_slice(), &[0, 0]);
        assert_eq!(paths[2].as_slice(), &[1]);
    }

    #[test]
    fn test_unbalanced_input_is_rejected() {
        assert!(XmlDocument::parse(b"<r><a></r>").is_err());
        assert!(matches!(XmlDocument::parse(b"   "), Err(XmlError::NoRoot)));
    }

    #[test]
    fn test_set_attr_keeps_position() {
        let mut el = XmlElement::new("a:blip")
            .with_attr("r:embed", "rId2")
            .with_attr("cstate", "print");
        el.set_attr("r:embed", "rId9");
        assert_eq!(el.to_xml(), r#"<a:blip r:embed="rId9" cstate="print"/>"#);
        assert_eq!(el.remove_attr("cstate").as_deref(), Some("print"));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert!(matches!(
            XmlDocument::parse(b"<a:t>ok \xff\xfe bytes</a:t>"),
            Err(XmlError::Utf8(_))
        ));
        assert!(matches!(
            XmlDocument::parse(b"<p:cNvPr name=\"\xc3\"/>"),
            Err(XmlError::Utf8(_))
        ));
    }

    #[test]
    fn test_character_reference_in_attr_is_decoded() {
        let doc = XmlDocument::parse(br#"<p:cNvPr id="2" name="Caf&#233;"/>"#).unwrap();
        let mut props = doc.root().clone();
        assert_eq!(props.attr("name").as_deref(), Some("Café"));
        // Untouched attributes keep their source form.
        assert_eq!(props.attr_raw("name"), Some("Caf&#233;"));

        let name = props.attr("name").unwrap();
        props.set_attr("name", &name);
        assert_eq!(props.to_xml(), r#"<p:cNvPr id="2" name="Café"/>"#);
    }
}
