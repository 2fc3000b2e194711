use crate::common::xml::{XmlDocument, XmlError, escape_attr};
use crate::ooxml::opc::constants::{namespace, target_mode};
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri::{PackURI, split_numbered};
/// Relationship tables of OPC parts.
///
/// A relationship part is modelled as an ordered list of [`Relationship`]
/// entries keyed by id, rather than as free-form markup, so that id
/// uniqueness and document order can be checked directly. The table also owns
/// the id allocator used while transplanting content into a part.
use smallvec::SmallVec;

/// Marker appended to provisional ids by older composition tools ("rId7-created").
///
/// Recognised when reading source tables; never emitted.
pub const PROVISIONAL_MARKER: &str = "-created";

/// A single relationship from a source part to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1")
    r_id: String,

    /// Relationship type URI
    reltype: String,

    /// Target reference, relative to the source part's directory, or an external URL
    target_ref: String,

    /// Whether this is an external relationship
    is_external: bool,
}

impl Relationship {
    pub fn new(r_id: String, reltype: String, target_ref: String, is_external: bool) -> Self {
        Self {
            r_id,
            reltype,
            target_ref,
            is_external,
        }
    }

    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    #[inline]
    pub fn target_ref(&self) -> &str {
        &self.target_ref
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.is_external
    }

    /// Final segment of the type URI, e.g. "chart" or "package".
    pub fn kind(&self) -> &str {
        last_segment(&self.reltype)
    }

    /// Final segment of the target, e.g. "chart3.xml".
    pub fn filename(&self) -> &str {
        last_segment(&self.target_ref)
    }

    pub fn filename_ext(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(pos) => &filename[pos + 1..],
            None => "",
        }
    }

    fn filename_stem(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(pos) => &filename[..pos],
            None => filename,
        }
    }

    /// Target filename without extension and trailing number, e.g. "chart".
    pub fn filename_base(&self) -> &str {
        split_numbered(self.filename_stem()).0
    }

    /// Trailing number of the target filename; 0 when unnumbered.
    pub fn target_number(&self) -> u32 {
        split_numbered(self.filename_stem()).1
    }

    /// Absolute part name of an internal target, resolved against the source directory.
    pub fn target_partname(&self, base_uri: &str) -> Result<PackURI> {
        if self.is_external {
            return Err(OpcError::InvalidPackUri(format!(
                "{} points outside the package: {}",
                self.r_id, self.target_ref
            )));
        }
        PackURI::from_rel_ref(base_uri, &self.target_ref).map_err(OpcError::InvalidPackUri)
    }
}

#[inline]
fn last_segment(s: &str) -> &str {
    s.rsplit('/').next().unwrap_or(s)
}

/// Numeric value of an id such as "rId12" or "rId12-created".
pub fn id_number(r_id: &str) -> Option<u32> {
    let digits = r_id.strip_prefix("rId")?;
    let digits = digits.strip_suffix(PROVISIONAL_MARKER).unwrap_or(digits);
    atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok()
}

/// Next number in a numbered series: the maximum plus one, never a gap.
///
/// Existing numbers {1, 2, 5} yield 6. `None` once the series holds `u32::MAX`.
pub fn next_number<I>(existing: I) -> Option<u32>
where
    I: IntoIterator<Item = u32>,
{
    existing.into_iter().max().unwrap_or(0).checked_add(1)
}

/// Resolved companion reference: a relationship plus the parts of its target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Target reference as written in the relationship part
    pub file: String,
    pub r_id: String,
    pub reltype: String,
    /// Relationship kind requested by the selector ("chart", "image", ...)
    pub subtype: String,
    /// Prefix the target matched, when selected by prefix
    pub prefix: Option<String>,
    pub number: u32,
    pub filename: String,
    pub filename_ext: String,
    pub filename_base: String,
    pub is_external: bool,
}

impl Target {
    fn from_rel(rel: &Relationship, subtype: &str, prefix: Option<&str>) -> Self {
        Self {
            file: rel.target_ref().to_string(),
            r_id: rel.r_id().to_string(),
            reltype: rel.reltype().to_string(),
            subtype: subtype.to_string(),
            prefix: prefix.map(str::to_string),
            number: rel.target_number(),
            filename: rel.filename().to_string(),
            filename_ext: rel.filename_ext().to_string(),
            filename_base: rel.filename_base().to_string(),
            is_external: rel.is_external(),
        }
    }
}

/// How to pick relationships out of a table.
#[derive(Debug, Clone)]
pub enum RelSelector {
    /// Relationships whose type URI equals this one exactly.
    Type(String),
    /// Relationships whose kind equals the prefix's final segment and whose
    /// target starts with the prefix, e.g. "../charts/chart". Relationships of
    /// kind "package" match every prefix.
    Prefixes(SmallVec<[String; 2]>),
}

impl RelSelector {
    pub fn by_type(reltype: &str) -> Self {
        RelSelector::Type(reltype.to_string())
    }

    pub fn by_prefix(prefix: &str) -> Self {
        RelSelector::Prefixes(SmallVec::from_iter([prefix.to_string()]))
    }

    pub fn by_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RelSelector::Prefixes(prefixes.into_iter().map(Into::into).collect())
    }

    fn select(&self, rel: &Relationship) -> Option<Target> {
        match self {
            RelSelector::Type(reltype) => {
                (rel.reltype() == reltype).then(|| Target::from_rel(rel, rel.kind(), None))
            },
            RelSelector::Prefixes(prefixes) => prefixes.iter().find_map(|prefix| {
                let subtype = last_segment(prefix);
                prefix_matches(rel, subtype, prefix)
                    .then(|| Target::from_rel(rel, subtype, Some(prefix)))
            }),
        }
    }
}

fn prefix_matches(rel: &Relationship, subtype: &str, prefix: &str) -> bool {
    if rel.kind() == "package" {
        return true;
    }
    rel.kind() == subtype && rel.target_ref().starts_with(prefix)
}

/// A relationship about to be registered. Every field is required.
#[derive(Debug, Clone, Default)]
pub struct NewRelationship {
    pub r_id: Option<String>,
    pub reltype: Option<String>,
    pub target_ref: Option<String>,
    pub is_external: bool,
}

impl NewRelationship {
    pub fn new(r_id: &str, reltype: &str, target_ref: &str) -> Self {
        Self {
            r_id: Some(r_id.to_string()),
            reltype: Some(reltype.to_string()),
            target_ref: Some(target_ref.to_string()),
            is_external: false,
        }
    }

    pub fn external(mut self) -> Self {
        self.is_external = true;
        self
    }
}

/// Relationship table of one part, in document order.
#[derive(Debug, Clone)]
pub struct Relationships {
    /// Directory of the source part; targets resolve against it
    base_uri: String,

    rels: Vec<Relationship>,

    /// Highest id handed out by `allocate_id` in this session
    reserved: u32,

    /// Lowest id the allocator may hand out
    min_id: u32,
}

impl Relationships {
    pub fn new(base_uri: String) -> Self {
        Self {
            base_uri,
            rels: Vec::new(),
            reserved: 0,
            min_id: 1,
        }
    }

    /// Parse a relationship part. Entries are taken as-is; nothing is repaired.
    pub fn from_xml(base_uri: String, bytes: &[u8]) -> std::result::Result<Self, XmlError> {
        let doc = XmlDocument::parse(bytes)?;
        let mut table = Self::new(base_uri);
        for el in doc.root().elements().filter(|el| el.local_name() == "Relationship") {
            let is_external = el.attr("TargetMode").as_deref() == Some(target_mode::EXTERNAL);
            table.rels.push(Relationship::new(
                el.attr("Id").unwrap_or_default(),
                el.attr("Type").unwrap_or_default(),
                el.attr("Target").unwrap_or_default(),
                is_external,
            ));
        }
        Ok(table)
    }

    /// Set the lowest id `allocate_id` may return.
    pub fn set_min_id(&mut self, min_id: u32) {
        self.min_id = min_id.max(1);
    }

    #[inline]
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn get(&self, r_id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|rel| rel.r_id() == r_id)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Largest numeric id currently declared, markers stripped.
    pub fn max_id(&self) -> u32 {
        self.rels
            .iter()
            .filter_map(|rel| id_number(rel.r_id()))
            .max()
            .unwrap_or(0)
    }

    /// Reserve the next unused id.
    ///
    /// Recomputed from the current table on every call, and never below an id
    /// reserved earlier in the session, so several ids can be taken before any
    /// of them is registered.
    pub fn allocate_id(&mut self) -> Result<String> {
        let next = next_number([self.max_id(), self.reserved])
            .ok_or_else(|| OpcError::NumberExhausted(format!("rId{} in {}", u32::MAX, self.base_uri)))?
            .max(self.min_id);
        self.reserved = next;
        Ok(format!("rId{}", next))
    }

    /// Append a relationship. Fails if a field is missing or the id is taken.
    pub fn register(&mut self, rel: NewRelationship) -> std::result::Result<&Relationship, String> {
        let r_id = rel.r_id.filter(|s| !s.is_empty()).ok_or("missing Id")?;
        let reltype = rel.reltype.filter(|s| !s.is_empty()).ok_or("missing Type")?;
        let target_ref = rel
            .target_ref
            .filter(|s| !s.is_empty())
            .ok_or("missing Target")?;
        if self.get(&r_id).is_some() {
            return Err(format!("duplicate Id {}", r_id));
        }
        self.rels
            .push(Relationship::new(r_id, reltype, target_ref, rel.is_external));
        Ok(&self.rels[self.rels.len() - 1])
    }

    pub fn remove(&mut self, r_id: &str) -> Option<Relationship> {
        let pos = self.rels.iter().position(|rel| rel.r_id() == r_id)?;
        Some(self.rels.remove(pos))
    }

    /// Relationships picked by `selector`, as target descriptors.
    pub fn resolve(&self, selector: &RelSelector) -> Vec<Target> {
        self.rels.iter().filter_map(|rel| selector.select(rel)).collect()
    }

    /// Serialize to relationship-part XML, in table order.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(128 + self.rels.len() * 160);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str("\r\n");
        xml.push_str(&format!(r#"<Relationships xmlns="{}">"#, namespace::OPC_RELATIONSHIPS));
        for rel in &self.rels {
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_attr(rel.r_id()),
                escape_attr(rel.reltype()),
                escape_attr(rel.target_ref()),
                if rel.is_external() {
                    r#" TargetMode="External""#
                } else {
                    ""
                }
            ));
        }
        xml.push_str("</Relationships>");
        xml
    }
}
