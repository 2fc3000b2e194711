//! Companion resources of transplanted elements.
//!
//! An element rarely stands alone: pictures point at media, chart frames at
//! chart parts (which in turn point at a workbook, a style and a colour
//! scheme), OLE frames at embeddings, text runs at hyperlinks. Each of these
//! references is a relationship id valid only in the source part's table.
//!
//! [`Rewirer`] walks a detached clone, copies whatever each reference points
//! at into the target package, registers a fresh relationship in the target
//! part, declares content types, and rewrites the clone's attribute. Copying
//! is dispatched over the closed [`CompanionKind`] set, one handler per kind.

use crate::common::xml::{ElementPath, XmlElement};
use crate::ooxml::opc::constants::{content_type, relationship_type as rt};
use crate::ooxml::opc::error::Result;
use crate::ooxml::opc::{ArchiveStore, NewRelationship, PackURI, Package, RelSelector, Relationship};
use crate::ooxml::pptx::config::ComposeOptions;
use crate::ooxml::pptx::report::{ComposeReport, SkipReason, TrackedRelation};
use log::{debug, warn};
use std::collections::HashMap;

/// Prefix of relationship-id attributes (`r:id`, `r:embed`, `r:link`, ...).
const REL_ATTR_PREFIX: &str = "r:";

/// Relationship types whose targets are document structure rather than
/// resources. They are never copied, only referenced.
const STRUCTURAL_TYPES: [&str; 6] = [
    rt::SLIDE,
    rt::SLIDE_LAYOUT,
    rt::SLIDE_MASTER,
    rt::NOTES_SLIDE,
    rt::NOTES_MASTER,
    rt::THEME,
];

fn is_structural(reltype: &str) -> bool {
    STRUCTURAL_TYPES.contains(&reltype)
}

/// What a reference inside an element points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompanionKind {
    Image,
    Chart,
    ChartEx,
    OleObject,
    Hyperlink,
    /// Any other relationship attribute; its target is copied as a plain part.
    Other,
}

impl CompanionKind {
    pub const KNOWN: [CompanionKind; 5] = [
        CompanionKind::Image,
        CompanionKind::Chart,
        CompanionKind::ChartEx,
        CompanionKind::OleObject,
        CompanionKind::Hyperlink,
    ];

    /// Element carrying the reference.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            CompanionKind::Image => Some("a:blip"),
            CompanionKind::Chart => Some("c:chart"),
            CompanionKind::ChartEx => Some("cx:chart"),
            CompanionKind::OleObject => Some("p:oleObj"),
            CompanionKind::Hyperlink => Some("a:hlinkClick"),
            CompanionKind::Other => None,
        }
    }

    /// Attribute holding the relationship id.
    pub fn attribute(self) -> Option<&'static str> {
        match self {
            CompanionKind::Image => Some("r:embed"),
            CompanionKind::Other => None,
            _ => Some("r:id"),
        }
    }

    /// Target prefix, relative to a slide, that relationships of this kind share.
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            CompanionKind::Image => Some("../media/image"),
            CompanionKind::Chart => Some("../charts/chart"),
            CompanionKind::ChartEx => Some("../charts/chartEx"),
            CompanionKind::OleObject => Some("../embeddings/oleObject"),
            CompanionKind::Hyperlink | CompanionKind::Other => None,
        }
    }

    /// Selector finding relationships of this kind in a slide's table.
    pub fn selector(self) -> Option<RelSelector> {
        match self {
            CompanionKind::Hyperlink => Some(RelSelector::by_type(rt::HYPERLINK)),
            kind => kind.prefix().map(RelSelector::by_prefix),
        }
    }

    /// Kind of the reference held by `attribute` on an element named `tag`.
    pub fn classify(tag: &str, attribute: &str) -> Self {
        match (tag, attribute) {
            ("a:blip", "r:embed" | "r:link") => CompanionKind::Image,
            ("c:chart", "r:id") => CompanionKind::Chart,
            ("cx:chart", "r:id") => CompanionKind::ChartEx,
            ("p:oleObj", "r:id") => CompanionKind::OleObject,
            ("a:hlinkClick" | "a:hlinkHover", "r:id") => CompanionKind::Hyperlink,
            _ => CompanionKind::Other,
        }
    }

    pub fn is_chart(self) -> bool {
        matches!(self, CompanionKind::Chart | CompanionKind::ChartEx)
    }

    async fn copy_companion<S, T>(
        self,
        rewirer: &mut Rewirer<'_, S, T>,
        rel: &Relationship,
    ) -> Result<Option<Rewired>>
    where
        S: ArchiveStore,
        T: ArchiveStore,
    {
        match self {
            CompanionKind::Image => ImageHandler.copy(rewirer, rel).await,
            CompanionKind::Chart | CompanionKind::ChartEx => {
                ChartHandler { kind: self }.copy(rewirer, rel).await
            },
            CompanionKind::OleObject => OleObjectHandler.copy(rewirer, rel).await,
            CompanionKind::Hyperlink => HyperlinkHandler.copy(rewirer, rel).await,
            CompanionKind::Other => PartHandler.copy(rewirer, rel).await,
        }
    }
}

/// The relationship a rewired reference needs in the target part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewired {
    pub reltype: String,
    pub target_ref: String,
    pub is_external: bool,
}

impl Rewired {
    fn verbatim(rel: &Relationship) -> Self {
        Self {
            reltype: rel.reltype().to_string(),
            target_ref: rel.target_ref().to_string(),
            is_external: rel.is_external(),
        }
    }
}

/// Copies what one relationship points at into the target package.
///
/// Returns the relationship the clone needs in its new part, or `None` when
/// the reference should be dropped from the clone.
#[allow(async_fn_in_trait)]
pub trait CompanionHandler {
    async fn copy<S, T>(
        &self,
        rewirer: &mut Rewirer<'_, S, T>,
        rel: &Relationship,
    ) -> Result<Option<Rewired>>
    where
        S: ArchiveStore,
        T: ArchiveStore;
}

/// Pictures. Linked (external) pictures keep their URL.
pub struct ImageHandler;

impl CompanionHandler for ImageHandler {
    async fn copy<S, T>(&self, rewirer: &mut Rewirer<'_, S, T>, rel: &Relationship) -> Result<Option<Rewired>>
    where
        S: ArchiveStore,
        T: ArchiveStore,
    {
        rewirer.copy_target(rel).await.map(Some)
    }
}

/// OLE embeddings such as `oleObject1.bin` or an embedded workbook.
pub struct OleObjectHandler;

impl CompanionHandler for OleObjectHandler {
    async fn copy<S, T>(&self, rewirer: &mut Rewirer<'_, S, T>, rel: &Relationship) -> Result<Option<Rewired>>
    where
        S: ArchiveStore,
        T: ArchiveStore,
    {
        rewirer.copy_target(rel).await.map(Some)
    }
}

/// Chart parts, copied with their own relationship graph.
pub struct ChartHandler {
    kind: CompanionKind,
}

impl CompanionHandler for ChartHandler {
    async fn copy<S, T>(&self, rewirer: &mut Rewirer<'_, S, T>, rel: &Relationship) -> Result<Option<Rewired>>
    where
        S: ArchiveStore,
        T: ArchiveStore,
    {
        if rel.is_external() {
            return Ok(Some(Rewired::verbatim(rel)));
        }
        let rewired = rewirer.copy_target(rel).await?;
        let source_chart = rel.target_partname(rewirer.source_part.base_uri())?;
        let Some(chart) = rewirer.copied.get(&source_chart).cloned() else {
            return Ok(Some(rewired));
        };

        let workbooks = rewirer
            .target
            .resolve(&chart, &RelSelector::by_type(rt::PACKAGE))
            .await?;
        let workbook = workbooks
            .into_iter()
            .find(|t| !t.is_external)
            .map(|t| PackURI::from_rel_ref(chart.base_uri(), &t.file))
            .transpose()
            .map_err(crate::ooxml::opc::OpcError::InvalidPackUri)?;
        debug!("chart {} copied to {} (workbook {:?})", source_chart, chart, workbook);
        rewirer.charts.push(CopiedChart {
            kind: self.kind,
            part: chart,
            workbook,
        });
        Ok(Some(rewired))
    }
}

/// Hyperlinks. External targets are kept as URLs or dropped by
/// configuration; links into the document are kept verbatim.
pub struct HyperlinkHandler;

impl CompanionHandler for HyperlinkHandler {
    async fn copy<S, T>(&self, rewirer: &mut Rewirer<'_, S, T>, rel: &Relationship) -> Result<Option<Rewired>>
    where
        S: ArchiveStore,
        T: ArchiveStore,
    {
        if rel.is_external() && !rewirer.options.copy_external_hyperlinks {
            rewirer.report.skip(
                rewirer.target_part,
                None,
                SkipReason::ExternalHyperlinkDropped {
                    target: rel.target_ref().to_string(),
                },
            );
            return Ok(None);
        }
        if !rel.is_external() {
            debug!("internal hyperlink {} kept as {}", rel.r_id(), rel.target_ref());
        }
        Ok(Some(Rewired::verbatim(rel)))
    }
}

/// Any other referenced part.
pub struct PartHandler;

impl CompanionHandler for PartHandler {
    async fn copy<S, T>(&self, rewirer: &mut Rewirer<'_, S, T>, rel: &Relationship) -> Result<Option<Rewired>>
    where
        S: ArchiveStore,
        T: ArchiveStore,
    {
        if is_structural(rel.reltype()) {
            return Ok(Some(Rewired::verbatim(rel)));
        }
        rewirer.copy_target(rel).await.map(Some)
    }
}

/// A chart part created in the target by a rewire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedChart {
    pub kind: CompanionKind,
    pub part: PackURI,
    pub workbook: Option<PackURI>,
}

/// A relationship attribute found in a clone.
#[derive(Debug, Clone)]
struct Reference {
    path: ElementPath,
    tag: String,
    attribute: String,
    r_id: String,
    kind: CompanionKind,
}

fn collect_references(clone: &XmlElement) -> Vec<Reference> {
    let mut refs = Vec::new();
    push_references(clone, ElementPath::new(), &mut refs);
    let paths = clone.find_paths(|el| el.attributes().any(|(name, _)| name.starts_with(REL_ATTR_PREFIX)));
    for path in paths {
        if let Some(el) = clone.at(&path) {
            push_references(el, path, &mut refs);
        }
    }
    refs
}

fn push_references(el: &XmlElement, path: ElementPath, refs: &mut Vec<Reference>) {
    for (name, value) in el.attributes() {
        if !name.starts_with(REL_ATTR_PREFIX) || value.is_empty() {
            continue;
        }
        refs.push(Reference {
            path: path.clone(),
            tag: el.name().to_string(),
            attribute: name.to_string(),
            kind: CompanionKind::classify(el.name(), name),
            r_id: value,
        });
    }
}

/// Rewires one clone from a source part into a target part.
pub struct Rewirer<'a, S: ArchiveStore, T: ArchiveStore> {
    source: &'a mut Package<S>,
    source_part: &'a PackURI,
    target: &'a mut Package<T>,
    target_part: &'a PackURI,
    options: &'a ComposeOptions,
    report: &'a mut ComposeReport,
    /// Source part -> its copy in the target
    copied: HashMap<PackURI, PackURI>,
    charts: Vec<CopiedChart>,
}

impl<'a, S: ArchiveStore, T: ArchiveStore> Rewirer<'a, S, T> {
    pub fn new(
        source: &'a mut Package<S>,
        source_part: &'a PackURI,
        target: &'a mut Package<T>,
        target_part: &'a PackURI,
        options: &'a ComposeOptions,
        report: &'a mut ComposeReport,
    ) -> Self {
        Self {
            source,
            source_part,
            target,
            target_part,
            options,
            report,
            copied: HashMap::new(),
            charts: Vec::new(),
        }
    }

    /// Charts created so far.
    pub fn charts(&self) -> &[CopiedChart] {
        &self.charts
    }

    /// Rewire every relationship attribute of `clone`.
    ///
    /// Each distinct source id gets one new id in the target part. References
    /// that cannot be carried over are removed from the clone. Returns the id
    /// mapping that was applied.
    pub async fn rewire(&mut self, clone: &mut XmlElement) -> Result<HashMap<String, String>> {
        let refs = collect_references(clone);
        let mut mapping: HashMap<String, Option<(String, String)>> = HashMap::new();
        for reference in &refs {
            if mapping.contains_key(&reference.r_id) {
                continue;
            }
            let rewired = self.rewire_one(&reference.r_id, reference.kind).await?;
            mapping.insert(reference.r_id.clone(), rewired);
        }

        for reference in &refs {
            let Some(el) = clone.at_mut(&reference.path) else {
                continue;
            };
            match mapping.get(&reference.r_id) {
                Some(Some((new_id, target_ref))) => {
                    el.set_attr(&reference.attribute, new_id);
                    self.report.track_relation(TrackedRelation {
                        part: self.target_part.clone(),
                        tag: reference.tag.clone(),
                        attribute: reference.attribute.clone(),
                        r_id: new_id.clone(),
                        target: target_ref.clone(),
                    });
                },
                _ => {
                    el.remove_attr(&reference.attribute);
                },
            }
        }

        Ok(mapping
            .into_iter()
            .filter_map(|(old, new)| new.map(|(new_id, _)| (old, new_id)))
            .collect())
    }

    async fn rewire_one(&mut self, r_id: &str, kind: CompanionKind) -> Result<Option<(String, String)>> {
        let rel = self
            .source
            .relationships(self.source_part)
            .await?
            .get(r_id)
            .cloned();
        let Some(rel) = rel else {
            warn!("{} references missing relationship {}", self.source_part, r_id);
            self.report.skip(
                self.target_part,
                None,
                SkipReason::DanglingReference {
                    r_id: r_id.to_string(),
                },
            );
            return Ok(None);
        };

        let Some(rewired) = kind.copy_companion(self, &rel).await? else {
            return Ok(None);
        };
        let new_id = self.target.allocate_id(self.target_part).await?;
        let mut new_rel = NewRelationship::new(&new_id, &rewired.reltype, &rewired.target_ref);
        if rewired.is_external {
            new_rel = new_rel.external();
        }
        self.target
            .register_relationship(self.target_part, new_rel)
            .await?;
        debug!(
            "{:?} {} -> {} ({})",
            kind, r_id, new_id, rewired.target_ref
        );
        Ok(Some((new_id, rewired.target_ref)))
    }

    /// Copy the target of `rel` into the target package and describe it
    /// relative to the target part. External targets are kept as-is.
    async fn copy_target(&mut self, rel: &Relationship) -> Result<Rewired> {
        if rel.is_external() {
            return Ok(Rewired::verbatim(rel));
        }
        let source = rel.target_partname(self.source_part.base_uri())?;
        let copied = self.copy_part(&source).await?;
        Ok(Rewired {
            reltype: rel.reltype().to_string(),
            target_ref: copied.relative_ref(self.target_part.base_uri()),
            is_external: false,
        })
    }

    /// Copy a part with the resources it references under the next free
    /// number of its series. Relationship ids inside the copied graph are
    /// kept, as every table in it is new.
    async fn copy_part(&mut self, source: &PackURI) -> Result<PackURI> {
        if let Some(done) = self.copied.get(source) {
            return Ok(done.clone());
        }
        let (base, _) = source.numbered();
        let copy = self
            .target
            .next_partname(source.base_uri(), base, source.ext())?;
        let data = self.source.read_bytes(source).await?;
        self.target.write_bytes(&copy, data).await?;
        self.copy_content_type(source, &copy).await?;
        self.copied.insert(source.clone(), copy.clone());
        debug!("copied {} to {}", source, copy);

        let rels: Vec<Relationship> = self
            .source
            .relationships(source)
            .await?
            .iter()
            .cloned()
            .collect();
        for rel in rels {
            let target_ref = if rel.is_external() || is_structural(rel.reltype()) {
                rel.target_ref().to_string()
            } else {
                let child = rel.target_partname(source.base_uri())?;
                let child_copy = Box::pin(self.copy_part(&child)).await?;
                child_copy.relative_ref(copy.base_uri())
            };
            let mut new_rel = NewRelationship::new(rel.r_id(), rel.reltype(), &target_ref);
            if rel.is_external() {
                new_rel = new_rel.external();
            }
            self.target.register_relationship(&copy, new_rel).await?;
        }
        Ok(copy)
    }

    /// Declare the copy's content type the way the source declared the original.
    async fn copy_content_type(&mut self, source: &PackURI, copy: &PackURI) -> Result<()> {
        let (override_ct, default_ct) = {
            let types = self.source.content_types().await?;
            (
                types.override_for(source.as_str()).map(str::to_string),
                types.default_for(source.ext()).map(str::to_string),
            )
        };
        if let Some(ct) = override_ct {
            self.target.register_override(copy, &ct).await?;
            return Ok(());
        }
        let ext = copy.ext();
        match default_ct.or_else(|| content_type::for_extension(ext).map(str::to_string)) {
            Some(ct) => {
                self.target.register_extension(ext, &ct).await?;
            },
            None => warn!("no content type known for {}", source),
        }
        Ok(())
    }
}
