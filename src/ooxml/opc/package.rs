/// The package session: one archive plus the parsed state edited against it.
///
/// A [`Package`] owns its [`ArchiveStore`] together with a cache of parsed part
/// trees, relationship tables and the content-type registry. Everything is
/// loaded on first use and persisted by an explicit commit, so a later `load`
/// of the same part always observes earlier edits. Nothing here is shared
/// between sessions; `&mut self` on every mutating call keeps edits to one
/// package in issue order.
use crate::common::xml::{XmlDocument, XmlElement};
use crate::ooxml::opc::content_types::ContentTypes;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri::{CONTENT_TYPES_URI, PackURI};
use crate::ooxml::opc::phys_pkg::{ArchiveStore, ZipStore};
use crate::ooxml::opc::rel::{NewRelationship, RelSelector, Relationships, Target, next_number};
use bytes::Bytes;
use log::debug;
use std::collections::HashMap;
use std::path::Path;

pub struct Package<S: ArchiveStore = ZipStore> {
    store: S,

    /// Parsed markup parts, keyed by part name
    trees: HashMap<PackURI, XmlDocument>,

    /// Relationship tables, keyed by the part that owns them
    rels: HashMap<PackURI, Relationships>,

    content_types: Option<ContentTypes>,

    /// Lowest id handed out by relationship allocation
    min_relationship_id: u32,
}

impl Package<ZipStore> {
    /// Open an OPC package from a file path.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(ZipStore::open(path).await?))
    }

    /// Open an OPC package held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(Self::new(ZipStore::from_bytes(data)?))
    }
}

impl<S: ArchiveStore> Package<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            trees: HashMap::new(),
            rels: HashMap::new(),
            content_types: None,
            min_relationship_id: 1,
        }
    }

    /// Lowest relationship id allocation may return, for tables loaded from now on.
    pub fn set_min_relationship_id(&mut self, min_id: u32) {
        self.min_relationship_id = min_id.max(1);
        for table in self.rels.values_mut() {
            table.set_min_id(self.min_relationship_id);
        }
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn contains(&self, partname: &PackURI) -> bool {
        self.store.contains(partname.membername())
    }

    /// Every part name in the container, in container order.
    pub fn part_names(&self) -> Vec<PackURI> {
        self.store
            .names()
            .iter()
            .map(|name| PackURI::from_membername(name))
            .collect()
    }

    /// Parsed tree of a markup part.
    ///
    /// Parsed on first request; later requests in this session return the
    /// cached tree, including any uncommitted edits.
    pub async fn load(&mut self, partname: &PackURI) -> Result<&mut XmlDocument> {
        if !self.trees.contains_key(partname) {
            let data = self.store.get(partname.membername()).await?;
            let doc = XmlDocument::parse(&data).map_err(|e| OpcError::xml(partname.as_str(), e))?;
            debug!("parsed {}", partname);
            self.trees.insert(partname.clone(), doc);
        }
        self.trees
            .get_mut(partname)
            .ok_or_else(|| OpcError::PartNotFound(partname.to_string()))
    }

    /// Cached tree of a part, if it has been loaded.
    pub fn cached(&self, partname: &PackURI) -> Option<&XmlDocument> {
        self.trees.get(partname)
    }

    pub fn cached_mut(&mut self, partname: &PackURI) -> Option<&mut XmlDocument> {
        self.trees.get_mut(partname)
    }

    /// Serialize the cached tree of `partname` back into the store.
    pub async fn commit(&mut self, partname: &PackURI) -> Result<()> {
        let doc = self
            .trees
            .get(partname)
            .ok_or_else(|| OpcError::PartNotFound(partname.to_string()))?;
        let data = Bytes::from(doc.to_bytes());
        self.store.set(partname.membername(), data).await?;
        debug!("committed {}", partname);
        Ok(())
    }

    /// Replace the tree of `partname` (creating the part if needed) and commit it.
    pub async fn commit_tree(&mut self, partname: &PackURI, doc: XmlDocument) -> Result<()> {
        self.trees.insert(partname.clone(), doc);
        self.commit(partname).await
    }

    /// Load, apply each callback to the root in order, commit.
    pub async fn modify<I, F>(&mut self, partname: &PackURI, callbacks: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(&mut XmlElement),
    {
        let doc = self.load(partname).await?;
        for callback in callbacks {
            callback(doc.root_mut());
        }
        self.commit(partname).await
    }

    /// Append `element` to the first element named `parent` when `clause` holds
    /// for the part's root. Commits only when something was appended.
    pub async fn append_if<F>(
        &mut self,
        partname: &PackURI,
        parent: &str,
        element: XmlElement,
        clause: F,
    ) -> Result<bool>
    where
        F: FnOnce(&XmlElement) -> bool,
    {
        let doc = self.load(partname).await?;
        if !clause(doc.root()) {
            return Ok(false);
        }
        let root = doc.root_mut();
        let target = if root.is(parent) {
            Some(root)
        } else {
            root.find_mut(parent)
        };
        let Some(target) = target else {
            return Ok(false);
        };
        target.push_element(element);
        self.commit(partname).await?;
        Ok(true)
    }

    /// Raw bytes of a part, e.g. media or an embedded workbook.
    ///
    /// A cached tree wins over the stored bytes.
    pub async fn read_bytes(&self, partname: &PackURI) -> Result<Bytes> {
        if let Some(doc) = self.trees.get(partname) {
            return Ok(Bytes::from(doc.to_bytes()));
        }
        self.store.get(partname.membername()).await
    }

    /// Store raw bytes under `partname`, dropping any cached tree for it.
    pub async fn write_bytes(&mut self, partname: &PackURI, data: Bytes) -> Result<()> {
        self.trees.remove(partname);
        self.store.set(partname.membername(), data).await
    }

    /// Remove a part together with its relationship part and content-type override.
    pub async fn remove_part(&mut self, partname: &PackURI) -> Result<bool> {
        self.trees.remove(partname);
        self.rels.remove(partname);
        let removed = self.store.remove(partname.membername()).await?;
        self.store.remove(partname.rels_uri().membername()).await?;
        if self.content_types().await?.remove_override(partname.as_str()).is_some() {
            self.commit_content_types().await?;
        }
        if removed {
            debug!("removed {}", partname);
        }
        Ok(removed)
    }

    /// Relationship table owned by `source`. A part without a relationship
    /// part has an empty table.
    pub async fn relationships(&mut self, source: &PackURI) -> Result<&mut Relationships> {
        if !self.rels.contains_key(source) {
            let rels_uri = source.rels_uri();
            let mut table = if self.store.contains(rels_uri.membername()) {
                let data = self.store.get(rels_uri.membername()).await?;
                Relationships::from_xml(source.base_uri().to_string(), &data)
                    .map_err(|e| OpcError::xml(rels_uri.as_str(), e))?
            } else {
                Relationships::new(source.base_uri().to_string())
            };
            table.set_min_id(self.min_relationship_id);
            self.rels.insert(source.clone(), table);
        }
        self.rels
            .get_mut(source)
            .ok_or_else(|| OpcError::PartNotFound(source.rels_uri().to_string()))
    }

    /// Persist the relationship table of `source`.
    pub async fn commit_relationships(&mut self, source: &PackURI) -> Result<()> {
        let table = self
            .rels
            .get(source)
            .ok_or_else(|| OpcError::PartNotFound(source.rels_uri().to_string()))?;
        let data = Bytes::from(table.to_xml());
        self.store.set(source.rels_uri().membername(), data).await
    }

    /// Reserve the next relationship id in the table of `source`.
    pub async fn allocate_id(&mut self, source: &PackURI) -> Result<String> {
        self.relationships(source).await?.allocate_id()
    }

    /// Append a relationship to the table of `source` and persist it.
    pub async fn register_relationship(
        &mut self,
        source: &PackURI,
        rel: NewRelationship,
    ) -> Result<()> {
        let table = self.relationships(source).await?;
        match table.register(rel) {
            Ok(rel) => debug!("{}: {} -> {}", source, rel.r_id(), rel.target_ref()),
            Err(reason) => {
                return Err(OpcError::MalformedRelationship {
                    rels: source.rels_uri().to_string(),
                    reason,
                });
            },
        }
        self.commit_relationships(source).await
    }

    pub async fn resolve(&mut self, source: &PackURI, selector: &RelSelector) -> Result<Vec<Target>> {
        Ok(self.relationships(source).await?.resolve(selector))
    }

    /// Descriptor of the relationship `r_id` in the table of `source`.
    pub async fn target_by_rel_id(&mut self, source: &PackURI, r_id: &str) -> Result<Option<Target>> {
        let table = self.relationships(source).await?;
        let Some(rel) = table.get(r_id) else {
            return Ok(None);
        };
        let selector = RelSelector::by_type(rel.reltype());
        Ok(table.resolve(&selector).into_iter().find(|t| t.r_id == r_id))
    }

    /// The package's content-type registry.
    pub async fn content_types(&mut self) -> Result<&mut ContentTypes> {
        if self.content_types.is_none() {
            let name = &CONTENT_TYPES_URI[1..];
            let data = self.store.get(name).await?;
            let types =
                ContentTypes::from_xml(&data).map_err(|e| OpcError::xml(CONTENT_TYPES_URI, e))?;
            self.content_types = Some(types);
        }
        self.content_types
            .as_mut()
            .ok_or_else(|| OpcError::PartNotFound(CONTENT_TYPES_URI.to_string()))
    }

    async fn commit_content_types(&mut self) -> Result<()> {
        let Some(types) = &self.content_types else {
            return Ok(());
        };
        let data = Bytes::from(types.to_xml());
        self.store.set(&CONTENT_TYPES_URI[1..], data).await
    }

    /// Declare a Default content type unless the extension already has one.
    pub async fn register_extension(&mut self, ext: &str, content_type: &str) -> Result<bool> {
        let added = self.content_types().await?.register_extension(ext, content_type);
        if added {
            debug!("content type default .{} = {}", ext, content_type);
            self.commit_content_types().await?;
        }
        Ok(added)
    }

    /// Declare an Override content type unless the part already has one.
    pub async fn register_override(&mut self, partname: &PackURI, content_type: &str) -> Result<bool> {
        let added = self
            .content_types()
            .await?
            .register_override(partname.as_str(), content_type);
        if added {
            debug!("content type override {} = {}", partname, content_type);
            self.commit_content_types().await?;
        }
        Ok(added)
    }

    /// Next free number for parts named `{dir}/{base}N.{ext}`: the highest in use plus one.
    ///
    /// `dir` is a directory part name such as "/ppt/charts". Fails once the
    /// series holds `u32::MAX`.
    pub fn next_part_number(&self, dir: &str, base: &str, ext: &str) -> Result<u32> {
        let dir = dir.trim_end_matches('/');
        next_number(self.store.names().iter().filter_map(|name| {
            let uri = PackURI::from_membername(name);
            if uri.base_uri() != dir || !uri.ext().eq_ignore_ascii_case(ext) {
                return None;
            }
            match uri.numbered() {
                (b, n) if b == base => Some(n),
                _ => None,
            }
        }))
        .ok_or_else(|| OpcError::NumberExhausted(format!("{}/{}{}.{}", dir, base, u32::MAX, ext)))
    }

    /// Name for the next part in a numbered series, e.g. "/ppt/charts/chart4.xml".
    pub fn next_partname(&self, dir: &str, base: &str, ext: &str) -> Result<PackURI> {
        let number = self.next_part_number(dir, base, ext)?;
        PackURI::new(format!("{}/{}{}.{}", dir.trim_end_matches('/'), base, number, ext))
            .map_err(OpcError::InvalidPackUri)
    }

    /// Hand back the store; cached state is dropped.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Serialize the container. Cached trees are not written implicitly.
    pub async fn finalize(self) -> Result<Vec<u8>> {
        self.store.finalize().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ooxml::opc::constants::{content_type as ct, relationship_type as rt};
    use crate::ooxml::opc::phys_pkg::tests::zip_fixture;

    pub(crate) const CONTENT_TYPES: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/slides/slide1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/></Types>"#;

    const SLIDE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/></p:nvSpPr><p:txBody><a:p><a:r><a:t>Q&amp;A</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#;

    const SLIDE_RELS: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/></Relationships>"#;

    fn package() -> Package {
        let data = zip_fixture(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("ppt/slides/slide1.xml", SLIDE),
            ("ppt/slides/_rels/slide1.xml.rels", SLIDE_RELS),
            ("ppt/charts/chart1.xml", b"<c:chartSpace/>"),
            ("ppt/charts/chart2.xml", b"<c:chartSpace/>"),
            ("ppt/charts/chart5.xml", b"<c:chartSpace/>"),
            ("ppt/charts/chartEx9.xml", b"<cx:chartSpace/>"),
        ]);
        Package::from_bytes(&data).unwrap()
    }

    fn slide1() -> PackURI {
        PackURI::new("/ppt/slides/slide1.xml").unwrap()
    }

    #[tokio::test]
    async fn test_load_is_cached_and_read_your_write() {
        let mut pkg = package();
        let uri = slide1();
        {
            let doc = pkg.load(&uri).await.unwrap();
            let name = doc.root_mut().find_mut("p:cNvPr").unwrap();
            name.set_attr("name", "Renamed");
        }
        // Uncommitted edit is visible through the cache.
        let doc = pkg.load(&uri).await.unwrap();
        assert_eq!(doc.root().find("p:cNvPr").unwrap().attr("name").as_deref(), Some("Renamed"));

        pkg.commit(&uri).await.unwrap();
        let stored = pkg.store().get(uri.membername()).await.unwrap();
        assert!(String::from_utf8_lossy(&stored).contains(r#"name="Renamed""#));
    }

    #[tokio::test]
    async fn test_missing_part() {
        let mut pkg = package();
        let uri = PackURI::new("/ppt/slides/slide7.xml").unwrap();
        assert!(matches!(pkg.load(&uri).await, Err(OpcError::PartNotFound(_))));
        assert!(matches!(pkg.commit(&uri).await, Err(OpcError::PartNotFound(_))));
    }

    #[tokio::test]
    async fn test_commit_unmodified_is_canonical() {
        let mut pkg = package();
        let uri = slide1();
        pkg.load(&uri).await.unwrap();
        pkg.commit(&uri).await.unwrap();
        let stored = pkg.store().get(uri.membername()).await.unwrap();
        let canonical = XmlDocument::parse(SLIDE).unwrap().to_bytes();
        assert_eq!(&stored[..], &canonical[..]);
    }

    #[tokio::test]
    async fn test_modify_and_append_if() {
        let mut pkg = package();
        let uri = slide1();
        pkg.modify(&uri, [|root: &mut XmlElement| {
            if let Some(t) = root.find_mut("a:t") {
                t.set_text("Answers");
            }
        }])
        .await
        .unwrap();
        assert_eq!(pkg.load(&uri).await.unwrap().root().find("a:t").unwrap().text(), "Answers");

        let added = pkg
            .append_if(&uri, "p:spTree", XmlElement::new("p:sp"), |root| {
                root.find_all("p:sp").len() < 2
            })
            .await
            .unwrap();
        assert!(added);
        let again = pkg
            .append_if(&uri, "p:spTree", XmlElement::new("p:sp"), |root| {
                root.find_all("p:sp").len() < 2
            })
            .await
            .unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn test_relationship_registration_commits() {
        let mut pkg = package();
        let uri = slide1();
        let r_id = pkg.allocate_id(&uri).await.unwrap();
        assert_eq!(r_id, "rId2");
        pkg.register_relationship(&uri, NewRelationship::new(&r_id, rt::CHART, "../charts/chart6.xml"))
            .await
            .unwrap();

        let stored = pkg.store().get(uri.rels_uri().membername()).await.unwrap();
        let reread = Relationships::from_xml("/ppt/slides".to_string(), &stored).unwrap();
        assert_eq!(reread.get("rId2").unwrap().target_ref(), "../charts/chart6.xml");

        let target = pkg.target_by_rel_id(&uri, "rId2").await.unwrap().unwrap();
        assert_eq!(target.number, 6);
        assert_eq!(target.subtype, "chart");

        let broken = NewRelationship {
            r_id: Some("rId9".to_string()),
            ..NewRelationship::default()
        };
        assert!(matches!(
            pkg.register_relationship(&uri, broken).await,
            Err(OpcError::MalformedRelationship { .. })
        ));
    }

    #[tokio::test]
    async fn test_part_without_rels_has_empty_table() {
        let mut pkg = package();
        let chart = PackURI::new("/ppt/charts/chart1.xml").unwrap();
        assert!(pkg.relationships(&chart).await.unwrap().is_empty());
        pkg.set_min_relationship_id(3);
        assert_eq!(pkg.allocate_id(&chart).await.unwrap(), "rId3");
    }

    #[tokio::test]
    async fn test_content_type_registration() {
        let mut pkg = package();
        assert!(pkg.register_extension("png", ct::PNG).await.unwrap());
        assert!(!pkg.register_extension("PNG", ct::PNG).await.unwrap());
        let chart = PackURI::new("/ppt/charts/chart6.xml").unwrap();
        assert!(pkg.register_override(&chart, ct::DML_CHART).await.unwrap());
        assert!(!pkg.register_override(&chart, ct::DML_CHART).await.unwrap());

        let stored = pkg.store().get("[Content_Types].xml").await.unwrap();
        let types = ContentTypes::from_xml(&stored).unwrap();
        assert_eq!(types.default_for("png"), Some(ct::PNG));
        assert_eq!(types.override_for("/ppt/charts/chart6.xml"), Some(ct::DML_CHART));
    }

    #[tokio::test]
    async fn test_part_numbering_uses_max_plus_one() {
        let pkg = package();
        assert_eq!(pkg.next_part_number("/ppt/charts", "chart", "xml").unwrap(), 6);
        assert_eq!(pkg.next_part_number("/ppt/charts", "chartEx", "xml").unwrap(), 10);
        assert_eq!(pkg.next_part_number("/ppt/media", "image", "png").unwrap(), 1);
        assert_eq!(
            pkg.next_partname("/ppt/charts", "chart", "xml").unwrap().as_str(),
            "/ppt/charts/chart6.xml"
        );
    }

    #[tokio::test]
    async fn test_part_numbering_stops_at_last_number() {
        let data = zip_fixture(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("ppt/charts/chart4294967295.xml", b"<c:chartSpace/>"),
        ]);
        let pkg = Package::from_bytes(&data).unwrap();
        assert!(matches!(
            pkg.next_partname("/ppt/charts", "chart", "xml"),
            Err(OpcError::NumberExhausted(_))
        ));
    }

    #[tokio::test]
    async fn test_allocation_past_last_id_fails() {
        let rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId4294967295" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/></Relationships>"#;
        let data = zip_fixture(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("ppt/slides/slide1.xml", SLIDE),
            ("ppt/slides/_rels/slide1.xml.rels", rels),
        ]);
        let mut pkg = Package::from_bytes(&data).unwrap();
        assert!(matches!(
            pkg.allocate_id(&slide1()).await,
            Err(OpcError::NumberExhausted(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8_part_is_an_error() {
        let data = zip_fixture(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("ppt/slides/slide1.xml", b"<p:sld><a:t>ok \xff\xfe bytes</a:t></p:sld>"),
        ]);
        let mut pkg = Package::from_bytes(&data).unwrap();
        match pkg.load(&slide1()).await {
            Err(OpcError::Utf8 { part, .. }) => assert_eq!(part, "/ppt/slides/slide1.xml"),
            other => panic!("expected a UTF-8 error, got {:?}", other.map(|_| ())),
        }
        assert!(pkg.cached(&slide1()).is_none());
    }

    #[tokio::test]
    async fn test_remove_part() {
        let mut pkg = package();
        let uri = slide1();
        assert!(pkg.remove_part(&uri).await.unwrap());
        assert!(!pkg.contains(&uri));
        assert!(!pkg.store().contains(uri.rels_uri().membername()));
        assert_eq!(pkg.content_types().await.unwrap().override_for(uri.as_str()), None);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(50))]

            #[test]
            fn prop_commit_of_load_is_canonical(
                name in "[A-Za-z0-9 &<>\"']{0,16}",
                text in "[A-Za-z0-9 &<>]{0,24}",
            ) {
                let slide = format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<p:sld xmlns:p=\"p\"><p:cNvPr id=\"2\" name=\"{}\"/><a:t>{}</a:t></p:sld>",
                    crate::common::xml::escape_attr(&name),
                    crate::common::xml::escape_text(&text),
                );
                let data = zip_fixture(&[("ppt/slides/slide1.xml", slide.as_bytes())]);
                let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let stored = runtime.block_on(async {
                    let mut pkg = Package::from_bytes(&data).unwrap();
                    let uri = slide1();
                    pkg.load(&uri).await.unwrap();
                    pkg.commit(&uri).await.unwrap();
                    pkg.store().get(uri.membername()).await.unwrap()
                });
                let canonical = XmlDocument::parse(slide.as_bytes()).unwrap().to_bytes();
                prop_assert_eq!(&stored[..], &canonical[..]);

                let reparsed = XmlDocument::parse(&stored).unwrap();
                prop_assert_eq!(reparsed.root().find("p:cNvPr").unwrap().attr("name"), Some(name));
            }
        }
    }
}
