/// Spreadsheets embedded behind charts.
///
/// A chart's data lives in an embedded `.xlsx` package. [`LinkedWorkbook`]
/// opens that package as a nested [`Package`], pre-loads the parts chart hooks
/// usually touch (first worksheet, shared strings, the sheet's first table)
/// and writes everything back into one blob when the hooks are done.
use crate::common::xml::{XmlDocument, XmlElement};
use crate::ooxml::opc::constants::{content_type as ct, namespace, relationship_type as rt};
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::{NewRelationship, PackURI, Package, RelSelector, ZipStore};
use bytes::Bytes;

/// A parsed part of the workbook package.
#[derive(Debug)]
struct LoadedPart {
    partname: PackURI,
    doc: XmlDocument,
}

/// An embedded workbook opened for editing.
pub struct LinkedWorkbook {
    package: Package<ZipStore>,
    workbook: PackURI,
    sheet: LoadedPart,
    shared_strings: LoadedPart,
    /// Set when the package had no shared-strings part and one was started here
    shared_strings_created: bool,
    table: Option<LoadedPart>,
}

impl LinkedWorkbook {
    /// Open a workbook package held in memory.
    pub async fn open(data: &[u8]) -> Result<Self> {
        let mut package = Package::from_bytes(data)?;
        let root = PackURI::new("/").map_err(OpcError::InvalidPackUri)?;
        let workbook = first_target(&mut package, &root, rt::OFFICE_DOCUMENT)
            .await?
            .ok_or_else(|| OpcError::PartNotFound("workbook part".to_string()))?;

        let sheet_rel = {
            let doc = package.load(&workbook).await?;
            doc.root()
                .find("sheet")
                .and_then(|sheet| sheet.attr("r:id"))
                .ok_or_else(|| OpcError::PartNotFound(format!("{} lists no sheet", workbook)))?
        };
        let sheet = match package.relationships(&workbook).await?.get(&sheet_rel) {
            Some(rel) => rel.target_partname(workbook.base_uri())?,
            None => return Err(OpcError::PartNotFound(format!("{}#{}", workbook, sheet_rel))),
        };
        let sheet = load_part(&mut package, sheet).await?;

        let (shared_strings, shared_strings_created) =
            match first_target(&mut package, &workbook, rt::SHARED_STRINGS).await? {
                Some(partname) => (load_part(&mut package, partname).await?, false),
                None => {
                    let partname = PackURI::from_rel_ref(workbook.base_uri(), "sharedStrings.xml")
                        .map_err(OpcError::InvalidPackUri)?;
                    let root = XmlElement::new("sst")
                        .with_attr("xmlns", namespace::SML_MAIN)
                        .with_attr("count", "0")
                        .with_attr("uniqueCount", "0");
                    let part = LoadedPart {
                        partname,
                        doc: XmlDocument::from_root(root),
                    };
                    (part, true)
                },
            };

        let table = match first_target(&mut package, &sheet.partname, rt::TABLE).await? {
            Some(partname) => Some(load_part(&mut package, partname).await?),
            None => None,
        };

        Ok(Self {
            package,
            workbook,
            sheet,
            shared_strings,
            shared_strings_created,
            table,
        })
    }

    /// The first worksheet.
    pub fn sheet(&mut self) -> &mut XmlDocument {
        &mut self.sheet.doc
    }

    pub fn sheet_partname(&self) -> &PackURI {
        &self.sheet.partname
    }

    pub fn shared_strings(&mut self) -> &mut XmlDocument {
        &mut self.shared_strings.doc
    }

    /// The first table defined on the worksheet, if any.
    pub fn table(&mut self) -> Option<&mut XmlDocument> {
        self.table.as_mut().map(|part| &mut part.doc)
    }

    /// Append a string to the shared-strings table and return its index.
    pub fn append_shared_string(&mut self, text: &str) -> usize {
        let mut t = XmlElement::new("t");
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            t.set_attr("xml:space", "preserve");
        }
        t.set_text(text);
        let mut si = XmlElement::new("si");
        si.push_element(t);

        let sst = self.shared_strings.doc.root_mut();
        sst.push_element(si);
        let unique = sst.elements().filter(|el| el.is("si")).count();
        sst.set_attr("uniqueCount", &unique.to_string());
        let count = sst
            .attr("count")
            .and_then(|c| atoi_simd::parse::<usize, false, false>(c.as_bytes()).ok())
            .unwrap_or(unique - 1);
        sst.set_attr("count", &count.saturating_add(1).to_string());
        unique - 1
    }

    /// Text of shared string `index`, runs concatenated.
    pub fn shared_string(&self, index: usize) -> Option<String> {
        let si = self
            .shared_strings
            .doc
            .root()
            .elements()
            .filter(|el| el.is("si"))
            .nth(index)?;
        Some(si.find_all("t").iter().map(|t| t.text()).collect())
    }

    /// Commit every edited part and serialize the workbook package.
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        let parts = [Some(self.sheet), Some(self.shared_strings), self.table];
        for part in parts.into_iter().flatten() {
            self.package.commit_tree(&part.partname, part.doc).await?;
        }
        if self.shared_strings_created {
            let partname = PackURI::from_rel_ref(self.workbook.base_uri(), "sharedStrings.xml")
                .map_err(OpcError::InvalidPackUri)?;
            let r_id = self.package.allocate_id(&self.workbook).await?;
            let target_ref = partname.relative_ref(self.workbook.base_uri());
            self.package
                .register_relationship(
                    &self.workbook,
                    NewRelationship::new(&r_id, rt::SHARED_STRINGS, &target_ref),
                )
                .await?;
            self.package
                .register_override(&partname, ct::SML_SHARED_STRINGS)
                .await?;
        }
        Ok(Bytes::from(self.package.finalize().await?))
    }
}

async fn first_target(
    package: &mut Package<ZipStore>,
    source: &PackURI,
    reltype: &str,
) -> Result<Option<PackURI>> {
    let targets = package.resolve(source, &RelSelector::by_type(reltype)).await?;
    let Some(target) = targets.into_iter().find(|t| !t.is_external) else {
        return Ok(None);
    };
    PackURI::from_rel_ref(source.base_uri(), &target.file)
        .map(Some)
        .map_err(OpcError::InvalidPackUri)
}

async fn load_part(package: &mut Package<ZipStore>, partname: PackURI) -> Result<LoadedPart> {
    let doc = package.load(&partname).await?.clone();
    Ok(LoadedPart { partname, doc })
}
