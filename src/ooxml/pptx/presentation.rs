/// The presentation part and its slide list.
///
/// `presentation.xml` lists slides as `p:sldId` entries inside `p:sldIdLst`;
/// each entry carries a numeric id and the relationship id of the slide
/// part. List order is slide order, so truncating and reordering slides are
/// collection edits on that list.
use crate::common::xml::{XmlElement, XmlNode};
use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::error::OpcError;
use crate::ooxml::opc::{ArchiveStore, PackURI, Package, ZipStore};
use crate::ooxml::pptx::collection;
use crate::ooxml::pptx::config::ComposeOptions;
use crate::ooxml::pptx::identity::{self, ElementInfo};
use log::debug;
use std::collections::HashSet;
use std::path::Path;

pub const PRESENTATION: &str = "/ppt/presentation.xml";
pub const SLIDE_ID_LIST: &str = "p:sldIdLst";
pub const SLIDE_ID: &str = "p:sldId";

/// Lowest id a slide may carry.
const MIN_SLIDE_ID: u32 = 256;

/// Highest id a slide may carry.
pub(crate) const MAX_SLIDE_ID: u32 = 2_147_483_647;

/// Lists that precede `p:sldIdLst` in a presentation.
const PRECEDING_LISTS: [&str; 3] = ["p:sldMasterIdLst", "p:notesMasterIdLst", "p:handoutMasterIdLst"];

/// One entry of the slide list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideEntry {
    pub id: u32,
    pub r_id: String,
    pub part: PackURI,
}

/// Element identities found on one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideInventory {
    pub slide: PackURI,
    pub elements: Vec<ElementInfo>,
}

/// Open a presentation file for composition with `options` applied.
pub async fn open_package<P: AsRef<Path>>(path: P, options: &ComposeOptions) -> Result<Package> {
    let store = ZipStore::open(path).await?;
    Ok(configure(store, options))
}

/// In-memory variant of [`open_package`].
pub fn package_from_bytes(data: &[u8], options: &ComposeOptions) -> Result<Package> {
    let store = ZipStore::from_bytes(data)?;
    Ok(configure(store, options))
}

fn configure(store: ZipStore, options: &ComposeOptions) -> Package {
    let mut package = Package::new(store.with_deflate(options.deflate));
    package.set_min_relationship_id(options.min_relationship_id);
    package
}

pub(crate) fn presentation_uri() -> Result<PackURI> {
    PackURI::new(PRESENTATION).map_err(|e| OoxmlError::Opc(OpcError::InvalidPackUri(e)))
}

/// The slide list of a presentation root, created in schema position when
/// missing.
pub(crate) fn slide_id_list(root: &mut XmlElement) -> Option<&mut XmlElement> {
    if root.child(SLIDE_ID_LIST).is_none() {
        let position = root
            .children()
            .iter()
            .rposition(|node| matches!(node, XmlNode::Element(el) if PRECEDING_LISTS.iter().any(|t| el.is(t))))
            .map_or(0, |slot| slot + 1);
        root.children_mut()
            .insert(position, XmlNode::Element(XmlElement::new(SLIDE_ID_LIST)));
    }
    root.child_mut(SLIDE_ID_LIST)
}

/// Highest slide id in `list` plus one, never below 256.
///
/// `None` once the list already holds [`MAX_SLIDE_ID`].
pub(crate) fn next_slide_id(list: &XmlElement) -> Option<u32> {
    let max = list
        .elements()
        .filter(|el| el.is(SLIDE_ID))
        .filter_map(|el| el.attr("id"))
        .filter_map(|id| atoi_simd::parse::<u32, false, false>(id.as_bytes()).ok())
        .max();
    match max {
        None => Some(MIN_SLIDE_ID),
        Some(max) => max
            .checked_add(1)
            .filter(|&next| next <= MAX_SLIDE_ID)
            .map(|next| next.max(MIN_SLIDE_ID)),
    }
}

/// Slides in presentation order.
pub async fn slides<S: ArchiveStore>(package: &mut Package<S>) -> Result<Vec<SlideEntry>> {
    let pres = presentation_uri()?;
    let listed: Vec<(u32, String)> = {
        let root = package.load(&pres).await?.root();
        let Some(list) = root.child(SLIDE_ID_LIST) else {
            return Ok(Vec::new());
        };
        list.elements()
            .filter(|el| el.is(SLIDE_ID))
            .filter_map(|el| {
                let id = atoi_simd::parse::<u32, false, false>(el.attr("id")?.as_bytes()).ok()?;
                Some((id, el.attr("r:id")?))
            })
            .collect()
    };

    let rels = package.relationships(&pres).await?;
    let mut entries = Vec::with_capacity(listed.len());
    for (id, r_id) in listed {
        let rel = rels.get(&r_id).ok_or_else(|| OpcError::MalformedRelationship {
            rels: pres.rels_uri().to_string(),
            reason: format!("slide {} refers to missing {}", id, r_id),
        })?;
        let part = rel.target_partname(pres.base_uri())?;
        entries.push(SlideEntry { id, r_id, part });
    }
    Ok(entries)
}

/// Drop slides from the list, the same way [`collection::truncate`] drops
/// members: everything past `keep`, or positions `from..keep` when `from` is
/// given. Removed slides lose their presentation relationship and their
/// parts. Returns the removed slide parts.
pub async fn truncate_slides<S: ArchiveStore>(
    package: &mut Package<S>,
    keep: usize,
    from: Option<usize>,
) -> Result<Vec<PackURI>> {
    let pres = presentation_uri()?;
    let before = slides(package).await?;
    {
        let root = package.load(&pres).await?.root_mut();
        if let Some(list) = root.child_mut(SLIDE_ID_LIST) {
            collection::truncate(list, Some(SLIDE_ID), keep, from);
        }
    }
    let kept: HashSet<String> = slides(package).await?.into_iter().map(|s| s.r_id).collect();

    let mut removed = Vec::new();
    for entry in before.into_iter().filter(|s| !kept.contains(&s.r_id)) {
        package.relationships(&pres).await?.remove(&entry.r_id);
        package.remove_part(&entry.part).await?;
        debug!("removed slide {} ({})", entry.id, entry.part);
        removed.push(entry.part);
    }
    if !removed.is_empty() {
        package.commit_relationships(&pres).await?;
        package.commit(&pres).await?;
    }
    Ok(removed)
}

/// Put slides in the order given by `permutation`, a list of current
/// positions. Returns how many entries moved.
pub async fn reorder_slides<S: ArchiveStore>(package: &mut Package<S>, permutation: &[usize]) -> Result<usize> {
    let pres = presentation_uri()?;
    let moved = {
        let root = package.load(&pres).await?.root_mut();
        match root.child_mut(SLIDE_ID_LIST) {
            Some(list) => collection::reorder(list, Some(SLIDE_ID), permutation),
            None => 0,
        }
    };
    package.commit(&pres).await?;
    Ok(moved)
}

/// Names and creation ids of every element, slide by slide.
pub async fn creation_ids<S: ArchiveStore>(package: &mut Package<S>) -> Result<Vec<SlideInventory>> {
    let mut inventories = Vec::new();
    for entry in slides(package).await? {
        let root = package.load(&entry.part).await?.root();
        inventories.push(SlideInventory {
            elements: identity::inventory(root),
            slide: entry.part,
        });
    }
    Ok(inventories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::opc::constants::{content_type as ct, relationship_type as rt};
    use crate::ooxml::opc::phys_pkg::tests::zip_fixture;
    use crate::ooxml::pptx::test_support::{content_types, presentation, rels, shape, slide};

    /// A deck of `n` slides, each with one titled shape.
    fn deck(n: usize) -> Vec<u8> {
        let mut files: Vec<(String, Vec<u8>)> = Vec::new();
        let mut overrides = Vec::new();
        let mut pres_rels = vec![("rId1".to_string(), rt::SLIDE_MASTER, "slideMasters/slideMaster1.xml".to_string())];
        let mut list = Vec::new();
        for i in 1..=n {
            let part = format!("ppt/slides/slide{}.xml", i);
            let cid = format!("{{C000000{}-0000-0000-0000-000000000000}}", i);
            files.push((part.clone(), slide(&shape(2, &format!("Title {}", i), Some(&cid))).into_bytes()));
            overrides.push((format!("/{}", part), ct::PML_SLIDE));
            pres_rels.push((format!("rId{}", i + 1), rt::SLIDE, format!("slides/slide{}.xml", i)));
            list.push((255 + i as u32, format!("rId{}", i + 1)));
        }
        let overrides: Vec<(&str, &str)> = overrides.iter().map(|(p, c)| (p.as_str(), *c)).collect();
        let pres_rels: Vec<(&str, &str, &str)> =
            pres_rels.iter().map(|(i, t, p)| (i.as_str(), *t, p.as_str())).collect();
        let list: Vec<(u32, &str)> = list.iter().map(|(id, r)| (*id, r.as_str())).collect();
        files.push(("[Content_Types].xml".to_string(), content_types(&[], &overrides).into_bytes()));
        files.push(("ppt/presentation.xml".to_string(), presentation(&list).into_bytes()));
        files.push(("ppt/_rels/presentation.xml.rels".to_string(), rels(&pres_rels).into_bytes()));

        let entries: Vec<(&str, &[u8])> = files.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
        zip_fixture(&entries)
    }

    fn parts(entries: &[SlideEntry]) -> Vec<&str> {
        entries.iter().map(|s| s.part.as_str()).collect()
    }

    #[tokio::test]
    async fn test_slides_in_list_order() {
        let mut package = package_from_bytes(&deck(3), &ComposeOptions::default()).unwrap();
        let entries = slides(&mut package).await.unwrap();
        assert_eq!(
            parts(&entries),
            ["/ppt/slides/slide1.xml", "/ppt/slides/slide2.xml", "/ppt/slides/slide3.xml"]
        );
        assert_eq!(entries[0].id, 256);
        assert_eq!(entries[2].r_id, "rId4");
    }

    #[tokio::test]
    async fn test_reorder_slides() {
        let mut package = package_from_bytes(&deck(5), &ComposeOptions::default()).unwrap();
        assert_eq!(reorder_slides(&mut package, &[2, 0, 1, 4, 3]).await.unwrap(), 5);
        let ids: Vec<u32> = slides(&mut package).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, [258, 256, 257, 260, 259]);

        let bytes = package.finalize().await.unwrap();
        let mut reopened = package_from_bytes(&bytes, &ComposeOptions::default()).unwrap();
        assert_eq!(slides(&mut reopened).await.unwrap()[0].part.as_str(), "/ppt/slides/slide3.xml");
    }

    #[tokio::test]
    async fn test_truncate_slides_removes_parts() {
        let mut package = package_from_bytes(&deck(4), &ComposeOptions::default()).unwrap();
        let removed = truncate_slides(&mut package, 3, Some(1)).await.unwrap();
        let removed: Vec<&str> = removed.iter().map(PackURI::as_str).collect();
        assert_eq!(removed, ["/ppt/slides/slide2.xml", "/ppt/slides/slide3.xml"]);

        let left = slides(&mut package).await.unwrap();
        assert_eq!(parts(&left), ["/ppt/slides/slide1.xml", "/ppt/slides/slide4.xml"]);
        assert!(!package.contains(&PackURI::new("/ppt/slides/slide2.xml").unwrap()));
        let pres = presentation_uri().unwrap();
        assert!(package.relationships(&pres).await.unwrap().get("rId3").is_none());
        assert!(
            package
                .content_types()
                .await
                .unwrap()
                .override_for("/ppt/slides/slide3.xml")
                .is_none()
        );

        assert!(truncate_slides(&mut package, 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_creation_ids_per_slide() {
        let mut package = package_from_bytes(&deck(2), &ComposeOptions::default()).unwrap();
        let inventories = creation_ids(&mut package).await.unwrap();
        assert_eq!(inventories.len(), 2);
        assert_eq!(inventories[1].slide.as_str(), "/ppt/slides/slide2.xml");
        let title = &inventories[1].elements[0];
        assert_eq!(title.name, "Title 2");
        assert_eq!(title.creation_id.as_deref(), Some("{C0000002-0000-0000-0000-000000000000}"));
        assert_eq!(title.tag, "p:sp");
        assert_eq!(title.depth, 0);
    }

    #[tokio::test]
    async fn test_min_relationship_id_applies() {
        let options = ComposeOptions {
            min_relationship_id: 100,
            ..ComposeOptions::default()
        };
        let mut package = package_from_bytes(&deck(1), &options).unwrap();
        let pres = presentation_uri().unwrap();
        assert_eq!(package.allocate_id(&pres).await.unwrap(), "rId100");
        assert_eq!(package.allocate_id(&pres).await.unwrap(), "rId101");
    }

    #[test]
    fn test_slide_list_created_after_masters() {
        let doc = crate::common::xml::XmlDocument::parse(
            br#"<p:presentation><p:sldMasterIdLst/><p:notesMasterIdLst/><p:sldSz/></p:presentation>"#,
        )
        .unwrap();
        let mut root = doc.root().clone();
        let list = slide_id_list(&mut root).unwrap();
        assert_eq!(next_slide_id(list), Some(256));
        let names: Vec<&str> = root.elements().map(|el| el.name()).collect();
        assert_eq!(names, ["p:sldMasterIdLst", "p:notesMasterIdLst", "p:sldIdLst", "p:sldSz"]);
    }

    #[test]
    fn test_next_slide_id_bounds() {
        let list = |ids: &[&str]| {
            let mut list = XmlElement::new(SLIDE_ID_LIST);
            for id in ids {
                list.push_element(XmlElement::new(SLIDE_ID).with_attr("id", id));
            }
            list
        };
        assert_eq!(next_slide_id(&list(&["256", "300"])), Some(301));
        assert_eq!(next_slide_id(&list(&["12"])), Some(256));
        assert_eq!(next_slide_id(&list(&["2147483646"])), Some(MAX_SLIDE_ID));
        assert_eq!(next_slide_id(&list(&["2147483647"])), None);
        assert_eq!(next_slide_id(&list(&["4294967295"])), None);
    }
}
