//! Copying whole slides between presentations.

use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::constants::{content_type as ct, relationship_type as rt};
use crate::ooxml::opc::error::OpcError;
use crate::ooxml::opc::{ArchiveStore, NewRelationship, PackURI, Package, RelSelector, Relationship};
use crate::ooxml::pptx::companion::Rewirer;
use crate::ooxml::pptx::config::ComposeOptions;
use crate::ooxml::pptx::presentation::{self, PRESENTATION};
use crate::ooxml::pptx::report::ComposeReport;
use log::{debug, warn};

/// Directory of slide parts.
pub const SLIDES_DIR: &str = "/ppt/slides";

/// Copy `source_slide` from `source` to the end of `target`'s slide list.
///
/// The copy is numbered after the highest slide in `target`. Resources the
/// slide references are copied alongside and rewired. Layout and notes
/// relationships are kept when their parts exist in `target`; a layout that
/// does not is replaced by the layout of `target`'s first slide.
///
/// Returns the part name of the new slide.
pub async fn append_slide<S, T>(
    source: &mut Package<S>,
    source_slide: &PackURI,
    target: &mut Package<T>,
    options: &ComposeOptions,
    report: &mut ComposeReport,
) -> Result<PackURI>
where
    S: ArchiveStore,
    T: ArchiveStore,
{
    let new_slide = target.next_partname(SLIDES_DIR, "slide", "xml")?;
    let mut doc = source.load(source_slide).await?.clone();
    let structural: Vec<Relationship> = source
        .relationships(source_slide)
        .await?
        .iter()
        .filter(|rel| !rel.is_external() && matches!(rel.reltype(), rt::SLIDE_LAYOUT | rt::NOTES_SLIDE))
        .cloned()
        .collect();

    let mut has_layout = false;
    for rel in &structural {
        let part = rel.target_partname(source_slide.base_uri())?;
        if !target.contains(&part) {
            warn!("{}: {} not in target, relationship dropped", new_slide, part);
            continue;
        }
        let r_id = target.allocate_id(&new_slide).await?;
        let target_ref = part.relative_ref(new_slide.base_uri());
        target
            .register_relationship(&new_slide, NewRelationship::new(&r_id, rel.reltype(), &target_ref))
            .await?;
        has_layout |= rel.reltype() == rt::SLIDE_LAYOUT;
    }
    if !has_layout {
        match fallback_layout(target).await? {
            Some(layout) => {
                let r_id = target.allocate_id(&new_slide).await?;
                let target_ref = layout.relative_ref(new_slide.base_uri());
                target
                    .register_relationship(&new_slide, NewRelationship::new(&r_id, rt::SLIDE_LAYOUT, &target_ref))
                    .await?;
                debug!("{}: layout falls back to {}", new_slide, layout);
            },
            None => warn!("{} has no slide layout", new_slide),
        }
    }

    let mapping = {
        let mut rewirer = Rewirer::new(source, source_slide, target, &new_slide, options, report);
        rewirer.rewire(doc.root_mut()).await?
    };
    debug!("{}: {} reference(s) rewired from {}", new_slide, mapping.len(), source_slide);

    target.commit_tree(&new_slide, doc).await?;
    target.register_override(&new_slide, ct::PML_SLIDE).await?;
    add_to_slide_list(target, &new_slide).await?;
    Ok(new_slide)
}

/// Layout of the first slide listed in the presentation.
async fn fallback_layout<T: ArchiveStore>(target: &mut Package<T>) -> Result<Option<PackURI>> {
    let Some(first) = presentation::slides(target).await?.into_iter().next() else {
        return Ok(None);
    };
    let layouts = target
        .resolve(&first.part, &RelSelector::by_type(rt::SLIDE_LAYOUT))
        .await?;
    layouts
        .into_iter()
        .find(|t| !t.is_external)
        .map(|t| PackURI::from_rel_ref(first.part.base_uri(), &t.file))
        .transpose()
        .map_err(|e| OoxmlError::Opc(OpcError::InvalidPackUri(e)))
}

/// Relate `slide` to the presentation and list it last.
async fn add_to_slide_list<T: ArchiveStore>(target: &mut Package<T>, slide: &PackURI) -> Result<()> {
    let pres = presentation::presentation_uri()?;
    let id = {
        let root = target.load(&pres).await?.root_mut();
        let list = presentation::slide_id_list(root)
            .ok_or_else(|| OoxmlError::InvalidFormat(format!("{} cannot hold a slide list", PRESENTATION)))?;
        presentation::next_slide_id(list).ok_or_else(|| {
            OoxmlError::InvalidFormat(format!(
                "{} has no slide id left after {}",
                PRESENTATION,
                presentation::MAX_SLIDE_ID
            ))
        })?
    };

    let r_id = target.allocate_id(&pres).await?;
    let target_ref = slide.relative_ref(pres.base_uri());
    target
        .register_relationship(&pres, NewRelationship::new(&r_id, rt::SLIDE, &target_ref))
        .await?;

    let root = target.load(&pres).await?.root_mut();
    let list = presentation::slide_id_list(root)
        .ok_or_else(|| OoxmlError::InvalidFormat(format!("{} cannot hold a slide list", PRESENTATION)))?;
    list.push_element(
        crate::common::xml::XmlElement::new(presentation::SLIDE_ID)
            .with_attr("id", &id.to_string())
            .with_attr("r:id", &r_id),
    );
    debug!("{}: sldId {} ({}) -> {}", PRESENTATION, id, r_id, slide);
    target.commit(&pres).await?;
    Ok(())
}
