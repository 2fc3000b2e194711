//! Builders for small presentation packages used across the pptx tests.

use crate::ooxml::opc::Package;
use crate::ooxml::opc::constants::{content_type as ct, relationship_type as rt};
use crate::ooxml::opc::phys_pkg::tests::zip_fixture;

pub(crate) const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

pub(crate) fn content_types(defaults: &[(&str, &str)], overrides: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#,
    );
    for (ext, content_type) in defaults {
        xml.push_str(&format!(r#"<Default Extension="{}" ContentType="{}"/>"#, ext, content_type));
    }
    for (part, content_type) in overrides {
        xml.push_str(&format!(r#"<Override PartName="{}" ContentType="{}"/>"#, part, content_type));
    }
    xml.push_str("</Types>");
    xml
}

/// Relationship part from (id, type, target) triples; targets starting with
/// "http" are external.
pub(crate) fn rels(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, reltype, target) in entries {
        let mode = if target.starts_with("http") {
            r#" TargetMode="External""#
        } else {
            ""
        };
        xml.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
            id, reltype, target, mode
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

pub(crate) fn slide(shapes: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld {}><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{}</p:spTree></p:cSld></p:sld>"#,
        NS, shapes
    )
}

fn non_visual(id: u32, name: &str, creation_id: Option<&str>) -> String {
    match creation_id {
        Some(cid) => format!(
            r#"<p:cNvPr id="{}" name="{}"><a:extLst><a:ext uri="{{FF2B5EF4-FFF2-40B4-BE49-F238E27FC236}}"><a16:creationId xmlns:a16="http://schemas.microsoft.com/office/drawing/2014/main" id="{}"/></a:ext></a:extLst></p:cNvPr>"#,
            id, name, cid
        ),
        None => format!(r#"<p:cNvPr id="{}" name="{}"/>"#, id, name),
    }
}

pub(crate) fn shape(id: u32, name: &str, creation_id: Option<&str>) -> String {
    format!(
        r#"<p:sp><p:nvSpPr>{}<p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
        non_visual(id, name, creation_id),
        name
    )
}

pub(crate) fn linked_shape(id: u32, name: &str, link_rid: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr>{}<p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:rPr><a:hlinkClick r:id="{}"/></a:rPr><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
        non_visual(id, name, None),
        link_rid,
        name
    )
}

pub(crate) fn picture(id: u32, name: &str, embed_rid: &str) -> String {
    format!(
        r#"<p:pic><p:nvPicPr>{}<p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{}"/></p:blipFill><p:spPr/></p:pic>"#,
        non_visual(id, name, None),
        embed_rid
    )
}

pub(crate) fn chart_frame(id: u32, name: &str, creation_id: Option<&str>, chart_rid: &str) -> String {
    format!(
        r#"<p:graphicFrame><p:nvGraphicFramePr>{}<p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/chart"><c:chart xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" r:id="{}"/></a:graphicData></a:graphic></p:graphicFrame>"#,
        non_visual(id, name, creation_id),
        chart_rid
    )
}

pub(crate) const CHART: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><c:chart><c:plotArea><c:barChart><c:ser><c:tx><c:strRef><c:f>Sheet1!$B$1</c:f></c:strRef></c:tx></c:ser></c:barChart></c:plotArea></c:chart><c:externalData r:id="rId1"><c:autoUpdate val="0"/></c:externalData></c:chartSpace>"#;

/// Minimal presentation part listing `slides` as (sldId, rId) pairs.
pub(crate) fn presentation(slides: &[(u32, &str)]) -> String {
    let ids: String = slides
        .iter()
        .map(|(id, rid)| format!(r#"<p:sldId id="{}" r:id="{}"/>"#, id, rid))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation {}><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{}</p:sldIdLst><p:sldSz cx="12192000" cy="6858000"/></p:presentation>"#,
        NS, ids
    )
}

pub(crate) fn package(entries: &[(&str, Vec<u8>)]) -> Package {
    let borrowed: Vec<(&str, &[u8])> = entries.iter().map(|(n, d)| (*n, d.as_slice())).collect();
    Package::from_bytes(&zip_fixture(&borrowed)).unwrap()
}

pub(crate) const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfixture";

/// Package A: slide 1 with a titled shape and a picture, slide 2 with a chart
/// backed by an embedded workbook.
pub(crate) fn source_package() -> Package {
    let slide1 = slide(&format!(
        "{}{}{}",
        shape(2, "Title 1", Some("{A0000001-0000-0000-0000-000000000000}")),
        picture(3, "Logo", "rId2"),
        linked_shape(4, "Link", "rId3")
    ));
    let slide2 = slide(&chart_frame(
        5,
        "Revenue Chart",
        Some("{A0000005-0000-0000-0000-000000000000}"),
        "rId5",
    ));
    package(&[
        (
            "[Content_Types].xml",
            content_types(
                &[("png", ct::PNG), ("xlsx", ct::SML_SHEET)],
                &[
                    ("/ppt/presentation.xml", "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"),
                    ("/ppt/slides/slide1.xml", ct::PML_SLIDE),
                    ("/ppt/slides/slide2.xml", ct::PML_SLIDE),
                    ("/ppt/charts/chart3.xml", ct::DML_CHART),
                    ("/ppt/charts/style3.xml", ct::MS_CHART_STYLE),
                ],
            )
            .into_bytes(),
        ),
        (
            "ppt/presentation.xml",
            presentation(&[(256, "rId2"), (257, "rId3")]).into_bytes(),
        ),
        (
            "ppt/_rels/presentation.xml.rels",
            rels(&[
                ("rId1", rt::SLIDE_MASTER, "slideMasters/slideMaster1.xml"),
                ("rId2", rt::SLIDE, "slides/slide1.xml"),
                ("rId3", rt::SLIDE, "slides/slide2.xml"),
            ])
            .into_bytes(),
        ),
        ("ppt/slides/slide1.xml", slide1.into_bytes()),
        (
            "ppt/slides/_rels/slide1.xml.rels",
            rels(&[
                ("rId1", rt::SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml"),
                ("rId2", rt::IMAGE, "../media/image4.png"),
                ("rId3", rt::HYPERLINK, "https://example.com/q3"),
            ])
            .into_bytes(),
        ),
        ("ppt/slides/slide2.xml", slide2.into_bytes()),
        (
            "ppt/slides/_rels/slide2.xml.rels",
            rels(&[
                ("rId1", rt::SLIDE_LAYOUT, "../slideLayouts/slideLayout2.xml"),
                ("rId5", rt::CHART, "../charts/chart3.xml"),
            ])
            .into_bytes(),
        ),
        ("ppt/media/image4.png", PNG.to_vec()),
        ("ppt/charts/chart3.xml", CHART.as_bytes().to_vec()),
        (
            "ppt/charts/_rels/chart3.xml.rels",
            rels(&[
                ("rId1", rt::PACKAGE, "../embeddings/Microsoft_Excel_Worksheet.xlsx"),
                ("rId2", rt::CHART_STYLE, "style3.xml"),
            ])
            .into_bytes(),
        ),
        ("ppt/charts/style3.xml", b"<cs:chartStyle/>".to_vec()),
        (
            "ppt/embeddings/Microsoft_Excel_Worksheet.xlsx",
            crate::ooxml::pptx::workbook::tests::workbook_fixture(true),
        ),
    ])
}

/// Package B: one slide with three shapes and an existing chart part.
pub(crate) fn target_package() -> Package {
    let slide1 = slide(&format!(
        "{}{}{}",
        shape(2, "Title 1", Some("{B0000001-0000-0000-0000-000000000000}")),
        shape(3, "Logo", None),
        shape(4, "Footer", None)
    ));
    package(&[
        (
            "[Content_Types].xml",
            content_types(
                &[],
                &[
                    ("/ppt/presentation.xml", "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"),
                    ("/ppt/slides/slide1.xml", ct::PML_SLIDE),
                    ("/ppt/charts/chart1.xml", ct::DML_CHART),
                ],
            )
            .into_bytes(),
        ),
        (
            "ppt/presentation.xml",
            presentation(&[(256, "rId2")]).into_bytes(),
        ),
        (
            "ppt/_rels/presentation.xml.rels",
            rels(&[
                ("rId1", rt::SLIDE_MASTER, "slideMasters/slideMaster1.xml"),
                ("rId2", rt::SLIDE, "slides/slide1.xml"),
            ])
            .into_bytes(),
        ),
        ("ppt/slides/slide1.xml", slide1.into_bytes()),
        (
            "ppt/slides/_rels/slide1.xml.rels",
            rels(&[("rId1", rt::SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml")]).into_bytes(),
        ),
        ("ppt/slideLayouts/slideLayout1.xml", b"<p:sldLayout/>".to_vec()),
        ("ppt/charts/chart1.xml", CHART.as_bytes().to_vec()),
    ])
}
