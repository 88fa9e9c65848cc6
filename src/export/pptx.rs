//! PresentationML (PPTX) writer. One blank layout; every slide is built from
//! absolutely positioned text boxes.

use super::markdown::{body_lines, classify, parse_formatted_text, parse_sections, LineKind};
use super::{generated_date, ooxml_package, xml_escape, ExportContent, FOOTER, XML_DECL};
use crate::error::WizardResult;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// 10in x 7.5in in EMU.
const SLIDE_CX: u64 = 9_144_000;
const SLIDE_CY: u64 = 6_858_000;
const EMU_PER_INCH: u64 = 914_400;

/// Body lines per slide before a section continues on the next one.
const LINES_PER_SLIDE: usize = 10;

const PURPLE: &str = "6B46C1";
const GREY: &str = "555555";

struct TextBox<'a> {
    x: u64,
    y: u64,
    cx: u64,
    cy: u64,
    paragraphs: Vec<String>,
    name: &'a str,
}

fn text_run(text: &str, size: u32, bold: bool, italic: bool, color: &str) -> String {
    format!(
        "<a:r><a:rPr lang=\"en-US\" sz=\"{size}\" b=\"{}\" i=\"{}\" dirty=\"0\"><a:solidFill><a:srgbClr val=\"{color}\"/></a:solidFill></a:rPr><a:t>{}</a:t></a:r>",
        u8::from(bold),
        u8::from(italic),
        xml_escape(text)
    )
}

fn para(runs: &str, centered: bool) -> String {
    let algn = if centered { "ctr" } else { "l" };
    format!("<a:p><a:pPr algn=\"{algn}\"/>{runs}</a:p>")
}

fn shape(id: usize, tb: &TextBox<'_>) -> String {
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"{}\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></a:xfrm><a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap=\"square\"><a:normAutofit/></a:bodyPr><a:lstStyle/>{}</p:txBody></p:sp>",
        xml_escape(tb.name),
        tb.x,
        tb.y,
        tb.cx,
        tb.cy,
        tb.paragraphs.concat()
    )
}

fn slide_xml(boxes: &[TextBox<'_>]) -> String {
    let shapes: String = boxes.iter().enumerate().map(|(i, tb)| shape(i + 2, tb)).collect();
    format!(
        "{XML_DECL}<p:sld xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"
    )
}

fn inches(n: f64) -> u64 {
    (n * EMU_PER_INCH as f64) as u64
}

fn title_slide(title: &str, metadata: &[(&'static str, String)]) -> String {
    let heading = TextBox {
        x: inches(0.5),
        y: inches(2.0),
        cx: SLIDE_CX - inches(1.0),
        cy: inches(1.5),
        paragraphs: vec![para(&text_run(title, 3600, true, false, PURPLE), true)],
        name: "Title",
    };
    let meta = TextBox {
        x: inches(0.5),
        y: inches(3.75),
        cx: SLIDE_CX - inches(1.0),
        cy: inches(2.5),
        paragraphs: metadata
            .iter()
            .map(|(label, value)| {
                para(&(text_run(&format!("{label}: "), 1800, true, false, GREY) + &text_run(value, 1800, false, false, GREY)), true)
            })
            .collect(),
        name: "Subtitle",
    };
    slide_xml(&[heading, meta])
}

fn body_paragraph(line: &str, number: &mut usize) -> String {
    let kind = classify(line);
    let prefix = match kind {
        LineKind::Bullet(_) => {
            *number = 0;
            "\u{2022} ".to_string()
        }
        LineKind::Numbered(_) => {
            *number += 1;
            format!("{number}. ")
        }
        LineKind::Plain(_) => {
            *number = 0;
            String::new()
        }
    };
    let mut runs = if prefix.is_empty() { String::new() } else { text_run(&prefix, 1800, false, false, "333333") };
    for seg in parse_formatted_text(kind.text()) {
        runs.push_str(&text_run(&seg.text, 1800, seg.bold, seg.italic, "333333"));
    }
    para(&runs, false)
}

fn section_slides(title: &str, body: &str) -> Vec<String> {
    let lines: Vec<&str> = body_lines(body).collect();
    let chunks: Vec<&[&str]> = if lines.is_empty() { vec![&[][..]] } else { lines.chunks(LINES_PER_SLIDE).collect() };
    let mut number = 0;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let heading = if i == 0 { title.to_string() } else { format!("{title} (cont.)") };
            let head = TextBox {
                x: inches(0.5),
                y: inches(0.4),
                cx: SLIDE_CX - inches(1.0),
                cy: inches(1.0),
                paragraphs: vec![para(&text_run(&heading, 2800, true, false, PURPLE), false)],
                name: "Title",
            };
            let content = TextBox {
                x: inches(0.5),
                y: inches(1.5),
                cx: SLIDE_CX - inches(1.0),
                cy: SLIDE_CY - inches(2.0),
                paragraphs: chunk.iter().map(|line| body_paragraph(line, &mut number)).collect(),
                name: "Content",
            };
            slide_xml(&[head, content])
        })
        .collect()
}

fn closing_slide(date: &str) -> String {
    let text = TextBox {
        x: inches(0.5),
        y: inches(2.75),
        cx: SLIDE_CX - inches(1.0),
        cy: inches(2.0),
        paragraphs: vec![
            para(&text_run(FOOTER, 2400, true, false, PURPLE), true),
            para(&text_run(date, 1600, false, true, GREY), true),
        ],
        name: "Closing",
    };
    slide_xml(&[text])
}

fn slides(content: &ExportContent<'_>) -> Vec<String> {
    let metadata = content.metadata();
    let mut out = Vec::new();
    for (variant, text) in content.selected() {
        out.push(title_slide(&format!("UDL Learning Materials: {}", variant.display_name()), &metadata));
        for section in parse_sections(text) {
            out.extend(section_slides(&section.title, &section.body));
        }
    }
    out.push(closing_slide(&generated_date(content.materials.generated_at)));
    out
}

fn content_types(slide_count: usize) -> String {
    let slide_overrides: String = (1..=slide_count)
        .map(|n| format!("<Override PartName=\"/ppt/slides/slide{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slide+xml\"/>"))
        .collect();
    format!(
        "{XML_DECL}<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"><Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/><Default Extension=\"xml\" ContentType=\"application/xml\"/><Override PartName=\"/ppt/presentation.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml\"/><Override PartName=\"/ppt/slideMasters/slideMaster1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml\"/><Override PartName=\"/ppt/slideLayouts/slideLayout1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml\"/><Override PartName=\"/ppt/theme/theme1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.theme+xml\"/>{slide_overrides}</Types>"
    )
}

fn presentation(slide_count: usize) -> String {
    let ids: String = (1..=slide_count)
        .map(|n| format!("<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 255 + n, n + 2))
        .collect();
    format!(
        "{XML_DECL}<p:presentation xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\"><p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"rId1\"/></p:sldMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx=\"{SLIDE_CX}\" cy=\"{SLIDE_CY}\" type=\"screen4x3\"/><p:notesSz cx=\"{SLIDE_CY}\" cy=\"{SLIDE_CX}\"/></p:presentation>"
    )
}

fn presentation_rels(slide_count: usize) -> String {
    let slides: String = (1..=slide_count)
        .map(|n| format!("<Relationship Id=\"rId{}\" Type=\"{REL_TYPE}/slide\" Target=\"slides/slide{n}.xml\"/>", n + 2))
        .collect();
    format!(
        "{XML_DECL}<Relationships xmlns=\"{REL_NS}\"><Relationship Id=\"rId1\" Type=\"{REL_TYPE}/slideMaster\" Target=\"slideMasters/slideMaster1.xml\"/><Relationship Id=\"rId2\" Type=\"{REL_TYPE}/theme\" Target=\"theme/theme1.xml\"/>{slides}</Relationships>"
    )
}

fn slide_master() -> String {
    format!(
        "{XML_DECL}<p:sldMaster xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\"><p:cSld><p:bg><p:bgRef idx=\"1001\"><a:schemeClr val=\"bg1\"/></p:bgRef></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMap bg1=\"lt1\" tx1=\"dk1\" bg2=\"lt2\" tx2=\"dk2\" accent1=\"accent1\" accent2=\"accent2\" accent3=\"accent3\" accent4=\"accent4\" accent5=\"accent5\" accent6=\"accent6\" hlink=\"hlink\" folHlink=\"folHlink\"/><p:sldLayoutIdLst><p:sldLayoutId id=\"2147483649\" r:id=\"rId1\"/></p:sldLayoutIdLst></p:sldMaster>"
    )
}

fn slide_layout() -> String {
    format!(
        "{XML_DECL}<p:sldLayout xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\" type=\"blank\" preserve=\"1\"><p:cSld name=\"Blank\"><p:spTree><p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"
    )
}

fn rels_to(kind: &str, target: &str) -> String {
    format!("{XML_DECL}<Relationships xmlns=\"{REL_NS}\"><Relationship Id=\"rId1\" Type=\"{REL_TYPE}/{kind}\" Target=\"{target}\"/></Relationships>")
}

fn master_rels() -> String {
    format!(
        "{XML_DECL}<Relationships xmlns=\"{REL_NS}\"><Relationship Id=\"rId1\" Type=\"{REL_TYPE}/slideLayout\" Target=\"../slideLayouts/slideLayout1.xml\"/><Relationship Id=\"rId2\" Type=\"{REL_TYPE}/theme\" Target=\"../theme/theme1.xml\"/></Relationships>"
    )
}

fn theme() -> String {
    let fill = "<a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill>";
    let line = "<a:ln w=\"9525\"><a:solidFill><a:schemeClr val=\"phClr\"/></a:solidFill></a:ln>";
    let effect = "<a:effectStyle><a:effectLst/></a:effectStyle>";
    format!(
        "{XML_DECL}<a:theme xmlns:a=\"{NS_A}\" name=\"Wizard\"><a:themeElements>\
<a:clrScheme name=\"Wizard\"><a:dk1><a:srgbClr val=\"000000\"/></a:dk1><a:lt1><a:srgbClr val=\"FFFFFF\"/></a:lt1><a:dk2><a:srgbClr val=\"333333\"/></a:dk2><a:lt2><a:srgbClr val=\"EEEEEE\"/></a:lt2><a:accent1><a:srgbClr val=\"{PURPLE}\"/></a:accent1><a:accent2><a:srgbClr val=\"2B6CB0\"/></a:accent2><a:accent3><a:srgbClr val=\"2F855A\"/></a:accent3><a:accent4><a:srgbClr val=\"C05621\"/></a:accent4><a:accent5><a:srgbClr val=\"B83280\"/></a:accent5><a:accent6><a:srgbClr val=\"718096\"/></a:accent6><a:hlink><a:srgbClr val=\"0563C1\"/></a:hlink><a:folHlink><a:srgbClr val=\"954F72\"/></a:folHlink></a:clrScheme>\
<a:fontScheme name=\"Wizard\"><a:majorFont><a:latin typeface=\"Calibri\"/><a:ea typeface=\"\"/><a:cs typeface=\"\"/></a:majorFont><a:minorFont><a:latin typeface=\"Calibri\"/><a:ea typeface=\"\"/><a:cs typeface=\"\"/></a:minorFont></a:fontScheme>\
<a:fmtScheme name=\"Wizard\"><a:fillStyleLst>{fill}{fill}{fill}</a:fillStyleLst><a:lnStyleLst>{line}{line}{line}</a:lnStyleLst><a:effectStyleLst>{effect}{effect}{effect}</a:effectStyleLst><a:bgFillStyleLst>{fill}{fill}{fill}</a:bgFillStyleLst></a:fmtScheme>\
</a:themeElements></a:theme>"
    )
}

pub(super) fn render(content: &ExportContent<'_>) -> WizardResult<Vec<u8>> {
    let slides = slides(content);
    let count = slides.len();

    let mut parts = vec![
        ("[Content_Types].xml".to_string(), content_types(count)),
        ("_rels/.rels".to_string(), rels_to("officeDocument", "ppt/presentation.xml")),
        ("ppt/presentation.xml".to_string(), presentation(count)),
        ("ppt/_rels/presentation.xml.rels".to_string(), presentation_rels(count)),
        ("ppt/slideMasters/slideMaster1.xml".to_string(), slide_master()),
        ("ppt/slideMasters/_rels/slideMaster1.xml.rels".to_string(), master_rels()),
        ("ppt/slideLayouts/slideLayout1.xml".to_string(), slide_layout()),
        (
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels".to_string(),
            rels_to("slideMaster", "../slideMasters/slideMaster1.xml"),
        ),
        ("ppt/theme/theme1.xml".to_string(), theme()),
    ];
    for (i, xml) in slides.into_iter().enumerate() {
        let n = i + 1;
        parts.push((format!("ppt/slides/slide{n}.xml"), xml));
        parts.push((
            format!("ppt/slides/_rels/slide{n}.xml.rels"),
            rels_to("slideLayout", "../slideLayouts/slideLayout1.xml"),
        ));
    }
    ooxml_package(&parts)
}
