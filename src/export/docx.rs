//! WordprocessingML (DOCX) writer. Formatting is applied directly on runs so
//! the package needs no style part.

use super::markdown::{body_lines, classify, parse_formatted_text, parse_sections, LineKind};
use super::{ooxml_package, xml_escape, ExportContent, FOOTER, XML_DECL};
use crate::error::WizardResult;

const CONTENT_TYPES: &str = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

#[derive(Default)]
struct RunStyle {
    bold: bool,
    italic: bool,
    /// Half-points, Word's unit for font size.
    size: Option<u32>,
}

fn run(text: &str, style: &RunStyle) -> String {
    let mut props = String::new();
    if style.bold {
        props.push_str("<w:b/>");
    }
    if style.italic {
        props.push_str("<w:i/>");
    }
    if let Some(sz) = style.size {
        props.push_str(&format!("<w:sz w:val=\"{sz}\"/>"));
    }
    let rpr = if props.is_empty() { String::new() } else { format!("<w:rPr>{props}</w:rPr>") };
    format!("<w:r>{rpr}<w:t xml:space=\"preserve\">{}</w:t></w:r>", xml_escape(text))
}

fn formatted_runs(text: &str) -> String {
    parse_formatted_text(text)
        .iter()
        .map(|seg| run(&seg.text, &RunStyle { bold: seg.bold, italic: seg.italic, size: None }))
        .collect()
}

fn paragraph(runs: &str, centered: bool, indent_twips: Option<u32>) -> String {
    let mut ppr = String::new();
    if centered {
        ppr.push_str("<w:jc w:val=\"center\"/>");
    }
    if let Some(left) = indent_twips {
        ppr.push_str(&format!("<w:ind w:left=\"{left}\" w:hanging=\"360\"/>"));
    }
    let ppr = if ppr.is_empty() { String::new() } else { format!("<w:pPr>{ppr}</w:pPr>") };
    format!("<w:p>{ppr}{runs}</w:p>")
}

const PAGE_BREAK: &str = "<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>";
const EMPTY_PARAGRAPH: &str = "<w:p/>";

fn document_body(content: &ExportContent<'_>) -> String {
    let mut body = String::new();
    let metadata = content.metadata();

    for (i, (variant, text)) in content.selected().into_iter().enumerate() {
        if i > 0 {
            body.push_str(PAGE_BREAK);
        }
        let title = format!("UDL Learning Materials: {}", variant.display_name());
        body.push_str(&paragraph(&run(&title, &RunStyle { bold: true, size: Some(40), ..Default::default() }), true, None));

        for (label, value) in &metadata {
            let runs = run(&format!("{label}: "), &RunStyle { bold: true, ..Default::default() })
                + &run(value, &RunStyle::default());
            body.push_str(&paragraph(&runs, false, None));
        }
        body.push_str(EMPTY_PARAGRAPH);

        for section in parse_sections(text) {
            let heading = run(&section.title, &RunStyle { bold: true, size: Some(28), ..Default::default() });
            body.push_str(&paragraph(&heading, false, None));

            let mut number = 0;
            for line in body_lines(&section.body) {
                let kind = classify(line);
                let (prefix, indent) = match kind {
                    LineKind::Bullet(_) => {
                        number = 0;
                        ("\u{2022} ".to_string(), Some(720))
                    }
                    LineKind::Numbered(_) => {
                        number += 1;
                        (format!("{number}. "), Some(720))
                    }
                    LineKind::Plain(_) => {
                        number = 0;
                        (String::new(), None)
                    }
                };
                let runs = run(&prefix, &RunStyle::default()) + &formatted_runs(kind.text());
                body.push_str(&paragraph(&runs, false, indent));
            }
        }
    }

    body.push_str(EMPTY_PARAGRAPH);
    body.push_str(&paragraph(
        &run(FOOTER, &RunStyle { italic: true, size: Some(18), ..Default::default() }),
        true,
        None,
    ));
    body
}

pub(super) fn render(content: &ExportContent<'_>) -> WizardResult<Vec<u8>> {
    let document = format!(
        "{XML_DECL}<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}<w:sectPr><w:pgSz w:w=\"12240\" w:h=\"15840\"/><w:pgMar w:top=\"1440\" w:right=\"1440\" w:bottom=\"1440\" w:left=\"1440\" w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/></w:sectPr></w:body></w:document>",
        document_body(content)
    );
    ooxml_package(&[
        ("[Content_Types].xml".to_string(), format!("{XML_DECL}{CONTENT_TYPES}")),
        ("_rels/.rels".to_string(), format!("{XML_DECL}{ROOT_RELS}")),
        ("word/document.xml".to_string(), document),
    ])
}
