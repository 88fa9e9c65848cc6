//! SpreadsheetML (XLSX) writer using inline strings, so no shared-string
//! table is needed.

use super::markdown::{body_lines, classify, parse_sections, plain_text, LineKind};
use super::{ooxml_package, xml_escape, ExportContent, FOOTER, XML_DECL};
use crate::error::WizardResult;

const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// Indices into `cellXfs` in `STYLES`.
#[derive(Clone, Copy)]
enum Style {
    Normal = 0,
    Bold = 1,
    Header = 2,
    Wrap = 3,
    Title = 4,
}

const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="4"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><color rgb="FFFFFFFF"/><name val="Calibri"/></font><font><b/><sz val="14"/><color rgb="FF6B46C1"/><name val="Calibri"/></font></fonts><fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FF6B46C1"/><bgColor indexed="64"/></patternFill></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="5"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"><alignment vertical="top"/></xf><xf numFmtId="0" fontId="2" fillId="2" borderId="0" xfId="0" applyFont="1" applyFill="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment wrapText="1" vertical="top"/></xf><xf numFmtId="0" fontId="3" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

struct Sheet {
    name: String,
    rows: Vec<Vec<(String, Style)>>,
    widths: [f32; 2],
}

impl Sheet {
    fn new(name: impl Into<String>, widths: [f32; 2]) -> Self {
        Self { name: name.into(), rows: Vec::new(), widths }
    }

    fn row(&mut self, cells: Vec<(String, Style)>) {
        self.rows.push(cells);
    }

    fn blank(&mut self) {
        self.rows.push(Vec::new());
    }

    fn to_xml(&self) -> String {
        let mut data = String::new();
        for (r, cells) in self.rows.iter().enumerate() {
            let row_num = r + 1;
            data.push_str(&format!("<row r=\"{row_num}\">"));
            for (c, (text, style)) in cells.iter().enumerate() {
                let col = (b'A' + c as u8) as char;
                data.push_str(&format!(
                    "<c r=\"{col}{row_num}\" s=\"{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                    *style as u8,
                    xml_escape(text)
                ));
            }
            data.push_str("</row>");
        }
        format!(
            "{XML_DECL}<worksheet xmlns=\"{NS_MAIN}\"><cols><col min=\"1\" max=\"1\" width=\"{}\" customWidth=\"1\"/><col min=\"2\" max=\"2\" width=\"{}\" customWidth=\"1\"/></cols><sheetData>{data}</sheetData><mergeCells count=\"1\"><mergeCell ref=\"A1:B1\"/></mergeCells></worksheet>",
            self.widths[0], self.widths[1]
        )
    }
}

fn cell(text: impl Into<String>, style: Style) -> (String, Style) {
    (text.into(), style)
}

/// Section body as plain lines, list markers kept as text.
fn flatten_body(body: &str) -> String {
    let mut number = 0;
    body_lines(body)
        .map(|line| {
            let kind = classify(line);
            let text = plain_text(kind.text());
            match kind {
                LineKind::Bullet(_) => {
                    number = 0;
                    format!("\u{2022} {text}")
                }
                LineKind::Numbered(_) => {
                    number += 1;
                    format!("{number}. {text}")
                }
                LineKind::Plain(_) => {
                    number = 0;
                    text
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sheets(content: &ExportContent<'_>) -> Vec<Sheet> {
    let selected = content.selected();

    let mut overview = Sheet::new("Overview", [25.0, 80.0]);
    overview.row(vec![cell("UDL Learning Materials", Style::Title)]);
    overview.blank();
    for (label, value) in content.metadata() {
        overview.row(vec![cell(label, Style::Bold), cell(value, Style::Wrap)]);
    }
    overview.blank();
    overview.row(vec![cell("Version", Style::Header), cell("Sections", Style::Header)]);
    for (variant, text) in &selected {
        let titles: Vec<String> = parse_sections(text).into_iter().map(|s| s.title).collect();
        overview.row(vec![cell(variant.display_name(), Style::Bold), cell(titles.join(", "), Style::Wrap)]);
    }
    overview.blank();
    overview.row(vec![cell(FOOTER, Style::Normal)]);

    let mut out = vec![overview];
    for (variant, text) in selected {
        let mut sheet = Sheet::new(variant.file_key(), [25.0, 100.0]);
        sheet.row(vec![cell(variant.display_name(), Style::Title)]);
        sheet.blank();
        sheet.row(vec![cell("Section", Style::Header), cell("Content", Style::Header)]);
        for section in parse_sections(text) {
            sheet.row(vec![cell(section.title, Style::Bold), cell(flatten_body(&section.body), Style::Wrap)]);
        }
        out.push(sheet);
    }
    out
}

pub(super) fn render(content: &ExportContent<'_>) -> WizardResult<Vec<u8>> {
    let sheets = sheets(content);

    let overrides: String = (1..=sheets.len())
        .map(|n| format!("<Override PartName=\"/xl/worksheets/sheet{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>"))
        .collect();
    let content_types = format!(
        "{XML_DECL}<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"><Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/><Default Extension=\"xml\" ContentType=\"application/xml\"/><Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/><Override PartName=\"/xl/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml\"/>{overrides}</Types>"
    );
    let root_rels = format!(
        "{XML_DECL}<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"><Relationship Id=\"rId1\" Type=\"{REL_TYPE}/officeDocument\" Target=\"xl/workbook.xml\"/></Relationships>"
    );
    let sheet_entries: String = sheets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>", xml_escape(&s.name), i + 1, i + 1))
        .collect();
    let workbook = format!(
        "{XML_DECL}<workbook xmlns=\"{NS_MAIN}\" xmlns:r=\"{REL_TYPE}\"><sheets>{sheet_entries}</sheets></workbook>"
    );
    let sheet_rels: String = (1..=sheets.len())
        .map(|n| format!("<Relationship Id=\"rId{n}\" Type=\"{REL_TYPE}/worksheet\" Target=\"worksheets/sheet{n}.xml\"/>"))
        .collect();
    let workbook_rels = format!(
        "{XML_DECL}<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{sheet_rels}<Relationship Id=\"rId{}\" Type=\"{REL_TYPE}/styles\" Target=\"styles.xml\"/></Relationships>",
        sheets.len() + 1
    );

    let mut parts = vec![
        ("[Content_Types].xml".to_string(), content_types),
        ("_rels/.rels".to_string(), root_rels),
        ("xl/workbook.xml".to_string(), workbook),
        ("xl/_rels/workbook.xml.rels".to_string(), workbook_rels),
        ("xl/styles.xml".to_string(), format!("{XML_DECL}{STYLES}")),
    ];
    for (i, sheet) in sheets.iter().enumerate() {
        parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet.to_xml()));
    }
    ooxml_package(&parts)
}
