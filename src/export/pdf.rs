//! Plain PDF 1.4 writer: US Letter pages, the standard Helvetica faces with
//! WinAnsi encoding, greedy word wrap. Inline emphasis is flattened.

use super::markdown::{body_lines, classify, parse_sections, plain_text, LineKind, CHECKBOX_CHECKED, CHECKBOX_UNCHECKED};
use super::{ExportContent, FOOTER};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH: f32 = 0.5;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
    Italic,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
            Face::Italic => "F3",
        }
    }
}

struct Line {
    text: String,
    face: Face,
    size: f32,
    indent: f32,
    centered: bool,
    space_before: f32,
}

enum Item {
    Line(Line),
    PageBreak,
}

fn wrap(text: &str, size: f32, indent: f32) -> Vec<String> {
    let usable = PAGE_WIDTH - 2.0 * MARGIN - indent;
    let max_chars = ((usable / (size * AVG_GLYPH)) as usize).max(10);
    let mut lines = Vec::new();
    let mut current = String::new();
    // Words wider than a line (long URLs) are hard-split.
    let pieces = text.split_whitespace().flat_map(|word| {
        let chars: Vec<char> = word.chars().collect();
        chars.chunks(max_chars).map(|c| c.iter().collect::<String>()).collect::<Vec<_>>()
    });
    for word in pieces {
        let len = word.chars().count();
        let needed = if current.is_empty() { len } else { current.chars().count() + 1 + len };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn push_wrapped(items: &mut Vec<Item>, text: &str, face: Face, size: f32, indent: f32, centered: bool, space_before: f32) {
    for (i, chunk) in wrap(text, size, indent).into_iter().enumerate() {
        items.push(Item::Line(Line {
            text: chunk,
            face,
            size,
            indent,
            centered,
            space_before: if i == 0 { space_before } else { 0.0 },
        }));
    }
}

fn layout(content: &ExportContent<'_>) -> Vec<Item> {
    let mut items = Vec::new();
    let metadata = content.metadata();

    for (i, (variant, text)) in content.selected().into_iter().enumerate() {
        if i > 0 {
            items.push(Item::PageBreak);
        }
        let title = format!("UDL Learning Materials: {}", variant.display_name());
        push_wrapped(&mut items, &title, Face::Bold, 18.0, 0.0, true, 0.0);
        for (n, (label, value)) in metadata.iter().enumerate() {
            let space = if n == 0 { 14.0 } else { 0.0 };
            push_wrapped(&mut items, &format!("{label}: {value}"), Face::Regular, 11.0, 0.0, false, space);
        }

        for section in parse_sections(text) {
            push_wrapped(&mut items, &section.title, Face::Bold, 14.0, 0.0, false, 14.0);
            for line in body_lines(&section.body) {
                let kind = classify(line);
                let body = plain_text(kind.text());
                match kind {
                    LineKind::Bullet(_) => push_wrapped(&mut items, &format!("\u{2022} {body}"), Face::Regular, 11.0, 18.0, false, 2.0),
                    LineKind::Numbered(_) => push_wrapped(&mut items, &plain_text(line), Face::Regular, 11.0, 18.0, false, 2.0),
                    LineKind::Plain(_) => push_wrapped(&mut items, &body, Face::Regular, 11.0, 0.0, false, 2.0),
                }
            }
        }
    }
    push_wrapped(&mut items, FOOTER, Face::Italic, 9.0, 0.0, true, 30.0);
    items
}

/// Encode for a WinAnsi font and escape PDF string delimiters.
fn pdf_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(b'(');
    for ch in text.chars() {
        let mapped: &[u8] = match ch {
            '(' => b"\\(",
            ')' => b"\\)",
            '\\' => b"\\\\",
            '\u{2022}' => &[0x95],
            '\u{2013}' => &[0x96],
            '\u{2014}' => &[0x97],
            '\u{2018}' => &[0x91],
            '\u{2019}' => &[0x92],
            '\u{201C}' => &[0x93],
            '\u{201D}' => &[0x94],
            '\u{2026}' => &[0x85],
            c if c == CHECKBOX_UNCHECKED => b"[ ]",
            c if c == CHECKBOX_CHECKED => b"[x]",
            _ => &[],
        };
        if !mapped.is_empty() {
            out.extend_from_slice(mapped);
        } else if (ch as u32) >= 0x20 && (ch as u32) < 0x7f || ((ch as u32) >= 0xa0 && (ch as u32) <= 0xff) {
            out.push(ch as u32 as u8);
        } else {
            out.push(b'?');
        }
    }
    out.push(b')');
    out
}

/// One content stream per page.
fn paginate(items: &[Item]) -> Vec<Vec<u8>> {
    let mut pages = Vec::new();
    let mut stream = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for item in items {
        let line = match item {
            Item::PageBreak => {
                pages.push(std::mem::take(&mut stream));
                y = PAGE_HEIGHT - MARGIN;
                continue;
            }
            Item::Line(line) => line,
        };
        let advance = line.space_before + line.size * 1.3;
        if y - advance < MARGIN && !stream.is_empty() {
            pages.push(std::mem::take(&mut stream));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= advance;

        let width = line.text.chars().count() as f32 * line.size * AVG_GLYPH;
        let x = if line.centered {
            ((PAGE_WIDTH - width) / 2.0).max(MARGIN)
        } else {
            MARGIN + line.indent
        };
        stream.extend_from_slice(
            format!("BT /{} {:.1} Tf {:.2} {:.2} Td ", line.face.resource(), line.size, x, y).as_bytes(),
        );
        stream.extend_from_slice(&pdf_string(&line.text));
        stream.extend_from_slice(b" Tj ET\n");
    }
    pages.push(stream);
    pages
}

pub(super) fn render(content: &ExportContent<'_>) -> Vec<u8> {
    let pages = paginate(&layout(content));

    // Object numbering: 1 catalog, 2 page tree, 3-5 fonts, then page/content pairs.
    let first_page_obj = 6;
    let mut objects: Vec<Vec<u8>> = Vec::new();
    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", first_page_obj + 2 * i)).collect();
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages.len()).into_bytes());
    for base in ["Helvetica", "Helvetica-Bold", "Helvetica-Oblique"] {
        objects.push(format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>").into_bytes());
    }
    for (i, stream) in pages.iter().enumerate() {
        let content_obj = first_page_obj + 2 * i + 1;
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] /Resources << /Font << /F1 3 0 R /F2 4 0 R /F3 5 0 R >> >> /Contents {content_obj} 0 R >>"
            )
            .into_bytes(),
        );
        let mut obj = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        obj.extend_from_slice(stream);
        obj.extend_from_slice(b"\nendstream");
        objects.push(obj);
    }

    let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", objects.len() + 1, xref_at).as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::super::tests::{sample_form, sample_materials};
    use super::*;
    use crate::domain::Variant;

    fn contains(hay: &[u8], needle: &[u8]) -> bool {
        hay.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn one_page_per_variant_with_valid_trailer() {
        let form = sample_form();
        let materials = sample_materials();
        let content = ExportContent { form: &form, materials: &materials, variant: None };
        let pdf = render(&content);
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        assert!(contains(&pdf, b"/Count 5"));
        assert!(contains(&pdf, b"(UDL Learning Materials: Visual-Heavy)"));
        assert!(contains(&pdf, b"[ ] I can explain my answer"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let form = sample_form();
        let materials = sample_materials();
        let content = ExportContent { form: &form, materials: &materials, variant: Some(Variant::Simplified) };
        let pdf = render(&content);
        let text = String::from_utf8_lossy(&pdf);
        let xref = text.find("xref\n").unwrap();
        let first_entry = text[xref..].lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();
        assert!(pdf[offset..].starts_with(b"1 0 obj"));
    }

    #[test]
    fn strings_are_escaped_and_mapped() {
        assert_eq!(pdf_string("a(b)\\"), b"(a\\(b\\)\\\\)".to_vec());
        assert_eq!(pdf_string("\u{2022} caf\u{e9} \u{4e2d}"), vec![b'(', 0x95, b' ', b'c', b'a', b'f', 0xe9, b' ', b'?', b')']);
    }

    #[test]
    fn long_text_wraps_and_paginates() {
        let long = "word ".repeat(2000);
        let lines = wrap(&long, 11.0, 0.0);
        assert!(lines.len() > 50);
        let items: Vec<Item> = lines
            .into_iter()
            .map(|text| Item::Line(Line { text, face: Face::Regular, size: 11.0, indent: 0.0, centered: false, space_before: 0.0 }))
            .collect();
        assert!(paginate(&items).len() > 1);
    }

    #[test]
    fn overlong_words_are_split_to_the_line_width() {
        let url = format!("https://example.org/{}", "a".repeat(300));
        let lines = wrap(&format!("See {url} today"), 11.0, 18.0);
        let max_chars = ((PAGE_WIDTH - 2.0 * MARGIN - 18.0) / (11.0 * AVG_GLYPH)) as usize;
        assert!(lines.len() >= 3);
        assert!(lines.iter().all(|l| l.chars().count() <= max_chars), "{lines:?}");
        assert_eq!(lines.concat().replace(' ', ""), format!("See{url}today"));
    }
}
