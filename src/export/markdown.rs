//! The small subset of markdown models emit that the renderers understand:
//! section headers, bullets, numbered items, bold/italic runs and checkboxes.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CHECKBOX_UNCHECKED: char = '\u{2610}';
pub const CHECKBOX_CHECKED: char = '\u{2611}';

static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,3}\s*\*{0,2}(.+?)\*{0,2}\s*$").expect("static regex"));
static BOLD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*(.+?)\*\*\s*$").expect("static regex"));
static INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*\*(.+?)\*\*\*|\*\*(.+?)\*\*|\*(.+?)\*").expect("static regex")
});
static CHECKED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[xX]\]").expect("static regex"));
static UNCHECKED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s?\]").expect("static regex"));
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*").expect("static regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    Bullet(&'a str),
    Numbered(&'a str),
    Plain(&'a str),
}

impl<'a> LineKind<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            LineKind::Bullet(t) | LineKind::Numbered(t) | LineKind::Plain(t) => t,
        }
    }
}

/// Split content into titled sections. Text before the first header goes
/// under "Content"; content with no headers becomes a single section.
pub fn parse_sections(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title = "Content".to_string();
    let mut lines: Vec<&str> = Vec::new();

    for line in content.lines() {
        let header = HEADER.captures(line).or_else(|| BOLD_LINE.captures(line));
        match header {
            Some(caps) => {
                if !lines.is_empty() {
                    sections.push(Section { title: title.clone(), body: lines.join("\n").trim().to_string() });
                    lines.clear();
                }
                title = caps[1].trim().to_string();
            }
            None => lines.push(line),
        }
    }
    if !lines.is_empty() {
        sections.push(Section { title, body: lines.join("\n").trim().to_string() });
    }

    if sections.is_empty() {
        sections.push(Section { title: "Content".into(), body: content.trim().to_string() });
    }
    sections
}

pub fn convert_checkboxes(text: &str) -> String {
    let checked = CHECKED.replace_all(text, CHECKBOX_CHECKED.to_string().as_str()).into_owned();
    UNCHECKED.replace_all(&checked, CHECKBOX_UNCHECKED.to_string().as_str()).into_owned()
}

/// Bold/italic runs of one line, checkboxes already converted.
pub fn parse_formatted_text(text: &str) -> Vec<Segment> {
    let text = convert_checkboxes(text);
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in INLINE.captures_iter(&text) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() > last {
            segments.push(Segment { text: text[last..whole.start()].to_string(), bold: false, italic: false });
        }
        let (inner, bold, italic) = if let Some(m) = caps.get(1) {
            (m.as_str(), true, true)
        } else if let Some(m) = caps.get(2) {
            (m.as_str(), true, false)
        } else {
            (caps.get(3).map_or("", |m| m.as_str()), false, true)
        };
        segments.push(Segment { text: inner.to_string(), bold, italic });
        last = whole.end();
    }
    if last < text.len() {
        segments.push(Segment { text: text[last..].to_string(), bold: false, italic: false });
    }
    if segments.is_empty() {
        segments.push(Segment { text, bold: false, italic: false });
    }
    segments
}

/// Checkboxes converted and emphasis markers removed, for plain-text targets.
pub fn plain_text(text: &str) -> String {
    parse_formatted_text(text).into_iter().map(|s| s.text).collect()
}

pub fn classify(line: &str) -> LineKind<'_> {
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return LineKind::Bullet(rest);
    }
    if let Some(m) = NUMBERED.find(line) {
        return LineKind::Numbered(&line[m.end()..]);
    }
    LineKind::Plain(line)
}

/// Non-empty, trimmed lines of a section body.
pub fn body_lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines().map(str::trim).filter(|l| !l.is_empty())
}
