//! Office-document rendering of generated materials.
//!
//! `render` is a pure function from content to bytes. DOCX, PPTX and XLSX are
//! OOXML zip packages assembled from XML parts; PDF is written directly.
//! Rendering refuses any result that lacks one of the five variants.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::{GenerationResult, Variant, WizardState};
use crate::error::{WizardError, WizardResult};
use crate::util::sanitize_filename;

pub mod markdown;
mod docx;
mod pdf;
mod pptx;
mod xlsx;

pub const FOOTER: &str = "Generated by Assignment Differentiation Wizard";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Docx,
    Pdf,
    Pptx,
    Xlsx,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] =
        [ExportFormat::Docx, ExportFormat::Pdf, ExportFormat::Pptx, ExportFormat::Xlsx];

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Pptx => "pptx",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Pptx => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

/// What to render: the inputs, the five variants, and optionally a single
/// variant to narrow the document to.
#[derive(Clone, Copy, Debug)]
pub struct ExportContent<'a> {
    pub form: &'a WizardState,
    pub materials: &'a GenerationResult,
    pub variant: Option<Variant>,
}

impl<'a> ExportContent<'a> {
    /// Variants included in the document, in order, with their bodies.
    fn selected(&self) -> Vec<(Variant, &'a str)> {
        let materials = self.materials;
        let chosen: Vec<Variant> = match self.variant {
            Some(v) => vec![v],
            None => Variant::ALL.to_vec(),
        };
        chosen
            .into_iter()
            .filter_map(|v| materials.get(v).map(|body| (v, body)))
            .collect()
    }

    /// Title/value pairs printed under each document title.
    fn metadata(&self) -> Vec<(&'static str, String)> {
        let mut meta = vec![
            ("Learning Objective", or_na(&self.form.learning_objective)),
            ("Grade Level", or_na(&self.form.grade_level)),
        ];
        if !self.form.subject.trim().is_empty() {
            meta.push(("Subject", self.form.subject.trim().to_string()));
        }
        meta.push(("Generated", generated_date(self.materials.generated_at)));
        meta
    }
}

fn or_na(value: &str) -> String {
    crate::util::or_placeholder(value, "N/A").to_string()
}

pub fn generated_date(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%B %d, %Y").to_string()
}

/// Render `content` as `format`.
#[instrument(level = "info", skip(content), fields(variant = ?content.variant))]
pub fn render(format: ExportFormat, content: &ExportContent<'_>) -> WizardResult<Vec<u8>> {
    content.materials.ensure_complete()?;
    let bytes = match format {
        ExportFormat::Docx => docx::render(content)?,
        ExportFormat::Pdf => pdf::render(content),
        ExportFormat::Pptx => pptx::render(content)?,
        ExportFormat::Xlsx => xlsx::render(content)?,
    };
    info!(target: "export", ?format, size = bytes.len(), "Document rendered");
    Ok(bytes)
}

/// `UDL_<variant|AllVersions>_<objective prefix>.<ext>`
pub fn file_name(format: ExportFormat, content: &ExportContent<'_>) -> String {
    let scope = content.variant.map_or("AllVersions", |v| v.file_key());
    let objective = crate::util::or_placeholder(&content.form.learning_objective, "materials");
    let short: String = objective.chars().take(30).collect();
    let short = sanitize_filename(&short, 50);
    let short = if short.is_empty() { "materials".to_string() } else { short };
    format!("UDL_{}_{}.{}", scope, short, format.extension())
}

/// Render and write into `dir`, returning the full path.
pub fn export_to_dir(
    dir: &Path,
    format: ExportFormat,
    content: &ExportContent<'_>,
) -> WizardResult<PathBuf> {
    let bytes = render(format, content)?;
    std::fs::create_dir_all(dir)
        .map_err(|e| WizardError::Storage(format!("{}: {e}", dir.display())))?;
    let path = dir.join(file_name(format, content));
    std::fs::write(&path, bytes)
        .map_err(|e| WizardError::Storage(format!("{}: {e}", path.display())))?;
    info!(target: "export", path = %path.display(), "Export written");
    Ok(path)
}

pub(crate) fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 forbids most control characters.
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Zip the given `(path, xml)` parts into an OOXML package.
pub(crate) fn ooxml_package(parts: &[(String, String)]) -> WizardResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, xml) in parts {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(xml.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

pub(crate) const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Read;

    pub(crate) fn sample_form() -> WizardState {
        WizardState {
            learning_objective: "Students will compare fractions & explain <why>".into(),
            grade_level: "3-5".into(),
            subject: "Math".into(),
            student_needs: "reading support".into(),
            ..Default::default()
        }
    }

    pub(crate) fn sample_materials() -> GenerationResult {
        let variants: BTreeMap<Variant, String> = Variant::ALL
            .iter()
            .map(|v| {
                (
                    *v,
                    format!(
                        "## Introduction\nToday we explore **{v}** fractions.\n## Activities\n- Fold paper strips\n1. Compare 1/2 and 1/3\n[ ] I can explain my answer"
                    ),
                )
            })
            .collect();
        GenerationResult::complete(variants, "llama3.2").unwrap()
    }

    pub(crate) fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        let mut part = archive.by_name(name).expect("part present");
        let mut out = String::new();
        part.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn every_format_renders_complete_results() {
        let form = sample_form();
        let materials = sample_materials();
        let content = ExportContent { form: &form, materials: &materials, variant: None };
        for format in ExportFormat::ALL {
            let bytes = render(format, &content).unwrap_or_else(|e| panic!("{format:?}: {e}"));
            assert!(!bytes.is_empty(), "{format:?} produced no bytes");
        }
    }

    #[test]
    fn every_format_rejects_a_missing_variant() {
        let form = sample_form();
        let mut materials = sample_materials();
        materials.variants.remove(&Variant::Scaffolded);
        for format in ExportFormat::ALL {
            for variant in [None, Some(Variant::Simplified)] {
                let content = ExportContent { form: &form, materials: &materials, variant };
                let err = render(format, &content).unwrap_err();
                assert_eq!(err, WizardError::Render("missing variants: Scaffolded".into()));
            }
        }
    }

    #[test]
    fn file_names_are_sanitized() {
        let form = sample_form();
        let materials = sample_materials();
        let all = ExportContent { form: &form, materials: &materials, variant: None };
        assert_eq!(file_name(ExportFormat::Xlsx, &all), "UDL_AllVersions_Students_will_compare_fraction.xlsx");
        let one = ExportContent { variant: Some(Variant::OnLevel), ..all };
        assert!(file_name(ExportFormat::Docx, &one).starts_with("UDL_on_level_"));
    }

    #[test]
    fn export_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let form = sample_form();
        let materials = sample_materials();
        let content = ExportContent { form: &form, materials: &materials, variant: Some(Variant::Visual) };
        let path = export_to_dir(&dir.path().join("out"), ExportFormat::Pdf, &content).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn xml_escape_handles_markup_and_controls() {
        assert_eq!(xml_escape("a<b>&\"c'\u{1}"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }
}
