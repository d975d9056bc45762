//! Office Open XML output, built on `docx-rs`.
//!
//! Every physical line becomes one paragraph, so the line estimator and
//! the document agree on what a line is. Word paginates on open; the
//! assembler cannot report a page count.

use crate::assemble::{DocumentAssembler, RenderedDocument, label_line, omission_lines, physical};
use crate::config::Layout;
use crate::error::{Error, Result};
use crate::plan::{DocumentPlan, ExpansionUnit, Omission};
use docx_rs::{
    AlignmentType, BorderType, Docx, FieldCharType, Footer, Header, InstrPAGE, InstrText,
    LineSpacing, PageMargin, Paragraph, ParagraphBorder, ParagraphBorderPosition,
    ParagraphBorders, Run, RunFonts, Style, StyleType,
};
use std::io::Cursor;
use tracing::debug;

const A4_WIDTH_TWIPS: u32 = 11_906;
const A4_HEIGHT_TWIPS: u32 = 16_838;
const TWIPS_PER_CM: f64 = 1440.0 / 2.54;

const CODE_STYLE: &str = "Code";
const LABEL_STYLE: &str = "CodeLabel";
const ANNOTATION_STYLE: &str = "CodeAnnotation";
const MARKER_STYLE: &str = "CodeMarker";
const HEADER_STYLE: &str = "Header";
const FOOTER_STYLE: &str = "Footer";

#[allow(clippy::cast_possible_truncation)]
fn twips(cm: f64) -> i32 {
    (cm * TWIPS_PER_CM).round().max(0.0) as i32
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn half_points(pt: f64) -> usize {
    (pt * 2.0).round().max(1.0) as usize
}

/// Line spacing in 240ths of a line.
#[allow(clippy::cast_possible_truncation)]
fn line_spacing(multiple: f64) -> i32 {
    (multiple * 240.0).round().max(1.0) as i32
}

/// Drops characters XML 1.0 cannot carry. They do turn up in sources
/// decoded through a single-byte fallback.
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || !((c as u32) < 0x20 || matches!(c, '\u{FFFE}' | '\u{FFFF}'))
        })
        .collect()
}

fn fonts(family: &str) -> RunFonts {
    RunFonts::new()
        .ascii(family)
        .hi_ansi(family)
        .east_asia(family)
        .cs(family)
}

fn styles(layout: &Layout) -> Vec<Style> {
    let body_size = half_points(layout.font_size);
    let header_size = half_points(layout.header_font_size);
    let spacing = LineSpacing::new()
        .before(0)
        .after(0)
        .line(line_spacing(layout.line_spacing));

    vec![
        Style::new(CODE_STYLE, StyleType::Paragraph)
            .name("Code")
            .fonts(fonts(&layout.font_family))
            .size(body_size)
            .line_spacing(spacing.clone()),
        Style::new(LABEL_STYLE, StyleType::Paragraph)
            .name("Code Label")
            .based_on(CODE_STYLE)
            .next(CODE_STYLE)
            .fonts(fonts(&layout.font_family))
            .size(body_size)
            .line_spacing(spacing.clone())
            .bold(),
        Style::new(ANNOTATION_STYLE, StyleType::Paragraph)
            .name("Code Annotation")
            .based_on(CODE_STYLE)
            .fonts(fonts(&layout.font_family))
            .size(body_size)
            .line_spacing(spacing.clone())
            .italic(),
        Style::new(MARKER_STYLE, StyleType::Paragraph)
            .name("Code Marker")
            .based_on(CODE_STYLE)
            .fonts(fonts(&layout.font_family))
            .size(body_size)
            .line_spacing(spacing)
            .bold(),
        Style::new(HEADER_STYLE, StyleType::Paragraph)
            .name("header")
            .fonts(fonts(&layout.header_font_family))
            .size(header_size),
        Style::new(FOOTER_STYLE, StyleType::Paragraph)
            .name("footer")
            .based_on(HEADER_STYLE)
            .fonts(fonts(&layout.header_font_family))
            .size(header_size),
    ]
}

fn header(text: &str, border: bool) -> Header {
    let mut paragraph = Paragraph::new()
        .style(HEADER_STYLE)
        .align(AlignmentType::Center)
        .add_run(Run::new().add_text(xml_safe(text)));
    if border {
        paragraph = paragraph.set_borders(
            ParagraphBorders::with_empty().set(
                ParagraphBorder::new(ParagraphBorderPosition::Bottom)
                    .val(BorderType::Single)
                    .size(4)
                    .space(1)
                    .color("auto"),
            ),
        );
    }
    Header::new().add_paragraph(paragraph)
}

/// Centered `PAGE` field; Word fills in the number.
fn page_number_footer() -> Footer {
    let field = Run::new()
        .add_field_char(FieldCharType::Begin, false)
        .add_instr_text(InstrText::PAGE(InstrPAGE::new()))
        .add_field_char(FieldCharType::Separate, false)
        .add_text("1")
        .add_field_char(FieldCharType::End, false);

    Footer::new().add_paragraph(
        Paragraph::new()
            .style(FOOTER_STYLE)
            .align(AlignmentType::Center)
            .add_run(field),
    )
}

/// Renders a plan as a `.docx` package.
#[derive(Debug, Default)]
pub struct DocxAssembler {
    header_text: String,
    layout: Layout,
    paragraphs: Vec<Paragraph>,
}

impl DocxAssembler {
    /// Creates a DOCX assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push_wrapped(&mut self, style: &str, line: &str) {
        for text in physical(line, &self.layout.wrap) {
            let mut paragraph = Paragraph::new()
                .style(style)
                .add_run(Run::new().add_text(xml_safe(&text)));
            if style == LABEL_STYLE {
                paragraph = paragraph.keep_next(true);
            }
            self.paragraphs.push(paragraph);
        }
    }

    fn document(&mut self) -> Docx {
        let layout = &self.layout;
        let margins = PageMargin::new()
            .top(twips(layout.margins.top))
            .bottom(twips(layout.margins.bottom))
            .left(twips(layout.margins.left))
            .right(twips(layout.margins.right))
            .header(twips(layout.header_distance))
            .footer(twips(layout.footer_distance));

        let mut docx = Docx::new()
            .page_size(A4_WIDTH_TWIPS, A4_HEIGHT_TWIPS)
            .page_margin(margins)
            .default_fonts(fonts(&layout.font_family))
            .default_size(half_points(layout.font_size));

        for style in styles(layout) {
            docx = docx.add_style(style);
        }
        if !self.header_text.trim().is_empty() {
            docx = docx.header(header(&self.header_text, layout.header_border));
        }
        if layout.page_numbers {
            docx = docx.footer(page_number_footer());
        }
        for paragraph in self.paragraphs.drain(..) {
            docx = docx.add_paragraph(paragraph);
        }
        docx
    }
}

impl DocumentAssembler for DocxAssembler {
    fn begin(&mut self, plan: &DocumentPlan) -> Result<()> {
        self.header_text = plan.header_text();
        self.layout = plan.layout().clone();
        self.paragraphs.clear();
        Ok(())
    }

    fn append_block(&mut self, unit: &ExpansionUnit) -> Result<()> {
        self.push_wrapped(LABEL_STYLE, &label_line(unit));
        if let Some(header) = unit.header() {
            self.push_wrapped(ANNOTATION_STYLE, header);
        }
        for line in unit.body().lines() {
            self.push_wrapped(CODE_STYLE, line);
        }
        if let Some(footer) = unit.footer() {
            self.push_wrapped(ANNOTATION_STYLE, footer);
        }
        Ok(())
    }

    fn append_omission(&mut self, omission: &Omission) -> Result<()> {
        for line in omission_lines(omission) {
            self.push_wrapped(MARKER_STYLE, &line);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<RenderedDocument> {
        let paragraphs = self.paragraphs.len();
        let mut buffer = Cursor::new(Vec::new());
        self.document()
            .build()
            .pack(&mut buffer)
            .map_err(|e| Error::render("[package]", format!("failed to package DOCX: {e}")))?;
        let bytes = buffer.into_inner();

        debug!("Packaged DOCX: {} paragraphs, {} bytes", paragraphs, bytes.len());

        Ok(RenderedDocument::new(bytes, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{Calibration, LengthEstimator};
    use crate::plan::BlockId;
    use crate::wrap::WrapOptions;
    use docx_rs::{DocumentChild, read_docx};
    use std::io::Read;
    use std::sync::Arc;

    fn estimator() -> Arc<dyn LengthEstimator> {
        Calibration::default().create(&WrapOptions::default())
    }

    fn plan(layout: Layout) -> DocumentPlan {
        let units = vec![
            ExpansionUnit::original(BlockId::new(0), "src/a.js", "if (a < b && c) {\n  go();\n}"),
            ExpansionUnit::repeated(
                BlockId::new(0),
                1,
                "src/a.js",
                "if (a < b && c) {\n  go();\n}",
                "/* repeat 1 of src/a.js */".to_string(),
                "/* end */".to_string(),
            ),
        ];
        DocumentPlan::new("R&D Tool", "3.1", units, None, layout, estimator().as_ref())
    }

    fn part_names(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    fn read_part(bytes: &[u8], name: &str) -> Option<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut xml = String::new();
        file.read_to_string(&mut xml).unwrap();
        Some(xml)
    }

    fn read_prefixed(bytes: &[u8], prefix: &str) -> Option<String> {
        let name = part_names(bytes).into_iter().find(|n| n.starts_with(prefix))?;
        read_part(bytes, &name)
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(twips(2.5), 1417);
        assert_eq!(half_points(9.0), 18);
        assert_eq!(half_points(10.5), 21);
        assert_eq!(line_spacing(1.0), 240);
    }

    #[test]
    fn test_xml_safe_drops_invalid_control_chars() {
        assert_eq!(xml_safe("a\u{0}b\u{1b}c\td"), "abc\td");
        assert_eq!(xml_safe("caf\u{e9} <ok>"), "caf\u{e9} <ok>");
    }

    #[test]
    fn test_package_contains_main_parts() {
        let doc = DocxAssembler::new().assemble(&plan(Layout::default())).unwrap();
        let names = part_names(doc.bytes());

        for part in ["[Content_Types].xml", "word/document.xml", "word/styles.xml"] {
            assert!(names.iter().any(|n| n == part), "missing {part}");
        }
        assert!(names.iter().any(|n| n.starts_with("word/header")));
        assert!(names.iter().any(|n| n.starts_with("word/footer")));
        assert_eq!(doc.rendered_pages(), None);
    }

    #[test]
    fn test_package_reads_back_one_paragraph_per_line() {
        let doc = DocxAssembler::new().assemble(&plan(Layout::default())).unwrap();
        let docx = read_docx(doc.bytes()).unwrap();

        let paragraphs = docx
            .document
            .children
            .iter()
            .filter(|child| matches!(child, DocumentChild::Paragraph(_)))
            .count();
        // 2 labels + 6 body lines + 2 annotation lines
        assert_eq!(paragraphs, 10);
    }

    #[test]
    fn test_document_paragraphs_are_escaped_lines() {
        let doc = DocxAssembler::new().assemble(&plan(Layout::default())).unwrap();
        let xml = read_part(doc.bytes(), "word/document.xml").unwrap();

        assert!(xml.contains("if (a &lt; b &amp;&amp; c) {"));
        assert!(xml.contains("w:val=\"CodeAnnotation\""));
        assert!(xml.contains("/* repeat 1 of src/a.js */"));
        assert!(xml.contains("w:top=\"1417\""));
        assert!(xml.contains("w:header=\"850\""));
        assert!(xml.contains("headerReference"));
    }

    #[test]
    fn test_header_footer_and_styles_follow_layout() {
        let doc = DocxAssembler::new().assemble(&plan(Layout::default())).unwrap();
        let header = read_prefixed(doc.bytes(), "word/header").unwrap();
        let footer = read_prefixed(doc.bytes(), "word/footer").unwrap();
        let styles = read_part(doc.bytes(), "word/styles.xml").unwrap();

        assert!(header.contains("R&amp;D Tool 3.1"));
        assert!(header.contains("w:val=\"single\""));
        assert!(footer.contains("PAGE"));
        assert!(footer.contains("w:fldCharType=\"begin\""));
        assert!(styles.contains("w:ascii=\"Courier New\""));
        assert!(styles.contains("w:ascii=\"Calibri\""));
        assert!(styles.contains("w:styleId=\"CodeLabel\""));
    }

    #[test]
    fn test_header_border_is_optional() {
        let layout = Layout {
            header_border: false,
            ..Layout::default()
        };
        let doc = DocxAssembler::new().assemble(&plan(layout)).unwrap();
        let header = read_prefixed(doc.bytes(), "word/header").unwrap();

        assert!(header.contains("R&amp;D Tool 3.1"));
        assert!(!header.contains("w:pBdr"));
    }

    #[test]
    fn test_header_and_footer_can_be_disabled() {
        let layout = Layout {
            header_text: String::new(),
            page_numbers: false,
            ..Layout::default()
        };
        let doc = DocxAssembler::new().assemble(&plan(layout)).unwrap();
        let names = part_names(doc.bytes());

        assert!(!names.iter().any(|n| n.starts_with("word/header")));
        assert!(!names.iter().any(|n| n.starts_with("word/footer")));
        let document = read_part(doc.bytes(), "word/document.xml").unwrap();
        assert!(!document.contains("headerReference"));
        assert!(!document.contains("footerReference"));
    }
}
