//! Document assembly.
//!
//! An assembler receives a [`DocumentPlan`] block by block and serializes
//! it. Every assembler writes the same physical lines the estimator counted:
//! lines are wrapped with the plan's [`WrapOptions`] before they are laid
//! out. Only the plain-text assembler paginates by itself, so it is the one
//! that reports a rendered page count back for calibration.

use crate::config::OutputFormat;
use crate::docx::DocxAssembler;
use crate::error::Result;
use crate::estimate::DEFAULT_LINES_PER_PAGE;
use crate::plan::{DocumentPlan, ExpansionUnit, Omission, Provenance};
use crate::template::TemplateEngine;
use crate::wrap::{WrapOptions, wrap_line};
use serde::Serialize;
use std::path::Path;

const OMISSION_NOTICE: &str =
    "// --- [ Content Omitted: Middle part of the source code is skipped here ] ---";
const PAGE_BREAK: char = '\u{c}';

/// Serialized document plus what the renderer knows about its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    bytes: Vec<u8>,
    rendered_pages: Option<usize>,
}

impl RenderedDocument {
    /// Creates a rendered document.
    #[must_use]
    pub const fn new(bytes: Vec<u8>, rendered_pages: Option<usize>) -> Self {
        Self {
            bytes,
            rendered_pages,
        }
    }

    /// Serialized bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the document and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Pages the renderer actually produced, if it paginates by itself.
    #[must_use]
    pub const fn rendered_pages(&self) -> Option<usize> {
        self.rendered_pages
    }
}

/// Collaborator that turns a plan into a document.
///
/// Blocks arrive strictly in plan order. `finish` may be called once.
pub trait DocumentAssembler {
    /// Starts a document with the plan's title and layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be started.
    fn begin(&mut self, plan: &DocumentPlan) -> Result<()>;

    /// Appends one labeled block.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be appended.
    fn append_block(&mut self, unit: &ExpansionUnit) -> Result<()>;

    /// Appends the separator that marks excerpted content.
    ///
    /// # Errors
    ///
    /// Returns an error if the separator cannot be appended.
    fn append_omission(&mut self, omission: &Omission) -> Result<()>;

    /// Serializes the document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn finish(&mut self) -> Result<RenderedDocument>;

    /// Feeds a whole plan through `begin`, `append_*` and `finish`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any step.
    fn assemble(&mut self, plan: &DocumentPlan) -> Result<RenderedDocument> {
        self.begin(plan)?;
        let omission = plan.omission();
        for (index, unit) in plan.units().iter().enumerate() {
            if let Some(omission) = omission.filter(|o| o.after_unit == index) {
                self.append_omission(omission)?;
            }
            self.append_block(unit)?;
        }
        if let Some(omission) = omission.filter(|o| o.after_unit >= plan.units().len()) {
            self.append_omission(omission)?;
        }
        self.finish()
    }
}

/// Creates the assembler for `format`.
///
/// `page_lines` is the page height used by the plain-text assembler.
///
/// # Errors
///
/// Returns an error if the built-in templates fail to load.
pub fn assembler_for(format: OutputFormat, page_lines: usize) -> Result<Box<dyn DocumentAssembler>> {
    Ok(match format {
        OutputFormat::Docx => Box::new(DocxAssembler::new()),
        OutputFormat::Markdown => Box::new(MarkdownAssembler::new()?),
        OutputFormat::Text => Box::new(TextAssembler::new(page_lines)),
    })
}

/// Line written above a block. Not counted by the estimator.
pub(crate) fn label_line(unit: &ExpansionUnit) -> String {
    match unit.provenance() {
        Provenance::Original { .. } => format!("// {}", unit.label()),
        Provenance::Repeated { repetition, .. } => {
            format!("// {} (repeat {repetition})", unit.label())
        }
    }
}

/// Lines of the omission separator.
pub(crate) fn omission_lines(omission: &Omission) -> Vec<String> {
    let rule = format!("// {}", "=".repeat(70));
    vec![
        String::new(),
        rule.clone(),
        OMISSION_NOTICE.to_string(),
        format!("// --- [ about {:.1} pages left out ] ---", omission.omitted_pages),
        rule,
        String::new(),
    ]
}

/// Physical lines of a logical line.
pub(crate) fn physical(line: &str, wrap: &WrapOptions) -> Vec<String> {
    wrap_line(line, wrap)
}

/// Paginated plain text. Pages are separated by form feeds and each page
/// carries the header and its page number.
#[derive(Debug)]
pub struct TextAssembler {
    page_lines: usize,
    header: String,
    page_numbers: bool,
    wrap: WrapOptions,
    lines: Vec<String>,
}

impl TextAssembler {
    /// Creates an assembler that puts `page_lines` body lines on a page.
    #[must_use]
    pub fn new(page_lines: usize) -> Self {
        Self {
            page_lines: if page_lines == 0 {
                DEFAULT_LINES_PER_PAGE
            } else {
                page_lines
            },
            header: String::new(),
            page_numbers: true,
            wrap: WrapOptions::default(),
            lines: Vec::new(),
        }
    }
}

impl DocumentAssembler for TextAssembler {
    fn begin(&mut self, plan: &DocumentPlan) -> Result<()> {
        self.header = plan.header_text();
        self.page_numbers = plan.layout().page_numbers;
        self.wrap = plan.layout().wrap.clone();
        self.lines.clear();
        Ok(())
    }

    fn append_block(&mut self, unit: &ExpansionUnit) -> Result<()> {
        self.lines.push(label_line(unit));
        for line in unit.lines() {
            self.lines.extend(physical(line, &self.wrap));
        }
        Ok(())
    }

    fn append_omission(&mut self, omission: &Omission) -> Result<()> {
        self.lines.extend(omission_lines(omission));
        Ok(())
    }

    fn finish(&mut self) -> Result<RenderedDocument> {
        let pages: Vec<&[String]> = if self.lines.is_empty() {
            vec![self.lines.as_slice()]
        } else {
            self.lines.chunks(self.page_lines).collect()
        };

        let mut out = String::new();
        for (number, page) in pages.iter().enumerate() {
            if number > 0 {
                out.push(PAGE_BREAK);
            }
            if !self.header.is_empty() {
                out.push_str(&self.header);
                out.push('\n');
                out.push_str(&"-".repeat(self.header.chars().count()));
                out.push_str("\n\n");
            }
            for line in *page {
                out.push_str(line);
                out.push('\n');
            }
            if self.page_numbers {
                out.push_str(&format!("\n- {} -\n", number + 1));
            }
        }

        Ok(RenderedDocument::new(out.into_bytes(), Some(pages.len())))
    }
}

#[derive(Serialize)]
struct MarkdownContext<'a> {
    title: &'a str,
    blocks: &'a [MarkdownBlock],
}

#[derive(Serialize)]
struct MarkdownBlock {
    omission: bool,
    label: String,
    repetition: Option<usize>,
    language: String,
    fence: String,
    text: String,
}

/// Markdown with one fenced code block per unit.
pub struct MarkdownAssembler {
    engine: TemplateEngine,
    title: String,
    wrap: WrapOptions,
    blocks: Vec<MarkdownBlock>,
}

impl MarkdownAssembler {
    /// Creates a markdown assembler.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in templates fail to load.
    pub fn new() -> Result<Self> {
        Ok(Self {
            engine: TemplateEngine::new()?,
            title: String::new(),
            wrap: WrapOptions::default(),
            blocks: Vec::new(),
        })
    }
}

/// A fence longer than any backtick run in `text`.
fn fence_for(text: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

impl DocumentAssembler for MarkdownAssembler {
    fn begin(&mut self, plan: &DocumentPlan) -> Result<()> {
        self.title = plan.header_text();
        if self.title.trim().is_empty() {
            self.title = format!("{} {}", plan.software_name(), plan.version());
        }
        self.wrap = plan.layout().wrap.clone();
        self.blocks.clear();
        Ok(())
    }

    fn append_block(&mut self, unit: &ExpansionUnit) -> Result<()> {
        let text = unit
            .lines()
            .flat_map(|line| physical(line, &self.wrap))
            .collect::<Vec<_>>()
            .join("\n");
        let repetition = match unit.provenance() {
            Provenance::Repeated { repetition, .. } => Some(repetition),
            Provenance::Original { .. } => None,
        };
        let language = Path::new(unit.label())
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        self.blocks.push(MarkdownBlock {
            omission: false,
            label: unit.label().to_string(),
            repetition,
            language,
            fence: fence_for(&text),
            text,
        });
        Ok(())
    }

    fn append_omission(&mut self, omission: &Omission) -> Result<()> {
        self.blocks.push(MarkdownBlock {
            omission: true,
            label: String::new(),
            repetition: None,
            language: String::new(),
            fence: String::new(),
            text: format!(
                "the middle of the source is skipped here (about {:.1} pages).",
                omission.omitted_pages
            ),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<RenderedDocument> {
        let context = MarkdownContext {
            title: &self.title,
            blocks: &self.blocks,
        };
        let rendered = self.engine.render("markdown", &context)?;
        Ok(RenderedDocument::new(rendered.into_bytes(), None))
    }
}
