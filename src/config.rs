use crate::clean::CleanConfig;
use crate::error::{Error, Result};
use crate::estimate::Calibration;
use crate::expand::{Annotation, ExpansionConfig};
use crate::file::{DEFAULT_ENCODING_FALLBACKS, encoding_for_label};
use crate::filter::FileFilterConfig;
use crate::wrap::WrapOptions;
use crate::writer::output_file_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_VERSION: &str = "1.0";
const DEFAULT_SOFTWARE_NAME: &str = "software";
const DEFAULT_HEADER_TEXT: &str = "{name} {version}";

/// Output format of the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Office Open XML word-processing document
    #[default]
    Docx,
    /// Markdown with fenced code blocks
    Markdown,
    /// Plain text paginated with form feeds
    Text,
}

impl OutputFormat {
    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Docx => "docx",
            Self::Markdown => "markdown",
            Self::Text => "text",
        })
    }
}

/// Page margins in centimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    /// Top margin
    pub top: f64,
    /// Bottom margin
    pub bottom: f64,
    /// Left margin
    pub left: f64,
    /// Right margin
    pub right: f64,
}

impl Margins {
    /// Same margin on every side.
    #[must_use]
    pub const fn uniform(cm: f64) -> Self {
        Self {
            top: cm,
            bottom: cm,
            left: cm,
            right: cm,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(2.5)
    }
}

/// Page layout handed to the assembler with the plan.
///
/// Sizes are in points, distances in centimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Page header; `{name}` and `{version}` are filled in, empty disables it
    pub header_text: String,
    /// Rule below the header
    pub header_border: bool,
    /// Page number in the footer
    pub page_numbers: bool,
    /// Monospace font of the code body
    pub font_family: String,
    /// Code body font size
    pub font_size: f64,
    /// Header and footer font
    pub header_font_family: String,
    /// Header and footer font size
    pub header_font_size: f64,
    /// Line spacing multiple of the code body
    pub line_spacing: f64,
    /// Page margins
    pub margins: Margins,
    /// Distance of the header from the top edge
    pub header_distance: f64,
    /// Distance of the footer from the bottom edge
    pub footer_distance: f64,
    /// Physical-line wrapping shared with the estimator
    pub wrap: WrapOptions,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            header_text: DEFAULT_HEADER_TEXT.to_string(),
            header_border: true,
            page_numbers: true,
            font_family: "Courier New".to_string(),
            font_size: 9.0,
            header_font_family: "Calibri".to_string(),
            header_font_size: 10.0,
            line_spacing: 1.0,
            margins: Margins::default(),
            header_distance: 1.5,
            footer_distance: 1.75,
            wrap: WrapOptions::default(),
        }
    }
}

impl Layout {
    /// Validates sizes and wrapping.
    ///
    /// # Errors
    ///
    /// Returns an error if a size is not positive, a distance is negative, or
    /// the continuation indent does not fit in the wrap width.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("font_size", self.font_size),
            ("header_font_size", self.header_font_size),
            ("line_spacing", self.line_spacing),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::config(format!("{name} must be greater than 0")));
            }
        }

        let margins = self.margins;
        for (name, value) in [
            ("margins.top", margins.top),
            ("margins.bottom", margins.bottom),
            ("margins.left", margins.left),
            ("margins.right", margins.right),
            ("header_distance", self.header_distance),
            ("footer_distance", self.footer_distance),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::config(format!("{name} must not be negative")));
            }
        }

        if self.font_family.trim().is_empty() {
            return Err(Error::config("font_family must not be empty"));
        }

        let wrap = &self.wrap;
        if wrap.width != 0 && wrap.indent.chars().count() >= wrap.width {
            return Err(Error::config(format!(
                "continuation indent ({} chars) must be shorter than wrap width ({})",
                wrap.indent.chars().count(),
                wrap.width
            )));
        }
        if wrap.tab_width == 0 {
            return Err(Error::config("tab_width must be greater than 0"));
        }

        Ok(())
    }
}

/// Configuration for one code-collate run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Root directory to scan for source files
    pub root_dir: PathBuf,

    /// Directory the document is written to
    pub output_dir: PathBuf,

    /// Software name, used in the header and the file name
    pub software_name: String,

    /// Software version, used in the header and the file name
    pub software_version: String,

    /// Output format
    pub format: OutputFormat,

    /// Extension allow-list and exclusion patterns
    pub file_filter_config: FileFilterConfig,

    /// Honour `.gitignore` files during the walk
    pub respect_gitignore: bool,

    /// Encoding labels tried in order when a file is not valid UTF-8;
    /// empty skips such files
    pub encoding_fallbacks: Vec<String>,

    /// Comment and blank-line removal
    pub clean: CleanConfig,

    /// Page estimation factor
    pub calibration: Calibration,

    /// Page target, ceiling and annotation
    pub expansion: ExpansionConfig,

    /// Keep only this many pages, split between start and end.
    ///
    /// Below the expansion target, the kept tail can hold repeats whose
    /// originals were cut from the middle.
    pub excerpt_pages: Option<usize>,

    /// Page layout
    pub layout: Layout,

    /// Dry run mode (no file writes)
    pub dry_run: bool,

    /// Create backups of existing files
    pub backup_existing: bool,

    /// Write a JSON run summary next to the document
    pub write_summary: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use code_collate::Config;
    ///
    /// let config = Config::builder()
    ///     .root_dir("./web")
    ///     .software_name("Inventory Manager")
    ///     .target_pages(60)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a scan error if the root directory is missing or not a
    /// directory, and a configuration error for any invalid setting.
    pub fn validate(&self) -> Result<()> {
        if !self.root_dir.exists() {
            return Err(Error::scan(&self.root_dir, "directory does not exist"));
        }

        if !self.root_dir.is_dir() {
            return Err(Error::scan(&self.root_dir, "not a directory"));
        }

        if self.software_name.trim().is_empty() {
            return Err(Error::config("software name must not be empty"));
        }

        if self.software_version.trim().is_empty() {
            return Err(Error::config("software version must not be empty"));
        }

        if self.excerpt_pages == Some(0) {
            return Err(Error::config("excerpt_pages must be greater than 0"));
        }

        if let Some(pages) = self
            .excerpt_pages
            .filter(|pages| self.expansion.enabled && *pages < self.expansion.target_pages)
        {
            warn!(
                "excerpt_pages ({}) is below target_pages ({}); repeated blocks may appear without their originals",
                pages, self.expansion.target_pages
            );
        }

        if let Some(label) = self
            .encoding_fallbacks
            .iter()
            .find(|label| encoding_for_label(label).is_none())
        {
            return Err(Error::config(format!("unknown encoding '{label}'")));
        }

        self.calibration.validate()?;
        self.expansion.validate()?;
        self.file_filter_config.validate()?;
        self.layout.validate()?;

        Ok(())
    }

    /// File name of the rendered document.
    #[must_use]
    pub fn output_file_name(&self) -> String {
        output_file_name(
            &self.software_name,
            &self.software_version,
            self.format.extension(),
        )
    }

    /// Full path of the rendered document.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(self.output_file_name())
    }
}

/// Name of the root directory, used when no software name is given.
fn default_software_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_SOFTWARE_NAME.to_string())
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    root_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    software_name: Option<String>,
    software_version: Option<String>,
    format: Option<OutputFormat>,
    file_filter_config: Option<FileFilterConfig>,
    respect_gitignore: Option<bool>,
    encoding_fallbacks: Option<Vec<String>>,
    strip_comments: Option<bool>,
    strip_blank_lines: Option<bool>,
    reflow_minified: Option<bool>,
    calibration: Option<Calibration>,
    expansion_enabled: Option<bool>,
    target_pages: Option<usize>,
    ceiling: Option<usize>,
    annotation: Option<Annotation>,
    excerpt_pages: Option<usize>,
    layout: Option<Layout>,
    dry_run: bool,
    backup_existing: Option<bool>,
    write_summary: Option<bool>,
}

impl ConfigBuilder {
    /// Sets the root directory to scan.
    #[must_use]
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the software name. Defaults to the root directory's name.
    #[must_use]
    pub fn software_name(mut self, name: impl Into<String>) -> Self {
        self.software_name = Some(name.into());
        self
    }

    /// Sets the software version. Defaults to `1.0`.
    #[must_use]
    pub fn software_version(mut self, version: impl Into<String>) -> Self {
        self.software_version = Some(version.into());
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the extension allow-list and exclusion patterns.
    #[must_use]
    pub fn file_filter_config(mut self, config: FileFilterConfig) -> Self {
        self.file_filter_config = Some(config);
        self
    }

    /// Replaces the extension allow-list, keeping the exclusion patterns.
    #[must_use]
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        let filter = self.file_filter_config.take().unwrap_or_default();
        self.file_filter_config = Some(filter.extensions(extensions));
        self
    }

    /// Adds directory exclusion patterns to the defaults.
    #[must_use]
    pub fn exclude_directories(mut self, patterns: Vec<String>) -> Self {
        let filter = self.file_filter_config.take().unwrap_or_default();
        self.file_filter_config = Some(filter.also_exclude_directories(patterns));
        self
    }

    /// Replaces the file exclusion patterns.
    #[must_use]
    pub fn exclude_files(mut self, patterns: Vec<String>) -> Self {
        let filter = self.file_filter_config.take().unwrap_or_default();
        self.file_filter_config = Some(filter.exclude_files(patterns));
        self
    }

    /// Enables or disables `.gitignore` handling.
    #[must_use]
    pub fn respect_gitignore(mut self, enabled: bool) -> Self {
        self.respect_gitignore = Some(enabled);
        self
    }

    /// Sets the encodings tried when a file is not valid UTF-8.
    #[must_use]
    pub fn encoding_fallbacks<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encoding_fallbacks = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// Enables or disables comment removal.
    #[must_use]
    pub fn strip_comments(mut self, enabled: bool) -> Self {
        self.strip_comments = Some(enabled);
        self
    }

    /// Enables or disables blank-line removal.
    #[must_use]
    pub fn strip_blank_lines(mut self, enabled: bool) -> Self {
        self.strip_blank_lines = Some(enabled);
        self
    }

    /// Enables or disables splitting of minified files.
    #[must_use]
    pub fn reflow_minified(mut self, enabled: bool) -> Self {
        self.reflow_minified = Some(enabled);
        self
    }

    /// Sets the page estimation factor.
    #[must_use]
    pub fn calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Enables or disables expansion.
    #[must_use]
    pub fn expansion_enabled(mut self, enabled: bool) -> Self {
        self.expansion_enabled = Some(enabled);
        self
    }

    /// Sets the target page count.
    #[must_use]
    pub fn target_pages(mut self, pages: usize) -> Self {
        self.target_pages = Some(pages);
        self
    }

    /// Sets the ceiling on repeated units.
    #[must_use]
    pub fn ceiling(mut self, units: usize) -> Self {
        self.ceiling = Some(units);
        self
    }

    /// Sets the annotation placed around repeated blocks.
    #[must_use]
    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Keeps only this many pages of a longer document.
    #[must_use]
    pub fn excerpt_pages(mut self, pages: usize) -> Self {
        self.excerpt_pages = Some(pages);
        self
    }

    /// Sets the page layout.
    #[must_use]
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Enables dry run mode (no file writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Enables or disables backup creation.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = Some(enabled);
        self
    }

    /// Enables or disables the JSON run summary.
    #[must_use]
    pub fn write_summary(mut self, enabled: bool) -> Self {
        self.write_summary = Some(enabled);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let root_dir = self.root_dir.unwrap_or_else(|| PathBuf::from("."));
        let software_name = self
            .software_name
            .unwrap_or_else(|| default_software_name(&root_dir));

        let defaults = CleanConfig::default();
        let clean = CleanConfig {
            strip_comments: self.strip_comments.unwrap_or(defaults.strip_comments),
            strip_blank_lines: self.strip_blank_lines.unwrap_or(defaults.strip_blank_lines),
            reflow_minified: self.reflow_minified.unwrap_or(defaults.reflow_minified),
        };

        let mut expansion = ExpansionConfig::default();
        if let Some(enabled) = self.expansion_enabled {
            expansion.enabled = enabled;
        }
        if let Some(pages) = self.target_pages {
            expansion.target_pages = pages;
        }
        if let Some(ceiling) = self.ceiling {
            expansion.ceiling = ceiling;
        }
        if let Some(annotation) = self.annotation {
            expansion.annotation = annotation;
        }

        let config = Config {
            root_dir,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("out")),
            software_name,
            software_version: self
                .software_version
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            format: self.format.unwrap_or_default(),
            file_filter_config: self.file_filter_config.unwrap_or_default(),
            respect_gitignore: self.respect_gitignore.unwrap_or(true),
            encoding_fallbacks: self.encoding_fallbacks.unwrap_or_else(|| {
                DEFAULT_ENCODING_FALLBACKS
                    .iter()
                    .map(|label| (*label).to_string())
                    .collect()
            }),
            clean,
            calibration: self.calibration.unwrap_or_default(),
            expansion,
            excerpt_pages: self.excerpt_pages,
            layout: self.layout.unwrap_or_default(),
            dry_run: self.dry_run,
            backup_existing: self.backup_existing.unwrap_or(true),
            write_summary: self.write_summary.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder().root_dir(temp.path()).build().unwrap();

        assert_eq!(config.expansion.target_pages, 63);
        assert_eq!(config.expansion.ceiling, 10_000);
        assert_eq!(config.calibration, Calibration::LinesPerPage(57));
        assert_eq!(config.format, OutputFormat::Docx);
        assert_eq!(config.software_version, "1.0");
        assert!(config.clean.strip_comments);
        assert!(config.respect_gitignore);
        assert_eq!(config.encoding_fallbacks, ["gbk", "windows-1252"]);
    }

    #[test]
    fn test_software_name_defaults_to_root_name() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder().root_dir(temp.path()).build().unwrap();

        let expected = temp
            .path()
            .canonicalize()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert_eq!(config.software_name, expected);
    }

    #[test]
    fn test_missing_root_is_a_scan_error() {
        let result = Config::builder()
            .root_dir("/nonexistent/path/that/should/not/exist")
            .software_name("x")
            .build();

        assert!(result.unwrap_err().is_scan());
    }

    #[test]
    fn test_root_must_be_a_directory() {
        use assert_fs::prelude::*;
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("main.js");
        file.write_str("x();").unwrap();

        let result = Config::builder().root_dir(file.path()).build();
        assert!(result.unwrap_err().is_scan());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let base = || Config::builder().root_dir(temp.path());

        assert!(base().target_pages(0).build().unwrap_err().is_config());
        assert!(base().ceiling(0).build().unwrap_err().is_config());
        assert!(base().excerpt_pages(0).build().unwrap_err().is_config());
        assert!(base()
            .calibration(Calibration::CharsPerPage(0))
            .build()
            .unwrap_err()
            .is_config());
        assert!(base().software_version(" ").build().unwrap_err().is_config());
    }

    #[test]
    fn test_layout_validation() {
        let mut layout = Layout::default();
        assert!(layout.validate().is_ok());

        layout.wrap.width = 2;
        assert!(layout.validate().is_err());

        layout = Layout::default();
        layout.font_size = 0.0;
        assert!(layout.validate().is_err());

        layout = Layout::default();
        layout.margins.left = -1.0;
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_output_path() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder()
            .root_dir(temp.path())
            .output_dir("docs")
            .software_name("Acme Shop")
            .software_version("2.1")
            .format(OutputFormat::Markdown)
            .build()
            .unwrap();

        assert_eq!(config.output_path(), PathBuf::from("docs/Acme_Shop_2.1_source_code.md"));
    }

    #[test]
    fn test_clean_toggles() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config::builder()
            .root_dir(temp.path())
            .strip_comments(false)
            .strip_blank_lines(false)
            .build()
            .unwrap();

        assert!(config.clean.is_disabled());
    }
}
