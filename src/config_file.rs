//! YAML configuration file.
//!
//! The file is optional. Its values are applied to a [`ConfigBuilder`]
//! before command-line flags, so flags win.
//!
//! ```yaml
//! source:
//!   extensions: [js, ts, css]
//!   exclude: ["**/generated"]
//! expansion:
//!   target_pages: 60
//! calibration:
//!   lines_per_page: 55
//! output:
//!   format: docx
//! ```

use crate::config::{ConfigBuilder, Layout, OutputFormat};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::estimate::Calibration;
use crate::expand::Annotation;
use serde::Deserialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CODE_COLLATE_CONFIG_PATH";

/// Older name of [`CONFIG_PATH_ENV`], read when the new one is unset.
pub const LEGACY_CONFIG_PATH_ENV: &str = "CODECOLLATE_CONFIG_PATH";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "code-collate.yaml";

/// Older name of [`DEFAULT_CONFIG_FILE`], tried after it.
pub const LEGACY_CONFIG_FILE: &str = "codecollate_config.yaml";

/// Reads the configuration path variable, falling back to its older name.
#[must_use]
pub fn config_path_from_env() -> Option<OsString> {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var_os(LEGACY_CONFIG_PATH_ENV))
}

/// Where the configuration file path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// [`CONFIG_PATH_ENV`]
    Environment,
    /// `--config` flag
    Flag,
    /// [`DEFAULT_CONFIG_FILE`] in the working directory
    WorkingDirectory,
}

/// Outcome of configuration path resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfigPath {
    /// The file to load, if any
    pub path: Option<(PathBuf, ConfigSource)>,
    /// Warnings raised while resolving
    pub diagnostics: Diagnostics,
}

/// Resolves the configuration file path.
///
/// Precedence: environment value > explicit flag > working-directory
/// default. An environment path that does not exist is reported and
/// skipped; an explicit flag path that does not exist is an error. The
/// environment value is passed in so the function has no ambient inputs.
///
/// # Errors
///
/// Returns an error if `flag` names a file that does not exist.
pub fn resolve_config_path(
    env_value: Option<&OsStr>,
    flag: Option<&Path>,
    working_dir: &Path,
) -> Result<ResolvedConfigPath> {
    let mut resolved = ResolvedConfigPath::default();

    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        let path = PathBuf::from(value);
        if path.is_file() {
            debug!("Using configuration from {}: {}", CONFIG_PATH_ENV, path.display());
            resolved.path = Some((path, ConfigSource::Environment));
            return Ok(resolved);
        }
        resolved.diagnostics.push(Warning::ConfigFileMissing { path });
    }

    if let Some(path) = flag {
        if !path.is_file() {
            return Err(Error::config(format!(
                "configuration file does not exist: {}",
                path.display()
            )));
        }
        resolved.path = Some((path.to_path_buf(), ConfigSource::Flag));
        return Ok(resolved);
    }

    resolved.path = [DEFAULT_CONFIG_FILE, LEGACY_CONFIG_FILE]
        .iter()
        .map(|name| working_dir.join(name))
        .find(|path| path.is_file())
        .map(|path| (path, ConfigSource::WorkingDirectory));

    Ok(resolved)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SourceSection {
    extensions: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    exclude_files: Option<Vec<String>>,
    respect_gitignore: Option<bool>,
    encoding_fallbacks: Option<Vec<String>>,
    strip_comments: Option<bool>,
    strip_blank_lines: Option<bool>,
    reflow_minified: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ExpansionSection {
    enabled: Option<bool>,
    target_pages: Option<usize>,
    ceiling: Option<usize>,
    annotation_header: Option<String>,
    annotation_footer: Option<String>,
    excerpt_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CalibrationSection {
    lines_per_page: Option<usize>,
    chars_per_page: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MarginsSection {
    top: Option<f64>,
    bottom: Option<f64>,
    left: Option<f64>,
    right: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LayoutSection {
    header_text: Option<String>,
    header_border: Option<bool>,
    page_numbers: Option<bool>,
    font_family: Option<String>,
    font_size: Option<f64>,
    header_font_family: Option<String>,
    header_font_size: Option<f64>,
    line_spacing: Option<f64>,
    margins: MarginsSection,
    header_distance: Option<f64>,
    footer_distance: Option<f64>,
    wrap_width: Option<usize>,
    wrap_indent: Option<String>,
    tab_width: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OutputSection {
    dir: Option<PathBuf>,
    format: Option<OutputFormat>,
    name: Option<String>,
    version: Option<String>,
    backup: Option<bool>,
    summary: Option<bool>,
}

/// Contents of a YAML configuration file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    source: SourceSection,
    expansion: ExpansionSection,
    calibration: CalibrationSection,
    layout: LayoutSection,
    output: OutputSection,
}

impl ConfigFile {
    /// Parses YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML or has unknown keys.
    pub fn parse(text: &str) -> Result<Self> {
        let has_content = text.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#') && line != "---"
        });
        if !has_content {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reads and parses a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text).map_err(|e| {
            Error::config(format!("failed to parse '{}': {e}", path.display()))
        })
    }

    /// Applies every value present in the file to `builder`.
    ///
    /// # Errors
    ///
    /// Returns an error if both calibration factors are set.
    pub fn apply(self, mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
        let Self {
            source,
            expansion,
            calibration,
            layout,
            output,
        } = self;

        if let Some(extensions) = source.extensions {
            builder = builder.extensions(extensions);
        }
        if let Some(patterns) = source.exclude {
            builder = builder.exclude_directories(patterns);
        }
        if let Some(patterns) = source.exclude_files {
            builder = builder.exclude_files(patterns);
        }
        if let Some(enabled) = source.respect_gitignore {
            builder = builder.respect_gitignore(enabled);
        }
        if let Some(labels) = source.encoding_fallbacks {
            builder = builder.encoding_fallbacks(labels);
        }
        if let Some(enabled) = source.strip_comments {
            builder = builder.strip_comments(enabled);
        }
        if let Some(enabled) = source.strip_blank_lines {
            builder = builder.strip_blank_lines(enabled);
        }
        if let Some(enabled) = source.reflow_minified {
            builder = builder.reflow_minified(enabled);
        }

        if let Some(enabled) = expansion.enabled {
            builder = builder.expansion_enabled(enabled);
        }
        if let Some(pages) = expansion.target_pages {
            builder = builder.target_pages(pages);
        }
        if let Some(ceiling) = expansion.ceiling {
            builder = builder.ceiling(ceiling);
        }
        if expansion.annotation_header.is_some() || expansion.annotation_footer.is_some() {
            let defaults = Annotation::default();
            builder = builder.annotation(Annotation {
                header: expansion.annotation_header.unwrap_or(defaults.header),
                footer: expansion.annotation_footer.unwrap_or(defaults.footer),
            });
        }
        if let Some(pages) = expansion.excerpt_pages {
            builder = builder.excerpt_pages(pages);
        }

        match (calibration.lines_per_page, calibration.chars_per_page) {
            (Some(_), Some(_)) => {
                return Err(Error::config(
                    "calibration: set either lines_per_page or chars_per_page, not both",
                ));
            }
            (Some(lines), None) => builder = builder.calibration(Calibration::LinesPerPage(lines)),
            (None, Some(chars)) => builder = builder.calibration(Calibration::CharsPerPage(chars)),
            (None, None) => {}
        }

        builder = builder.layout(layout.into_layout());

        if let Some(dir) = output.dir {
            builder = builder.output_dir(dir);
        }
        if let Some(format) = output.format {
            builder = builder.format(format);
        }
        if let Some(name) = output.name {
            builder = builder.software_name(name);
        }
        if let Some(version) = output.version {
            builder = builder.software_version(version);
        }
        if let Some(enabled) = output.backup {
            builder = builder.backup_existing(enabled);
        }
        if let Some(enabled) = output.summary {
            builder = builder.write_summary(enabled);
        }

        Ok(builder)
    }

    /// Software name from the file, if set.
    #[must_use]
    pub fn software_name(&self) -> Option<&str> {
        self.output.name.as_deref()
    }

    /// Software version from the file, if set.
    #[must_use]
    pub fn software_version(&self) -> Option<&str> {
        self.output.version.as_deref()
    }
}

impl LayoutSection {
    fn into_layout(self) -> Layout {
        let mut layout = Layout::default();

        if let Some(text) = self.header_text {
            layout.header_text = text;
        }
        if let Some(enabled) = self.header_border {
            layout.header_border = enabled;
        }
        if let Some(enabled) = self.page_numbers {
            layout.page_numbers = enabled;
        }
        if let Some(font) = self.font_family {
            layout.font_family = font;
        }
        if let Some(size) = self.font_size {
            layout.font_size = size;
        }
        if let Some(font) = self.header_font_family {
            layout.header_font_family = font;
        }
        if let Some(size) = self.header_font_size {
            layout.header_font_size = size;
        }
        if let Some(spacing) = self.line_spacing {
            layout.line_spacing = spacing;
        }

        let margins = &mut layout.margins;
        margins.top = self.margins.top.unwrap_or(margins.top);
        margins.bottom = self.margins.bottom.unwrap_or(margins.bottom);
        margins.left = self.margins.left.unwrap_or(margins.left);
        margins.right = self.margins.right.unwrap_or(margins.right);

        if let Some(distance) = self.header_distance {
            layout.header_distance = distance;
        }
        if let Some(distance) = self.footer_distance {
            layout.footer_distance = distance;
        }
        if let Some(width) = self.wrap_width {
            layout.wrap.width = width;
        }
        if let Some(indent) = self.wrap_indent {
            layout.wrap.indent = indent;
        }
        if let Some(width) = self.tab_width {
            layout.wrap.tab_width = width;
        }

        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use assert_fs::prelude::*;

    #[test]
    fn test_parse_full_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let yaml = r#"
source:
  extensions: [js, vue]
  exclude: ["**/generated"]
  strip_comments: false
  encoding_fallbacks: [gbk, latin-1]
expansion:
  target_pages: 30
  ceiling: 500
  annotation_header: "// repeat {index}: {file}"
calibration:
  chars_per_page: 4000
layout:
  font_size: 10.5
  margins:
    left: 3.0
  wrap_width: 100
output:
  format: markdown
  name: Demo
  version: "3.2"
"#;
        let builder = ConfigFile::parse(yaml)
            .unwrap()
            .apply(Config::builder().root_dir(temp.path()))
            .unwrap();
        let config = builder.build().unwrap();

        assert_eq!(config.expansion.target_pages, 30);
        assert_eq!(config.expansion.ceiling, 500);
        assert_eq!(config.expansion.annotation.header, "// repeat {index}: {file}");
        assert_eq!(config.calibration, Calibration::CharsPerPage(4000));
        assert!(!config.clean.strip_comments);
        assert!(config.clean.strip_blank_lines);
        assert!((config.layout.margins.left - 3.0).abs() < f64::EPSILON);
        assert!((config.layout.margins.top - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.layout.wrap.width, 100);
        assert_eq!(config.format, OutputFormat::Markdown);
        assert_eq!(config.software_name, "Demo");
        assert_eq!(config.software_version, "3.2");
        assert!(config.file_filter_config.allowed_extensions().contains("vue"));
        assert_eq!(config.encoding_fallbacks, ["gbk", "latin-1"]);
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = ConfigFile::parse("source:\n  encoding_fallbacks: [ebcdic-ish]\n").unwrap();
        let err = file
            .apply(Config::builder().root_dir(temp.path()))
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_cli_values_override_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = ConfigFile::parse("expansion:\n  target_pages: 30\n").unwrap();
        let config = file
            .apply(Config::builder().root_dir(temp.path()))
            .unwrap()
            .target_pages(80)
            .build()
            .unwrap();

        assert_eq!(config.expansion.target_pages, 80);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ConfigFile::parse("expansion:\n  target: 30\n").is_err());
        assert!(ConfigFile::parse("colour: red\n").is_err());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert!(ConfigFile::parse("").is_ok());
        assert!(ConfigFile::parse("# only a comment\n").is_ok());
    }

    #[test]
    fn test_both_calibrations_rejected() {
        let file =
            ConfigFile::parse("calibration:\n  lines_per_page: 50\n  chars_per_page: 3000\n").unwrap();
        let err = file.apply(Config::builder()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_env_path_takes_precedence() {
        let temp = assert_fs::TempDir::new().unwrap();
        let env_file = temp.child("env.yaml");
        env_file.write_str("").unwrap();
        let flag_file = temp.child("flag.yaml");
        flag_file.write_str("").unwrap();
        temp.child(DEFAULT_CONFIG_FILE).write_str("").unwrap();

        let resolved = resolve_config_path(
            Some(env_file.path().as_os_str()),
            Some(flag_file.path()),
            temp.path(),
        )
        .unwrap();

        assert_eq!(
            resolved.path,
            Some((env_file.path().to_path_buf(), ConfigSource::Environment))
        );
        assert!(resolved.diagnostics.is_empty());
    }

    #[test]
    fn test_missing_env_path_falls_through_with_warning() {
        let temp = assert_fs::TempDir::new().unwrap();
        let flag_file = temp.child("flag.yaml");
        flag_file.write_str("").unwrap();

        let resolved = resolve_config_path(
            Some(OsStr::new("/no/such/config.yaml")),
            Some(flag_file.path()),
            temp.path(),
        )
        .unwrap();

        assert_eq!(
            resolved.path,
            Some((flag_file.path().to_path_buf(), ConfigSource::Flag))
        );
        assert!(matches!(
            resolved.diagnostics.warnings(),
            [Warning::ConfigFileMissing { .. }]
        ));
    }

    #[test]
    fn test_missing_flag_path_is_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = resolve_config_path(None, Some(Path::new("/no/such.yaml")), temp.path());
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_working_directory_default() {
        let temp = assert_fs::TempDir::new().unwrap();
        let resolved = resolve_config_path(None, None, temp.path()).unwrap();
        assert!(resolved.path.is_none());

        temp.child(DEFAULT_CONFIG_FILE).write_str("").unwrap();
        let resolved = resolve_config_path(Some(OsStr::new("")), None, temp.path()).unwrap();
        assert_eq!(
            resolved.path.map(|(_, source)| source),
            Some(ConfigSource::WorkingDirectory)
        );
    }

    #[test]
    fn test_legacy_file_name_is_found_after_current_name() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(LEGACY_CONFIG_FILE).write_str("").unwrap();
        let resolved = resolve_config_path(None, None, temp.path()).unwrap();
        assert_eq!(
            resolved.path.map(|(path, _)| path),
            Some(temp.path().join(LEGACY_CONFIG_FILE))
        );

        temp.child(DEFAULT_CONFIG_FILE).write_str("").unwrap();
        let resolved = resolve_config_path(None, None, temp.path()).unwrap();
        assert_eq!(
            resolved.path.map(|(path, _)| path),
            Some(temp.path().join(DEFAULT_CONFIG_FILE))
        );
    }
}
