//! Path filtering for repository scanning.
//!
//! Decides which files enter the corpus: the extension allow-list plus glob
//! patterns that exclude files and whole directories.

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::path::Path;

static DEFAULT_EXTENSIONS: Lazy<Vec<String>> = Lazy::new(|| {
    ["html", "js", "css", "py", "java", "ts", "tsx"]
        .into_iter()
        .map(String::from)
        .collect()
});

static DEFAULT_EXCLUDED_DIRECTORIES: Lazy<Vec<String>> = Lazy::new(|| {
    [
        "**/node_modules",
        "**/target",
        "**/out",
        "**/dist",
        "**/build",
        "**/.git",
        "**/.idea",
        "**/.vscode",
        "**/vendor",
        "**/__pycache__",
    ]
    .into_iter()
    .map(String::from)
    .collect()
});

/// Configuration for file filtering with an extension allow-list and glob patterns.
///
/// Patterns are matched against paths relative to the scan root.
#[derive(Debug, Clone)]
pub struct FileFilterConfig {
    extensions: Vec<String>,
    exclude_files: Vec<String>,
    exclude_directories: Vec<String>,
}

impl Default for FileFilterConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.clone(),
            exclude_files: Vec::new(),
            exclude_directories: DEFAULT_EXCLUDED_DIRECTORIES.clone(),
        }
    }
}

impl FileFilterConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the extension allow-list.
    ///
    /// Leading dots and `*.` prefixes are accepted and ignored.
    #[must_use]
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Replaces the file exclusion patterns.
    #[must_use]
    pub fn exclude_files(mut self, patterns: Vec<String>) -> Self {
        self.exclude_files = patterns;
        self
    }

    /// Replaces the directory exclusion patterns.
    #[must_use]
    pub fn exclude_directories(mut self, patterns: Vec<String>) -> Self {
        self.exclude_directories = patterns;
        self
    }

    /// Adds directory exclusion patterns to the current list.
    #[must_use]
    pub fn also_exclude_directories(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.exclude_directories.extend(patterns);
        self
    }

    /// Normalized, lowercase extension allow-list.
    #[must_use]
    pub fn allowed_extensions(&self) -> BTreeSet<String> {
        self.extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Validates the allow-list and every glob pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the allow-list is empty or a pattern is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_extensions().is_empty() {
            return Err(Error::config("extension allow-list must not be empty"));
        }
        FileFilter::new(self).map(|_| ())
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim()
        .trim_start_matches('*')
        .trim_start_matches('.')
        .to_ascii_lowercase()
}

/// Compiled form of [`FileFilterConfig`].
#[derive(Debug, Clone)]
pub(crate) struct FileFilter {
    extensions: BTreeSet<String>,
    exclude_files: GlobSet,
    exclude_directories: GlobSet,
}

impl FileFilter {
    /// Compiles the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a glob pattern is invalid.
    pub(crate) fn new(config: &FileFilterConfig) -> Result<Self> {
        Ok(Self {
            extensions: config.allowed_extensions(),
            exclude_files: Self::build_globset(&config.exclude_files)?,
            exclude_directories: Self::build_globset(&config.exclude_directories)?,
        })
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob =
                Glob::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))
    }

    /// Returns true if the extension is on the allow-list (case-insensitive).
    pub(crate) fn extension_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }

    /// Returns true if the walker should not descend into this directory.
    pub(crate) fn is_excluded_directory(&self, relative: &Path) -> bool {
        !relative.as_os_str().is_empty() && self.exclude_directories.is_match(relative)
    }

    /// Returns true if a file at this relative path belongs in the corpus.
    pub(crate) fn should_process(&self, relative: &Path) -> bool {
        if !self.extension_allowed(relative) {
            return false;
        }

        if self.exclude_files.is_match(relative) {
            return false;
        }

        // Walkers prune excluded directories, but callers may pass any path
        !relative
            .ancestors()
            .skip(1)
            .any(|ancestor| self.is_excluded_directory(ancestor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(config: &FileFilterConfig) -> FileFilter {
        FileFilter::new(config).unwrap()
    }

    #[test]
    fn test_default_allow_list() {
        let filter = filter(&FileFilterConfig::default());
        assert!(filter.should_process(Path::new("index.html")));
        assert!(filter.should_process(Path::new("src/App.TSX")));
        assert!(filter.should_process(Path::new("pkg/main.py")));
        assert!(!filter.should_process(Path::new("Cargo.toml")));
        assert!(!filter.should_process(Path::new("Makefile")));
    }

    #[test]
    fn test_extension_normalization() {
        let config = FileFilterConfig::new().extensions(vec![
            "*.html".to_string(),
            ".JS".to_string(),
            "css".to_string(),
        ]);
        let allowed: Vec<String> = config.allowed_extensions().into_iter().collect();
        assert_eq!(allowed, ["css", "html", "js"]);
    }

    #[test]
    fn test_excluded_directories() {
        let filter = filter(&FileFilterConfig::default());
        assert!(filter.is_excluded_directory(Path::new("node_modules")));
        assert!(filter.is_excluded_directory(Path::new("web/dist")));
        assert!(!filter.is_excluded_directory(Path::new("src")));
        assert!(!filter.should_process(Path::new("node_modules/lib/index.js")));
        assert!(filter.should_process(Path::new("src/builder.js")));
    }

    #[test]
    fn test_root_is_never_excluded() {
        let filter = filter(&FileFilterConfig::default().exclude_directories(vec!["**".to_string()]));
        assert!(!filter.is_excluded_directory(Path::new("")));
    }

    #[test]
    fn test_excluded_files() {
        let config = FileFilterConfig::default().exclude_files(vec!["**/*.min.js".to_string()]);
        let filter = filter(&config);
        assert!(!filter.should_process(Path::new("static/jquery.min.js")));
        assert!(filter.should_process(Path::new("static/app.js")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = FileFilterConfig::default().exclude_files(vec!["[".to_string()]);
        let err = config.validate().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_empty_allow_list_is_rejected() {
        let config = FileFilterConfig::default().extensions(vec![" ".to_string()]);
        assert!(config.validate().is_err());
    }
}
