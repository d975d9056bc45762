//! Recoverable conditions collected during a run.
//!
//! None of these abort the pipeline. They are logged at `warn` level as they
//! happen and handed back to the caller in [`crate::RunReport`].

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// A non-fatal condition encountered during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Warning {
    /// A single file could not be read or decoded and was skipped.
    FileRead {
        /// Path of the skipped file (or directory, for walk errors)
        path: PathBuf,
        /// Why it was skipped
        reason: String,
    },

    /// No file under the root matched the extension allow-list.
    EmptyCorpus {
        /// Directory that was scanned
        root: PathBuf,
    },

    /// Files were found, but cleaning left nothing that could be repeated.
    NoExpandableContent {
        /// Number of files in the corpus
        files: usize,
    },

    /// Expansion stopped at the safety ceiling before reaching the target.
    CeilingReached {
        /// Configured ceiling on expansion units
        ceiling: usize,
        /// Units emitted before stopping
        units_emitted: usize,
        /// Estimate at the point expansion stopped
        estimated_pages: f64,
        /// Configured target
        target_pages: usize,
    },

    /// A configuration file named by the environment does not exist.
    ConfigFileMissing {
        /// The path that was looked up
        path: PathBuf,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileRead { path, reason } => {
                write!(f, "skipped '{}': {reason}", path.display())
            }
            Self::EmptyCorpus { root } => write!(
                f,
                "no source files matching the extension allow-list were found under '{}'; \
                 the document will be empty",
                root.display()
            ),
            Self::NoExpandableContent { files } => write!(
                f,
                "{files} file(s) were found but contain no code after cleaning; \
                 nothing can be repeated to reach the page target"
            ),
            Self::CeilingReached {
                ceiling,
                units_emitted,
                estimated_pages,
                target_pages,
            } => write!(
                f,
                "expansion stopped at the safety ceiling of {ceiling} units \
                 ({units_emitted} emitted): ~{estimated_pages:.1} of {target_pages} target pages"
            ),
            Self::ConfigFileMissing { path } => {
                write!(f, "configuration file '{}' does not exist", path.display())
            }
        }
    }
}

/// Ordered list of warnings raised during one run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and logs it.
    pub fn push(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// Appends every warning from another list, preserving order.
    pub fn extend(&mut self, other: Self) {
        self.warnings.extend(other.warnings);
    }

    /// Returns the recorded warnings in order.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Returns the number of recorded warnings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    /// Returns true if an empty-corpus warning was recorded.
    #[must_use]
    pub fn has_empty_corpus(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::EmptyCorpus { .. }))
    }

    /// Returns true if the ceiling was reached.
    #[must_use]
    pub fn has_ceiling_reached(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::CeilingReached { .. }))
    }

    /// Number of files skipped with a read warning.
    #[must_use]
    pub fn skipped_files(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, Warning::FileRead { .. }))
            .count()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Warning;
    type IntoIter = std::vec::IntoIter<Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.warnings.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Warning::EmptyCorpus {
            root: PathBuf::from("src"),
        });
        diagnostics.push(Warning::FileRead {
            path: PathBuf::from("a.js"),
            reason: "binary".to_string(),
        });

        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(diagnostics.warnings()[0], Warning::EmptyCorpus { .. }));
        assert!(diagnostics.has_empty_corpus());
        assert!(!diagnostics.has_ceiling_reached());
        assert_eq!(diagnostics.skipped_files(), 1);
    }

    #[test]
    fn test_ceiling_message_mentions_target() {
        let warning = Warning::CeilingReached {
            ceiling: 5,
            units_emitted: 5,
            estimated_pages: 2.5,
            target_pages: 60,
        };
        let text = warning.to_string();
        assert!(text.contains("ceiling of 5"));
        assert!(text.contains("60 target pages"));
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let warning = Warning::EmptyCorpus {
            root: PathBuf::from("src"),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "empty_corpus");
    }
}
