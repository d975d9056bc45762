use crate::error::{Error, Result};
use crate::wrap::{WrapOptions, expand_tabs, physical_lines};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Physical lines per page of the default DOCX layout.
pub const DEFAULT_LINES_PER_PAGE: usize = 57;

/// Conversion factor from measured text to pages.
///
/// The factor must be calibrated against the renderer's real layout (font,
/// margins and line spacing). A "page" produced by an estimator is always
/// this proxy, never a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calibration {
    /// Physical (wrapped) lines per page
    LinesPerPage(usize),
    /// Characters per page, line breaks included
    CharsPerPage(usize),
}

impl Default for Calibration {
    fn default() -> Self {
        Self::LinesPerPage(DEFAULT_LINES_PER_PAGE)
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinesPerPage(n) => write!(f, "{n} lines/page"),
            Self::CharsPerPage(n) => write!(f, "{n} chars/page"),
        }
    }
}

impl Calibration {
    /// Creates the estimator for this calibration.
    ///
    /// `wrap` must be the layout the renderer uses, so that physical lines
    /// are counted the way they are written.
    #[must_use]
    pub fn create(self, wrap: &WrapOptions) -> Arc<dyn LengthEstimator> {
        match self {
            Self::LinesPerPage(lines_per_page) => {
                Arc::new(LineEstimator::new(lines_per_page, wrap.clone()))
            }
            Self::CharsPerPage(chars_per_page) => {
                Arc::new(CharEstimator::new(chars_per_page, wrap.tab_width))
            }
        }
    }

    /// Units of measure per page.
    #[must_use]
    pub const fn factor(self) -> usize {
        match self {
            Self::LinesPerPage(n) | Self::CharsPerPage(n) => n,
        }
    }

    /// Same kind of calibration with a different factor.
    #[must_use]
    pub const fn with_factor(self, factor: usize) -> Self {
        match self {
            Self::LinesPerPage(_) => Self::LinesPerPage(factor),
            Self::CharsPerPage(_) => Self::CharsPerPage(factor),
        }
    }

    /// Validates the factor.
    ///
    /// # Errors
    ///
    /// Returns an error if the factor is zero.
    pub fn validate(self) -> Result<()> {
        if self.factor() == 0 {
            return Err(Error::config(format!(
                "calibration factor must be greater than 0 ({self})"
            )));
        }
        Ok(())
    }

    /// Factor that would have predicted `actual_pages` for `measured` units.
    ///
    /// Returns `None` when either count is zero.
    #[must_use]
    pub fn recalibrated(self, measured: usize, actual_pages: usize) -> Option<Self> {
        if measured == 0 || actual_pages == 0 {
            return None;
        }
        let factor = measured.div_ceil(actual_pages).max(1);
        Some(self.with_factor(factor))
    }
}

/// Converts text into an estimated page count.
///
/// Implementations are pure: the same text always measures the same, and
/// measuring is additive over lines so running totals stay exact.
pub trait LengthEstimator: Send + Sync {
    /// Measures one logical line (no trailing newline).
    fn measure_line(&self, line: &str) -> usize;

    /// Units of measure per page.
    fn per_page(&self) -> usize;

    /// Name of the unit of measure.
    fn unit(&self) -> &'static str;

    /// Measures a block of text.
    ///
    /// Default implementation sums `measure_line` over every line.
    fn measure(&self, text: &str) -> usize {
        text.lines().map(|line| self.measure_line(line)).sum()
    }

    /// Converts a measured quantity into pages.
    #[allow(clippy::cast_precision_loss)]
    fn pages(&self, measured: usize) -> f64 {
        measured as f64 / self.per_page().max(1) as f64
    }

    /// Measured quantity that corresponds to `pages` pages.
    fn required(&self, pages: usize) -> usize {
        pages.saturating_mul(self.per_page())
    }

    /// Estimates the pages a block of text fills.
    fn estimate_pages(&self, text: &str) -> f64 {
        self.pages(self.measure(text))
    }
}

impl fmt::Debug for dyn LengthEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LengthEstimator({} {}/page)", self.per_page(), self.unit())
    }
}

/// Counts physical lines after wrapping.
#[derive(Debug, Clone)]
pub struct LineEstimator {
    lines_per_page: usize,
    wrap: WrapOptions,
}

impl LineEstimator {
    /// Creates a line estimator.
    #[must_use]
    pub const fn new(lines_per_page: usize, wrap: WrapOptions) -> Self {
        Self {
            lines_per_page,
            wrap,
        }
    }
}

impl LengthEstimator for LineEstimator {
    fn measure_line(&self, line: &str) -> usize {
        physical_lines(line, &self.wrap)
    }

    fn per_page(&self) -> usize {
        self.lines_per_page
    }

    fn unit(&self) -> &'static str {
        "lines"
    }
}

/// Counts characters, tabs expanded and one per line break.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimator {
    chars_per_page: usize,
    tab_width: usize,
}

impl CharEstimator {
    /// Creates a character estimator.
    #[must_use]
    pub const fn new(chars_per_page: usize, tab_width: usize) -> Self {
        Self {
            chars_per_page,
            tab_width,
        }
    }
}

impl LengthEstimator for CharEstimator {
    fn measure_line(&self, line: &str) -> usize {
        expand_tabs(line, self.tab_width).chars().count() + 1
    }

    fn per_page(&self) -> usize {
        self.chars_per_page
    }

    fn unit(&self) -> &'static str {
        "chars"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(per_page: usize) -> Arc<dyn LengthEstimator> {
        Calibration::LinesPerPage(per_page).create(&WrapOptions::unwrapped())
    }

    #[test]
    fn test_line_estimator_counts_lines() {
        let estimator = lines(10);
        assert_eq!(estimator.measure(""), 0);
        assert_eq!(estimator.measure("a\nb\nc"), 3);
        assert_eq!(estimator.measure("a\n\nc\n"), 3);
        assert!((estimator.estimate_pages(&"x\n".repeat(25)) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_line_estimator_counts_wrapped_lines() {
        let wrap = WrapOptions {
            width: 10,
            ..WrapOptions::default()
        };
        let estimator = Calibration::LinesPerPage(50).create(&wrap);
        assert_eq!(estimator.measure("short"), 1);
        // "word word" then one word per continuation line
        assert_eq!(estimator.measure(&"word ".repeat(10)), 9);
    }

    #[test]
    fn test_measure_is_additive() {
        let estimator = lines(57);
        let a = "fn a() {}\nlet x = 1;";
        let b = "b();";
        assert_eq!(
            estimator.measure(&format!("{a}\n{b}")),
            estimator.measure(a) + estimator.measure(b)
        );
    }

    #[test]
    fn test_estimates_are_pure() {
        let estimator = lines(57);
        let text = "const a = 1;\n".repeat(100);
        assert_eq!(estimator.measure(&text), estimator.measure(&text));
    }

    #[test]
    fn test_char_estimator() {
        let estimator = Calibration::CharsPerPage(100).create(&WrapOptions::default());
        assert_eq!(estimator.measure("abc"), 4);
        assert_eq!(estimator.measure("abc\n\tx"), 4 + 6);
        assert_eq!(estimator.required(3), 300);
        assert_eq!(estimator.unit(), "chars");
    }

    #[test]
    fn test_estimators_built_directly_match_calibration() {
        let wrap = WrapOptions::default();
        let text = "\tlet total = price * quantity;\n".repeat(30);

        let direct = LineEstimator::new(57, wrap.clone());
        let created = Calibration::LinesPerPage(57).create(&wrap);
        assert_eq!(direct.measure(&text), created.measure(&text));
        assert_eq!(direct.per_page(), 57);

        let direct = CharEstimator::new(3_000, wrap.tab_width);
        let created = Calibration::CharsPerPage(3_000).create(&wrap);
        assert_eq!(direct.measure(&text), created.measure(&text));
        assert_eq!(direct.unit(), "chars");
    }

    #[test]
    fn test_required_saturates() {
        assert_eq!(lines(10).required(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_zero_factor_is_rejected() {
        assert!(Calibration::LinesPerPage(0).validate().is_err());
        assert!(Calibration::CharsPerPage(3_000).validate().is_ok());
    }

    #[test]
    fn test_recalibrated() {
        let calibration = Calibration::LinesPerPage(57);
        assert_eq!(
            calibration.recalibrated(600, 10),
            Some(Calibration::LinesPerPage(60))
        );
        assert_eq!(calibration.recalibrated(601, 10), Some(Calibration::LinesPerPage(61)));
        assert_eq!(calibration.recalibrated(600, 0), None);
        assert_eq!(calibration.recalibrated(0, 4), None);
    }
}
