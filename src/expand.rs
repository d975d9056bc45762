//! Controlled repetition up to a page target.
//!
//! The engine walks `Assessing -> Expanding -> Satisfied | CeilingReached`.
//! When the originals already fill the target nothing is repeated.
//! Otherwise the non-blank files are repeated round-robin, each repeat
//! wrapped in an annotation naming its source file and repetition index,
//! until the estimate reaches the target or the unit ceiling is hit.

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::estimate::LengthEstimator;
use crate::file::Corpus;
use crate::plan::{BlockId, ExpansionUnit};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Default page target.
pub const DEFAULT_TARGET_PAGES: usize = 63;

/// Default ceiling on repeated units.
pub const DEFAULT_CEILING: usize = 10_000;

const DEFAULT_HEADER: &str = "/* === repeated block {block}, repeat {index} of {file} === */";
const DEFAULT_FOOTER: &str = "/* === end of repeat {index} of {file} === */";

/// Marker lines placed around every repeated block.
///
/// Templates support `{file}` (relative path), `{index}` (repetition index
/// starting at 1) and `{block}` (1-based block number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Line before the repeated block
    pub header: String,
    /// Line after the repeated block
    pub footer: String,
}

impl Default for Annotation {
    fn default() -> Self {
        Self {
            header: DEFAULT_HEADER.to_string(),
            footer: DEFAULT_FOOTER.to_string(),
        }
    }
}

impl Annotation {
    /// Validates both templates.
    ///
    /// # Errors
    ///
    /// Returns an error if a template is blank, spans lines, or lacks the
    /// `{file}` or `{index}` placeholder.
    pub fn validate(&self) -> Result<()> {
        for template in [&self.header, &self.footer] {
            if template.trim().is_empty() {
                return Err(Error::invalid_pattern(
                    template.as_str(),
                    "annotation must not be empty",
                ));
            }
            if template.contains('\n') {
                return Err(Error::invalid_pattern(
                    template.as_str(),
                    "annotation must be a single line",
                ));
            }
            for placeholder in ["{file}", "{index}"] {
                if !template.contains(placeholder) {
                    return Err(Error::invalid_pattern(
                        template.as_str(),
                        format!("annotation must contain {placeholder}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fills placeholders in one pass; substituted text is never rescanned.
    fn render(template: &str, file: &str, block: BlockId, index: usize) -> String {
        let mut out = String::with_capacity(template.len() + file.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{file}") {
                out.push_str(file);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{index}") {
                out.push_str(&index.to_string());
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{block}") {
                out.push_str(&block.to_string());
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }

    /// Renders the header for one repeat.
    #[must_use]
    pub fn header_for(&self, file: &str, block: BlockId, index: usize) -> String {
        Self::render(&self.header, file, block, index)
    }

    /// Renders the footer for one repeat.
    #[must_use]
    pub fn footer_for(&self, file: &str, block: BlockId, index: usize) -> String {
        Self::render(&self.footer, file, block, index)
    }
}

/// Expansion settings: the page budget and the annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionConfig {
    /// Repeat content when below target
    pub enabled: bool,
    /// Target page count
    pub target_pages: usize,
    /// Maximum number of repeated units
    pub ceiling: usize,
    /// Marker lines around repeats
    pub annotation: Annotation,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_pages: DEFAULT_TARGET_PAGES,
            ceiling: DEFAULT_CEILING,
            annotation: Annotation::default(),
        }
    }
}

impl ExpansionConfig {
    /// Validates the budget and annotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the target or ceiling is zero or the annotation
    /// is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.target_pages == 0 {
            return Err(Error::config("target_pages must be greater than 0"));
        }
        if self.ceiling == 0 {
            return Err(Error::config("ceiling must be greater than 0"));
        }
        self.annotation.validate()
    }
}

/// States of the expansion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionState {
    /// Measuring the originals
    Assessing,
    /// Emitting repeats
    Expanding,
    /// Target reached (terminal)
    Satisfied,
    /// Ceiling hit before the target (terminal)
    CeilingReached,
}

impl ExpansionState {
    /// Returns true for the two terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Satisfied | Self::CeilingReached)
    }
}

/// How expansion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionOutcome {
    /// The estimate reached the target
    Satisfied,
    /// Stopped below target: ceiling hit or nothing to repeat
    CeilingReached,
    /// Expansion turned off; originals only
    Disabled,
}

impl fmt::Display for ExpansionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Satisfied => "satisfied",
            Self::CeilingReached => "ceiling reached",
            Self::Disabled => "disabled",
        })
    }
}

/// Result of one expansion.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// Originals in corpus order followed by repeats
    pub units: Vec<ExpansionUnit>,
    /// How expansion ended
    pub outcome: ExpansionOutcome,
    /// Measure of the originals alone
    pub original_measure: usize,
    /// Measure of every unit
    pub measured: usize,
    /// Estimated pages of every unit
    pub estimated_pages: f64,
    /// Warnings raised while expanding
    pub diagnostics: Diagnostics,
}

impl Expansion {
    /// Number of repeated units emitted.
    #[must_use]
    pub fn repeated_units(&self) -> usize {
        self.units.iter().filter(|u| u.is_repeated()).count()
    }
}

/// Brings a corpus up to the page target by annotated repetition.
pub struct ExpansionEngine {
    config: ExpansionConfig,
    estimator: Arc<dyn LengthEstimator>,
}

impl fmt::Debug for ExpansionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionEngine")
            .field("config", &self.config)
            .field("estimator", &self.estimator)
            .finish()
    }
}

impl ExpansionEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: ExpansionConfig, estimator: Arc<dyn LengthEstimator>) -> Self {
        Self { config, estimator }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Runs the state machine over `corpus`.
    ///
    /// Deterministic: the same corpus always yields the same units. Emits at
    /// most `ceiling` repeats. An empty corpus stops immediately with
    /// `CeilingReached` and no units; raising the empty-corpus warning is
    /// left to the caller, which knows the scanned root.
    #[must_use]
    pub fn expand(&self, corpus: &Corpus) -> Expansion {
        let estimator = self.estimator.as_ref();
        let mut diagnostics = Diagnostics::new();
        let mut state = ExpansionState::Assessing;
        trace!("Expansion state: {:?}", state);

        let mut units: Vec<ExpansionUnit> = corpus
            .iter()
            .enumerate()
            .map(|(index, file)| {
                ExpansionUnit::original(BlockId::new(index), file.label(), file.cleaned())
            })
            .collect();

        let original_measure: usize = units.iter().map(|u| u.measure(estimator)).sum();
        let required = estimator.required(self.config.target_pages);
        let mut measured = original_measure;

        debug!(
            "Assessing: {} {} across {} files, {} needed for {} pages",
            original_measure,
            estimator.unit(),
            units.len(),
            required,
            self.config.target_pages
        );

        let outcome = if measured >= required {
            info!(
                "Corpus already fills ~{:.1} pages; no expansion needed",
                estimator.pages(measured)
            );
            ExpansionOutcome::Satisfied
        } else if !self.config.enabled {
            info!("Expansion disabled; document stays at ~{:.1} pages", estimator.pages(measured));
            ExpansionOutcome::Disabled
        } else if corpus.is_empty() {
            ExpansionOutcome::CeilingReached
        } else {
            let expandable: Vec<usize> = corpus
                .iter()
                .enumerate()
                .filter(|(_, file)| !file.is_blank())
                .map(|(index, _)| index)
                .collect();

            if expandable.is_empty() {
                diagnostics.push(Warning::NoExpandableContent { files: corpus.len() });
                ExpansionOutcome::CeilingReached
            } else {
                state = ExpansionState::Expanding;
                trace!("Expansion state: {:?}", state);

                let mut repetitions = vec![0usize; corpus.len()];
                let mut emitted = 0usize;

                // Round-robin: the k-th repeat of every file precedes any (k+1)-th
                let mut cursor = expandable.iter().cycle();
                while !state.is_terminal() {
                    if emitted >= self.config.ceiling {
                        state = ExpansionState::CeilingReached;
                        continue;
                    }

                    let Some(&index) = cursor.next() else {
                        break;
                    };
                    let Some(file) = corpus.get(index) else {
                        continue;
                    };
                    let block = BlockId::new(index);
                    repetitions[index] += 1;
                    let repetition = repetitions[index];
                    let label = file.label();

                    let unit = ExpansionUnit::repeated(
                        block,
                        repetition,
                        label.as_str(),
                        file.cleaned(),
                        self.config.annotation.header_for(&label, block, repetition),
                        self.config.annotation.footer_for(&label, block, repetition),
                    );
                    measured += unit.measure(estimator);
                    units.push(unit);
                    emitted += 1;

                    trace!(
                        "Repeated {} (#{}), now ~{:.2} pages",
                        label,
                        repetition,
                        estimator.pages(measured)
                    );

                    if measured >= required {
                        state = ExpansionState::Satisfied;
                    }
                }

                debug!("Expanding finished after {} units in state {:?}", emitted, state);

                if state == ExpansionState::Satisfied {
                    ExpansionOutcome::Satisfied
                } else {
                    diagnostics.push(Warning::CeilingReached {
                        ceiling: self.config.ceiling,
                        units_emitted: emitted,
                        estimated_pages: estimator.pages(measured),
                        target_pages: self.config.target_pages,
                    });
                    ExpansionOutcome::CeilingReached
                }
            }
        };

        Expansion {
            units,
            outcome,
            original_measure,
            measured,
            estimated_pages: estimator.pages(measured),
            diagnostics,
        }
    }
}
