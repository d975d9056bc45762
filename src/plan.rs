//! The document plan handed to an assembler.
//!
//! A plan is an ordered list of [`ExpansionUnit`]s plus the layout. It is
//! built once at the end of a run and never mutated afterwards.

use crate::config::Layout;
use crate::estimate::LengthEstimator;
use serde::Serialize;
use std::fmt;

/// Identifies an original block, i.e. one file of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates an id from a corpus index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Corpus index of the block.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 1-based for readers
        write!(f, "{}", self.0 + 1)
    }
}

/// Where the text of a unit comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// The file's own cleaned text.
    Original {
        /// The block this unit is
        block: BlockId,
    },
    /// A repeat of an original block.
    Repeated {
        /// The original block being repeated
        source: BlockId,
        /// 1 on the first repeat of `source`, increasing by one
        repetition: usize,
    },
}

impl Provenance {
    /// The original block this unit derives from.
    #[must_use]
    pub const fn block(self) -> BlockId {
        match self {
            Self::Original { block } => block,
            Self::Repeated { source, .. } => source,
        }
    }
}

/// A labeled block of text with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionUnit {
    label: String,
    header: Option<String>,
    body: String,
    footer: Option<String>,
    provenance: Provenance,
    truncated: bool,
}

impl ExpansionUnit {
    /// Creates an original unit.
    #[must_use]
    pub fn original(block: BlockId, label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            header: None,
            body: body.into(),
            footer: None,
            provenance: Provenance::Original { block },
            truncated: false,
        }
    }

    /// Creates a repeated unit. Repeats always carry their annotation.
    #[must_use]
    pub(crate) fn repeated(
        source: BlockId,
        repetition: usize,
        label: impl Into<String>,
        body: impl Into<String>,
        header: String,
        footer: String,
    ) -> Self {
        Self {
            label: label.into(),
            header: Some(header),
            body: body.into(),
            footer: Some(footer),
            provenance: Provenance::Repeated { source, repetition },
            truncated: false,
        }
    }

    /// File label shown above the block.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Annotation line opening a repeated block.
    #[must_use]
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// The code itself.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Annotation line closing a repeated block.
    #[must_use]
    pub fn footer(&self) -> Option<&str> {
        self.footer.as_deref()
    }

    /// Provenance tag.
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Returns true for an original unit.
    #[must_use]
    pub const fn is_original(&self) -> bool {
        matches!(self.provenance, Provenance::Original { .. })
    }

    /// Returns true for a repeated unit.
    #[must_use]
    pub const fn is_repeated(&self) -> bool {
        matches!(self.provenance, Provenance::Repeated { .. })
    }

    /// Returns true if part of the body was cut by excerpting.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Every text line of the unit: header, body lines, footer.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.header
            .as_deref()
            .into_iter()
            .chain(self.body.lines())
            .chain(self.footer.as_deref())
    }

    /// Full annotated text.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    /// Measured length of the annotated text.
    #[must_use]
    pub fn measure(&self, estimator: &dyn LengthEstimator) -> usize {
        self.lines().map(|line| estimator.measure_line(line)).sum()
    }

    fn annotation_measure(&self, estimator: &dyn LengthEstimator) -> usize {
        self.header
            .as_deref()
            .into_iter()
            .chain(self.footer.as_deref())
            .map(|line| estimator.measure_line(line))
            .sum()
    }

    /// Keeps the longest run of body lines from the front (or back) that
    /// fits in `budget`, annotations included. `None` if not even one fits.
    fn truncate(&self, budget: usize, from_front: bool, estimator: &dyn LengthEstimator) -> Option<Self> {
        let mut used = self.annotation_measure(estimator);
        let lines: Vec<&str> = self.body.lines().collect();
        let mut kept = 0;

        let ordered: Box<dyn Iterator<Item = &&str>> = if from_front {
            Box::new(lines.iter())
        } else {
            Box::new(lines.iter().rev())
        };
        for line in ordered {
            let cost = estimator.measure_line(line);
            if used + cost > budget {
                break;
            }
            used += cost;
            kept += 1;
        }

        if kept == 0 {
            return None;
        }

        let body = if from_front {
            lines[..kept].join("\n")
        } else {
            lines[lines.len() - kept..].join("\n")
        };

        Some(Self {
            body,
            truncated: true,
            ..self.clone()
        })
    }
}

/// Marks where excerpting removed the middle of the document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Omission {
    /// Number of units kept before the gap
    pub after_unit: usize,
    /// Measured quantity that was left out
    pub omitted: usize,
    /// Estimated pages that were left out
    pub omitted_pages: f64,
}

/// Keeps the first and last half of `budget_pages` worth of units.
///
/// Returns the units unchanged when they already fit. Units straddling
/// either boundary are cut at a line boundary and keep their provenance.
#[must_use]
pub fn excerpt(
    units: Vec<ExpansionUnit>,
    estimator: &dyn LengthEstimator,
    budget_pages: usize,
) -> (Vec<ExpansionUnit>, Option<Omission>) {
    let budget = estimator.required(budget_pages);
    let sizes: Vec<usize> = units.iter().map(|u| u.measure(estimator)).collect();
    let total: usize = sizes.iter().sum();

    if total <= budget {
        return (units, None);
    }

    let head_budget = budget / 2;
    let tail_budget = budget - head_budget;

    let mut head = Vec::new();
    let mut head_used = 0;
    let mut head_end = 0;
    for (unit, &size) in units.iter().zip(&sizes) {
        if head_used + size <= head_budget {
            head.push(unit.clone());
            head_used += size;
            head_end += 1;
            continue;
        }
        if let Some(cut) = unit.truncate(head_budget - head_used, true, estimator) {
            head_used += cut.measure(estimator);
            head.push(cut);
        }
        break;
    }

    let mut tail = Vec::new();
    let mut tail_used = 0;
    for (index, (unit, &size)) in units.iter().zip(&sizes).enumerate().rev() {
        // Never reuse a unit that the head kept whole
        if index < head_end {
            break;
        }
        if tail_used + size <= tail_budget {
            tail.push(unit.clone());
            tail_used += size;
            continue;
        }
        if let Some(cut) = unit.truncate(tail_budget - tail_used, false, estimator) {
            tail_used += cut.measure(estimator);
            tail.push(cut);
        }
        break;
    }
    tail.reverse();

    let omitted = total.saturating_sub(head_used + tail_used);
    let omission = Omission {
        after_unit: head.len(),
        omitted,
        omitted_pages: estimator.pages(omitted),
    };

    tracing::info!(
        "Excerpting: kept {} + {} of {} units, omitted ~{:.1} pages",
        head.len(),
        tail.len(),
        units.len(),
        omission.omitted_pages
    );

    head.extend(tail);
    (head, Some(omission))
}

/// Final ordered units plus layout; the only input of an assembler.
#[derive(Debug, Clone)]
pub struct DocumentPlan {
    software_name: String,
    version: String,
    units: Vec<ExpansionUnit>,
    omission: Option<Omission>,
    layout: Layout,
    measured: usize,
    estimated_pages: f64,
}

impl DocumentPlan {
    /// Creates a plan. `measured` must be the measure of `units`.
    #[must_use]
    pub fn new(
        software_name: impl Into<String>,
        version: impl Into<String>,
        units: Vec<ExpansionUnit>,
        omission: Option<Omission>,
        layout: Layout,
        estimator: &dyn LengthEstimator,
    ) -> Self {
        let measured = units.iter().map(|u| u.measure(estimator)).sum();
        Self {
            software_name: software_name.into(),
            version: version.into(),
            units,
            omission,
            layout,
            measured,
            estimated_pages: estimator.pages(measured),
        }
    }

    /// Software name.
    #[must_use]
    pub fn software_name(&self) -> &str {
        &self.software_name
    }

    /// Software version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Page header text with name and version filled in.
    #[must_use]
    pub fn header_text(&self) -> String {
        self.layout
            .header_text
            .replace("{name}", &self.software_name)
            .replace("{version}", &self.version)
    }

    /// Units in document order.
    #[must_use]
    pub fn units(&self) -> &[ExpansionUnit] {
        &self.units
    }

    /// Gap left by excerpting, if any.
    #[must_use]
    pub const fn omission(&self) -> Option<&Omission> {
        self.omission.as_ref()
    }

    /// Layout configuration.
    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Measured quantity of every unit.
    #[must_use]
    pub const fn measured(&self) -> usize {
        self.measured
    }

    /// Estimated pages of every unit.
    #[must_use]
    pub const fn estimated_pages(&self) -> f64 {
        self.estimated_pages
    }

    /// Number of original units.
    #[must_use]
    pub fn original_units(&self) -> usize {
        self.units.iter().filter(|u| u.is_original()).count()
    }

    /// Number of repeated units.
    #[must_use]
    pub fn repeated_units(&self) -> usize {
        self.units.iter().filter(|u| u.is_repeated()).count()
    }

    /// Returns true if the plan holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
