use crate::{
    assemble::assembler_for,
    config::Config,
    diagnostics::Diagnostics,
    error::Result,
    estimate::{Calibration, DEFAULT_LINES_PER_PAGE, LengthEstimator},
    expand::{ExpansionEngine, ExpansionOutcome},
    plan::{DocumentPlan, excerpt},
    scanner::Scanner,
    writer::Writer,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Files that matched the allow-list
    pub files_scanned: usize,

    /// Files read into the corpus
    pub text_files: usize,

    /// Files skipped as binary or unreadable
    pub skipped_files: usize,

    /// Bytes read before cleaning
    pub raw_bytes: usize,

    /// Bytes left after cleaning
    pub cleaned_bytes: usize,

    /// Lines left after cleaning
    pub cleaned_lines: usize,

    /// Original units in the plan
    pub original_units: usize,

    /// Repeated units in the plan
    pub repeated_units: usize,

    /// Measured size of the plan
    pub measured: usize,

    /// Unit of `measured` (lines or chars)
    pub unit: &'static str,

    /// Calibration used for the estimate
    pub calibration: Calibration,

    /// Estimated pages of the plan
    pub estimated_pages: f64,

    /// Requested page count
    pub target_pages: usize,

    /// Pages left out by excerpting
    pub omitted_pages: Option<f64>,

    /// Pages reported by the renderer, if it paginates by itself
    pub rendered_pages: Option<usize>,

    /// How expansion ended
    pub outcome: ExpansionOutcome,

    /// Total execution time
    pub duration: Duration,

    /// Time spent scanning and cleaning
    pub scan_duration: Duration,

    /// Time spent expanding
    pub expand_duration: Duration,

    /// Time spent rendering and writing
    pub write_duration: Duration,

    /// Output document, empty on a dry run
    pub output_path: String,
}

impl PipelineStats {
    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Collation Summary                          ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ Files Scanned:        {:>8}                        ║", self.files_scanned);
        println!("║   - Collated:         {:>8}                        ║", self.text_files);
        println!("║   - Skipped:          {:>8}                        ║", self.skipped_files);
        println!("║ Bytes Read:           {:>8}                        ║", self.raw_bytes);
        println!("║ Bytes After Cleaning: {:>8}                        ║", self.cleaned_bytes);
        println!("║                                                       ║");
        println!("║ Original Blocks:      {:>8}                        ║", self.original_units);
        println!("║ Repeated Blocks:      {:>8}                        ║", self.repeated_units);
        println!(
            "║ Measured:             {:>8} {:<5}                  ║",
            self.measured, self.unit
        );
        println!(
            "║ Estimated Pages:      {:>8.1} (target {:>4})          ║",
            self.estimated_pages, self.target_pages
        );
        if let Some(pages) = self.rendered_pages {
            println!("║ Rendered Pages:       {:>8}                        ║", pages);
        }
        if let Some(pages) = self.omitted_pages {
            println!("║ Omitted Pages:        {:>8.1}                        ║", pages);
        }
        println!("║ Expansion:            {:>16}                ║", self.outcome.to_string());
        println!("║                                                       ║");
        if !self.output_path.is_empty() {
            println!("║ Output:                                               ║");
            println!("║   {}", self.output_path);
            println!("║                                                       ║");
        }
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Scanning:         {:>8.2}s                     ║",
            self.scan_duration.as_secs_f64()
        );
        println!(
            "║   - Expanding:        {:>8.2}s                     ║",
            self.expand_duration.as_secs_f64()
        );
        println!(
            "║   - Writing:          {:>8.2}s                     ║",
            self.write_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Everything a caller learns from one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Counters and timings
    pub stats: PipelineStats,

    /// Recoverable conditions, in the order they were raised
    pub warnings: Diagnostics,

    /// Written document, `None` on a dry run
    pub output: Option<PathBuf>,

    /// Backup of the previous document, if one was made
    pub backup: Option<PathBuf>,

    /// Written JSON summary, if enabled
    pub summary: Option<PathBuf>,

    /// Factor that would have predicted the rendered page count
    pub suggested_calibration: Option<Calibration>,
}

impl RunReport {
    /// How expansion ended.
    #[must_use]
    pub const fn outcome(&self) -> ExpansionOutcome {
        self.stats.outcome
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    generated_at: String,
    software_name: &'a str,
    software_version: &'a str,
    format: String,
    stats: &'a PipelineStats,
    warnings: &'a Diagnostics,
    suggested_calibration: Option<Calibration>,
}

/// A built plan with what was learned while building it.
struct Staged {
    plan: DocumentPlan,
    diagnostics: Diagnostics,
    stats: PipelineStats,
}

/// Main pipeline orchestrator: scan, clean, expand, assemble, write.
pub struct Pipeline {
    config: Config,
    scanner: Scanner,
    estimator: Arc<dyn LengthEstimator>,
    engine: ExpansionEngine,
    writer: Writer,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - A filter pattern is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let scanner = Scanner::new(&config)?;
        let estimator = config.calibration.create(&config.layout.wrap);
        let engine = ExpansionEngine::new(config.expansion.clone(), Arc::clone(&estimator));
        let writer = Writer::new(&config);

        Ok(Self {
            config,
            scanner,
            estimator,
            engine,
            writer,
        })
    }

    /// Scans, cleans and expands, returning the plan without rendering it.
    ///
    /// # Errors
    ///
    /// Returns a scan error if the root directory cannot be read.
    pub fn plan(&self) -> Result<(DocumentPlan, Diagnostics)> {
        let staged = self.stage(Instant::now())?;
        Ok((staged.plan, staged.diagnostics))
    }

    fn stage(&self, start: Instant) -> Result<Staged> {
        let estimator = self.estimator.as_ref();

        info!("Stage 1/3: Scanning {}...", self.config.root_dir.display());
        let scan_start = Instant::now();
        let scan = self.scanner.scan()?;
        let scan_duration = scan_start.elapsed();
        let corpus = scan.corpus;
        let mut diagnostics = scan.diagnostics;

        info!(
            "✓ Collected {} files ({} skipped) in {:.2}s",
            corpus.len(),
            scan.stats.binary_files + scan.stats.unreadable_files,
            scan_duration.as_secs_f64()
        );
        debug!(
            "Cleaning: {} bytes read, {} bytes and {} lines kept",
            corpus.raw_bytes(),
            corpus.cleaned_bytes(),
            corpus.cleaned_lines()
        );

        info!(
            "Stage 2/3: Expanding towards {} pages ({})...",
            self.config.expansion.target_pages, self.config.calibration
        );
        let expand_start = Instant::now();
        let expansion = self.engine.expand(&corpus);
        let expand_duration = expand_start.elapsed();
        let outcome = expansion.outcome;
        diagnostics.extend(expansion.diagnostics);

        debug!(
            "Expanded: {} original + {} repeated units, ~{:.1} of {} pages ({})",
            corpus.len(),
            expansion.units.iter().filter(|u| u.is_repeated()).count(),
            expansion.estimated_pages,
            self.config.expansion.target_pages,
            outcome
        );

        let (units, omission) = match self.config.excerpt_pages {
            Some(budget) => excerpt(expansion.units, estimator, budget),
            None => (expansion.units, None),
        };

        let plan = DocumentPlan::new(
            &self.config.software_name,
            &self.config.software_version,
            units,
            omission,
            self.config.layout.clone(),
            estimator,
        );

        info!(
            "✓ Planned {} blocks, ~{:.1} pages in {:.2}s",
            plan.units().len(),
            plan.estimated_pages(),
            expand_duration.as_secs_f64()
        );

        let stats = PipelineStats {
            files_scanned: scan.stats.matched_files,
            text_files: scan.stats.text_files,
            skipped_files: scan.stats.binary_files + scan.stats.unreadable_files,
            raw_bytes: corpus.raw_bytes(),
            cleaned_bytes: corpus.cleaned_bytes(),
            cleaned_lines: corpus.cleaned_lines(),
            original_units: plan.original_units(),
            repeated_units: plan.repeated_units(),
            measured: plan.measured(),
            unit: estimator.unit(),
            calibration: self.config.calibration,
            estimated_pages: plan.estimated_pages(),
            target_pages: self.config.expansion.target_pages,
            omitted_pages: plan.omission().map(|o| o.omitted_pages),
            rendered_pages: None,
            outcome,
            duration: start.elapsed(),
            scan_duration,
            expand_duration,
            write_duration: Duration::ZERO,
            output_path: String::new(),
        };

        Ok(Staged {
            plan,
            diagnostics,
            stats,
        })
    }

    /// Page height of the self-paginating text format.
    fn page_lines(&self) -> usize {
        match self.config.calibration {
            Calibration::LinesPerPage(lines) => lines,
            Calibration::CharsPerPage(_) => DEFAULT_LINES_PER_PAGE,
        }
    }

    /// Executes the complete pipeline and returns the report.
    ///
    /// # Process
    ///
    /// 1. **Scan**: Discovers, reads and cleans files under the root
    /// 2. **Expand**: Repeats annotated blocks until the page target is met
    /// 3. **Write**: Assembles the document and persists it atomically
    ///
    /// Only an unreadable root or a failed write abort the run; everything
    /// else is reported in [`RunReport::warnings`].
    ///
    /// # Errors
    ///
    /// Returns a scan error or a render error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use code_collate::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .root_dir("./web")
    ///     .build()?;
    ///
    /// let report = Pipeline::new(config)?.run()?;
    /// report.stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(root_dir = %self.config.root_dir.display()))]
    pub fn run(self) -> Result<RunReport> {
        let start_time = Instant::now();

        info!("Starting pipeline execution");

        let Staged {
            plan,
            diagnostics,
            mut stats,
        } = self.stage(start_time)?;

        if self.config.dry_run {
            warn!("Dry run mode enabled - skipping file writes");
            stats.duration = start_time.elapsed();
            self.print_dry_run_summary(&plan);
            return Ok(RunReport {
                stats,
                warnings: diagnostics,
                output: None,
                backup: None,
                summary: None,
                suggested_calibration: None,
            });
        }

        info!("Stage 3/3: Writing {} document...", self.config.format);
        let write_start = Instant::now();
        let output_path = self.config.output_path();

        let mut assembler = assembler_for(self.config.format, self.page_lines())?;
        let document = assembler.assemble(&plan)?;

        stats.rendered_pages = document.rendered_pages();
        let suggested_calibration = document.rendered_pages().and_then(|pages| {
            self.config
                .calibration
                .recalibrated(plan.measured(), pages)
                .filter(|suggested| *suggested != self.config.calibration)
        });
        if let Some(suggested) = suggested_calibration {
            info!(
                "Rendered {} pages against ~{:.1} estimated; {} would match",
                stats.rendered_pages.unwrap_or_default(),
                plan.estimated_pages(),
                suggested
            );
        }

        let backup = self.writer.write_document(&output_path, document.bytes())?;
        stats.output_path = output_path.display().to_string();
        stats.write_duration = write_start.elapsed();
        stats.duration = start_time.elapsed();

        let summary = if self.config.write_summary {
            let summary = RunSummary {
                generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                software_name: &self.config.software_name,
                software_version: &self.config.software_version,
                format: self.config.format.to_string(),
                stats: &stats,
                warnings: &diagnostics,
                suggested_calibration,
            };
            Some(self.writer.write_summary(&output_path, &summary)?)
        } else {
            None
        };

        info!(
            "✓ Pipeline completed in {:.2}s with {} warning(s)",
            stats.duration.as_secs_f64(),
            diagnostics.len()
        );

        Ok(RunReport {
            stats,
            warnings: diagnostics,
            output: Some(output_path),
            backup,
            summary,
            suggested_calibration,
        })
    }

    /// Prints a summary for dry run mode.
    fn print_dry_run_summary(&self, plan: &DocumentPlan) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                 Dry Run Summary                       ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!("║ Blocks planned:       {:>8}                        ║", plan.units().len());
        println!("║   - Repeated:         {:>8}                        ║", plan.repeated_units());
        println!(
            "║ Estimated pages:      {:>8.1}                        ║",
            plan.estimated_pages()
        );
        println!("║ Would write:                                          ║");
        println!("║   {}", self.config.output_path().display());
        println!("║                                                       ║");
        println!("║ ⚠ No files were written (dry run mode)               ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::diagnostics::Warning;
    use assert_fs::prelude::*;
    use std::path::Path;

    fn lines(tag: &str, count: usize) -> String {
        (1..=count)
            .map(|n| format!("{tag}{n}();"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn builder(root: &Path) -> crate::ConfigBuilder {
        Config::builder()
            .root_dir(root.join("src"))
            .output_dir(root.join("out"))
            .software_name("Shop")
            .software_version("1.0")
    }

    #[test]
    fn test_two_file_scenario_expands_once_each() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/a.js").write_str(&lines("a", 10)).unwrap();
        temp.child("src/b.js").write_str(&lines("b", 10)).unwrap();

        let config = builder(temp.path())
            .calibration(Calibration::LinesPerPage(10))
            .target_pages(4)
            .build()
            .unwrap();

        let (plan, diagnostics) = Pipeline::new(config).unwrap().plan().unwrap();

        assert_eq!(plan.original_units(), 2);
        assert_eq!(plan.repeated_units(), 2);
        assert_eq!(plan.units()[2].label(), "a.js");
        assert_eq!(plan.units()[3].label(), "b.js");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_pipeline_writes_docx_and_summary() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/main.js").write_str("// entry\nstart();\n").unwrap();

        let config = builder(temp.path()).target_pages(2).build().unwrap();
        let report = Pipeline::new(config).unwrap().run().unwrap();

        let output = report.output.clone().unwrap();
        assert_eq!(output, temp.path().join("out/Shop_1.0_source_code.docx"));
        assert!(output.exists());
        assert!(report.summary.as_ref().unwrap().exists());
        assert_eq!(report.outcome(), ExpansionOutcome::Satisfied);
        assert!(report.stats.repeated_units > 0);
        assert!(report.stats.estimated_pages >= 2.0);
    }

    #[test]
    fn test_pipeline_dry_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/file.js").write_str("run();").unwrap();

        let config = builder(temp.path()).dry_run(true).build().unwrap();
        let report = Pipeline::new(config).unwrap().run().unwrap();

        assert!(report.output.is_none());
        assert!(!temp.child("out").exists());
    }

    #[test]
    fn test_empty_root_warns_and_still_writes() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/readme.txt").write_str("not code").unwrap();

        let config = builder(temp.path()).build().unwrap();
        let report = Pipeline::new(config).unwrap().run().unwrap();

        assert!(report.warnings.has_empty_corpus());
        assert_eq!(report.stats.original_units, 0);
        assert_eq!(report.stats.repeated_units, 0);
        assert_eq!(report.outcome(), ExpansionOutcome::CeilingReached);
        assert!(report.output.unwrap().exists());
    }

    #[test]
    fn test_missing_root_is_scan_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = Config {
            root_dir: temp.path().join("missing"),
            ..builder(temp.path()).root_dir(temp.path()).build().unwrap()
        };

        let err = Pipeline::new(config).err().unwrap();
        assert!(err.is_scan());
    }

    #[test]
    fn test_ceiling_warning_reaches_report() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/a.js").write_str(&lines("a", 5)).unwrap();

        let config = builder(temp.path())
            .calibration(Calibration::LinesPerPage(10))
            .target_pages(100)
            .ceiling(3)
            .format(OutputFormat::Markdown)
            .build()
            .unwrap();
        let report = Pipeline::new(config).unwrap().run().unwrap();

        assert_eq!(report.outcome(), ExpansionOutcome::CeilingReached);
        assert_eq!(report.stats.repeated_units, 3);
        assert!(report.warnings.has_ceiling_reached());
        assert!(report
            .warnings
            .warnings()
            .iter()
            .any(|w| matches!(w, Warning::CeilingReached { ceiling: 3, .. })));
    }

    #[test]
    fn test_text_format_suggests_calibration() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/a.js").write_str(&lines("a", 20)).unwrap();
        temp.child("src/b.js").write_str(&lines("b", 20)).unwrap();

        let config = builder(temp.path())
            .calibration(Calibration::LinesPerPage(10))
            .expansion_enabled(false)
            .format(OutputFormat::Text)
            .build()
            .unwrap();
        let report = Pipeline::new(config).unwrap().run().unwrap();

        // 40 measured lines plus 2 label lines on pages of 10 lines
        assert_eq!(report.stats.rendered_pages, Some(5));
        assert_eq!(report.suggested_calibration, Some(Calibration::LinesPerPage(8)));
        assert_eq!(report.outcome(), ExpansionOutcome::Disabled);
    }

    #[test]
    fn test_excerpt_limits_plan() {
        let temp = assert_fs::TempDir::new().unwrap();
        for i in 0..6 {
            temp.child(format!("src/f{i}.js"))
                .write_str(&lines("x", 10))
                .unwrap();
        }

        let config = builder(temp.path())
            .calibration(Calibration::LinesPerPage(10))
            .expansion_enabled(false)
            .excerpt_pages(2)
            .build()
            .unwrap();

        let (plan, _) = Pipeline::new(config).unwrap().plan().unwrap();

        assert!(plan.omission().is_some());
        assert_eq!(plan.measured(), 20);
        assert_eq!(plan.units().first().unwrap().label(), "f0.js");
        assert_eq!(plan.units().last().unwrap().label(), "f5.js");
    }
}
