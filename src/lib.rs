//! # code-collate
//!
//! Collates a source tree into one paginated document, the kind of code
//! listing a software-copyright registration asks for.
//!
//! ## Features
//!
//! - Parallel file scanning with `.gitignore` support and a deterministic order
//! - Per-language comment and blank-line removal
//! - Page estimation calibrated in lines or characters per page
//! - Annotated round-robin repetition up to a page target, bounded by a ceiling
//! - DOCX, Markdown and paginated plain-text output
//! - Atomic file operations with automatic backups
//!
//! ## Quick Start
//!
//! ```no_run
//! use code_collate::{Config, OutputFormat, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .root_dir("./web")
//!     .output_dir("./docs")
//!     .software_name("Inventory Manager")
//!     .software_version("2.1")
//!     .format(OutputFormat::Docx)
//!     .target_pages(60)
//!     .build()?;
//!
//! let report = Pipeline::new(config)?.run()?;
//! for warning in report.warnings.warnings() {
//!     eprintln!("warning: {warning}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Scanner**: Discovers and reads files, respecting `.gitignore`
//! 2. **Cleaner**: Strips comments and blank lines per language
//! 3. **Expansion engine**: Repeats annotated blocks until the estimate meets the target
//! 4. **Assembler**: Serializes the plan; the writer persists it

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod assemble;
mod clean;
mod config;
mod config_file;
mod diagnostics;
mod docx;
mod error;
mod estimate;
mod expand;
mod file;
mod filter;
mod pipeline;
mod plan;
mod scanner;
mod template;
mod wrap;
mod writer;

pub use assemble::{
    DocumentAssembler, MarkdownAssembler, RenderedDocument, TextAssembler, assembler_for,
};
pub use clean::{
    CleanConfig, CommentStripper, CommentSyntax, ContentCleaner, Language, StringDelimiter,
};
pub use config::{Config, ConfigBuilder, Layout, Margins, OutputFormat};
pub use config_file::{
    CONFIG_PATH_ENV, ConfigFile, ConfigSource, DEFAULT_CONFIG_FILE, LEGACY_CONFIG_FILE,
    LEGACY_CONFIG_PATH_ENV, ResolvedConfigPath, config_path_from_env, resolve_config_path,
};
pub use diagnostics::{Diagnostics, Warning};
pub use docx::DocxAssembler;
pub use error::{Error, Result};
pub use estimate::{
    Calibration, CharEstimator, DEFAULT_LINES_PER_PAGE, LengthEstimator, LineEstimator,
};
pub use expand::{
    Annotation, DEFAULT_CEILING, DEFAULT_TARGET_PAGES, Expansion, ExpansionConfig,
    ExpansionEngine, ExpansionOutcome, ExpansionState,
};
pub use file::{Corpus, DEFAULT_ENCODING_FALLBACKS, SourceFile, encoding_for_label};
pub use filter::FileFilterConfig;
pub use pipeline::{Pipeline, PipelineStats, RunReport};
pub use plan::{BlockId, DocumentPlan, ExpansionUnit, Omission, Provenance, excerpt};
pub use scanner::{ScanOutcome, ScanStats, Scanner};
pub use wrap::{WrapOptions, expand_tabs, physical_lines, wrap_line};

/// Runs the complete collation pipeline with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - Root directory doesn't exist or is inaccessible
/// - The document cannot be rendered or written
///
/// An empty corpus or an unreachable page target is not an error; both are
/// reported in [`RunReport::warnings`].
///
/// # Examples
///
/// ```no_run
/// use code_collate::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .root_dir(".")
///     .build()?;
///
/// let report = run(config)?;
/// report.stats.print_summary();
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<RunReport> {
    Pipeline::new(config)?.run()
}
