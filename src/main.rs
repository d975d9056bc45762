use anyhow::Context;
use clap::Parser;
use code_collate::{
    Calibration, Config, ConfigFile, Diagnostics, OutputFormat, Pipeline, config_path_from_env,
    resolve_config_path,
};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    name = "code-collate",
    version,
    author,
    about = "Collate a source tree into a paginated code listing",
    long_about = "Collate a source tree into a single paginated document, as required for \
    software-copyright registration filings.\n\n\
    Source files are collected in a deterministic order, stripped of comments and blank \
    lines, and written one block per file. When the code falls short of the page target, \
    blocks are repeated round-robin, each repeat clearly annotated, until the estimate \
    reaches the target or the ceiling is hit.\n\n\
    The configuration file is taken from $CODE_COLLATE_CONFIG_PATH, then --config, then \
    code-collate.yaml in the working directory. Flags override the file.\n\n\
    USAGE EXAMPLES:\n  \
      # Collate the current directory into out/<name>_1.0_source_code.docx\n  \
      code-collate\n\n  \
      # Name and version the software, aim for 60 pages\n  \
      code-collate ./web --name \"Inventory Manager\" --software-version 2.1 --target-pages 60\n\n  \
      # Plain text, no repetition, keep comments\n  \
      code-collate ./src --format text --no-expand --keep-comments"
)]
struct Cli {
    /// Root directory to scan for source files
    #[arg(value_name = "SOURCE_DIR")]
    source_dir: Option<PathBuf>,

    /// Software name used in the header and the file name
    #[arg(long, value_name = "NAME")]
    name: Option<String>,

    /// Software version used in the header and the file name
    #[arg(long, value_name = "VERSION")]
    software_version: Option<String>,

    /// Output directory for the document
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Working directory; relative paths resolve against it
    #[arg(short, long, value_name = "PATH")]
    workdir: Option<PathBuf>,

    /// Configuration file (YAML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<CliFormat>,

    /// Pages the document should reach
    #[arg(long, value_name = "PAGES")]
    target_pages: Option<usize>,

    /// Calibrate the estimate in physical lines per page
    #[arg(long, value_name = "LINES", conflicts_with = "chars_per_page")]
    lines_per_page: Option<usize>,

    /// Calibrate the estimate in characters per page
    #[arg(long, value_name = "CHARS")]
    chars_per_page: Option<usize>,

    /// Maximum number of repeated blocks
    #[arg(long, value_name = "UNITS")]
    ceiling: Option<usize>,

    /// Keep comments in the source
    #[arg(long)]
    keep_comments: bool,

    /// Keep blank lines in the source
    #[arg(long)]
    keep_blank_lines: bool,

    /// File extension to collect, without the dot (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Extra directory glob to skip (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,

    /// Keep only this many pages, split between the start and the end
    #[arg(long, value_name = "PAGES")]
    excerpt_pages: Option<usize>,

    /// Do not repeat blocks to reach the target
    #[arg(long)]
    no_expand: bool,

    /// Dry run (don't write files)
    #[arg(long)]
    dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliFormat {
    Docx,
    Markdown,
    Text,
}

impl From<CliFormat> for OutputFormat {
    fn from(f: CliFormat) -> Self {
        match f {
            CliFormat::Docx => Self::Docx,
            CliFormat::Markdown => Self::Markdown,
            CliFormat::Text => Self::Text,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    if let Some(dir) = &cli.workdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to enter working directory {}", dir.display()))?;
    }
    let working_dir = std::env::current_dir().context("Failed to read working directory")?;

    let env_value = config_path_from_env();
    let resolved = resolve_config_path(env_value.as_deref(), cli.config.as_deref(), &working_dir)
        .context("Failed to resolve configuration file")?;
    let mut startup_warnings = resolved.diagnostics;

    let config_file = match &resolved.path {
        Some((path, source)) => {
            info!("Loading configuration from {} ({:?})", path.display(), source);
            Some(ConfigFile::load(path).context("Failed to load configuration file")?)
        }
        None => None,
    };

    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    let root = cli.source_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let name = match cli.name.clone() {
        Some(name) => Some(name),
        None if config_file.as_ref().and_then(ConfigFile::software_name).is_some() => None,
        None if interactive => Some(prompt("Software name", &default_name(&root))?),
        None => None,
    };
    let version = match cli.software_version.clone() {
        Some(version) => Some(version),
        None if config_file.as_ref().and_then(ConfigFile::software_version).is_some() => None,
        None if interactive => Some(prompt("Software version", DEFAULT_VERSION)?),
        None => None,
    };

    let mut builder = Config::builder().root_dir(&root);
    if let Some(file) = config_file {
        builder = file.apply(builder).context("Invalid configuration file")?;
    }

    if let Some(name) = name {
        builder = builder.software_name(name);
    }
    if let Some(version) = version {
        builder = builder.software_version(version);
    }
    if let Some(output) = cli.output {
        builder = builder.output_dir(output);
    }
    if let Some(format) = cli.format {
        builder = builder.format(format.into());
    }
    if let Some(pages) = cli.target_pages {
        builder = builder.target_pages(pages);
    }
    if let Some(lines) = cli.lines_per_page {
        builder = builder.calibration(Calibration::LinesPerPage(lines));
    }
    if let Some(chars) = cli.chars_per_page {
        builder = builder.calibration(Calibration::CharsPerPage(chars));
    }
    if let Some(ceiling) = cli.ceiling {
        builder = builder.ceiling(ceiling);
    }
    if cli.keep_comments {
        builder = builder.strip_comments(false);
    }
    if cli.keep_blank_lines {
        builder = builder.strip_blank_lines(false);
    }
    if !cli.extensions.is_empty() {
        builder = builder.extensions(cli.extensions);
    }
    if !cli.exclude.is_empty() {
        builder = builder.exclude_directories(cli.exclude);
    }
    if let Some(pages) = cli.excerpt_pages {
        builder = builder.excerpt_pages(pages);
    }
    if cli.no_expand {
        builder = builder.expansion_enabled(false);
    }

    let config = builder
        .dry_run(cli.dry_run)
        .build()
        .context("Failed to build configuration")?;

    if interactive && !cli.yes && !confirm(&config)? {
        println!("Aborted.");
        return Ok(());
    }

    let report = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .context("Pipeline execution failed")?;

    report.stats.print_summary();

    if let Some(suggested) = report.suggested_calibration {
        println!("Calibration hint: {suggested} would match the rendered page count.");
    }

    startup_warnings.extend(report.warnings);
    print_warnings(&startup_warnings);

    Ok(())
}

/// Name of the root directory, the library's own default.
fn default_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "software".to_string())
}

fn prompt(question: &str, default: &str) -> anyhow::Result<String> {
    print!("{question} [{default}]: ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("Failed to read answer")?;

    let answer = answer.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

fn confirm(config: &Config) -> anyhow::Result<bool> {
    println!("Source:  {}", config.root_dir.display());
    println!("Output:  {}", config.output_path().display());
    println!(
        "Target:  {} pages ({}{})",
        config.expansion.target_pages,
        config.calibration,
        if config.expansion.enabled { "" } else { ", no repetition" }
    );

    let answer = prompt("Proceed? (y/n)", "y")?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

/// Warnings are printed whatever the verbosity.
fn print_warnings(warnings: &Diagnostics) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("{} warning(s):", warnings.len());
    for warning in warnings.warnings() {
        eprintln!("  warning: {warning}");
    }
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("code_collate=info"),
        1 => EnvFilter::new("code_collate=debug"),
        _ => EnvFilter::new("code_collate=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
