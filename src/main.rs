use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use prism_core::{Finding, OutputFormat, PassKind, PrismConfig};
use prism_graph::source::FileSet;
use prism_review::ReviewInput;

const CONFIG_FILE: &str = ".prism.toml";

#[derive(Parser)]
#[command(
    name = "prism",
    version,
    about = "Multi-pass AI code review with budgeted repository context",
    long_about = "Prism reviews a whole repository in three passes: architecture, deep-dive and security.\n\n\
                   Each pass sees a token-budgeted selection of files chosen from the import graph,\n\
                   with oversized files reduced to the slices that matter.\n\n\
                   Examples:\n  \
                     prism init                          Create a .prism.toml config file\n  \
                     prism review --path .               Review the current repository\n  \
                     prism review --findings lint.json   Feed static analysis findings to the review\n  \
                     prism graph --path .                Print the scored dependency graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .prism.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output and debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the three-pass AI review
    #[command(long_about = "Run the three-pass AI review.\n\n\
        Walks the repository, builds the import graph, and runs the architecture,\n\
        deep-dive and security passes in order. Findings are deduplicated across passes.\n\
        Without an API key the review is skipped and a configuration finding is reported.\n\n\
        Examples:\n  prism review --path .\n  prism review --findings eslint.json --format markdown")]
    Review {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// JSON file with prior static analysis findings
        #[arg(long)]
        findings: Option<PathBuf>,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,

        /// Output format
        #[arg(
            long,
            default_value = "text",
            long_help = "Output format for the review report.\n\n\
                           Formats:\n  \
                             text      Human-readable summary (default)\n  \
                             json      Machine-readable JSON with camelCase keys\n  \
                             markdown  GitHub-flavored Markdown"
        )]
        format: OutputFormat,
    },
    /// Print the scored dependency graph as JSON
    Graph {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Create a default .prism.toml in the current directory
    Init,
}

const DEFAULT_CONFIG: &str = r#"# Prism Configuration

[llm]
# provider = "openai"
# model = "gpt-4o"
# base_url = "https://api.openai.com"
# api_key = ""  # falls back to PRISM_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY
# max_tokens = 4096
# temperature = 0.1

[review]
# architecture_budget = 15000
# deep_dive_budget = 40000
# security_budget = 25000
# slice_max_chars = 20000
# abort_on_provider_error = false
# timeout_secs = 600

[scoring]
# entry_base = 100
# config_base = 80
# api_base = 70
# security_bonus = 50
# test_penalty = 40
# category_precedence = ["test", "config", "api", "entry", "component", "util"]
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Review {
            path,
            findings,
            model,
            format,
        } => {
            if let Some(model) = model {
                config.llm.model = model;
            }
            run_review_command(&config, &path, findings.as_deref(), format, cli.verbose).await?;
        }
        Command::Graph { path } => {
            let files = load_files(&path)?;
            let graph = prism_graph::build_graph(&files, &config.scoring);
            println!("{}", serde_json::to_string_pretty(&graph).into_diagnostic()?);
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>) -> Result<PrismConfig> {
    match explicit {
        Some(path) => Ok(PrismConfig::from_file(path)
            .wrap_err(format!("loading {}", path.display()))?),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                Ok(PrismConfig::from_file(default_path)?)
            } else {
                Ok(PrismConfig::default())
            }
        }
    }
}

fn load_files(root: &Path) -> Result<FileSet> {
    if !root.is_dir() {
        return Err(prism_core::PrismError::FileNotFound(root.to_path_buf()).into());
    }
    let records = prism_graph::walker::walk_repo(root)?;
    tracing::info!(root = %root.display(), files = records.len(), "repository walked");
    Ok(FileSet::new(records))
}

fn load_findings(path: &Path) -> Result<Vec<Finding>> {
    let content = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err(format!("reading {}", path.display()))?;
    serde_json::from_str(&content)
        .into_diagnostic()
        .wrap_err(format!("parsing findings from {}", path.display()))
}

async fn run_review_command(
    config: &PrismConfig,
    root: &Path,
    findings: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let static_findings = match findings {
        Some(path) => load_findings(path)?,
        None => Vec::new(),
    };
    let files = load_files(root)?;
    let graph = prism_graph::build_graph(&files, &config.scoring);
    let frameworks = prism_graph::detect::detect_frameworks(&files);

    if verbose {
        eprintln!(
            "{} files, {} static findings, project: {}",
            graph.len(),
            static_findings.len(),
            frameworks.label()
        );
    }

    let spinner = if std::io::stderr().is_terminal() {
        let pb = indicatif::ProgressBar::new_spinner();
        pb.set_style(
            indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .into_diagnostic()?,
        );
        pb.set_message("Preparing review...");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let progress = spinner.clone();
    let on_pass = move |pass: PassKind| {
        if let Some(pb) = &progress {
            pb.set_message(format!("Running {pass} pass..."));
        }
    };

    let input = ReviewInput {
        graph: &graph,
        files: &files,
        frameworks: &frameworks,
        static_findings: &static_findings,
    };
    let timeout = Duration::from_secs(config.review.timeout_secs);
    let outcome = tokio::time::timeout(timeout, prism_review::run_review(config, &input, on_pass)).await;

    let report = match outcome {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            if let Some(pb) = &spinner {
                pb.finish_with_message("Failed");
            }
            return Err(e.into());
        }
        Err(_) => {
            if let Some(pb) = &spinner {
                pb.finish_with_message("Timed out");
            }
            miette::bail!(
                "review timed out after {}s (raise review.timeout_secs in {CONFIG_FILE})",
                config.review.timeout_secs
            );
        }
    };
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if verbose {
        eprint!("{}", report.inclusion_summary());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", report.to_markdown()),
        OutputFormat::Text => print!("{report}"),
    }
    Ok(())
}
