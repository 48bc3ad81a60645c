//! CLI tool reporting the build targets a source file uses but does not declare

use build_dep_audit::{audit_file, AuditOptions, AuditResult, RepoConfig};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "missing-deps")]
#[command(about = "Find the build targets a source file imports but its build rule does not declare", long_about = None)]
#[command(version)]
struct Cli {
    /// Source file to audit, absolute or relative to the repository root
    file: PathBuf,

    /// Path to the repository configuration file (JSON, or TOML with a .toml extension)
    #[arg(short = 'c', long, default_value = "repo.json")]
    repo_config: PathBuf,

    /// Output format
    #[arg(short = 'f', long, default_value = "text")]
    format: OutputFormat,

    /// Exit with a non-zero status when any dependency is missing
    #[arg(long)]
    check: bool,

    /// Show a progress spinner while build files are evaluated
    #[arg(long)]
    progress: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = match RepoConfig::load(&cli.repo_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Failed to load config: {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    let options = AuditOptions {
        show_progress: cli.progress,
    };

    let result = match audit_file(&config, &cli.file, &options).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{} Audit failed: {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    match cli.format {
        OutputFormat::Text => print!("{}", render_text(&result)),
        OutputFormat::Json => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{} Failed to serialize result: {}", "Error:".red().bold(), e);
                process::exit(1);
            }
        },
    }

    if cli.check && result.has_missing() {
        eprintln!(
            "{} {} missing dependencies for {}",
            "Failed:".red().bold(),
            result.missing.len(),
            result.source_file
        );
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn render_text(result: &AuditResult) -> String {
    let mut out = String::new();

    out.push_str("# Source file's BUILD listed dependency targets:\n");
    for label in &result.declared_labels {
        out.push_str(&format!("{}\n", label));
    }

    out.push_str("\n# Source file's missing dependency targets:\n");
    for label in &result.missing {
        out.push_str(&format!("\"{}\",\n", label));
    }

    out
}
