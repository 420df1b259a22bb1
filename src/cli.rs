use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "vendor-finder")]
#[command(about = "Classify installed Android packages by vendor ecosystem")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON inventory describing the installed packages
    #[arg(long, value_name = "FILE", conflicts_with = "apk_dir")]
    pub manifest: Option<PathBuf>,

    /// Directory of .apk files, one package per file
    #[arg(long, value_name = "DIR")]
    pub apk_dir: Option<PathBuf>,

    /// Identifier of the host application itself
    #[arg(long, value_name = "ID")]
    pub host_id: Option<String>,

    /// Per-package timeout in milliseconds, 0 disables it
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    #[arg(short, long, help = "Debug output")]
    pub debug: bool,

    #[arg(short, long, help = "Trace output")]
    pub trace: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// List installed packages
    Packages,
    /// List flagged installed packages
    Flagged,
    /// Classify packages by identifier
    Check {
        #[arg(required = true)]
        package_ids: Vec<String>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Classify a standalone archive
    Inspect {
        archive: PathBuf,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Print every class name defined in an archive's class containers
    Classes { archive: PathBuf },
    /// Print a package's icon as base64
    Icon { package_id: String },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
