//! Command line arguments backing the `scribe` binary.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
  name = "scribe",
  about = "A CLI tool for recognizing text in images through a bounded OCR request service",
  version
)]
pub struct Args {
  /// Log debug output to stderr
  #[arg(long, short = 'v', global = true)]
  pub verbose: bool,

  #[command(subcommand)]
  pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
  /// Print version information
  Version,
  /// Print the effective service configuration as TOML
  Config {
    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
  },
  /// Recognize text in image files or directories of images
  Recognize {
    /// Image files or directories to scan
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Drop candidates below this confidence (0.0 - 1.0)
    #[arg(long, short = 't')]
    threshold: Option<f64>,

    /// Per-image deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum images inside the engine at once
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Share one engine call between identical images
    #[arg(long)]
    coalesce: bool,

    /// Prefer speed over accuracy
    #[arg(long)]
    fast: bool,

    /// Recognition language (BCP 47), may be repeated
    #[arg(long = "language", short = 'l')]
    languages: Vec<String>,

    /// Print one JSON document per image instead of plain text
    #[arg(long)]
    json: bool,
  },
}
