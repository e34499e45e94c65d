//! Command-line interface definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use smpmap::logging::LogFormat;

/// Run computations over many inputs in parallel worker processes.
#[derive(Parser, Debug)]
#[command(name = "smpmap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Log level or filter directive (overrides -v and -q).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormatArg>,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Filter directive implied by the command-line flags, if any.
    pub fn log_filter(&self) -> Option<String> {
        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }
        if self.quiet {
            return Some("error".to_string());
        }
        match self.verbose {
            0 => None,
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the built-in computations.
    Tasks,

    /// Map a built-in computation over inputs.
    Run(RunArgs),
}

/// Built-in computation to run.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskArg {
    Sine,
    Integrate,
    Sqrt,
    Crash,
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Computation to run.
    #[arg(value_enum)]
    pub task: TaskArg,

    /// Inputs as JSON values, one task each.
    #[arg(
        value_name = "INPUT_JSON",
        conflicts_with_all = ["from", "to"],
        allow_negative_numbers = true
    )]
    pub inputs: Vec<String>,

    /// First integer of an inclusive input range.
    #[arg(long, requires = "to", allow_negative_numbers = true)]
    pub from: Option<i64>,

    /// Last integer of an inclusive input range.
    #[arg(long, requires = "from", allow_negative_numbers = true)]
    pub to: Option<i64>,

    /// For `sine` over a range: delay each task by this many milliseconds
    /// per position before the end of the range, so later inputs finish first.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub stagger_ms: u64,

    /// Maximum number of concurrent workers (defaults to the CPU count,
    /// or SMPMAP_MAX_CHILDREN).
    #[arg(short = 'j', long)]
    pub max_children: Option<usize>,

    /// Poll timeout in milliseconds while below the worker limit (defaults
    /// to 1, or SMPMAP_POLL_TIMEOUT_MS).
    #[arg(long, value_name = "MS")]
    pub poll_timeout_ms: Option<u64>,

    /// Result output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Plain)]
    pub format: OutputFormatArg,

    /// Where captured worker output is replayed.
    #[arg(long, value_enum, default_value_t = CapturedArg::Stdout)]
    pub captured: CapturedArg,
}

/// Result output format.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormatArg {
    /// `#<index> <value>` per line.
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

/// Destination of captured worker output.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapturedArg {
    #[default]
    Stdout,
    Stderr,
    Discard,
}

/// Log output format.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
