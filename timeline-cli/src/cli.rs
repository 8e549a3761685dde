use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hlstl",
    about = "hlstl - scan, verify and reconstruct time-bucketed HLS archives",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the buckets of a time range and whether each has a folder
    Scan {
        /// Range start (epoch seconds or RFC 3339)
        #[arg(short, long)]
        start: String,

        /// Range end, exclusive (epoch seconds or RFC 3339)
        #[arg(short, long)]
        end: String,

        #[arg(short = 'f', long, default_value = "pretty")]
        format: OutputFormat,
    },

    /// Check one bucket folder's manifest against its files
    Verify {
        /// Folder key, e.g. 1657546219
        #[arg(long)]
        folder: String,

        #[arg(short = 'f', long, default_value = "pretty")]
        format: OutputFormat,
    },

    /// Print the playable clips of a range, or follow the live edge
    Clips {
        /// Range start (epoch seconds or RFC 3339)
        #[arg(short, long)]
        start: String,

        /// Range end, exclusive. Without it the stream is followed until
        /// interrupted.
        #[arg(short, long)]
        end: Option<String>,

        /// Write each clip's concatenated segments as a .ts file here
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Stop after this many clips
        #[arg(long)]
        limit: Option<usize>,

        #[arg(short = 'f', long, default_value = "pretty")]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// One JSON document per line
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Pretty => write!(f, "pretty"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
