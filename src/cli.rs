use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit video files (or every file under a directory) to the target size
    Batch {
        /// Input files or directories, processed in the order given
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Target output size in MiB
        #[arg(short, long)]
        target_mib: Option<u64>,

        /// Directory to write encoded files to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the bitrates that would be used for a clip of a given length
    Plan {
        /// Clip duration in seconds
        #[arg(short, long)]
        duration: f64,

        /// Target output size in MiB
        #[arg(short, long)]
        target_mib: Option<u64>,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Where to write the configuration
        #[arg(short, long, default_value = "config.toml")]
        path: PathBuf,
    },
}
