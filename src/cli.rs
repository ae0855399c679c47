use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffpipe")]
#[command(author, version, about = "Run ffmpeg with inputs and outputs streamed through named pipes")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run ffmpeg, streaming stdin and/or stdout through pipes
    Run(RunArgs),

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default locations if not specified)
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Stream this process's stdin into an input pipe ({input})
    #[arg(long)]
    pub stdin: bool,

    /// Stream an output pipe ({output}) to this process's stdout
    #[arg(long)]
    pub stdout: bool,

    /// Container format of stdin, passed as `-f` before the input pipe
    #[arg(long)]
    pub input_format: Option<String>,

    /// Container format written to stdout, passed as `-f` before the output pipe
    #[arg(long)]
    pub output_format: Option<String>,

    /// Total media duration in seconds, enables percentage progress
    #[arg(long)]
    pub duration: Option<f64>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Template variable as KEY=VALUE, substituted for {KEY}
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// ffmpeg arguments
    #[arg(last = true, required = true)]
    pub args: Vec<String>,
}
