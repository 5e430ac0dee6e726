use crate::types::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubin")]
#[command(about = "Kubin CLI - Create and share Kubernetes cluster snapshots")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a snapshot of your current Kubernetes cluster
    Create(CreateArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Archive path (default: kubin-snapshot-<seconds>-<nanoseconds>.tar.gz in --output-dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for the generated archive name
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Kubeconfig file (default: $KUBECONFIG, ~/.kube/config, then in-cluster config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Context
    #[arg(long)]
    pub context: Option<String>,

    /// Serialization of each captured resource
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Also capture the logs of every pod
    #[arg(long)]
    pub include_logs: bool,

    /// Skip resources that cannot be written instead of aborting
    #[arg(long)]
    pub keep_going: bool,
}
