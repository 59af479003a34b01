use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config YAML file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging for internal details
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run concurrent producers and blocking consumers against an in-memory service
    Simulate(SimulateArgs),
    /// Offer items through one handle and remove them in order through another
    Drain(DrainArgs),
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of producer sessions (overrides config)
    #[arg(long)]
    pub producers: Option<usize>,

    /// Number of consumer sessions (overrides config)
    #[arg(long)]
    pub consumers: Option<usize>,

    /// Total number of items to offer (overrides config)
    #[arg(long)]
    pub items: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DrainArgs {
    /// Number of items to offer and drain
    #[arg(long, default_value_t = 10)]
    pub items: usize,
}
