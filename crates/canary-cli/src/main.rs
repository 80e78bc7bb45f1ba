mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    commit::CommitSubcommand, config::ConfigSubcommand, metric::MetricSubcommand,
    trial::TrialSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "canary",
    about = "Risk-gated commits and canary trials for automated changes",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: nearest directory containing .canary/)
    #[arg(long, global = true, env = "CANARY_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .canary/ with default config, metrics file and trial database
    Init,

    /// Commit decisions for proposed tasks
    Commit {
        #[command(subcommand)]
        subcommand: CommitSubcommand,
    },

    /// Create, inspect and resolve canary trials
    Trial {
        #[command(subcommand)]
        subcommand: TrialSubcommand,
    },

    /// Survival rate per kind of change
    Scores {
        #[arg(long)]
        limit: Option<usize>,
        /// Only scores for this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Inspect project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Read and write local metric values
    Metric {
        #[command(subcommand)]
        subcommand: MetricSubcommand,
    },

    /// Serve the HTTP API and resolve trials in the background
    Serve {
        #[arg(long, default_value = "7480")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Commit { subcommand } => cmd::commit::run(&root, subcommand, cli.json),
        Commands::Trial { subcommand } => cmd::trial::run(&root, subcommand, cli.json),
        Commands::Scores { limit, tag } => cmd::scores::run(&root, limit, tag.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Metric { subcommand } => cmd::metric::run(&root, subcommand, cli.json),
        Commands::Serve { port } => cmd::serve::run(&root, port),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
