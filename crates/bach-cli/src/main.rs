mod cmd;
mod output;
mod scoped;

use bach_core::config::{BachConfig, DEFAULT_CONFIG_FILE};
use clap::{Parser, Subcommand};
use cmd::{run::RunArgs, task::TaskSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bach",
    about = "Fetch ads reports, filter rows by rules, and act on what matches",
    version,
    propagate_version = true,
    after_help = "Area and notifier parameters are passed as --area.<key>=<value> and --notify.<key>=<value>."
)]
struct Cli {
    /// Config file (default: ./bach.yaml)
    #[arg(long, global = true, env = "BACH_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline once, or save it as a task
    Run(RunArgs),

    /// Manage saved tasks
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// List registered areas, actors, notifiers and fetchers
    Plugins,

    /// Start the HTTP entrypoint
    Serve {
        #[arg(long, short, default_value_t = 8080, env = "BACH_PORT")]
        port: u16,
    },
}

fn main() {
    let (args, scoped_args) = scoped::split_args(std::env::args().collect());
    let cli = Cli::parse_from(args);

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

    if let Err(e) = dispatch(cli, &scoped_args) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli, scoped_args: &[String]) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = BachConfig::load(&config_path)
        .map_err(|e| anyhow::anyhow!("cannot load config {}: {e}", config_path.display()))?;
    for warning in config.validate() {
        tracing::warn!("{}: {warning}", config_path.display());
    }

    let params = scoped::parse(scoped_args)?;
    if !matches!(cli.command, Commands::Run(_)) && params.values().any(|p| !p.is_empty()) {
        anyhow::bail!("--area.* and --notify.* parameters only apply to `bach run`");
    }

    match cli.command {
        Commands::Run(args) => cmd::run::run(&config, args, params, cli.json),
        Commands::Task { subcommand } => cmd::task::run(&config, subcommand, cli.json),
        Commands::Plugins => cmd::plugins::run(&config, cli.json),
        Commands::Serve { port } => cmd::serve::run(&config, port),
    }
}
