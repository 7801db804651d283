mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Thread-scaling experiments for sequence aligners
#[derive(Parser, Debug)]
#[command(name = "thread-sweep", version, about)]
struct Cli {
    /// Log every engine decision and command line
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every configuration and run the thread-count series
    Run(commands::run::RunArgs),
    /// Check the catalog, read inputs and index without building or running
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => commands::run::execute(args).await,
        Command::Validate(args) => commands::validate::execute(args),
    }
}

/// `RUST_LOG` wins over the default filter
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "sweep_engine=debug,thread_sweep=debug"
    } else {
        "sweep_engine=info,thread_sweep=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
