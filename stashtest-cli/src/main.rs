use clap::Parser;

use stashtest_cli::cli::{Cli, Commands};
use stashtest_cli::commands::{self, check, run};
use stashtest_cli::error::CliError;
use stashtest_cli::logging::init_tracing;
use stashtest_cli::metrics_snapshot;
use stashtest_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let mut config = commands::load_config(cli.config.as_deref()).await?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(path) = cli.metrics_file {
        config.general.metrics_file = path.display().to_string();
    }
    config.validate()?;
    init_tracing(&config.general)?;
    let snapshot = metrics_snapshot::install_recorder(&config.general)?;

    tracing::debug!(command = ?cli.command, "stashtest starting");

    let writer = OutputWriter::new(cli.output);
    let result = match cli.command {
        Commands::Run(args) => run::execute(args, &config, &writer).await,
        Commands::Check(args) => check::execute(args, &config, &writer).await,
    };

    if let Some(snapshot) = snapshot {
        match snapshot.write().await {
            Ok(()) => tracing::info!(path = %snapshot.path().display(), "metrics written"),
            Err(e) => tracing::warn!(error = %e, "failed to write metrics"),
        }
    }
    result
}
