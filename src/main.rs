//! kiln CLI entrypoint

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kiln::cli::{Cli, CliError};
use kiln::fs::PathResolver;
use kiln::plugins::builtin_registry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let registry = builtin_registry()?;

    // Parse CLI, including plugin-declared options
    let cli = match Cli::parse_with(&registry.commander_options()) {
        Ok(cli) => cli,
        Err(CliError::Clap(e)) => e.exit(),
        Err(e) => return Err(e.into()),
    };

    let resolver = PathResolver::from_current_dir().context("Failed to read current directory")?;
    let config = cli.load_config(&resolver).await?;

    // Initialize tracing; RUST_LOG wins over the log toggles
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.filter_directives())),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let code = cli.execute(resolver, config, registry).await?;
    std::process::exit(code);
}
