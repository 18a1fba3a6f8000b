//! Command-line interface for kiln.
//!
//! The fixed options are declared with clap derive; plugin options are
//! appended at runtime from their commander specs.

pub mod options;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser};
use serde_json::{json, Value};
use tracing::info;

use crate::config::{Config, ConfigSources};
use crate::core::{EventBus, Orchestrator};
use crate::domain::{BuildEvent, EventKind};
use crate::fs::PathResolver;
use crate::plugins::{CommanderOption, PluginRegistry};

pub use options::{CliError, CommandArgs};

/// kiln - Pluggable build orchestrator
#[derive(Parser, Debug, Default)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Build file name: loads ./<NAME>.json instead of ./build.json
    #[arg(short, long, value_name = "NAME", env = "KILN_BUILD")]
    pub build: Option<String>,

    /// Only report steps, completions and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Include debug output and warnings
    #[arg(long)]
    pub verbose: bool,

    /// Print the merged configuration and exit
    #[arg(long)]
    pub show_config: bool,

    /// Values of plugin-declared options
    #[arg(skip)]
    pub plugin_args: CommandArgs,
}

impl Cli {
    /// Parse the process arguments with plugin options added
    pub fn parse_with(options: &[CommanderOption]) -> Result<Self, CliError> {
        Self::try_parse_from_with(options, std::env::args_os())
    }

    pub fn try_parse_from_with<I, T>(options: &[CommanderOption], argv: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let specs = options::parse_options(options)?;
        let command = specs
            .iter()
            .fold(Cli::command(), |command, (spec, help)| command.arg(spec.to_arg(help)));

        let matches = command.try_get_matches_from(argv)?;
        let mut cli = Cli::from_arg_matches(&matches)?;
        cli.plugin_args = options::collect_args(&specs, &matches);
        Ok(cli)
    }

    /// Configuration overrides implied by the flags
    pub fn overrides(&self) -> Value {
        let mut log = serde_json::Map::new();
        if self.quiet {
            log.insert("debug".into(), json!(false));
            log.insert("event".into(), json!(false));
            log.insert("warning".into(), json!(false));
        }
        if self.verbose {
            log.insert("debug".into(), json!(true));
            log.insert("warning".into(), json!(true));
        }

        if log.is_empty() {
            Value::Null
        } else {
            json!({ "log": log })
        }
    }

    /// Load and merge every configuration layer
    pub async fn load_config(&self, resolver: &PathResolver) -> Result<Config> {
        let sources = ConfigSources::discover(resolver, self.build.as_deref());
        Config::load(&sources, self.overrides())
            .await
            .with_context(|| format!("Failed to load {}", sources.project.display()))
    }

    /// Run the build and return the process exit code
    pub async fn execute(
        self,
        resolver: PathResolver,
        config: Config,
        registry: PluginRegistry,
    ) -> Result<i32> {
        if self.show_config {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(0);
        }

        let bus = Arc::new(EventBus::new());
        bus.on(EventKind::AllStop, |event| {
            if let BuildEvent::AllStop { exit_code } = event {
                std::process::exit(*exit_code);
            }
        });

        let interrupt = bus.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                interrupt.raise(BuildEvent::AllStop { exit_code: 130 });
            }
        });

        let mut orchestrator = Orchestrator::new(config, resolver, registry, bus);
        let outcome = orchestrator.start(&self.plugin_args).await?;
        Ok(outcome.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin_options() -> Vec<CommanderOption> {
        vec![
            CommanderOption::new("--ci", "continuous"),
            CommanderOption::new("--values [value]", "values file"),
        ]
    }

    #[test]
    fn test_fixed_and_plugin_options() {
        let cli = Cli::try_parse_from_with(
            &plugin_options(),
            ["kiln", "-b", "release", "--ci", "--values", "v.json"],
        )
        .unwrap();

        assert_eq!(cli.build.as_deref(), Some("release"));
        assert!(!cli.quiet);
        assert!(cli.plugin_args.flag("ci"));
        assert_eq!(cli.plugin_args.value("values"), Some("v.json"));
    }

    #[test]
    fn test_unknown_option_is_clap_error() {
        let err = Cli::try_parse_from_with(&plugin_options(), ["kiln", "--nope"]).unwrap_err();
        assert!(matches!(err, CliError::Clap(_)));
    }

    #[test]
    fn test_log_overrides() {
        let quiet = Cli {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(quiet.overrides()["log"]["event"], json!(false));

        let verbose = Cli {
            verbose: true,
            ..Default::default()
        };
        assert_eq!(verbose.overrides()["log"]["debug"], json!(true));

        assert_eq!(Cli::default().overrides(), Value::Null);
    }
}
