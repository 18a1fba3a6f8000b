//! Plugin-declared command-line options.
//!
//! Plugins describe their flags commander-style (`"--ci"`,
//! `"--values [value]"`, `"-o, --out <dir>"`). These are turned into clap
//! arguments at startup, and the parsed values are handed back to plugins
//! as [`CommandArgs`].

use std::str::FromStr;

use clap::{Arg, ArgAction, ArgMatches};
use serde_json::{Map, Value};
use thiserror::Error;

/// Long names and shorts owned by the core CLI
const RESERVED_LONG: &[&str] = &["build", "quiet", "verbose", "show-config", "help", "version"];
const RESERVED_SHORT: &[char] = &['b', 'q', 'h', 'V'];

/// Errors from the command line layer
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid option spec '{0}': expected e.g. \"-x, --example <value>\"")]
    InvalidOptionSpec(String),

    #[error("Option '{0}' is declared more than once")]
    DuplicateOption(String),

    #[error(transparent)]
    Clap(#[from] clap::Error),
}

/// A single commander-style option declared by a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommanderOption {
    /// Flag spec, e.g. `"--values [value]"`
    pub flags: String,

    /// Help text
    pub description: String,
}

impl CommanderOption {
    pub fn new(flags: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            flags: flags.into(),
            description: description.into(),
        }
    }
}

/// Whether an option takes a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// Boolean switch
    None,
    /// `<name>`
    Required(String),
    /// `[name]`
    Optional(String),
}

/// A parsed flag spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    pub short: Option<char>,
    pub long: String,
    pub value: ValueKind,
}

impl FromStr for OptionSpec {
    type Err = CliError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || CliError::InvalidOptionSpec(spec.to_string());

        let mut short = None;
        let mut long = None;
        let mut value = ValueKind::None;

        for token in spec.split(|c: char| c == ',' || c.is_whitespace()) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            if let Some(name) = token.strip_prefix("--") {
                if name.is_empty() || long.is_some() {
                    return Err(invalid());
                }
                long = Some(name.to_string());
            } else if let Some(name) = token.strip_prefix('-') {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if short.is_none() => short = Some(c),
                    _ => return Err(invalid()),
                }
            } else if let Some(name) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
                value = ValueKind::Required(name.to_string());
            } else if let Some(name) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                value = ValueKind::Optional(name.to_string());
            } else {
                return Err(invalid());
            }
        }

        let long = long.ok_or_else(invalid)?;
        Ok(Self { short, long, value })
    }
}

impl OptionSpec {
    /// Build the clap argument for this spec
    pub fn to_arg(&self, description: &str) -> Arg {
        let mut arg = Arg::new(self.long.clone())
            .long(self.long.clone())
            .help(description.to_string());

        if let Some(short) = self.short {
            arg = arg.short(short);
        }

        match &self.value {
            ValueKind::None => arg.action(ArgAction::SetTrue),
            ValueKind::Required(name) => arg
                .action(ArgAction::Set)
                .num_args(1)
                .value_name(name.to_uppercase()),
            ValueKind::Optional(name) => arg
                .action(ArgAction::Set)
                .num_args(0..=1)
                .default_missing_value("true")
                .value_name(name.to_uppercase()),
        }
    }

    /// Pull this option's value out of parsed matches
    fn extract(&self, matches: &ArgMatches, args: &mut CommandArgs) {
        match self.value {
            ValueKind::None => {
                if matches.get_flag(&self.long) {
                    args.set(self.long.clone(), true);
                }
            }
            ValueKind::Required(_) | ValueKind::Optional(_) => {
                if let Some(value) = matches.get_one::<String>(&self.long) {
                    args.set(self.long.clone(), value.clone());
                }
            }
        }
    }
}

/// Parse every option and reject clashes with each other or the core CLI
pub fn parse_options(
    options: &[CommanderOption],
) -> Result<Vec<(OptionSpec, String)>, CliError> {
    let mut parsed: Vec<(OptionSpec, String)> = Vec::with_capacity(options.len());

    for option in options {
        let spec: OptionSpec = option.flags.parse()?;

        let long_taken = RESERVED_LONG.contains(&spec.long.as_str())
            || parsed.iter().any(|(p, _)| p.long == spec.long);
        let short_taken = spec.short.is_some_and(|s| {
            RESERVED_SHORT.contains(&s) || parsed.iter().any(|(p, _)| p.short == Some(s))
        });

        if long_taken || short_taken {
            return Err(CliError::DuplicateOption(option.flags.clone()));
        }

        parsed.push((spec, option.description.clone()));
    }

    Ok(parsed)
}

/// Collect plugin option values from parsed matches
pub fn collect_args(specs: &[(OptionSpec, String)], matches: &ArgMatches) -> CommandArgs {
    let mut args = CommandArgs::default();
    for (spec, _) in specs {
        spec.extract(matches, &mut args);
    }
    args
}

/// Values of plugin-declared options, keyed by long name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    values: Map<String, Value>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// True when a switch was given
    pub fn flag(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// The string value of an option, if given
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
