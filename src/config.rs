//! Build configuration.
//!
//! Configuration layers (lowest priority first):
//! 1. Built-in defaults
//! 2. User preferences (~/.kiln)
//! 3. Project build file (./build.json, or ./<name>.json with --build)
//! 4. CLI overrides
//!
//! Objects merge recursively; any other value replaces. Every top-level key
//! that is not a core setting is a plugin section keyed by plugin name.

pub mod log;
pub mod merge;

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::core::scheduler::mapped;
use crate::domain::Activity;
use crate::fs::PathResolver;

pub use log::LogConfig;
pub use merge::deep_merge;

/// Default build file when no `--build` name is given
pub const DEFAULT_BUILD_FILE: &str = "./build.json";

/// User preferences file
pub const USER_PREFERENCES: &str = "~/.kiln";

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error(
        "Source, working and spec directories must be separate directories ({first} and {second} both resolve to {})",
        path.display()
    )]
    OverlappingRoots {
        first: &'static str,
        second: &'static str,
        path: PathBuf,
    },

    #[error("Invalid section for plugin '{plugin}': {source}")]
    PluginSection {
        plugin: String,
        source: serde_json::Error,
    },
}

/// Process-wide build configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Working (staging) tree
    pub working: PathBuf,

    /// Source tree
    pub source: PathBuf,

    /// Spec tree
    pub spec: PathBuf,

    /// Output directory
    pub output: PathBuf,

    /// Tasks directory
    pub tasks: PathBuf,

    /// Activities in execution order
    pub activity_order: Vec<Activity>,

    pub log: LogConfig,

    /// Re-run the pipeline when watched files change
    pub continuous: bool,

    /// Debounce window for change notifications
    pub debounce_ms: u64,

    /// Optional per-activity timeout; none means wait indefinitely
    pub activity_timeout_secs: Option<u64>,

    /// Directory names or paths pruned from every crawl
    pub excluded: Vec<String>,

    /// Plugin sections keyed by plugin name
    #[serde(flatten)]
    pub plugins: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working: PathBuf::from("./.kiln/tmp"),
            source: PathBuf::from("./src"),
            spec: PathBuf::from("./spec"),
            output: PathBuf::from("./lib"),
            tasks: PathBuf::from("./tasks"),
            activity_order: Activity::default_order(),
            log: LogConfig::default(),
            continuous: false,
            debounce_ms: 1000,
            activity_timeout_secs: None,
            excluded: Vec::new(),
            plugins: Map::new(),
        }
    }
}

/// Where configuration layers are read from
#[derive(Debug, Clone)]
pub struct ConfigSources {
    /// User preferences file (skipped when `None`)
    pub user: Option<PathBuf>,

    /// Project build file
    pub project: PathBuf,
}

impl ConfigSources {
    /// Standard locations: `~/.kiln` and `./<name>.json` (default `./build.json`)
    pub fn discover(resolver: &PathResolver, build_name: Option<&str>) -> Self {
        let project = match build_name {
            Some(name) => resolver.absolute(format!("./{}.json", name)),
            None => resolver.absolute(DEFAULT_BUILD_FILE),
        };
        Self {
            user: Some(resolver.absolute(USER_PREFERENCES)),
            project,
        }
    }
}

impl Config {
    /// Load and merge every layer. User and project files are read
    /// concurrently; a missing file contributes nothing.
    pub async fn load(sources: &ConfigSources, overrides: Value) -> Result<Self, ConfigError> {
        let mut layers = mapped([
            ("user", read_layer(sources.user.clone()).boxed()),
            ("project", read_layer(Some(sources.project.clone())).boxed()),
        ])
        .await;

        let user = layers.remove("user").unwrap_or(Ok(Value::Null))?;
        let project = layers.remove("project").unwrap_or(Ok(Value::Null))?;

        let defaults = serde_json::to_value(Config::default())?;
        let merged = merge::merge_layers(defaults, [user, project, overrides]);

        let config: Config = serde_json::from_value(merged)?;
        debug!(plugins = config.plugins.len(), "Configuration merged");
        Ok(config)
    }

    /// Fail fast unless working, source and spec resolve to distinct paths
    pub fn validate(&self, resolver: &PathResolver) -> Result<(), ConfigError> {
        let roots = [
            ("working", resolver.absolute(&self.working)),
            ("source", resolver.absolute(&self.source)),
            ("spec", resolver.absolute(&self.spec)),
        ];

        for (i, (first, first_path)) in roots.iter().enumerate() {
            for (second, second_path) in roots.iter().skip(i + 1) {
                if first_path == second_path {
                    return Err(ConfigError::OverlappingRoots {
                        first: *first,
                        second: *second,
                        path: first_path.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Debounce window as a Duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn activity_timeout(&self) -> Option<Duration> {
        self.activity_timeout_secs.map(Duration::from_secs)
    }

    /// Raw section for a plugin
    pub fn plugin_section(&self, plugin: &str) -> Option<&Value> {
        self.plugins.get(plugin)
    }

    /// Deserialize a plugin's section; a missing section yields defaults
    pub fn plugin_config<T>(&self, plugin: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.plugins.get(plugin) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(section) => serde_json::from_value(section.clone()).map_err(|source| {
                ConfigError::PluginSection {
                    plugin: plugin.to_string(),
                    source,
                }
            }),
        }
    }

    /// Add crawl exclusions, skipping ones already present
    pub fn add_exclusions<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for entry in entries {
            let entry = entry.into();
            if !self.excluded.contains(&entry) {
                self.excluded.push(entry);
            }
        }
    }

    /// Merge a plugin's defaults underneath its configured section
    pub fn apply_plugin_defaults(&mut self, plugin: &str, defaults: &Value) {
        if defaults.is_null() {
            return;
        }
        let mut merged = defaults.clone();
        if let Some(section) = self.plugins.remove(plugin) {
            deep_merge(&mut merged, section);
        }
        self.plugins.insert(plugin.to_string(), merged);
    }
}

/// Read one JSON layer; a missing or absent file is an empty layer
async fn read_layer(path: Option<PathBuf>) -> Result<Value, ConfigError> {
    let Some(path) = path else {
        return Ok(Value::Null);
    };

    if !is_file(&path).await {
        debug!(path = %path.display(), "Config layer not found");
        return Ok(Value::Null);
    }

    let content = fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
