//! Plugin contract.
//!
//! A plugin registers against one activity and is driven through
//! configure → run (once per cycle) → build_done → shutdown. Optional
//! capabilities are descriptor fields with empty defaults.
//!
//! - `registry`: plugin storage, grouping by activity, prerequisite checks
//! - `builtin`: the file loader, stage and replace plugins

pub mod builtin;
pub mod registry;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cli::options::CommandArgs;
use crate::config::Config;
use crate::core::bus::EventBus;
use crate::domain::{Activity, ProjectState};
use crate::fs::FileSystem;

pub use crate::cli::options::CommanderOption;
pub use builtin::builtin_registry;
pub use registry::{PluginError, PluginRegistry, RegisteredPlugin};

/// Static description of a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    /// Unique plugin name; also the key of its config section
    pub name: String,

    /// Activity the plugin runs in
    pub activity: Activity,

    /// Plugins that must finish first when they share this activity
    pub prerequisites: Vec<String>,

    /// Directory exclusions contributed to crawls
    pub excluded: Vec<String>,

    /// Command-line options
    pub commander: Vec<CommanderOption>,

    /// Defaults merged underneath the plugin's config section
    pub config: Value,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, activity: Activity) -> Self {
        Self {
            name: name.into(),
            activity,
            prerequisites: Vec::new(),
            excluded: Vec::new(),
            commander: Vec::new(),
            config: Value::Null,
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_excluded<I, S>(mut self, excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded = excluded.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_option(mut self, flags: &str, description: &str) -> Self {
        self.commander.push(CommanderOption::new(flags, description));
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Handed to `Plugin::configure`; configuration is still mutable here
pub struct ConfigureContext<'a> {
    pub config: &'a mut Config,
    pub args: &'a CommandArgs,
    pub fs: &'a FileSystem,
    pub bus: &'a Arc<EventBus>,
}

/// Handed to every per-cycle hook.
///
/// Each cycle gets a fresh context with an empty [`ProjectState`].
#[derive(Clone)]
pub struct RunContext {
    /// 1-based cycle number
    pub cycle: u64,
    pub config: Arc<Config>,
    pub fs: Arc<FileSystem>,
    pub bus: Arc<EventBus>,
    project: Arc<RwLock<ProjectState>>,
}

impl RunContext {
    pub fn new(cycle: u64, config: Arc<Config>, fs: Arc<FileSystem>, bus: Arc<EventBus>) -> Self {
        Self {
            cycle,
            config,
            fs,
            bus,
            project: Arc::new(RwLock::new(ProjectState::default())),
        }
    }

    /// Read access to this cycle's project state
    pub async fn project(&self) -> RwLockReadGuard<'_, ProjectState> {
        self.project.read().await
    }

    /// Write access to this cycle's project state
    pub async fn project_mut(&self) -> RwLockWriteGuard<'_, ProjectState> {
        self.project.write().await
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

/// A build plugin
#[async_trait]
pub trait Plugin: Send + Sync {
    fn descriptor(&self) -> &PluginDescriptor;

    /// Called once, in activity order, before the first cycle
    async fn configure(&mut self, _ctx: &mut ConfigureContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once per cycle. An error fails this plugin only.
    async fn run(&mut self, ctx: &RunContext) -> Result<()>;

    /// Called after every activity of a cycle has finished
    async fn build_done(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }

    /// Release held resources before the build ends
    async fn shutdown(&mut self) {}
}
