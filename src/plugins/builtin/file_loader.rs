//! File loader plugin (identify).
//!
//! Populates the cycle's project state from the source and spec trees and,
//! in continuous mode, keeps watchers on both roots. Its lifecycle is a
//! three-state machine:
//!
//! ```text
//! Waiting --run--> Scanning --scan complete--> Watching --run--> Scanning
//! Waiting --build done--> Watching
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::log::targets;
use crate::domain::{Activity, BuildEvent};
use crate::fs::{Depth, Exclusions, WatchHandle};
use crate::plugins::{ConfigureContext, Plugin, PluginDescriptor, RunContext};

pub const NAME: &str = "fileLoader";

/// Loader lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderState {
    #[default]
    Waiting,
    Scanning,
    Watching,
}

/// Inputs that can move the loader between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderTrigger {
    Run,
    ScanComplete,
    BuildDone,
}

impl LoaderState {
    /// Pure transition function; `None` means the trigger is ignored
    pub fn next(self, trigger: LoaderTrigger) -> Option<LoaderState> {
        use LoaderState::*;
        use LoaderTrigger::*;

        match (self, trigger) {
            (Waiting | Watching, Run) => Some(Scanning),
            (Scanning, ScanComplete) => Some(Watching),
            (Waiting, BuildDone) => Some(Watching),
            _ => None,
        }
    }

    /// Only a watching loader forwards change notifications
    pub fn accepts_changes(self) -> bool {
        self == LoaderState::Watching
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LoaderSettings {
    continuous: bool,
    excluded: Vec<String>,
}

pub struct FileLoader {
    descriptor: PluginDescriptor,
    settings: LoaderSettings,
    state: Arc<Mutex<LoaderState>>,
    watchers: Vec<WatchHandle>,
}

impl Default for FileLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileLoader {
    pub fn new() -> Self {
        let descriptor = PluginDescriptor::new(NAME, Activity::Identify)
            .with_option("--ci", "continuously build on file changes")
            .with_config(json!({ "continuous": false, "excluded": [] }));

        Self {
            descriptor,
            settings: LoaderSettings::default(),
            state: Arc::new(Mutex::new(LoaderState::Waiting)),
            watchers: Vec::new(),
        }
    }

    pub fn state(&self) -> LoaderState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn transition(&self, trigger: LoaderTrigger) -> Option<LoaderState> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let current = *state;
        let next = current.next(trigger);
        match next {
            Some(next) => {
                debug!(from = ?current, to = ?next, ?trigger, "File loader transition");
                *state = next;
            }
            None => debug!(state = ?current, ?trigger, "File loader ignored trigger"),
        }
        next
    }

    /// Scanning: crawl both trees into the cycle's project state
    async fn scan(&self, ctx: &RunContext) {
        let fs = &ctx.fs;
        let config = &ctx.config;

        let mut exclusions = Exclusions::from_entries(
            fs.resolver(),
            config.excluded.iter().chain(&self.settings.excluded),
        );
        exclusions.add_path(fs.resolver().absolute(&config.output));

        let (source, specs) = tokio::join!(
            fs.get_files(&config.source, &config.working, &exclusions, Depth::Unlimited),
            fs.get_files(&config.spec, &config.working, &exclusions, Depth::Unlimited),
        );

        info!(
            target: targets::EVENT,
            "found {} directories with {} files",
            source.directories.len(),
            source.files.len()
        );
        info!(target: targets::EVENT, "found {} spec files", specs.files.len());

        let mut project = ctx.project_mut().await;
        project.files = source.files;
        project.specs = specs.files;
        project.directories = source.directories;
        project.directories.extend(specs.directories);
    }

    /// Watching: replace watchers on both roots when continuous
    async fn watch_roots(&mut self, ctx: &RunContext) {
        if !ctx.config.continuous {
            return;
        }

        self.release_watchers();

        for root in [&ctx.config.source, &ctx.config.spec] {
            let root: PathBuf = ctx.fs.resolver().absolute(root);
            if !ctx.fs.path_exists(&root).await {
                debug!(root = %root.display(), "Watch root missing, skipping");
                continue;
            }

            let bus = ctx.bus.clone();
            let state = self.state.clone();
            let watched = root.clone();
            let result = ctx.fs.watch(&root, move |path| {
                let watching = state
                    .lock()
                    .map(|s| s.accepts_changes())
                    .unwrap_or(false);
                if !watching {
                    return;
                }
                info!(target: targets::EVENT, "file change in '{}'", path.display());
                bus.raise(BuildEvent::FileChanged {
                    path,
                    root: watched.clone(),
                });
            });

            match result {
                Ok(handle) => self.watchers.push(handle),
                Err(e) => warn!(error = %e, "Could not watch root"),
            }
        }
    }

    fn release_watchers(&mut self) {
        for handle in self.watchers.drain(..) {
            handle.release();
        }
    }
}

#[async_trait]
impl Plugin for FileLoader {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    async fn configure(&mut self, ctx: &mut ConfigureContext<'_>) -> Result<()> {
        self.settings = ctx.config.plugin_config(NAME)?;
        if ctx.args.flag("ci") || self.settings.continuous {
            ctx.config.continuous = true;
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &RunContext) -> Result<()> {
        if self.transition(LoaderTrigger::Run).is_none() {
            anyhow::bail!("File loader cannot scan from state {:?}", self.state());
        }
        self.scan(ctx).await;

        if self.transition(LoaderTrigger::ScanComplete).is_some() {
            self.watch_roots(ctx).await;
        }
        Ok(())
    }

    async fn build_done(&mut self, ctx: &RunContext) -> Result<()> {
        if self.transition(LoaderTrigger::BuildDone).is_some() {
            self.watch_roots(ctx).await;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.release_watchers();
    }
}
