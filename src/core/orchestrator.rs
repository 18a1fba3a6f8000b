//! Build orchestrator.
//!
//! Owns the configuration, the event bus, the filesystem service and the
//! plugin registry. Configures plugins once, then runs pipeline cycles:
//! one cycle for a normal build, or a cycle per batch of file changes in
//! continuous mode until a stop is requested.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, error, info, instrument, warn};

use crate::cli::options::CommandArgs;
use crate::config::log::targets;
use crate::config::Config;
use crate::domain::{BuildEvent, BuildOutcome};
use crate::fs::{FileSystem, PathResolver};
use crate::plugins::{ConfigureContext, PluginRegistry, RunContext};

use super::bus::EventBus;
use super::pipeline::{panic_message, ActivityPipeline};

/// Exit code raised with `AllStop` when startup validation fails
pub const CONFIG_ERROR_EXIT: i32 = -1;

/// Why the watch loop woke up
#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Rebuild(PathBuf),
    Stop(i32),
}

/// Main build orchestrator
pub struct Orchestrator {
    /// Mutable until plugins are configured
    pending: Option<Config>,

    /// Frozen configuration shared with every cycle
    frozen: Option<Arc<Config>>,

    fs: Arc<FileSystem>,
    bus: Arc<EventBus>,
    registry: PluginRegistry,

    /// Last started cycle
    cycle: u64,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        resolver: PathResolver,
        registry: PluginRegistry,
        bus: Arc<EventBus>,
    ) -> Self {
        let fs = FileSystem::new(resolver).with_debounce(config.debounce());
        Self {
            pending: Some(config),
            frozen: None,
            fs: Arc::new(fs),
            bus,
            registry,
            cycle: 0,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn fs(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// The frozen configuration, once plugins are configured
    pub fn config(&self) -> Option<&Arc<Config>> {
        self.frozen.as_ref()
    }

    /// Configure then run
    pub async fn start(&mut self, args: &CommandArgs) -> Result<BuildOutcome> {
        self.configure(args).await?;
        self.run().await
    }

    /// Validate, configure every plugin in activity order, and freeze the
    /// configuration.
    ///
    /// Validation failures raise `AllStop` and return an error; plugin
    /// configure failures are logged and the build continues.
    #[instrument(skip(self, args))]
    pub async fn configure(&mut self, args: &CommandArgs) -> Result<Arc<Config>> {
        let mut config = self
            .pending
            .take()
            .context("Plugins have already been configured")?;

        if let Err(e) = self.validate(&config) {
            error!(error = %e, "Invalid build configuration");
            self.bus.raise(BuildEvent::AllStop {
                exit_code: CONFIG_ERROR_EXIT,
            });
            return Err(e);
        }

        self.bus.raise(BuildEvent::Config);
        config.add_exclusions(self.registry.excluded());

        for activity in config.activity_order.clone() {
            for registered in self.registry.for_activity(activity) {
                let name = registered.name();
                config.apply_plugin_defaults(name, &registered.descriptor.config);

                let mut plugin = registered.plugin.lock().await;
                let mut ctx = ConfigureContext {
                    config: &mut config,
                    args,
                    fs: &self.fs,
                    bus: &self.bus,
                };

                match AssertUnwindSafe(plugin.configure(&mut ctx)).catch_unwind().await {
                    Ok(Ok(())) => debug!(plugin = %name, "Configured plugin"),
                    Ok(Err(e)) => warn!(plugin = %name, error = %e, "Plugin configure failed"),
                    Err(panic) => error!(
                        plugin = %name,
                        panic = %panic_message(panic.as_ref()),
                        "Plugin configure panicked"
                    ),
                }
            }
        }

        let config = Arc::new(config);
        // Plugins may have changed the debounce window
        self.fs = Arc::new(
            FileSystem::new(self.fs.resolver().clone()).with_debounce(config.debounce()),
        );
        self.frozen = Some(config.clone());

        info!(plugins = self.registry.len(), continuous = config.continuous, "Plugins configured");
        self.bus.raise(BuildEvent::PluginsConfigured);
        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        config.validate(self.fs.resolver())?;
        self.registry.validate(&config.activity_order)?;
        Ok(())
    }

    /// Run pipeline cycles until the build finishes or is stopped
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<BuildOutcome> {
        let config = self
            .frozen
            .clone()
            .context("Plugins must be configured before running")?;
        let pipeline = ActivityPipeline::from_config(&config);

        // Subscribe before the first cycle so no change is missed
        let mut events = self.bus.subscribe();

        loop {
            self.cycle += 1;
            let ctx = RunContext::new(self.cycle, config.clone(), self.fs.clone(), self.bus.clone());

            let report = pipeline.run_cycle(&self.registry, &ctx).await;
            self.build_done(&ctx).await;

            info!(
                target: targets::COMPLETE,
                cycle = report.cycle,
                failures = report.failures().count(),
                "Build done"
            );
            self.bus.raise(BuildEvent::BuildDone { cycle: self.cycle });

            if !config.continuous {
                self.shutdown().await;
                return Ok(BuildOutcome::Completed(report));
            }

            match next_wake(&mut events).await {
                Wake::Rebuild(path) => {
                    info!(target: targets::EVENT, path = %path.display(), "Change detected, rebuilding");
                }
                Wake::Stop(exit_code) => {
                    info!(exit_code, "Stop requested");
                    self.shutdown().await;
                    return Ok(BuildOutcome::Stopped {
                        exit_code,
                        last: Some(report),
                    });
                }
            }
        }
    }

    async fn build_done(&self, ctx: &RunContext) {
        for registered in self.registry.iter() {
            let mut plugin = registered.plugin.lock().await;
            match AssertUnwindSafe(plugin.build_done(ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(plugin = %registered.name(), error = %e, "build_done hook failed"),
                Err(panic) => error!(
                    plugin = %registered.name(),
                    panic = %panic_message(panic.as_ref()),
                    "build_done hook panicked"
                ),
            }
        }
    }

    async fn shutdown(&self) {
        for registered in self.registry.iter() {
            registered.plugin.lock().await.shutdown().await;
        }
        debug!("Plugins shut down");
    }
}

/// Wait for a change or a stop. Queued changes collapse into one rebuild;
/// a queued stop wins over changes.
async fn next_wake(events: &mut broadcast::Receiver<BuildEvent>) -> Wake {
    loop {
        match events.recv().await {
            Ok(BuildEvent::AllStop { exit_code }) => return Wake::Stop(exit_code),
            Ok(BuildEvent::FileChanged { path, .. }) => return drain(events, path),
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event receiver lagged");
                continue;
            }
            Err(RecvError::Closed) => return Wake::Stop(0),
        }
    }
}

fn drain(events: &mut broadcast::Receiver<BuildEvent>, first: PathBuf) -> Wake {
    let mut coalesced = 0usize;
    loop {
        match events.try_recv() {
            Ok(BuildEvent::AllStop { exit_code }) => return Wake::Stop(exit_code),
            Ok(BuildEvent::FileChanged { .. }) => coalesced += 1,
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    if coalesced > 0 {
        debug!(coalesced, "Coalesced queued changes");
    }
    Wake::Rebuild(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(path: &str) -> BuildEvent {
        BuildEvent::FileChanged {
            path: PathBuf::from(path),
            root: PathBuf::from("/p/src"),
        }
    }

    #[tokio::test]
    async fn test_queued_changes_coalesce() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();

        bus.raise(BuildEvent::BuildDone { cycle: 1 });
        bus.raise(changed("/p/src/a.js"));
        bus.raise(changed("/p/src/b.js"));
        bus.raise(changed("/p/src/c.js"));

        assert_eq!(
            next_wake(&mut events).await,
            Wake::Rebuild(PathBuf::from("/p/src/a.js"))
        );
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_stop_wins_over_queued_changes() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();

        bus.raise(changed("/p/src/a.js"));
        bus.raise(BuildEvent::AllStop { exit_code: 2 });

        assert_eq!(next_wake(&mut events).await, Wake::Stop(2));
    }

    #[tokio::test]
    async fn test_run_requires_configure() {
        let mut orchestrator = Orchestrator::new(
            Config::default(),
            PathResolver::new("/proj"),
            PluginRegistry::new(),
            Arc::new(EventBus::new()),
        );
        assert!(orchestrator.run().await.is_err());
    }
}
