//! Activity pipeline.
//!
//! One cycle walks the activity order. Activities run strictly one after
//! another; the plugins of one activity run concurrently on the calling
//! task, except that a plugin waits for any same-activity prerequisite to
//! finish first. Plugin errors and panics are recorded, never propagated.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::log::targets;
use crate::config::Config;
use crate::domain::{
    Activity, ActivityReport, BuildEvent, CycleReport, PluginOutcome, PluginStatus,
};
use crate::plugins::{PluginRegistry, RegisteredPlugin, RunContext};

/// Drives plugins through the activity order
#[derive(Debug, Clone)]
pub struct ActivityPipeline {
    order: Vec<Activity>,
    timeout: Option<Duration>,
}

impl ActivityPipeline {
    pub fn new(order: Vec<Activity>, timeout: Option<Duration>) -> Self {
        Self { order, timeout }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.activity_order.clone(), config.activity_timeout())
    }

    pub fn order(&self) -> &[Activity] {
        &self.order
    }

    /// Run every activity once. Activities without plugins are skipped.
    #[instrument(skip(self, registry, ctx), fields(cycle = ctx.cycle))]
    pub async fn run_cycle(&self, registry: &PluginRegistry, ctx: &RunContext) -> CycleReport {
        let mut report = CycleReport::new(ctx.cycle);

        for activity in &self.order {
            let plugins = registry.for_activity(*activity);
            if plugins.is_empty() {
                debug!(activity = %activity, "No plugins registered, skipping");
                continue;
            }

            info!(
                target: targets::STEP,
                activity = %activity,
                plugins = plugins.len(),
                "Starting {}",
                activity
            );

            let activity_report = self.run_activity(*activity, registry, &plugins, ctx).await;

            info!(
                target: targets::COMPLETE,
                activity = %activity,
                duration_ms = activity_report.duration_ms,
                "Completed {}",
                activity
            );

            ctx.bus.raise(BuildEvent::ActivityCompleted {
                cycle: ctx.cycle,
                activity: *activity,
            });
            report.activities.push(activity_report);
        }

        report.finish();
        report
    }

    async fn run_activity(
        &self,
        activity: Activity,
        registry: &PluginRegistry,
        plugins: &[&RegisteredPlugin],
        ctx: &RunContext,
    ) -> ActivityReport {
        let started = Instant::now();

        let outcomes: Mutex<HashMap<String, PluginOutcome>> = Mutex::new(
            plugins
                .iter()
                .map(|p| (p.name().to_string(), PluginOutcome::pending(p.name())))
                .collect(),
        );

        // One completion signal per plugin for same-activity prerequisites
        let mut senders: HashMap<&str, watch::Sender<bool>> = HashMap::new();
        let mut receivers: HashMap<&str, watch::Receiver<bool>> = HashMap::new();
        for plugin in plugins {
            let (tx, rx) = watch::channel(false);
            senders.insert(plugin.name(), tx);
            receivers.insert(plugin.name(), rx);
        }

        let runs = plugins.iter().filter_map(|plugin| {
            let done = senders.remove(plugin.name())?;
            let waits: Vec<watch::Receiver<bool>> = registry
                .local_prerequisites(&plugin.descriptor)
                .into_iter()
                .filter_map(|name| receivers.get(name).cloned())
                .collect();
            Some(run_plugin(plugin, ctx, waits, done, &outcomes))
        });
        let runs: Vec<_> = runs.collect();

        let timed_out = match self.timeout {
            None => {
                join_all(runs).await;
                false
            }
            Some(limit) => tokio::time::timeout(limit, join_all(runs)).await.is_err(),
        };

        let mut outcomes = outcomes.into_inner().unwrap_or_else(|p| p.into_inner());
        let results: Vec<PluginOutcome> = plugins
            .iter()
            .filter_map(|p| outcomes.remove(p.name()))
            .map(|mut outcome| {
                if timed_out && matches!(outcome.status, PluginStatus::Pending | PluginStatus::Running) {
                    warn!(plugin = %outcome.plugin, activity = %activity, "Plugin timed out");
                    outcome.status = PluginStatus::TimedOut;
                }
                outcome
            })
            .collect();

        ActivityReport {
            activity,
            plugins: results,
            timed_out,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Run one plugin after its prerequisites and record the outcome
async fn run_plugin(
    registered: &RegisteredPlugin,
    ctx: &RunContext,
    waits: Vec<watch::Receiver<bool>>,
    done: watch::Sender<bool>,
    outcomes: &Mutex<HashMap<String, PluginOutcome>>,
) {
    let name = registered.name();

    for mut wait in waits {
        // A dropped sender means the prerequisite can no longer finish
        let _ = wait.wait_for(|finished| *finished).await;
    }

    record(outcomes, name, PluginStatus::Running, 0);
    let started = Instant::now();

    let result = {
        let mut plugin = registered.plugin.lock().await;
        AssertUnwindSafe(plugin.run(ctx)).catch_unwind().await
    };

    let status = match result {
        Ok(Ok(())) => {
            debug!(plugin = %name, "Plugin finished");
            PluginStatus::Completed
        }
        Ok(Err(e)) => {
            warn!(plugin = %name, error = %e, "Plugin failed");
            PluginStatus::Failed {
                error: format!("{:#}", e),
            }
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(plugin = %name, panic = %message, "Plugin panicked");
            PluginStatus::Failed { error: message }
        }
    };

    record(outcomes, name, status, started.elapsed().as_millis() as u64);
    let _ = done.send(true);
}

fn record(
    outcomes: &Mutex<HashMap<String, PluginOutcome>>,
    plugin: &str,
    status: PluginStatus,
    duration_ms: u64,
) {
    let mut outcomes = outcomes.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(outcome) = outcomes.get_mut(plugin) {
        outcome.status = status;
        outcome.duration_ms = duration_ms;
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
