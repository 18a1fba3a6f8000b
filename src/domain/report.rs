//! Cycle reports.
//!
//! A CycleReport records what every plugin did during one pass through the
//! activity order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::activity::Activity;

/// Status of a plugin within one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PluginStatus {
    /// Waiting on prerequisites
    Pending,

    /// Currently executing
    Running,

    /// Finished without error
    Completed,

    /// Finished with an error (or panicked)
    Failed { error: String },

    /// Still running when the activity timeout elapsed
    TimedOut,
}

impl Default for PluginStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Outcome of a single plugin run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOutcome {
    pub plugin: String,
    pub status: PluginStatus,
    pub duration_ms: u64,
}

impl PluginOutcome {
    pub fn pending(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            status: PluginStatus::Pending,
            duration_ms: 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            PluginStatus::Failed { .. } | PluginStatus::TimedOut
        )
    }
}

/// Outcome of one activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityReport {
    pub activity: Activity,
    pub plugins: Vec<PluginOutcome>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

/// Outcome of one pipeline cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Activities that had at least one plugin, in execution order
    pub activities: Vec<ActivityReport>,
}

impl CycleReport {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            started_at: Utc::now(),
            completed_at: None,
            activities: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn activity(&self, activity: Activity) -> Option<&ActivityReport> {
        self.activities.iter().find(|a| a.activity == activity)
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginOutcome> {
        self.activities
            .iter()
            .flat_map(|a| a.plugins.iter())
            .find(|p| p.plugin == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PluginOutcome> {
        self.activities
            .iter()
            .flat_map(|a| a.plugins.iter())
            .filter(|p| p.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// How a build (one or more cycles) ended
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// A non-continuous build finished its single cycle
    Completed(CycleReport),

    /// A stop was requested; carries the last finished cycle, if any
    Stopped {
        exit_code: i32,
        last: Option<CycleReport>,
    },
}

impl BuildOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildOutcome::Completed(report) if report.is_success() => 0,
            BuildOutcome::Completed(_) => 1,
            BuildOutcome::Stopped { exit_code, .. } => *exit_code,
        }
    }
}
