//! Domain types for the build orchestrator.
//!
//! This module contains the core data structures:
//! - Activity: the fixed build phases
//! - Events: messages carried by the event bus
//! - Project: file records and the per-cycle project snapshot
//! - Report: per-cycle plugin outcomes

pub mod activity;
pub mod events;
pub mod project;
pub mod report;

// Re-export commonly used types
pub use activity::{Activity, UnknownActivity};
pub use events::{BuildEvent, EventKind};
pub use project::{FileRecord, ProjectState};
pub use report::{ActivityReport, BuildOutcome, CycleReport, PluginOutcome, PluginStatus};
