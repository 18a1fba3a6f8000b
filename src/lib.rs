//! kiln - Pluggable build orchestrator
//!
//! Runs a fixed sequence of build activities (identify, pull, combine,
//! pre-process, compile, post-process, push, test), dispatching each to the
//! plugins registered for it, and optionally rebuilds as source files
//! change.
//!
//! # Architecture
//!
//! - Plugins run concurrently within an activity; activities run in order
//! - Every cycle starts from a fresh project state
//! - Components talk through an explicit event bus
//!
//! # Modules
//!
//! - `cli`: Command-line interface and plugin options
//! - `config`: Layered configuration
//! - `core`: Scheduler, event bus, activity pipeline, orchestrator
//! - `domain`: Data structures (Activity, FileRecord, CycleReport)
//! - `fs`: Path resolution, crawling, file operations, watching
//! - `plugins`: Plugin contract, registry, built-in plugins
//!
//! # Usage
//!
//! ```bash
//! # Build once with ./build.json
//! kiln
//!
//! # Build with ./release.json and keep rebuilding on changes
//! kiln -b release --ci
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod fs;
pub mod plugins;

// Re-export main types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{EventBus, Orchestrator};
pub use domain::{Activity, BuildEvent, BuildOutcome, CycleReport, FileRecord, ProjectState};
pub use fs::{FileSystem, FsError, PathResolver};
pub use plugins::{Plugin, PluginDescriptor, PluginRegistry, RunContext};
