//! Core orchestration logic.
//!
//! This module contains:
//! - Scheduler: fan-out / fan-in join primitives
//! - EventBus: typed publish/subscribe
//! - ActivityPipeline: one pass through the activity order
//! - Orchestrator: configuration, cycles, and the watch loop

pub mod bus;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;

// Re-export commonly used types
pub use bus::EventBus;
pub use orchestrator::{Orchestrator, CONFIG_ERROR_EXIT};
pub use pipeline::ActivityPipeline;
pub use scheduler::{mapped, parallel};
