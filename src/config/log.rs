//! Log verbosity toggles.
//!
//! The toggles map onto a `tracing` filter: a base level for ordinary lines
//! plus one directive per category target.

use serde::{Deserialize, Serialize};

/// Tracing targets for the log categories
pub mod targets {
    /// Discovery and change notifications ("found 3 files")
    pub const EVENT: &str = "kiln::event";
    /// Activity start lines
    pub const STEP: &str = "kiln::step";
    /// Activity and cycle completion lines
    pub const COMPLETE: &str = "kiln::complete";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub debug: bool,
    pub event: bool,
    pub step: bool,
    pub complete: bool,
    pub warning: bool,
    pub error: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            event: true,
            step: true,
            complete: true,
            warning: false,
            error: true,
        }
    }
}

impl LogConfig {
    /// An `EnvFilter` directive string for these toggles.
    ///
    /// Category lines are gated by their own toggle. Everything else is
    /// gated by level: `debug` shows all of it, then `warning`, then
    /// `error`.
    pub fn filter_directives(&self) -> String {
        let level = if self.debug {
            "debug"
        } else if self.warning {
            "warn"
        } else if self.error {
            "error"
        } else {
            "off"
        };

        let mut directives = vec![level.to_string()];
        for (enabled, target) in [
            (self.event, targets::EVENT),
            (self.step, targets::STEP),
            (self.complete, targets::COMPLETE),
        ] {
            let category = if enabled { "info" } else { "off" };
            directives.push(format!("{}={}", target, category));
        }
        directives.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            LogConfig::default().filter_directives(),
            "error,kiln::event=info,kiln::step=info,kiln::complete=info"
        );
    }

    #[test]
    fn test_warning_toggle_controls_warn_lines() {
        let log = LogConfig {
            event: false,
            ..Default::default()
        };
        assert_eq!(
            log.filter_directives(),
            "error,kiln::event=off,kiln::step=info,kiln::complete=info"
        );

        let log = LogConfig {
            warning: true,
            ..Default::default()
        };
        assert!(log.filter_directives().starts_with("warn,"));
    }

    #[test]
    fn test_debug_and_silence() {
        let log = LogConfig {
            debug: true,
            ..Default::default()
        };
        assert!(log.filter_directives().starts_with("debug,"));

        let silent = LogConfig {
            debug: false,
            event: false,
            step: false,
            complete: false,
            warning: false,
            error: false,
        };
        assert_eq!(
            silent.filter_directives(),
            "off,kiln::event=off,kiln::step=off,kiln::complete=off"
        );
    }
}
