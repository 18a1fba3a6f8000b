//! Events carried by the build event bus.

use std::path::PathBuf;

use super::activity::Activity;

/// A message published on the event bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Configuration has been merged
    Config,

    /// Every plugin finished its configure phase; configuration is frozen
    PluginsConfigured,

    /// A file under a watched root changed
    FileChanged { path: PathBuf, root: PathBuf },

    /// All plugins of an activity finished
    ActivityCompleted { cycle: u64, activity: Activity },

    /// A full pipeline cycle finished
    BuildDone { cycle: u64 },

    /// Fatal stop request
    AllStop { exit_code: i32 },
}

impl BuildEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BuildEvent::Config => EventKind::Config,
            BuildEvent::PluginsConfigured => EventKind::PluginsConfigured,
            BuildEvent::FileChanged { .. } => EventKind::FileChanged,
            BuildEvent::ActivityCompleted { .. } => EventKind::ActivityCompleted,
            BuildEvent::BuildDone { .. } => EventKind::BuildDone,
            BuildEvent::AllStop { .. } => EventKind::AllStop,
        }
    }
}

/// Discriminant used to register handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Config,
    PluginsConfigured,
    FileChanged,
    ActivityCompleted,
    BuildDone,
    AllStop,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Config => "config",
            EventKind::PluginsConfigured => "plugins.configured",
            EventKind::FileChanged => "file.changed",
            EventKind::ActivityCompleted => "activity.completed",
            EventKind::BuildDone => "build.done",
            EventKind::AllStop => "all.stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_mapping() {
        let event = BuildEvent::FileChanged {
            path: PathBuf::from("/p/src/a.js"),
            root: PathBuf::from("/p/src"),
        };
        assert_eq!(event.kind(), EventKind::FileChanged);
        assert_eq!(event.kind().as_str(), "file.changed");
        assert_eq!(BuildEvent::AllStop { exit_code: -1 }.kind().as_str(), "all.stop");
    }
}
