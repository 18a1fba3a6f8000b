//! Built-in plugins.
//!
//! They register through the same contract as any external plugin.

pub mod file_loader;
pub mod replace;
pub mod stage;

pub use file_loader::{FileLoader, LoaderState, LoaderTrigger};
pub use replace::Replace;
pub use stage::Stage;

use super::registry::{PluginError, PluginRegistry};

/// A registry holding the built-in plugins
pub fn builtin_registry() -> Result<PluginRegistry, PluginError> {
    let mut registry = PluginRegistry::new();
    registry.register(FileLoader::new())?;
    registry.register(Stage::new())?;
    registry.register(Replace::new())?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Activity;

    #[test]
    fn test_builtins_cover_their_activities() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.names(), vec!["fileLoader", "stage", "replace"]);
        assert_eq!(registry.for_activity(Activity::Identify).len(), 1);
        assert_eq!(registry.for_activity(Activity::PreProcess).len(), 1);
        assert!(registry.validate(&Activity::default_order()).is_ok());

        let flags: Vec<String> = registry
            .commander_options()
            .into_iter()
            .map(|o| o.flags)
            .collect();
        assert_eq!(flags, vec!["--ci", "--values [value]"]);
    }
}
