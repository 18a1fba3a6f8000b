//! Plugin registry.
//!
//! Holds every plugin in registration order, groups them by activity, and
//! checks prerequisite edges before the first cycle.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::cli::options::CommanderOption;
use crate::domain::Activity;

use super::{Plugin, PluginDescriptor};

/// Registry and prerequisite errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PluginError {
    #[error("A plugin named '{0}' is already registered")]
    DuplicateName(String),

    #[error("Plugin '{plugin}' requires '{prerequisite}', which runs in a later activity")]
    PrerequisiteOrder {
        plugin: String,
        prerequisite: String,
    },

    #[error("Prerequisite cycle: {}", .0.join(" -> "))]
    PrerequisiteCycle(Vec<String>),
}

/// A plugin together with a snapshot of its descriptor
pub struct RegisteredPlugin {
    pub descriptor: PluginDescriptor,
    pub plugin: Mutex<Box<dyn Plugin>>,
}

impl RegisteredPlugin {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) -> Result<(), PluginError> {
        self.register_boxed(Box::new(plugin))
    }

    pub fn register_boxed(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        let descriptor = plugin.descriptor().clone();
        if self.get(&descriptor.name).is_some() {
            return Err(PluginError::DuplicateName(descriptor.name));
        }
        self.plugins.push(RegisteredPlugin {
            descriptor,
            plugin: Mutex::new(plugin),
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredPlugin> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    /// Plugins of one activity, in registration order
    pub fn for_activity(&self, activity: Activity) -> Vec<&RegisteredPlugin> {
        self.plugins
            .iter()
            .filter(|p| p.descriptor.activity == activity)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.plugins.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(RegisteredPlugin::name).collect()
    }

    /// Every plugin's command-line options
    pub fn commander_options(&self) -> Vec<CommanderOption> {
        self.plugins
            .iter()
            .flat_map(|p| p.descriptor.commander.iter().cloned())
            .collect()
    }

    /// Directories any plugin asks to prune, in registration order
    pub fn excluded(&self) -> Vec<&str> {
        let mut excluded: Vec<&str> = Vec::new();
        for entry in self.plugins.iter().flat_map(|p| &p.descriptor.excluded) {
            if !excluded.contains(&entry.as_str()) {
                excluded.push(entry);
            }
        }
        excluded
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Check prerequisites against an activity order.
    ///
    /// Prerequisites in an earlier activity are satisfied by ordering.
    /// Unknown names and plugins whose activity is not in `order` are only
    /// warned about.
    pub fn validate(&self, order: &[Activity]) -> Result<(), PluginError> {
        let position: HashMap<Activity, usize> =
            order.iter().enumerate().map(|(i, a)| (*a, i)).collect();

        for registered in &self.plugins {
            let descriptor = &registered.descriptor;
            let Some(own) = position.get(&descriptor.activity) else {
                warn!(
                    plugin = %descriptor.name,
                    activity = %descriptor.activity,
                    "Plugin activity is not in the activity order; it will never run"
                );
                continue;
            };

            for prerequisite in &descriptor.prerequisites {
                let Some(other) = self.get(prerequisite) else {
                    warn!(
                        plugin = %descriptor.name,
                        prerequisite = %prerequisite,
                        "Ignoring unknown prerequisite"
                    );
                    continue;
                };

                let later = match position.get(&other.descriptor.activity) {
                    Some(theirs) => theirs > own,
                    None => true,
                };
                if later {
                    return Err(PluginError::PrerequisiteOrder {
                        plugin: descriptor.name.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }

        for activity in order {
            self.check_cycles(*activity)?;
        }

        Ok(())
    }

    /// Same-activity prerequisite names of a plugin
    pub fn local_prerequisites<'a>(&'a self, plugin: &'a PluginDescriptor) -> Vec<&'a str> {
        plugin
            .prerequisites
            .iter()
            .filter(|name| {
                self.get(name)
                    .is_some_and(|p| p.descriptor.activity == plugin.activity)
            })
            .map(String::as_str)
            .collect()
    }

    fn check_cycles(&self, activity: Activity) -> Result<(), PluginError> {
        let mut done: HashSet<&str> = HashSet::new();

        for start in self.for_activity(activity) {
            let mut path: Vec<&str> = Vec::new();
            self.visit(start.name(), &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), PluginError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(at) = path.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = path[at..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(PluginError::PrerequisiteCycle(cycle));
        }

        let Some(registered) = self.get(name) else {
            return Ok(());
        };

        path.push(name);
        for next in self.local_prerequisites(&registered.descriptor) {
            self.visit(next, path, done)?;
        }
        path.pop();
        done.insert(name);
        Ok(())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::RunContext;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Noop(PluginDescriptor);

    #[async_trait]
    impl Plugin for Noop {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.0
        }

        async fn run(&mut self, _ctx: &RunContext) -> Result<()> {
            Ok(())
        }
    }

    fn plugin(name: &str, activity: Activity, prerequisites: &[&str]) -> Noop {
        Noop(
            PluginDescriptor::new(name, activity)
                .with_prerequisites(prerequisites.iter().copied()),
        )
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin("a", Activity::Compile, &[])).unwrap();
        let err = registry
            .register(plugin("a", Activity::Test, &[]))
            .unwrap_err();
        assert_eq!(err, PluginError::DuplicateName("a".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_grouping_keeps_registration_order() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin("b", Activity::Compile, &[])).unwrap();
        registry.register(plugin("x", Activity::Pull, &[])).unwrap();
        registry.register(plugin("a", Activity::Compile, &[])).unwrap();

        let names: Vec<&str> = registry
            .for_activity(Activity::Compile)
            .into_iter()
            .map(RegisteredPlugin::name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(registry.for_activity(Activity::Test).is_empty());
    }

    #[test]
    fn test_prerequisite_rules() {
        let order = Activity::default_order();

        let mut earlier = PluginRegistry::new();
        earlier.register(plugin("load", Activity::Identify, &[])).unwrap();
        earlier
            .register(plugin("tsc", Activity::Compile, &["load", "missing"]))
            .unwrap();
        assert!(earlier.validate(&order).is_ok());

        let mut later = PluginRegistry::new();
        later.register(plugin("tsc", Activity::Compile, &["mocha"])).unwrap();
        later.register(plugin("mocha", Activity::Test, &[])).unwrap();
        assert!(matches!(
            later.validate(&order),
            Err(PluginError::PrerequisiteOrder { .. })
        ));
    }

    #[test]
    fn test_prerequisite_cycle_detected() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin("a", Activity::Compile, &["b"])).unwrap();
        registry.register(plugin("b", Activity::Compile, &["c"])).unwrap();
        registry.register(plugin("c", Activity::Compile, &["a"])).unwrap();

        match registry.validate(&Activity::default_order()) {
            Err(PluginError::PrerequisiteCycle(cycle)) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_local_prerequisites_skip_other_activities() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin("load", Activity::Identify, &[])).unwrap();
        registry.register(plugin("tsc", Activity::Compile, &[])).unwrap();
        registry
            .register(plugin("lint", Activity::Compile, &["tsc", "load", "ghost"]))
            .unwrap();

        let lint = &registry.get("lint").unwrap().descriptor;
        assert_eq!(registry.local_prerequisites(lint), vec!["tsc"]);
    }

    #[test]
    fn test_excluded_is_the_union_of_every_descriptor() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Noop(
                PluginDescriptor::new("load", Activity::Identify).with_excluded(["node_modules"]),
            ))
            .unwrap();
        registry
            .register(Noop(
                PluginDescriptor::new("tsc", Activity::Compile)
                    .with_excluded(["vendor", "node_modules"]),
            ))
            .unwrap();
        registry.register(plugin("lint", Activity::Compile, &[])).unwrap();

        assert_eq!(registry.excluded(), vec!["node_modules", "vendor"]);
    }
}
