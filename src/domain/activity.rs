//! The fixed build activity sequence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named phase of the build that plugins register against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Activity {
    Identify,
    Pull,
    Combine,
    PreProcess,
    Compile,
    PostProcess,
    Push,
    Test,
}

impl Activity {
    /// Default activity order
    pub const ORDER: [Activity; 8] = [
        Activity::Identify,
        Activity::Pull,
        Activity::Combine,
        Activity::PreProcess,
        Activity::Compile,
        Activity::PostProcess,
        Activity::Push,
        Activity::Test,
    ];

    pub fn default_order() -> Vec<Activity> {
        Self::ORDER.to_vec()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Identify => "identify",
            Activity::Pull => "pull",
            Activity::Combine => "combine",
            Activity::PreProcess => "pre-process",
            Activity::Compile => "compile",
            Activity::PostProcess => "post-process",
            Activity::Push => "push",
            Activity::Test => "test",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown activity: {0}")]
pub struct UnknownActivity(pub String);

impl FromStr for Activity {
    type Err = UnknownActivity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ORDER
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownActivity(s.to_string()))
    }
}
