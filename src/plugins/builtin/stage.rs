//! Stage plugin (pull): mirror source files into the working tree.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::scheduler::parallel;
use crate::domain::{Activity, FileRecord};
use crate::plugins::{Plugin, PluginDescriptor, RunContext};

pub const NAME: &str = "stage";

pub struct Stage {
    descriptor: PluginDescriptor,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage {
    pub fn new() -> Self {
        Self {
            descriptor: PluginDescriptor::new(NAME, Activity::Pull),
        }
    }
}

#[async_trait]
impl Plugin for Stage {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    async fn run(&mut self, ctx: &RunContext) -> Result<()> {
        let fs = &ctx.fs;

        // Stale copies from the previous cycle must not survive
        fs.delete(&ctx.config.working)
            .await
            .context("Failed to clear working tree")?;

        let files = ctx.project().await.files.clone();
        let total = files.len();
        let results = parallel(files, None, |file: FileRecord| async move {
            fs.copy(&file.full_path, file.working_file()).await
        })
        .await;

        let failures: Vec<_> = results.into_iter().filter_map(Result::err).collect();
        for failure in &failures {
            warn!(error = %failure, "Failed to stage file");
        }
        if !failures.is_empty() {
            anyhow::bail!("{} of {} files failed to stage", failures.len(), total);
        }

        debug!(files = total, "Staged source files");
        Ok(())
    }
}
