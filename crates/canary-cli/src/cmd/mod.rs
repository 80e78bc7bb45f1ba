pub mod commit;
pub mod config;
pub mod init;
pub mod metric;
pub mod scores;
pub mod serve;
pub mod trial;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use canary_core::clock::SystemClock;
use canary_core::config::Config;
use canary_core::trial::TrialEngine;

/// Open the trial engine for an initialized project.
pub(crate) fn open_engine(root: &Path) -> anyhow::Result<(Config, TrialEngine)> {
    let config = Config::load_checked(root)?;
    let engine = TrialEngine::open_project(root, &config, Arc::new(SystemClock))
        .context("failed to open trial database")?;
    Ok((config, engine))
}
