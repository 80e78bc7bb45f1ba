use anyhow::Context;
use canary_core::config::{Config, WarnLevel};
use canary_core::trial::TrialDb;
use canary_core::{io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing canary in: {}", root.display());

    let dir = paths::canary_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        let config = Config::load(root).context("failed to read existing config.yaml")?;
        for warning in config.validate() {
            let label = match warning.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            println!("  {label}: {}", warning.message);
        }
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let metrics_path = paths::metrics_path(root);
    if io::write_if_missing(&metrics_path, b"{}\n")? {
        println!("  created: {}", paths::METRICS_FILE);
    } else {
        println!("  exists:  {}", paths::METRICS_FILE);
    }

    let db_path = paths::db_path(root);
    let existed = db_path.exists();
    TrialDb::open(&db_path).context("failed to create trial database")?;
    if existed {
        println!("  exists:  {}", paths::DB_FILE);
    } else {
        println!("  created: {}", paths::DB_FILE);
    }

    Ok(())
}
