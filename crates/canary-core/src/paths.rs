use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CANARY_DIR: &str = ".canary";
pub const CONFIG_FILE: &str = ".canary/config.yaml";
pub const METRICS_FILE: &str = ".canary/metrics.yaml";
pub const DB_FILE: &str = ".canary/canary.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn canary_dir(root: &Path) -> PathBuf {
    root.join(CANARY_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn metrics_path(root: &Path) -> PathBuf {
    root.join(METRICS_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_canary_dir() {
        let root = Path::new("/proj");
        assert_eq!(config_path(root), PathBuf::from("/proj/.canary/config.yaml"));
        assert_eq!(metrics_path(root), PathBuf::from("/proj/.canary/metrics.yaml"));
        assert_eq!(db_path(root), PathBuf::from("/proj/.canary/canary.db"));
        assert!(db_path(root).starts_with(canary_dir(root)));
    }
}
