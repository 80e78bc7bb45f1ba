use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use canary_core::clock::{Clock, SystemClock};
use canary_core::commit::CommitController;
use canary_core::config::Config;
use canary_core::queue::PendingActionQueue;
use canary_core::score::ScoreBoard;
use canary_core::trial::TrialEngine;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub controller: Arc<CommitController>,
    pub queue: Arc<Mutex<PendingActionQueue>>,
    pub trials: Arc<TrialEngine>,
    pub scores: Arc<ScoreBoard>,
}

impl AppState {
    /// Load config and open the trial database under `root`.
    ///
    /// Blocking: builds the metric resolver, which may own a blocking HTTP
    /// client. Call it outside the async runtime or on `spawn_blocking`.
    pub fn open(root: PathBuf) -> canary_core::Result<Self> {
        let config = Config::load_checked(&root)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let trials = TrialEngine::open_project(&root, &config, clock.clone())?;
        Ok(Self::from_parts(root, config, trials, clock))
    }

    /// Assemble state from ready-made parts. Tests inject a manual clock and
    /// static metrics this way.
    pub fn from_parts(
        root: PathBuf,
        config: Config,
        trials: TrialEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root,
            controller: Arc::new(CommitController::new(config.commit.clone())),
            queue: Arc::new(Mutex::new(PendingActionQueue::new(clock))),
            trials: Arc::new(trials),
            scores: Arc::new(ScoreBoard::default()),
            config: Arc::new(config),
        }
    }

    /// Lock the action queue. A poisoned lock is recovered: queue methods
    /// validate before they mutate, so a panic cannot leave it half-updated.
    pub fn queue(&self) -> MutexGuard<'_, PendingActionQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}
