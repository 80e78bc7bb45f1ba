//! Background trial resolution.

use std::sync::Arc;
use std::time::Duration;

use canary_core::trial::TrialEngine;
use tokio::task::JoinHandle;

/// Run `check_due` every `every`, off the async workers. The first pass
/// happens immediately so trials that came due while the server was down
/// resolve on startup.
pub fn spawn(trials: Arc<TrialEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tick(trials.clone()).await;
            tokio::time::sleep(every).await;
        }
    })
}

pub async fn tick(trials: Arc<TrialEngine>) {
    match tokio::task::spawn_blocking(move || trials.check_due()).await {
        Ok(Ok(report)) if report.is_empty() => {}
        Ok(Ok(report)) => tracing::info!(
            resolved = report.resolved.len(),
            failed = report.failed.len(),
            "trial check finished"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "trial check failed"),
        Err(e) => tracing::error!(error = %e, "trial check task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canary_core::clock::ManualClock;
    use canary_core::config::TrialPolicy;
    use canary_core::metric::StaticMetrics;
    use canary_core::trial::NewTrial;
    use chrono::Utc;

    #[tokio::test]
    async fn tick_resolves_due_trials() {
        let metrics = Arc::new(StaticMetrics::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        metrics.set("error_rate", 0.05);
        let engine = Arc::new(TrialEngine::in_memory(
            metrics.clone(),
            clock.clone(),
            TrialPolicy::default(),
        ));
        let mut input = NewTrial::new("retry idempotent calls", "payments", "error_rate", 30);
        input.direction = canary_core::types::MetricDirection::LowerIsBetter;
        let trial = engine.create(input).unwrap();

        metrics.set("error_rate", 0.01);
        clock.advance_secs(30);
        tick(engine.clone()).await;

        assert_eq!(engine.get(trial.id).unwrap().survived, Some(true));
    }
}
