use crate::output::print_json;
use canary_core::commit::CommitController;
use canary_core::config::Config;
use canary_core::types::{Decision, RiskAssessment, RiskTier, Task};
use clap::Subcommand;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum CommitSubcommand {
    /// Decide whether a task runs now, waits for confirmation, or is blocked
    Decide {
        /// Task identifier
        #[arg(long = "task")]
        task_id: String,
        /// Risk tier declared on the task (low, medium, high, critical)
        #[arg(long, default_value = "low")]
        task_tier: RiskTier,
        /// Risk tier from the risk scorer
        #[arg(long)]
        risk_tier: RiskTier,
        /// Numeric risk score, echoed into the justification
        #[arg(long)]
        risk_score: Option<f64>,
        /// Reason reported by the risk scorer (repeatable)
        #[arg(long = "reason")]
        reasons: Vec<String>,
        /// Decision engine confidence, 0.0 to 1.0
        #[arg(long)]
        confidence: f64,
        /// The decision engine left an ambiguity unresolved
        #[arg(long)]
        needs_clarification: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: CommitSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CommitSubcommand::Decide {
            task_id,
            task_tier,
            risk_tier,
            risk_score,
            reasons,
            confidence,
            needs_clarification,
        } => {
            let config = Config::load_or_default(root)?;
            let controller = CommitController::new(config.commit);
            let task = Task::new(task_id, task_tier);
            let risk = RiskAssessment {
                tier: risk_tier,
                score: risk_score,
                reasons,
            };
            let decision = Decision {
                confidence,
                needs_clarification,
            };
            let commit = controller.determine_commit(&task, &risk, &decision);

            if json {
                return print_json(&commit);
            }
            println!("{}: {}", commit.task_id, commit.state);
            if let Some(secs) = commit.countdown_seconds {
                println!("  auto-executes in {secs}s");
            } else if commit.requires_confirmation {
                println!("  waiting for operator confirmation");
            }
            println!("  {}", commit.justification);
            Ok(())
        }
    }
}
