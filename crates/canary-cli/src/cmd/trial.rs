use crate::output::{print_json, print_table, short_time};
use anyhow::Context;
use canary_core::trial::{InboxTab, NewTrial, Trial};
use canary_core::types::MetricDirection;
use clap::Subcommand;
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum TrialSubcommand {
    /// Record a baseline and schedule a survival check for a change
    Create {
        /// What was changed
        #[arg(long)]
        action: String,
        /// Where it was changed (service, cluster, ...)
        #[arg(long)]
        context: String,
        /// Metric to compare before and after
        #[arg(long)]
        metric: String,
        /// higher_is_better or lower_is_better
        #[arg(long, default_value = "higher_is_better")]
        direction: MetricDirection,
        /// Seconds to wait before checking the metric again
        #[arg(long = "check-after", allow_negative_numbers = true)]
        check_after_sec: i64,
        /// Minimum improvement required to survive
        #[arg(long, allow_negative_numbers = true)]
        expected_delta: Option<f64>,
        /// Tag for score grouping (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Initial note
        #[arg(long)]
        note: Option<String>,
        /// Who applied the change
        #[arg(long = "by")]
        created_by: Option<String>,
    },

    /// Show trials grouped by what they need from an operator
    Inbox {
        /// pending, needs_review or completed
        #[arg(long, default_value = "pending")]
        tab: InboxTab,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show a trial with its audit trail
    Show { id: String },

    /// Mark a resolved trial's change as reverted
    Revert { id: String },

    /// Attach a note to a trial
    Note { id: String, text: String },

    /// Start a new trial of the same change against a fresh baseline
    Followup {
        id: String,
        #[arg(long = "check-after", allow_negative_numbers = true)]
        check_after_sec: Option<i64>,
    },

    /// Resolve every trial that is due now
    Check,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: TrialSubcommand, json: bool) -> anyhow::Result<()> {
    let (config, engine) = super::open_engine(root)?;

    match subcmd {
        TrialSubcommand::Create {
            action,
            context,
            metric,
            direction,
            check_after_sec,
            expected_delta,
            tags,
            note,
            created_by,
        } => {
            let input = NewTrial {
                action,
                context,
                metric_name: metric,
                direction,
                check_after_sec,
                expected_delta,
                tags,
                notes: note,
                created_by,
            };
            let trial = engine.create(input)?;
            if json {
                return print_json(&trial);
            }
            println!("Trial created: {}", trial.id);
            println!(
                "  {} = {} ({}), check at {}",
                trial.metric_name,
                trial.metric_before,
                trial.direction,
                short_time(trial.check_at)
            );
        }

        TrialSubcommand::Inbox { tab, limit } => {
            let inbox = engine.inbox(tab, limit.unwrap_or(config.trial.default_limit));
            if json {
                return print_json(&inbox);
            }
            let c = inbox.counts;
            println!(
                "pending: {} ({} due)  needs_review: {}  completed: {}",
                c.pending, c.due, c.needs_review, c.completed
            );
            if c.stalled > 0 {
                println!("warning: {} pending trial(s) keep failing metric lookups", c.stalled);
            }
            if inbox.items.is_empty() {
                println!("\nNo trials in {}.", inbox.tab);
                return Ok(());
            }
            println!();
            let rows = inbox
                .items
                .iter()
                .map(|item| {
                    let t = &item.trial;
                    let when = match t.checked_at {
                        Some(at) => short_time(at),
                        None if item.due => format!("{} (due)", short_time(t.check_at)),
                        None => short_time(t.check_at),
                    };
                    vec![
                        t.id.to_string(),
                        t.action.clone(),
                        t.metric_name.clone(),
                        outcome(t),
                        when,
                    ]
                })
                .collect();
            print_table(&["ID", "ACTION", "METRIC", "STATUS", "WHEN"], rows);
        }

        TrialSubcommand::Show { id } => {
            let detail = engine.detail(parse_id(&id)?)?;
            if json {
                return print_json(&detail);
            }
            let t = &detail.trial;
            println!("{}  {}", t.id, t.action);
            println!("  context:  {}", t.context);
            println!("  metric:   {} ({})", t.metric_name, t.direction);
            println!("  before:   {}", t.metric_before);
            if let Some(after) = t.metric_after {
                println!("  after:    {after}");
            }
            if let Some(delta) = t.expected_delta {
                println!("  expected: +{delta}");
            }
            println!("  status:   {}", outcome(t));
            if let Some(parent) = t.parent_id {
                println!("  follows:  {parent}");
            }
            if !t.tags.is_empty() {
                let tags: Vec<&str> = t.tags.iter().map(String::as_str).collect();
                println!("  tags:     {}", tags.join(", "));
            }
            if let Some(err) = &t.last_error {
                println!("  last error ({} failures): {err}", t.resolve_failures);
            }
            for note in &t.notes {
                println!("  note:     {note}");
            }
            println!("\nAudit:");
            for entry in &detail.audit {
                println!(
                    "  #{:<4} {}  {:<16} {}",
                    entry.seq,
                    short_time(entry.at),
                    entry.event.as_str(),
                    entry.detail.as_deref().unwrap_or("")
                );
            }
        }

        TrialSubcommand::Revert { id } => {
            let trial = engine.revert(parse_id(&id)?)?;
            if json {
                return print_json(&trial);
            }
            println!("Reverted: {} ({})", trial.id, trial.action);
        }

        TrialSubcommand::Note { id, text } => {
            let trial = engine.note(parse_id(&id)?, &text)?;
            if json {
                return print_json(&trial);
            }
            println!("Note added to {}", trial.id);
        }

        TrialSubcommand::Followup {
            id,
            check_after_sec,
        } => {
            let trial = engine.followup(parse_id(&id)?, check_after_sec)?;
            if json {
                return print_json(&trial);
            }
            println!("Follow-up trial created: {}", trial.id);
            println!(
                "  {} = {}, check at {}",
                trial.metric_name,
                trial.metric_before,
                short_time(trial.check_at)
            );
        }

        TrialSubcommand::Check => {
            let report = engine.check_due()?;
            if json {
                return print_json(&report);
            }
            if report.is_empty() {
                println!("No trials due.");
                return Ok(());
            }
            for t in &report.resolved {
                println!("{}  {}  {}", t.id, outcome(t), t.action);
            }
            for f in &report.failed {
                println!(
                    "{}  lookup failed ({}): {}; retry at {}",
                    f.trial_id,
                    f.failures,
                    f.error,
                    short_time(f.retry_at)
                );
            }
        }
    }
    Ok(())
}

fn parse_id(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid trial id '{raw}'"))
}

fn outcome(t: &Trial) -> String {
    if t.reverted {
        format!("{} (reverted)", t.status())
    } else {
        t.status().to_string()
    }
}
