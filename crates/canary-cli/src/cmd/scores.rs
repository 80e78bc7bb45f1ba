use crate::output::{print_json, print_table};
use canary_core::score::ScoreBoard;
use std::path::Path;

pub fn run(root: &Path, limit: Option<usize>, tag: Option<&str>, json: bool) -> anyhow::Result<()> {
    let (config, engine) = super::open_engine(root)?;
    let limit = limit.unwrap_or(config.trial.default_limit);

    let snapshot = engine.snapshot();
    let mut scores = ScoreBoard::default().scores(&snapshot, usize::MAX);
    if let Some(tag) = tag {
        scores.retain(|s| s.tag.as_deref() == Some(tag));
    }
    scores.truncate(limit);

    if json {
        return print_json(&scores);
    }
    if scores.is_empty() {
        println!("No resolved trials yet.");
        return Ok(());
    }
    let rows = scores
        .iter()
        .map(|s| {
            vec![
                s.action_template.clone(),
                s.tag.clone().unwrap_or_else(|| "-".to_string()),
                s.survived_count.to_string(),
                s.failed_count.to_string(),
                format!("{:.0}%", s.survival_rate * 100.0),
            ]
        })
        .collect();
    print_table(&["TEMPLATE", "TAG", "SURVIVED", "FAILED", "RATE"], rows);
    Ok(())
}
