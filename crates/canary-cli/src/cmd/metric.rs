use crate::output::{print_json, print_table};
use canary_core::config::{Config, MetricsConfig};
use canary_core::metric::FileMetrics;
use canary_core::paths;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum MetricSubcommand {
    /// Record the current value of a metric in .canary/metrics.yaml
    Set {
        name: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// List recorded metric values
    List,
}

pub fn run(root: &Path, subcmd: MetricSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root)?;
    if let MetricsConfig::Http { base_url, .. } = &config.metrics {
        anyhow::bail!("metrics are served by {base_url}; local metric values are only used with the file source");
    }
    let metrics = FileMetrics::new(paths::metrics_path(root));

    match subcmd {
        MetricSubcommand::Set { name, value } => {
            metrics.set(&name, value)?;
            if json {
                return print_json(&serde_json::json!({ "name": name, "value": value }));
            }
            println!("{name} = {value}");
        }
        MetricSubcommand::List => {
            let values = metrics.load()?;
            if json {
                return print_json(&values);
            }
            if values.is_empty() {
                println!("No metric values recorded.");
                return Ok(());
            }
            let rows = values
                .into_iter()
                .map(|(name, value)| vec![name, value.to_string()])
                .collect();
            print_table(&["METRIC", "VALUE"], rows);
        }
    }
    Ok(())
}
