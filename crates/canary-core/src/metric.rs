//! Metric sources for trial before/after measurements.
//!
//! A resolver must be safe to call twice for the same metric without side
//! effects on the measured system. Lookups may block on disk or network;
//! the trial engine never holds its state lock across a call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;

use crate::config::MetricsConfig;
use crate::error::{CanaryError, Result};
use crate::{io, paths};

pub trait MetricResolver: Send + Sync {
    fn resolve(&self, metric: &str) -> Result<f64>;
}

fn finite(metric: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CanaryError::metric(metric, format!("non-finite value {value}")))
    }
}

/// Build the resolver a project's config asks for.
pub fn from_config(root: &Path, config: &MetricsConfig) -> Result<Arc<dyn MetricResolver>> {
    match config {
        MetricsConfig::File => Ok(Arc::new(FileMetrics::new(paths::metrics_path(root)))),
        MetricsConfig::Http {
            base_url,
            timeout_secs,
        } => Ok(Arc::new(HttpMetrics::new(
            base_url.clone(),
            Duration::from_secs(*timeout_secs),
        )?)),
    }
}

// ---------------------------------------------------------------------------
// StaticMetrics
// ---------------------------------------------------------------------------

/// In-memory metric values, set by the host.
#[derive(Debug, Default)]
pub struct StaticMetrics {
    values: RwLock<BTreeMap<String, f64>>,
}

impl StaticMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, metric: impl Into<String>, value: f64) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(metric.into(), value);
    }

    pub fn remove(&self, metric: &str) {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(metric);
    }
}

impl MetricResolver for StaticMetrics {
    fn resolve(&self, metric: &str) -> Result<f64> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        let value = values
            .get(metric)
            .copied()
            .ok_or_else(|| CanaryError::metric(metric, "no value recorded"))?;
        finite(metric, value)
    }
}

// ---------------------------------------------------------------------------
// FileMetrics
// ---------------------------------------------------------------------------

/// Metric values kept in a YAML map (`name: value`). The file is re-read on
/// every lookup so external writers are picked up without a restart.
#[derive(Debug, Clone)]
pub struct FileMetrics {
    path: PathBuf,
}

impl FileMetrics {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<BTreeMap<String, f64>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn set(&self, metric: &str, value: f64) -> Result<()> {
        finite(metric, value)?;
        let mut values = self.load()?;
        values.insert(metric.to_string(), value);
        let content = serde_yaml::to_string(&values)?;
        io::atomic_write(&self.path, content.as_bytes())
    }
}

impl MetricResolver for FileMetrics {
    fn resolve(&self, metric: &str) -> Result<f64> {
        let values = self
            .load()
            .map_err(|e| CanaryError::metric(metric, e.to_string()))?;
        let value = values.get(metric).copied().ok_or_else(|| {
            CanaryError::metric(
                metric,
                format!("not present in {}", self.path.display()),
            )
        })?;
        finite(metric, value)
    }
}

// ---------------------------------------------------------------------------
// HttpMetrics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MetricBody {
    value: f64,
}

/// Metric values served over HTTP: `GET {base_url}/{metric}` must answer
/// `{"value": <number>}`.
pub struct HttpMetrics {
    base_url: reqwest::Url,
    client: reqwest::blocking::Client,
}

impl HttpMetrics {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = reqwest::Url::parse(base_url.trim())
            .map_err(|e| CanaryError::validation(format!("metrics base_url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CanaryError::validation(format!(
                "metrics base_url '{base_url}' cannot carry a path"
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| CanaryError::validation(format!("metrics http client: {e}")))?;
        Ok(Self { base_url, client })
    }

    /// `{base_url}/{metric}` with the metric name percent-encoded as a single
    /// path segment.
    fn url_for(&self, metric: &str) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CanaryError::metric(metric, "metrics base_url cannot carry a path"))?
            .pop_if_empty()
            .push(metric);
        Ok(url)
    }
}

impl MetricResolver for HttpMetrics {
    fn resolve(&self, metric: &str) -> Result<f64> {
        let url = self.url_for(metric)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| CanaryError::metric(metric, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CanaryError::metric(metric, format!("GET {url} returned {status}")));
        }
        let body: MetricBody = response
            .json()
            .map_err(|e| CanaryError::metric(metric, format!("malformed body: {e}")))?;
        finite(metric, body.value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn static_metrics_resolve_and_miss() {
        let m = StaticMetrics::new();
        m.set("latency_ms", 120.0);
        assert_eq!(m.resolve("latency_ms").unwrap(), 120.0);
        let err = m.resolve("missing").unwrap_err();
        assert!(matches!(err, CanaryError::MetricUnavailable { .. }));
        m.remove("latency_ms");
        assert!(m.resolve("latency_ms").is_err());
    }

    #[test]
    fn static_metrics_reject_nan() {
        let m = StaticMetrics::new();
        m.set("broken", f64::NAN);
        assert!(m.resolve("broken").is_err());
    }

    #[test]
    fn file_metrics_set_and_resolve() {
        let dir = TempDir::new().unwrap();
        let m = FileMetrics::new(dir.path().join(".canary/metrics.yaml"));
        assert!(m.load().unwrap().is_empty());

        m.set("error_rate", 0.02).unwrap();
        m.set("p99_ms", 350.0).unwrap();
        assert_eq!(m.resolve("error_rate").unwrap(), 0.02);
        assert_eq!(m.load().unwrap().len(), 2);

        let err = m.resolve("cpu").unwrap_err();
        assert!(err.to_string().contains("cpu"));
    }

    #[test]
    fn file_metrics_pick_up_external_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.yaml");
        std::fs::write(&path, "queue_depth: 4\n").unwrap();
        let m = FileMetrics::new(&path);
        assert_eq!(m.resolve("queue_depth").unwrap(), 4.0);
        std::fs::write(&path, "queue_depth: 9\n").unwrap();
        assert_eq!(m.resolve("queue_depth").unwrap(), 9.0);
    }

    #[test]
    fn http_metrics_reads_value() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/metrics/hit_rate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value": 0.93}"#)
            .create();

        let m = HttpMetrics::new(format!("{}/metrics/", server.url()), Duration::from_secs(5))
            .unwrap();
        assert_eq!(m.resolve("hit_rate").unwrap(), 0.93);
        mock.assert();
    }

    #[test]
    fn http_metrics_maps_errors_to_unavailable() {
        let mut server = mockito::Server::new();
        let _missing = server.mock("GET", "/gone").with_status(404).create();
        let _garbage = server
            .mock("GET", "/garbled")
            .with_status(200)
            .with_body("not json")
            .create();

        let m = HttpMetrics::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = m.resolve("gone").unwrap_err();
        assert!(matches!(err, CanaryError::MetricUnavailable { .. }));
        assert!(err.to_string().contains("404"));
        assert!(m.resolve("garbled").is_err());
    }

    #[test]
    fn http_metrics_encode_the_name_as_one_segment() {
        let mut server = mockito::Server::new();
        let encoded = server
            .mock("GET", "/metrics/api%2Fp99%3Fwindow=5m%23x")
            .with_status(200)
            .with_body(r#"{"value": 12.5}"#)
            .create();

        let m = HttpMetrics::new(format!("{}/metrics/", server.url()), Duration::from_secs(5))
            .unwrap();
        assert_eq!(m.resolve("api/p99?window=5m#x").unwrap(), 12.5);
        encoded.assert();
    }

    #[test]
    fn http_metrics_reject_unusable_base_url() {
        assert!(HttpMetrics::new("", Duration::from_secs(1)).is_err());
        assert!(HttpMetrics::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn from_config_builds_file_resolver() {
        let dir = TempDir::new().unwrap();
        FileMetrics::new(paths::metrics_path(dir.path()))
            .set("uptime", 1.0)
            .unwrap();
        let resolver = from_config(dir.path(), &MetricsConfig::File).unwrap();
        assert_eq!(resolver.resolve("uptime").unwrap(), 1.0);
    }
}
