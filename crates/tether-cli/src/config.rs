use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tether_store::StoreConfig;

pub const DEFAULT_ANNOTATION_KEY: &str = "annotations/genes";

/// Experiment settings shared by the `partial` and `ttest` commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub store: StoreConfig,
    /// Partition whose first column is the canonical gene order.
    #[serde(default = "default_annotation_key")]
    pub annotation_key: String,
    #[serde(default)]
    pub ttest: Option<TTestConfig>,
}

/// Which partitions form each side of a two-sample comparison.
///
/// Partition names are resolved under the store's domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TTestConfig {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub result_key: String,
}

fn default_annotation_key() -> String {
    DEFAULT_ANNOTATION_KEY.to_string()
}

impl ExperimentConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.store.validate()?;
        Ok(config)
    }

    pub fn ttest(&self) -> Result<&TTestConfig> {
        let ttest = self
            .ttest
            .as_ref()
            .context("config has no `ttest` section")?;
        if ttest.left.is_empty() || ttest.right.is_empty() {
            anyhow::bail!("ttest needs at least one partition on each side");
        }
        if ttest.result_key.trim().is_empty() {
            anyhow::bail!("ttest result_key must not be empty");
        }
        Ok(ttest)
    }
}
