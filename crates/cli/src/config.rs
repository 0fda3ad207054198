//! Configuration file loading.

use anyhow::{Context, Result};
use artguard_core::FrameworkContract;
use artguard_detect::{DetectorConfig, PatternLibrary, SandboxConfig, SignatureSpec};
use artguard_metrics::{MetricsAggregator, MetricsConfig};
use artguard_monitor::{sinks_from_config, AlertsConfig, MonitorBuilder, MonitorConfig};
use artguard_quality::ScoringPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Everything the `artguard` binary can be configured with.
///
/// Every section is optional in the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub scoring: ScoringPolicy,
    pub detector: DetectorConfig,
    pub monitor: MonitorConfig,
    pub metrics: MetricsConfig,
    pub contract: FrameworkContract,
    pub sandbox: SandboxConfig,
    pub alerts: AlertsConfig,

    /// Extra signatures added to the built-in ones
    pub patterns: Vec<SignatureSpec>,
}

impl GuardConfig {
    /// Read a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Read a TOML file if one was given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Built-in signatures plus the configured ones.
    pub fn library(&self) -> Result<PatternLibrary> {
        let compiled = self.contract.compile()?;
        let mut library = PatternLibrary::with_defaults(&compiled)?;
        for spec in &self.patterns {
            let signature = spec
                .build()
                .with_context(|| format!("invalid signature '{}'", spec.kind))?;
            library.register(signature)?;
        }
        Ok(library)
    }

    /// Monitor builder wired from every section.
    pub fn monitor_builder(&self, metrics: Option<Arc<MetricsAggregator>>) -> Result<MonitorBuilder> {
        let mut builder = MonitorBuilder::new()
            .config(self.monitor.clone())
            .contract(self.contract.clone())
            .scoring(self.scoring.clone())
            .detector_config(self.detector.clone())
            .process_sandbox(self.sandbox.clone())
            .library(self.library()?)
            .alert_sinks(sinks_from_config(&self.alerts)?);
        if let Some(metrics) = metrics {
            builder = builder.metrics(metrics);
        }
        Ok(builder)
    }
}
