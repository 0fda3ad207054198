//! Monitor construction.

use artguard_core::{Clock, FrameworkContract, SystemClock};
use artguard_detect::{
    Detector, DetectorConfig, PatternLibrary, ProcessSandbox, Sandbox, SandboxConfig,
};
use artguard_metrics::MetricsAggregator;
use artguard_quality::{RuleCatalog, ScoringPolicy, Validator};
use artguard_repair::RepairEngine;
use std::sync::Arc;

use crate::alert::{AlertSink, LogAlertSink};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::monitor::Monitor;

/// Builds a [`Monitor`] from its collaborators.
///
/// Anything not supplied is derived from the contract and the default
/// settings; without explicit sinks alerts go to the log.
pub struct MonitorBuilder {
    config: MonitorConfig,
    contract: FrameworkContract,
    scoring: ScoringPolicy,
    detector_config: DetectorConfig,
    sandbox: Option<Arc<dyn Sandbox>>,
    library: Option<PatternLibrary>,
    validator: Option<Validator>,
    repair: Option<RepairEngine>,
    sinks: Option<Vec<Arc<dyn AlertSink>>>,
    metrics: Option<Arc<MetricsAggregator>>,
    clock: Arc<dyn Clock>,
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorBuilder {
    /// Builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
            contract: FrameworkContract::default(),
            scoring: ScoringPolicy::default(),
            detector_config: DetectorConfig::default(),
            sandbox: None,
            library: None,
            validator: None,
            repair: None,
            sinks: None,
            metrics: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Monitor settings.
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// SDK contract used by the default rules, signatures and fixes.
    pub fn contract(mut self, contract: FrameworkContract) -> Self {
        self.contract = contract;
        self
    }

    /// Scoring policy of the default validator.
    pub fn scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    /// Detector settings.
    pub fn detector_config(mut self, config: DetectorConfig) -> Self {
        self.detector_config = config;
        self
    }

    /// Sandbox for trial runs. Defaults to a process sandbox.
    pub fn sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Process sandbox with the given settings.
    pub fn process_sandbox(self, config: SandboxConfig) -> Self {
        self.sandbox(Arc::new(ProcessSandbox::new(config)))
    }

    /// Signature library. Defaults to the built-in signatures.
    pub fn library(mut self, library: PatternLibrary) -> Self {
        self.library = Some(library);
        self
    }

    /// Validator. Defaults to the built-in rules.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Repair engine. Defaults to the built-in transformations.
    pub fn repair_engine(mut self, engine: RepairEngine) -> Self {
        self.repair = Some(engine);
        self
    }

    /// Add an alert sink.
    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.get_or_insert_with(Vec::new).push(sink);
        self
    }

    /// Replace all alert sinks; an empty list silences delivery.
    pub fn alert_sinks(mut self, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Record a metric sample per check.
    pub fn metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Time source for timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the monitor. It starts stopped.
    pub fn build(self) -> Result<Monitor> {
        let compiled = self.contract.compile()?;

        let library = match self.library {
            Some(library) => library,
            None => PatternLibrary::with_defaults(&compiled)?,
        };
        let sandbox = self
            .sandbox
            .unwrap_or_else(|| Arc::new(ProcessSandbox::new(SandboxConfig::default())));
        // the validator scores the same signatures the detector matches
        let validator = match self.validator {
            Some(validator) => validator,
            None => Validator::new(RuleCatalog::builtin(&library)?, self.scoring, compiled.clone()),
        };
        let detector = Detector::new(library, sandbox, self.detector_config);
        let repair = match self.repair {
            Some(repair) => repair,
            None => RepairEngine::with_defaults(detector.clone(), &compiled)?,
        };
        let sinks = self
            .sinks
            .unwrap_or_else(|| vec![Arc::new(LogAlertSink) as Arc<dyn AlertSink>]);

        Ok(Monitor::from_parts(
            self.config,
            detector,
            validator,
            repair,
            sinks,
            self.metrics,
            self.clock,
        ))
    }
}
