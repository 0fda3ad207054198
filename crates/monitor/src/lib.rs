//! Continuous monitoring of generated artifacts.
//!
//! A [`Monitor`] keeps a registry of artifacts, checks them on a timer with
//! the detector and validator, optionally repairs them, and reports what it
//! sees as [`MonitorEvent`]s on an event bus and as alerts through
//! [`AlertSink`]s.
//!
//! ```no_run
//! use artguard_core::{ArtifactId, Metadata};
//! use artguard_monitor::Monitor;
//!
//! # async fn run() -> artguard_monitor::Result<()> {
//! let monitor = Monitor::builder().build()?;
//! monitor.register(ArtifactId::new("maze"), "<html>...</html>", "game", Metadata::new());
//! monitor.start();
//! # Ok(())
//! # }
//! ```
//!
//! [`MonitorEvent`]: artguard_core::MonitorEvent

#![warn(missing_docs)]

mod alert;
mod builder;
mod bus;
mod check;
mod config;
mod error;
mod monitor;

pub use alert::{sinks_from_config, AlertSink, LogAlertSink, WebhookAlertSink};
pub use builder::MonitorBuilder;
pub use bus::{EventBus, Subscription};
pub use check::{CheckOutcome, CheckReport, SweepSummary};
pub use config::{AlertThresholds, AlertsConfig, MonitorConfig, ThresholdsUpdate};
pub use error::{MonitorError, Result};
pub use monitor::Monitor;
