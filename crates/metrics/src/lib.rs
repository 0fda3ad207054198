//! Generation and check metrics.
//!
//! The [`MetricsAggregator`] keeps a bounded log of [`MetricSample`]s,
//! derives rolling windows and trends from it, learns how well each repair
//! transformation works, and turns all of that into recommendations.
//!
//! [`MetricSample`]: artguard_core::MetricSample

#![warn(missing_docs)]

mod aggregator;
mod config;
mod error;
mod learning;
mod sample;
mod trends;

pub use aggregator::{CurrentStatus, DetailedStats, Health, MetricsAggregator, MetricsReport, Windows};
pub use config::MetricsConfig;
pub use error::{MetricsError, Result};
pub use learning::{FixLedger, FixStats};
pub use sample::{MetricOutcome, MetricRequest, WindowStats};
pub use trends::{recommend, Priority, Recommendation, Trend, TrendDirection, TrendReport};
