//! ArtGuard CLI - checks, repairs and watches generated artifacts.

mod config;

use anyhow::{Context, Result};
use artguard_core::{ArtifactId, DetectionConfidence, Finding, Metadata, MonitorEvent};
use artguard_metrics::MetricsAggregator;
use artguard_monitor::{CheckOutcome, Monitor};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::GuardConfig;

#[derive(Parser)]
#[command(name = "artguard")]
#[command(about = "Quality guard for generated interactive artifacts", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and validate one artifact
    Check {
        /// Artifact file
        file: PathBuf,
        /// Artifact type tag
        #[arg(long = "type", default_value = "game")]
        type_tag: String,
        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Repair one artifact
    Repair {
        /// Artifact file
        file: PathBuf,
        /// Artifact type tag
        #[arg(long = "type", default_value = "game")]
        type_tag: String,
        /// Overwrite the file with the fixed text
        #[arg(long, conflicts_with = "output")]
        write: bool,
        /// Write the fixed text here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Watch artifacts and print monitor events
    Watch {
        /// Artifact files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Artifact type tag
        #[arg(long = "type", default_value = "game")]
        type_tag: String,
        /// Repair artifacts automatically
        #[arg(long)]
        auto_fix: bool,
        /// Stop after this many sweeps instead of running until Ctrl-C
        #[arg(long)]
        sweeps: Option<usize>,
    },
    /// List detection signatures
    Patterns,
    /// Check artifacts once and print the metrics report
    Report {
        /// Artifact files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Artifact type tag
        #[arg(long = "type", default_value = "game")]
        type_tag: String,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = GuardConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { file, type_tag, json } => {
            let text = read(&file)?;
            let monitor = config.monitor_builder(None)?.build()?;
            let detection = monitor.run_detection(&text, &type_tag).await;
            let validation = monitor.run_validation(&text, &type_tag);

            if json {
                let out = json!({ "detection": detection, "validation": validation });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", file.display());
                println!(
                    "  Valid: {} (score {:.1})",
                    validation.is_valid, validation.overall_score
                );
                println!("  Severity: {}", detection.severity_level);
                if let DetectionConfidence::PatternOnly { reason } = &detection.confidence {
                    println!("  Pattern-only: {}", reason);
                }
                for (category, report) in &validation.categories {
                    println!("  {:<18} {:>5.1}", category, report.score);
                }
                print_findings(&detection.findings);
                for recommendation in &detection.recommendations {
                    println!("  -> {}", recommendation);
                }
            }

            return Ok(if validation.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        Commands::Repair {
            file,
            type_tag,
            write,
            output,
        } => {
            let text = read(&file)?;
            let monitor = config.monitor_builder(None)?.build()?;
            let detection = monitor.run_detection(&text, &type_tag).await;
            let result = monitor.repair(&text, &type_tag, &detection.findings).await;

            eprintln!(
                "Applied {} fix(es), {} failed, {} finding(s) remain ({:.0}% improvement)",
                result.applied_fixes.len(),
                result.failed_fixes.len(),
                result.remaining_findings.len(),
                result.improvement_rate,
            );
            for attempt in &result.failed_fixes {
                if let Some(reason) = &attempt.reason {
                    eprintln!("  {} - {}", attempt.finding.kind, reason);
                }
            }

            let target = if write { Some(file.clone()) } else { output };
            match target {
                Some(path) if result.changed() => {
                    std::fs::write(&path, &result.fixed_text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "fixed text written");
                }
                Some(_) => eprintln!("Nothing to write"),
                None => print!("{}", result.fixed_text),
            }
        }
        Commands::Watch {
            files,
            type_tag,
            auto_fix,
            sweeps,
        } => {
            let mut monitor_config = config.monitor.clone();
            if auto_fix {
                monitor_config = monitor_config.with_auto_fix_by_default(true);
            }
            let monitor = config
                .monitor_builder(None)?
                .config(monitor_config.clone())
                .build()?;
            let mut events = monitor.subscribe();
            register_files(&monitor, &files, &type_tag)?;

            match sweeps {
                Some(count) => {
                    let interval = Duration::from_millis(monitor_config.sweep_interval_ms);
                    for n in 0..count {
                        if n > 0 {
                            tokio::time::sleep(interval).await;
                        }
                        let summary = monitor.sweep().await;
                        for event in events.drain() {
                            println!("{}", describe(&event));
                        }
                        println!(
                            "sweep {}: {} checked, {} skipped, {} failed",
                            n + 1,
                            summary.checked,
                            summary.skipped,
                            summary.failed
                        );
                    }
                }
                None => {
                    monitor.start();
                    // first results right away instead of one interval later
                    monitor.sweep().await;
                    loop {
                        tokio::select! {
                            event = events.recv() => match event {
                                Some(event) => println!("{}", describe(&event)),
                                None => break,
                            },
                            _ = tokio::signal::ctrl_c() => break,
                        }
                    }
                    monitor.stop();
                }
            }

            for status in monitor.list_all() {
                println!(
                    "{} | {} finding(s) | {}",
                    status.id,
                    status.current_findings.len(),
                    status.severity_counts.summary()
                );
            }
        }
        Commands::Patterns => {
            let library = config.library()?;
            println!("Signatures ({})", library.len());
            for signature in library.list() {
                println!(
                    "  {:<24} | {:<8} | {:<18} | {}{}",
                    signature.kind,
                    signature.severity,
                    signature.category,
                    signature.description,
                    signature
                        .suggested_fix
                        .as_deref()
                        .map(|fix| format!(" [fix: {}]", fix))
                        .unwrap_or_default(),
                );
            }
        }
        Commands::Report {
            files,
            type_tag,
            json,
        } => {
            let metrics = Arc::new(MetricsAggregator::new(config.metrics.clone()));
            let monitor = config
                .monitor_builder(Some(Arc::clone(&metrics)))?
                .build()?;
            register_files(&monitor, &files, &type_tag)?;

            for status in monitor.list_all() {
                if let Some(CheckOutcome::Skipped) = monitor.check_one(&status.id).await {
                    warn!(artifact_id = %status.id, "check skipped");
                }
            }
            let report = metrics.generate_report();

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let status = &report.status;
                println!("Health: {:?}", status.health);
                println!(
                    "  Samples: {} (last hour {}, success {:.0}%, quality {:.1}, {:.0}ms avg)",
                    status.total_samples,
                    status.last_hour.count,
                    status.last_hour.success_rate * 100.0,
                    status.last_hour.avg_quality,
                    status.last_hour.avg_duration_ms,
                );
                for (category, count) in &report.stats.categories {
                    println!("  {:<18} {}", category, count);
                }
                for (fix, stats) in &report.stats.fixes {
                    println!(
                        "  fix {:<22} {}/{} succeeded",
                        fix, stats.successes, stats.attempts
                    );
                }
                for recommendation in &report.recommendations {
                    println!(
                        "  [{:?}] {}: {}",
                        recommendation.priority, recommendation.area, recommendation.message
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn register_files(monitor: &Monitor, files: &[PathBuf], type_tag: &str) -> Result<()> {
    for file in files {
        let text = read(file)?;
        let mut metadata = Metadata::new();
        metadata.insert("path".to_string(), json!(file.display().to_string()));
        let id = ArtifactId::new(file.display().to_string());
        if !monitor.register(id, text, type_tag, metadata) {
            warn!(path = %file.display(), "file listed twice");
        }
    }
    Ok(())
}

fn print_findings(findings: &[Finding]) {
    if findings.is_empty() {
        println!("  No findings");
        return;
    }
    println!("  Findings ({})", findings.len());
    for finding in findings {
        let line = finding
            .location
            .map(|l| format!(":{}", l.line))
            .unwrap_or_default();
        println!(
            "    {:<8} {}{} - {}",
            finding.severity, finding.kind, line, finding.message
        );
    }
}

fn describe(event: &MonitorEvent) -> String {
    let id = event
        .artifact_id()
        .map(|id| id.to_string())
        .unwrap_or_default();
    match event {
        MonitorEvent::MonitoringStarted { at } => format!("monitoring started at {}", at),
        MonitorEvent::MonitoringStopped { at } => format!("monitoring stopped at {}", at),
        MonitorEvent::ArtifactRegistered { .. } => format!("{}: registered", id),
        MonitorEvent::ArtifactUnregistered { .. } => format!("{}: unregistered", id),
        MonitorEvent::NewErrorsDetected { new_findings, .. } => {
            let kinds: Vec<&str> = new_findings.iter().map(|f| f.kind.as_str()).collect();
            format!("{}: {} new finding(s): {}", id, new_findings.len(), kinds.join(", "))
        }
        MonitorEvent::CriticalErrorsDetected { findings, .. } => {
            format!("{}: {} new critical finding(s)", id, findings.len())
        }
        MonitorEvent::AutoFixCompleted { result, .. } => format!(
            "{}: auto-fix applied {} fix(es), {:.0}% improvement",
            id,
            result.applied_fixes.len(),
            result.improvement_rate
        ),
        MonitorEvent::AutoFixFailed { reason, .. } => format!("{}: auto-fix failed: {}", id, reason),
        MonitorEvent::AlertTriggered(alert) => format!(
            "{}: ALERT {} ({})",
            id,
            alert.triggering_reasons.join(", "),
            alert.severity_counts.summary()
        ),
    }
}
