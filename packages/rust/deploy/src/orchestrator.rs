//! Build fallback orchestration.
//!
//! ```text
//! Attempting(initial) ──fail──▶ Attempting(next) ──fail──▶ … ──exhausted──▶ Failed
//!         │                            │
//!         └──────success───────────────┴──────────────────────────────────▶ Succeeded
//! ```
//!
//! An attempt succeeds only when the process exits 0 and the marker file
//! exists and is larger than the configured minimum.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use coinpress_shared::BuildConfig;

use crate::diagnostics::{ErrorCategory, categorize};
use crate::runner::{BuildCommand, BuildRunner, RunOutcome};
use crate::strategy::BuildStrategy;
use crate::write_json_report;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    Attempting(BuildStrategy),
    Succeeded(BuildStrategy),
    Failed,
}

/// Inputs to one orchestrator run.
#[derive(Debug, Clone)]
pub struct FallbackOptions {
    pub initial: BuildStrategy,
    /// Caller flags applied to every attempt before strategy overrides.
    pub forwarded_env: Vec<(String, String)>,
    /// Write `build-fallback-report.json` after the run.
    pub write_report: bool,
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self {
            initial: BuildStrategy::Fast,
            forwarded_env: Vec::new(),
            write_report: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackOutcome {
    Succeeded,
    Failed,
}

/// Record of a single strategy attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: BuildStrategy,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Marker size in bytes, if the file exists.
    pub marker_bytes: Option<u64>,
    pub duration_ms: u64,
    pub message: String,
    /// Set for failed attempts.
    pub category: Option<ErrorCategory>,
    pub output_tail: String,
}

/// Aggregate report written to `build-fallback-report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackReport {
    pub outcome: FallbackOutcome,
    pub initial_strategy: BuildStrategy,
    /// The strategy that produced the build, if any.
    pub final_strategy: Option<BuildStrategy>,
    pub attempts: Vec<AttemptRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_duration_ms: u64,
}

impl FallbackReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == FallbackOutcome::Succeeded
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }
}

/// Drives a [`BuildRunner`] through the strategy chain.
pub struct FallbackOrchestrator<'a, R> {
    runner: &'a R,
    build: &'a BuildConfig,
}

impl<'a, R: BuildRunner> FallbackOrchestrator<'a, R> {
    pub fn new(runner: &'a R, build: &'a BuildConfig) -> Self {
        Self { runner, build }
    }

    /// Run from `options.initial` until a strategy succeeds or the chain is exhausted.
    #[instrument(skip_all, fields(initial = %options.initial))]
    pub async fn run(&self, options: &FallbackOptions) -> FallbackReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut attempts = Vec::new();
        let mut state = FallbackState::Attempting(options.initial);

        while let FallbackState::Attempting(strategy) = state {
            info!(strategy = %strategy, "attempting build");
            let record = self.attempt(strategy, options).await;
            let success = record.success;

            if success {
                info!(strategy = %strategy, duration_ms = record.duration_ms, "build succeeded");
            } else {
                warn!(
                    strategy = %strategy,
                    category = ?record.category,
                    message = %record.message,
                    "build attempt failed"
                );
            }
            attempts.push(record);

            state = match (success, strategy.next()) {
                (true, _) => FallbackState::Succeeded(strategy),
                (false, Some(next)) => FallbackState::Attempting(next),
                (false, None) => FallbackState::Failed,
            };
        }

        let (outcome, final_strategy) = match state {
            FallbackState::Succeeded(s) => (FallbackOutcome::Succeeded, Some(s)),
            _ => (FallbackOutcome::Failed, None),
        };

        let report = FallbackReport {
            outcome,
            initial_strategy: options.initial,
            final_strategy,
            attempts,
            started_at,
            finished_at: Utc::now(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };

        if report.succeeded() {
            info!(attempts = report.attempts.len(), "build fallback succeeded");
        } else {
            warn!(attempts = report.attempts.len(), "all build strategies failed");
        }

        if options.write_report {
            write_json_report(&self.report_path(), &report);
        }

        report
    }

    pub fn report_path(&self) -> PathBuf {
        self.build.project_path(&self.build.report_file)
    }

    /// Fully resolved command for `strategy`.
    pub fn command_for(&self, strategy: BuildStrategy, options: &FallbackOptions) -> BuildCommand {
        let spec = strategy.spec(self.build);
        let mut env = options.forwarded_env.clone();
        env.extend(spec.env.iter().cloned());
        env.push(("NODE_OPTIONS".into(), spec.node_options()));
        env.push(("DEPLOYMENT_MODE".into(), strategy.as_str().into()));

        BuildCommand {
            program: self.build.program.clone(),
            args: self.build.args.clone(),
            dir: PathBuf::from(&self.build.project_dir),
            env,
            pre_commands: spec.pre_commands,
            timeout: spec.timeout,
        }
    }

    async fn attempt(&self, strategy: BuildStrategy, options: &FallbackOptions) -> AttemptRecord {
        let command = self.command_for(strategy, options);
        let start = Instant::now();

        let outcome = match self.runner.run(&command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                return AttemptRecord {
                    strategy,
                    success: false,
                    exit_code: None,
                    timed_out: false,
                    marker_bytes: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                    category: Some(categorize(&message)),
                    message,
                    output_tail: String::new(),
                };
            }
        };

        let marker = self.build.project_path(&self.build.marker_file);
        let marker_bytes = marker_size(&marker);
        let verdict = judge(&outcome, marker_bytes, self.build.min_marker_bytes, &marker);

        let (success, message, category) = match verdict {
            Ok(()) => (true, "build output verified".to_string(), None),
            Err(message) => {
                let category = if outcome.timed_out {
                    ErrorCategory::Timeout
                } else {
                    categorize(&format!("{message}\n{}", outcome.output_tail))
                };
                (false, message, Some(category))
            }
        };

        AttemptRecord {
            strategy,
            success,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            marker_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
            message,
            category,
            output_tail: outcome.output_tail,
        }
    }
}

/// Size of the marker file, `None` when missing.
pub fn marker_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

fn judge(
    outcome: &RunOutcome,
    marker_bytes: Option<u64>,
    min_bytes: u64,
    marker: &Path,
) -> std::result::Result<(), String> {
    if outcome.timed_out {
        return Err(format!(
            "build timed out after {}s and was killed",
            outcome.duration.as_secs()
        ));
    }
    if let Some(pre) = &outcome.failed_pre_command {
        return Err(format!("pre-command `{pre}` failed"));
    }
    match outcome.exit_code {
        Some(0) => {}
        Some(code) => return Err(format!("build exited with code {code}")),
        None => return Err("build was terminated by a signal".to_string()),
    }
    match marker_bytes {
        None => Err(format!("build output marker {} is missing", marker.display())),
        Some(size) if size <= min_bytes => Err(format!(
            "build output marker {} is too small ({size} bytes, need more than {min_bytes})",
            marker.display()
        )),
        Some(_) => Ok(()),
    }
}
