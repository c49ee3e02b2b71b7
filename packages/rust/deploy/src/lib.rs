//! Build and deployment supervision for the static site.
//!
//! - [`strategy`]: the ordered build strategies
//! - [`runner`]: external build process execution
//! - [`orchestrator`]: strategy fallback until a build verifies
//! - [`diagnostics`]: error categorization and error reports
//! - [`handler`]: the health → build → verify deployment flow

pub mod diagnostics;
pub mod env;
pub mod handler;
pub mod orchestrator;
pub mod runner;
pub mod strategy;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

pub use diagnostics::{ErrorCategory, ErrorReport, categorize, write_error_report};
pub use env::DeployEnv;
pub use handler::{DeployStep, DeploymentHandler, DeploymentReport, StepResult};
pub use orchestrator::{FallbackOptions, FallbackOrchestrator, FallbackOutcome, FallbackReport};
pub use runner::{BuildCommand, BuildRunner, ProcessRunner, RunOutcome};
pub use strategy::{BuildStrategy, StrategySpec};

/// Write a JSON report, logging and ignoring any failure.
pub fn write_json_report<T: Serialize>(path: &Path, report: &T) {
    let result = serde_json::to_string_pretty(report)
        .map_err(|e| e.to_string())
        .and_then(|json| {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
            std::fs::write(path, json).map_err(|e| e.to_string())
        });

    match result {
        Ok(()) => debug!(path = %path.display(), "report written"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to write report"),
    }
}
