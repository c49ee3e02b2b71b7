//! Error categorization and persisted error reports.
//!
//! Categories are informational: they pick troubleshooting tips for logs and
//! reports and never influence retry or fallback decisions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use coinpress_shared::{CoinpressError, Result};

use crate::runner::tail_chars;

/// Maximum log excerpt stored in a report.
const LOG_EXCERPT_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    BuildFailure,
    MemoryError,
    NetworkError,
    HostingDeploymentError,
    DependencyError,
    Timeout,
    PermissionError,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::BuildFailure,
        ErrorCategory::MemoryError,
        ErrorCategory::NetworkError,
        ErrorCategory::HostingDeploymentError,
        ErrorCategory::DependencyError,
        ErrorCategory::Timeout,
        ErrorCategory::PermissionError,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildFailure => "build_failure",
            Self::MemoryError => "memory_error",
            Self::NetworkError => "network_error",
            Self::HostingDeploymentError => "hosting_deployment_error",
            Self::DependencyError => "dependency_error",
            Self::Timeout => "timeout",
            Self::PermissionError => "permission_error",
            Self::Unknown => "unknown",
        }
    }

    pub fn tips(self) -> &'static [&'static str] {
        match self {
            Self::BuildFailure => &[
                "Run the build locally to reproduce the compiler output",
                "Check recently changed pages and components for type or syntax errors",
                "Retry with `coinpress fallback minimal` to skip type checking",
            ],
            Self::MemoryError => &[
                "Retry with a lighter strategy: `coinpress fallback emergency`",
                "Lower the number of statically generated pages per build",
                "Raise the memory limit of the build machine",
            ],
            Self::NetworkError => &[
                "Check connectivity to the package registry and remote APIs",
                "Retry the build; transient DNS and connection resets are common",
                "Verify proxy settings in the build environment",
            ],
            Self::HostingDeploymentError => &[
                "Check the hosting provider status page",
                "Verify deployment credentials and project settings",
                "Confirm the output directory matches the hosting configuration",
            ],
            Self::DependencyError => &[
                "Reinstall dependencies from a clean lockfile (`npm ci`)",
                "Check for peer dependency conflicts after upgrades",
                "Make sure every imported module is listed in package.json",
            ],
            Self::Timeout => &[
                "Retry with a faster strategy: `coinpress fallback basic`",
                "Look for pages that fetch slow remote data at build time",
            ],
            Self::PermissionError => &[
                "Check ownership of the project and cache directories",
                "Remove stale build caches created by another user",
            ],
            Self::Unknown => &[
                "Re-run with VERBOSE=true for debug logs",
                "Inspect the full build output for the first error",
            ],
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category rules in match priority order. Generic build failures come last
/// so more specific causes win.
static RULES: LazyLock<Vec<(ErrorCategory, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        rule(
            ErrorCategory::MemoryError,
            &[
                r"heap out of memory",
                r"\bENOMEM\b",
                r"out of memory",
                r"allocation failed",
                r"reached heap limit",
                r"\bSIGKILL\b|killed.*signal 9",
            ],
        ),
        rule(
            ErrorCategory::NetworkError,
            &[
                r"\bE(CONNREFUSED|CONNRESET|TIMEDOUT|NOTFOUND|AI_AGAIN)\b",
                r"getaddrinfo",
                r"socket hang up",
                r"fetch failed",
                r"network (error|request failed)",
            ],
        ),
        rule(
            ErrorCategory::Timeout,
            &[r"\btimed? ?out\b", r"deadline exceeded", r"exceeded .*time ?limit"],
        ),
        rule(
            ErrorCategory::PermissionError,
            &[
                r"\bEACCES\b",
                r"\bEPERM\b",
                r"permission denied",
                r"operation not permitted",
            ],
        ),
        rule(
            ErrorCategory::DependencyError,
            &[
                r"cannot find module",
                r"module not found",
                r"\bERESOLVE\b",
                r"peer dep",
                r"could not resolve dependency",
                r"npm ERR! code E404",
            ],
        ),
        rule(
            ErrorCategory::HostingDeploymentError,
            &[
                r"vercel|netlify|cloudflare pages|github pages",
                r"deploy(ment)? failed",
                r"upload failed",
                r"quota exceeded",
            ],
        ),
        rule(
            ErrorCategory::BuildFailure,
            &[
                r"build failed",
                r"failed to compile",
                r"type ?error",
                r"syntax ?error",
                r"exited with code [1-9]",
                r"error during build",
            ],
        ),
    ]
});

fn rule(category: ErrorCategory, patterns: &[&str]) -> (ErrorCategory, Vec<Regex>) {
    let compiled = patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("valid category regex"))
        .collect();
    (category, compiled)
}

/// Pick the first category whose patterns match `text`.
pub fn categorize(text: &str) -> ErrorCategory {
    RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(text)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Where and how the error happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    pub arch: String,
    pub tool_version: String,
    pub deployment_mode: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl EnvironmentInfo {
    pub fn capture(deployment_mode: Option<String>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            deployment_mode,
            working_dir: std::env::current_dir().ok(),
        }
    }
}

/// A persisted, categorized error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub message: String,
    /// Where the error came from (e.g. `deploy:build`).
    pub context: Option<String>,
    pub tips: Vec<String>,
    pub log_excerpt: Option<String>,
    pub environment: EnvironmentInfo,
}

impl ErrorReport {
    /// Categorize `message` together with an optional log and build a report.
    pub fn new(message: impl Into<String>, log: Option<&str>, environment: EnvironmentInfo) -> Self {
        let message = message.into();
        let haystack = match log {
            Some(log) => format!("{message}\n{log}"),
            None => message.clone(),
        };
        let category = categorize(&haystack);

        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            category,
            tips: category.tips().iter().map(|t| t.to_string()).collect(),
            message,
            context: None,
            log_excerpt: log
                .filter(|l| !l.trim().is_empty())
                .map(|l| tail_chars(l, LOG_EXCERPT_BYTES).to_string()),
            environment,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// `error-report-<YYYYMMDD-HHMMSS>-<id8>.json`
    pub fn file_name(&self) -> String {
        let id = self.id.simple().to_string();
        format!(
            "error-report-{}-{}.json",
            self.timestamp.format("%Y%m%d-%H%M%S"),
            &id[..8]
        )
    }
}

/// Write `report` into `dir` (created if needed), returning the file path.
pub fn write_error_report(dir: &Path, report: &ErrorReport) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| CoinpressError::io(dir, e))?;
    let path = dir.join(report.file_name());
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| CoinpressError::validation(format!("JSON serialization failed: {e}")))?;
    std::fs::write(&path, json).map_err(|e| CoinpressError::io(&path, e))?;

    info!(
        path = %path.display(),
        category = %report.category,
        "error report written"
    );
    debug!(id = %report.id, "error report id");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvironmentInfo {
        EnvironmentInfo::capture(Some("test".into()))
    }

    #[test]
    fn categorizes_common_failures() {
        let cases = [
            ("FATAL ERROR: Reached heap limit Allocation failed - JavaScript heap out of memory", ErrorCategory::MemoryError),
            ("request to https://registry.npmjs.org failed, reason: getaddrinfo ENOTFOUND", ErrorCategory::NetworkError),
            ("connect ETIMEDOUT 10.0.0.1:443", ErrorCategory::NetworkError),
            ("Static page generation timed out after 60 seconds", ErrorCategory::Timeout),
            ("Error: EACCES: permission denied, mkdir '.next/cache'", ErrorCategory::PermissionError),
            ("Module not found: Can't resolve 'react-tweet'", ErrorCategory::DependencyError),
            ("Error: Deployment failed on Vercel", ErrorCategory::HostingDeploymentError),
            ("Failed to compile.\n./app/page.tsx Type error: x is not assignable", ErrorCategory::BuildFailure),
            ("something strange happened", ErrorCategory::Unknown),
        ];
        for (text, expected) in cases {
            assert_eq!(categorize(text), expected, "{text}");
        }
    }

    #[test]
    fn every_category_has_tips() {
        for category in ErrorCategory::ALL {
            assert!(!category.tips().is_empty(), "{category}");
        }
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::HostingDeploymentError).unwrap();
        assert_eq!(json, "\"hosting_deployment_error\"");
    }

    #[test]
    fn log_text_participates_in_categorization() {
        let report = ErrorReport::new("build failed", Some("npm ERR! code ERESOLVE"), env());
        // Dependency rules outrank the generic build failure.
        assert_eq!(report.category, ErrorCategory::DependencyError);
        assert_eq!(report.log_excerpt.as_deref(), Some("npm ERR! code ERESOLVE"));
    }

    #[test]
    fn report_file_name_format() {
        let report = ErrorReport::new("oops", None, env());
        let name = report.file_name();
        let re = Regex::new(r"^error-report-\d{8}-\d{6}-[0-9a-f]{8}\.json$").unwrap();
        assert!(re.is_match(&name), "{name}");
    }

    #[test]
    fn writes_report_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("error-reports");
        let report = ErrorReport::new("connect ECONNREFUSED", None, env()).with_context("diagnose");

        let path = write_error_report(&target, &report).unwrap();
        assert!(path.starts_with(&target));

        let saved: ErrorReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.category, ErrorCategory::NetworkError);
        assert_eq!(saved.context.as_deref(), Some("diagnose"));
        assert_eq!(saved.id, report.id);
    }
}
