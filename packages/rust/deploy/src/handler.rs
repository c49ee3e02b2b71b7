//! Deployment error handling: health check, resilient build, output verification.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use coinpress_content::LoadOptions;
use coinpress_shared::{AppConfig, CoinpressError};

use crate::diagnostics::{EnvironmentInfo, ErrorReport, write_error_report};
use crate::env::DeployEnv;
use crate::orchestrator::{FallbackOptions, FallbackOrchestrator, FallbackReport, marker_size};
use crate::runner::BuildRunner;
use crate::strategy::BuildStrategy;
use crate::write_json_report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStep {
    /// `health`, then `build`, then `verify`.
    Complete,
    Health,
    Build,
    Verify,
}

impl DeployStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Health => "health",
            Self::Build => "build",
            Self::Verify => "verify",
        }
    }

    fn plan(self) -> &'static [DeployStep] {
        match self {
            Self::Complete => &[Self::Health, Self::Build, Self::Verify],
            Self::Health => &[Self::Health],
            Self::Build => &[Self::Build],
            Self::Verify => &[Self::Verify],
        }
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployStep {
    type Err = CoinpressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "health" => Ok(Self::Health),
            "build" => Ok(Self::Build),
            "verify" => Ok(Self::Verify),
            other => Err(CoinpressError::validation(format!(
                "unknown deploy step '{other}' (expected one of: complete, health, build, verify)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: DeployStep,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Written to `deployment-error-handling-report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub requested: DeployStep,
    pub success: bool,
    pub deployment_mode: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepResult>,
    /// One entry per orchestrator pass made by the build step.
    pub build_passes: Vec<FallbackReport>,
    /// Error report written for the failing step, if any.
    pub error_report: Option<PathBuf>,
}

impl DeploymentReport {
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

pub struct DeploymentHandler<'a, R> {
    runner: &'a R,
    config: &'a AppConfig,
    env: DeployEnv,
}

impl<'a, R: BuildRunner> DeploymentHandler<'a, R> {
    pub fn new(runner: &'a R, config: &'a AppConfig, env: DeployEnv) -> Self {
        Self { runner, config, env }
    }

    /// Orchestrator passes the build step may make.
    pub fn max_retries(&self) -> u32 {
        self.env
            .max_retries
            .unwrap_or(self.config.deploy.max_retries)
            .max(1)
    }

    pub fn initial_strategy(&self) -> BuildStrategy {
        self.env.initial_strategy().unwrap_or(BuildStrategy::Fast)
    }

    /// Run `step`, stopping at the first failure, and write the report.
    #[instrument(skip_all, fields(step = %step))]
    pub async fn run(&self, step: DeployStep) -> DeploymentReport {
        let started_at = Utc::now();
        let mut steps = Vec::new();
        let mut build_passes = Vec::new();

        for &current in step.plan() {
            let start = Instant::now();
            let (success, message) = match current {
                DeployStep::Health => self.health(),
                DeployStep::Build => self.build(&mut build_passes).await,
                DeployStep::Verify => self.verify(),
                DeployStep::Complete => unreachable!("complete expands to its steps"),
            };

            if success {
                info!(step = %current, message = %message, "step passed");
            } else {
                error!(step = %current, message = %message, "step failed");
            }

            steps.push(StepResult {
                step: current,
                success,
                message,
                duration_ms: start.elapsed().as_millis() as u64,
            });
            if !success {
                break;
            }
        }

        let success = steps.iter().all(|s| s.success);
        let error_report = match steps.iter().find(|s| !s.success) {
            Some(failed) => self.report_error(failed, &build_passes),
            None => None,
        };

        let report = DeploymentReport {
            requested: step,
            success,
            deployment_mode: self.env.deployment_mode.clone(),
            started_at,
            finished_at: Utc::now(),
            steps,
            build_passes,
            error_report,
        };

        let path = self.config.build.project_path(&self.config.deploy.report_file);
        write_json_report(&path, &report);
        report
    }

    fn health(&self) -> (bool, String) {
        let build = &self.config.build;
        let mut problems = Vec::new();

        if find_program(&build.program).is_none() {
            problems.push(format!("build program '{}' not found on PATH", build.program));
        }

        let project = Path::new(&build.project_dir);
        if !project.is_dir() {
            problems.push(format!("project directory {} does not exist", project.display()));
        } else if !project.join("package.json").is_file() {
            problems.push(format!("no package.json in {}", project.display()));
        }

        let content_dir = build.project_path(&self.config.content.dir);
        let opts = LoadOptions {
            words_per_minute: self.config.content.words_per_minute,
        };
        let articles = match coinpress_content::load_dir(&content_dir, &opts) {
            Ok(articles) => articles.len(),
            Err(e) => {
                problems.push(format!("content check failed: {e}"));
                0
            }
        };

        if problems.is_empty() {
            (true, format!("environment healthy, {articles} articles valid"))
        } else {
            (false, problems.join("; "))
        }
    }

    async fn build(&self, passes: &mut Vec<FallbackReport>) -> (bool, String) {
        let orchestrator = FallbackOrchestrator::new(self.runner, &self.config.build);
        let options = FallbackOptions {
            initial: self.initial_strategy(),
            forwarded_env: self.env.forwarded.clone(),
            write_report: true,
        };
        let max = self.max_retries();

        for pass in 1..=max {
            info!(pass, max, initial = %options.initial, "starting build pass");
            let report = orchestrator.run(&options).await;
            let result = report.final_strategy;
            passes.push(report);

            if let Some(strategy) = result {
                return (true, format!("built with '{strategy}' strategy on pass {pass}/{max}"));
            }
            warn!(pass, max, "build pass exhausted all strategies");
        }

        (false, format!("all build strategies failed in {max} pass(es)"))
    }

    fn verify(&self) -> (bool, String) {
        let build = &self.config.build;
        let mut problems = Vec::new();

        let marker = build.project_path(&build.marker_file);
        match marker_size(&marker) {
            None => problems.push(format!("{} is missing", marker.display())),
            Some(size) if size <= build.min_marker_bytes => problems.push(format!(
                "{} is too small ({size} bytes, need more than {})",
                marker.display(),
                build.min_marker_bytes
            )),
            Some(_) => {}
        }

        for required in &self.config.deploy.required_outputs {
            let path = build.project_path(required);
            if !path.exists() {
                problems.push(format!("required output {} is missing", path.display()));
            }
        }

        if problems.is_empty() {
            (true, "build output verified".to_string())
        } else {
            (false, problems.join("; "))
        }
    }

    fn report_error(&self, failed: &StepResult, passes: &[FallbackReport]) -> Option<PathBuf> {
        let log = passes
            .last()
            .and_then(FallbackReport::last_attempt)
            .map(|a| a.output_tail.as_str())
            .filter(|t| !t.is_empty());

        let report = ErrorReport::new(
            failed.message.clone(),
            log,
            EnvironmentInfo::capture(self.env.deployment_mode.clone()),
        )
        .with_context(format!("deploy:{}", failed.step));

        let dir = self.config.build.project_path(&self.config.deploy.error_report_dir);
        match write_error_report(&dir, &report) {
            Ok(path) => {
                for tip in &report.tips {
                    info!(category = %report.category, "tip: {tip}");
                }
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "failed to write error report");
                None
            }
        }
    }
}

/// Resolve `program` the way a shell would: as a path when it contains a
/// separator, otherwise through `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{ScriptedRunner, Step, project};

    fn write_post(root: &Path) {
        let posts = root.join("content/posts");
        std::fs::create_dir_all(&posts).unwrap();
        std::fs::write(
            posts.join("hello.md"),
            "---\ntitle: Hello\ndescription: First post\nauthor: Desk\npublishedAt: 2024-05-01\n---\nBody\n",
        )
        .unwrap();
    }

    fn healthy_project() -> (tempfile::TempDir, AppConfig) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        write_post(dir.path());

        let mut config = AppConfig::default();
        config.build = project(dir.path());
        config.build.program = "sh".into();
        (dir, config)
    }

    fn read_report(dir: &Path) -> DeploymentReport {
        let json =
            std::fs::read_to_string(dir.join("deployment-error-handling-report.json")).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn parses_steps() {
        assert_eq!("Complete".parse::<DeployStep>().unwrap(), DeployStep::Complete);
        assert_eq!("verify".parse::<DeployStep>().unwrap(), DeployStep::Verify);
        assert!("ship".parse::<DeployStep>().is_err());
    }

    #[test]
    fn finds_programs_on_path() {
        assert!(find_program("sh").is_some());
        assert!(find_program("definitely-not-a-real-program-xyz").is_none());
    }

    #[tokio::test]
    async fn complete_runs_all_steps() {
        let (dir, config) = healthy_project();
        let runner = ScriptedRunner::new(&config.build, &[Step::Exit(1, None), Step::Exit(0, Some(4096))]);
        let handler = DeploymentHandler::new(&runner, &config, DeployEnv::default());

        let report = handler.run(DeployStep::Complete).await;
        assert!(report.success, "{:?}", report.steps);
        assert_eq!(report.exit_code(), 0);
        let steps: Vec<DeployStep> = report.steps.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![DeployStep::Health, DeployStep::Build, DeployStep::Verify]);
        assert!(report.steps[1].message.contains("minimal"));
        assert!(report.error_report.is_none());
        assert!(read_report(dir.path()).success);
    }

    #[tokio::test]
    async fn health_failure_stops_before_building() {
        let (dir, config) = healthy_project();
        std::fs::remove_file(dir.path().join("package.json")).unwrap();
        let runner = ScriptedRunner::new(&config.build, &[Step::Exit(0, Some(4096))]);
        let handler = DeploymentHandler::new(&runner, &config, DeployEnv::default());

        let report = handler.run(DeployStep::Complete).await;
        assert!(!report.success);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.steps.len(), 1);
        assert!(report.steps[0].message.contains("package.json"));
        assert!(runner.seen.lock().unwrap().is_empty());

        let error_report = report.error_report.expect("error report written");
        assert!(error_report.starts_with(dir.path().join("error-reports")));
    }

    #[tokio::test]
    async fn build_retries_whole_chain_up_to_max_retries() {
        let (_dir, config) = healthy_project();
        let runner = ScriptedRunner::new(&config.build, &[]);
        let env = DeployEnv {
            max_retries: Some(3),
            ..DeployEnv::default()
        };
        let handler = DeploymentHandler::new(&runner, &config, env);

        let report = handler.run(DeployStep::Build).await;
        assert!(!report.success);
        assert_eq!(report.build_passes.len(), 3);
        assert_eq!(runner.seen.lock().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn deployment_mode_picks_initial_strategy() {
        let (_dir, config) = healthy_project();
        let runner = ScriptedRunner::new(&config.build, &[Step::Exit(0, Some(4096))]);
        let env = DeployEnv {
            deployment_mode: Some("emergency".into()),
            ..DeployEnv::default()
        };
        let handler = DeploymentHandler::new(&runner, &config, env);

        let report = handler.run(DeployStep::Build).await;
        assert!(report.success);
        assert_eq!(runner.strategies(), vec!["emergency"]);
        assert_eq!(report.deployment_mode.as_deref(), Some("emergency"));
    }

    #[tokio::test]
    async fn verify_checks_marker_and_required_outputs() {
        let (dir, mut config) = healthy_project();
        config.deploy.required_outputs = vec!["out/index.html".into(), "out/rss.xml".into()];
        let runner = ScriptedRunner::new(&config.build, &[]);
        let handler = DeploymentHandler::new(&runner, &config, DeployEnv::default());

        let report = handler.run(DeployStep::Verify).await;
        assert!(!report.success);
        assert!(report.steps[0].message.contains("missing"));

        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("index.html"), "x".repeat(2048)).unwrap();
        std::fs::write(out.join("rss.xml"), "<rss/>").unwrap();

        let report = handler.run(DeployStep::Verify).await;
        assert!(report.success, "{:?}", report.steps);
    }
}
