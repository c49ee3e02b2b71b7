//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use coinpress_core::site::{ProgressReporter, SiteBuildConfig, SiteBuildResult};
use coinpress_deploy::diagnostics::EnvironmentInfo;
use coinpress_deploy::env::is_truthy;
use coinpress_deploy::{
    BuildStrategy, DeployEnv, DeployStep, DeploymentHandler, ErrorReport, FallbackOptions,
    FallbackOrchestrator, ProcessRunner, write_error_report,
};
use coinpress_newsletter::{NewsletterClient, SubscribeOutcome};
use coinpress_search::SearchIndex;
use coinpress_shared::{AppConfig, Article, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Coinpress — content tooling for a crypto news site.
#[derive(Parser)]
#[command(
    name = "coinpress",
    version,
    about = "Build site data, search articles, and run resilient static-site builds.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./coinpress.toml, then ~/.coinpress/coinpress.toml).
    #[arg(long, env = "COINPRESS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate site data: article lists, related articles, search index, feeds.
    Build {
        /// Output directory (defaults to `[build].data_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Load and validate every article without writing anything.
    Check,

    /// Search articles.
    Search {
        /// Query text; every term must match.
        query: String,

        /// Maximum number of results (defaults to `[search].limit`).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the articles related to one article.
    Related {
        /// Article slug.
        slug: String,

        /// Number of related articles (defaults to `[content].related_limit`).
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Run the external build, falling back to lighter strategies on failure.
    Fallback {
        /// Strategy to start from, or `list` / `help` to show all strategies.
        target: Option<String>,
    },

    /// Deployment error handling.
    Deploy {
        /// Step to run: complete, health, build, or verify.
        #[arg(default_value = "complete")]
        step: DeployStep,
    },

    /// Categorize an error and write an error report.
    Diagnose {
        /// Build log to analyze.
        #[arg(long)]
        log: Option<PathBuf>,

        /// Error message.
        message: Vec<String>,
    },

    /// Subscribe an address to the newsletter.
    Subscribe {
        /// Email address.
        email: String,

        /// Extra tag for the subscriber (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a config file with defaults in the current directory.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags and `VERBOSE`.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_verbose = std::env::var("VERBOSE").is_ok_and(|v| is_truthy(&v));
    let level = if env_verbose { cli.verbose.max(1) } else { cli.verbose };

    let filter = match level {
        0 => "coinpress=info",
        1 => "coinpress=debug",
        _ => "coinpress=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Build { out } => cmd_build(config_path, out).await,
        Command::Check => cmd_check(config_path).await,
        Command::Search { query, limit, json } => cmd_search(config_path, &query, limit, json).await,
        Command::Related { slug, limit } => cmd_related(config_path, &slug, limit).await,
        Command::Fallback { target } => cmd_fallback(config_path, target.as_deref()).await,
        Command::Deploy { step } => cmd_deploy(config_path, step).await,
        Command::Diagnose { log, message } => cmd_diagnose(config_path, log.as_deref(), &message).await,
        Command::Subscribe { email, tags } => cmd_subscribe(config_path, &email, &tags).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn load_articles(config: &AppConfig) -> Result<Vec<Article>> {
    let dir = config.build.project_path(&config.content.dir);
    let opts = coinpress_content::LoadOptions {
        words_per_minute: config.content.words_per_minute,
    };
    Ok(coinpress_content::load_dir(&dir, &opts)?)
}

// ---------------------------------------------------------------------------
// Site data
// ---------------------------------------------------------------------------

async fn cmd_build(config_path: Option<&Path>, out: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let mut build_config = SiteBuildConfig::from_app(&config, env!("CARGO_PKG_VERSION"));
    if let Some(out) = out {
        build_config.output_dir = out;
    }

    info!(
        content = %build_config.content_dir.display(),
        out = %build_config.output_dir.display(),
        "building site data"
    );

    let reporter = CliProgress::new();
    let result = coinpress_core::site::build_site(&build_config, &reporter)?;

    println!();
    println!("  Site data generated!");
    println!("  Articles:  {}", result.article_count);
    println!("  Artifacts: {}", result.artifacts.len());
    println!("  Path:      {}", result.output_dir.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_check(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let articles = load_articles(&config)?;
    let tags = coinpress_core::catalog::tag_counts(&articles);
    let featured = coinpress_core::catalog::featured(&articles, usize::MAX);

    println!(
        "{} articles valid ({} featured, {} tags)",
        articles.len(),
        featured.len(),
        tags.len()
    );
    Ok(())
}

async fn cmd_search(
    config_path: Option<&Path>,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let limit = limit.unwrap_or(config.search.limit);

    // Prefer the generated index; fall back to indexing content in memory.
    let index_path = config
        .build
        .project_path(&config.build.data_dir)
        .join("search-index.json");
    let index = match std::fs::read_to_string(&index_path) {
        Ok(text) => SearchIndex::from_json(&text)?,
        Err(_) => {
            info!(path = %index_path.display(), "no generated index, indexing content");
            SearchIndex::build(&load_articles(&config)?, &config.search.article_base_path)
        }
    };

    let results = index.search(query, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No articles match '{query}'.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!("{:>2}. {}  ({:.2})", i + 1, result.title, result.score);
        println!("    {}", result.url);
        if let Some(m) = result.matches.first() {
            println!("    [{}] {}", m.field, m.snippet);
        }
    }
    Ok(())
}

async fn cmd_related(config_path: Option<&Path>, slug: &str, limit: Option<usize>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let articles = load_articles(&config)?;
    let target = coinpress_core::catalog::find(&articles, slug)
        .ok_or_else(|| eyre!("no article with slug '{slug}'"))?;

    let limit = limit.unwrap_or(config.content.related_limit);
    let related = coinpress_core::related::related_articles(target, &articles, limit);

    println!("Related to '{}':", target.title);
    for article in related {
        let score = coinpress_core::related::score(target, article);
        println!(
            "  {:>6.2}  {}  ({})",
            score.score,
            article.slug,
            article.published_at.format("%Y-%m-%d")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Build and deployment
// ---------------------------------------------------------------------------

async fn cmd_fallback(config_path: Option<&Path>, target: Option<&str>) -> Result<()> {
    let config = resolve_config(config_path)?;

    let env = DeployEnv::from_env();
    let initial = match fallback_target(target, env.initial_strategy())? {
        FallbackTarget::List => {
            print_strategies(&config);
            return Ok(());
        }
        FallbackTarget::Run(strategy) => strategy,
    };
    if let Some(mode) = env.deployment_mode.as_deref() {
        info!(deployment_mode = mode, "deployment mode");
    }

    let options = FallbackOptions {
        initial,
        forwarded_env: env.forwarded.clone(),
        write_report: true,
    };
    let runner = ProcessRunner;
    let orchestrator = FallbackOrchestrator::new(&runner, &config.build);

    let spinner = spinner();
    spinner.set_message(format!(
        "Building ({} → {})",
        initial,
        initial.chain_from().iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" → ")
    ));
    let report = orchestrator.run(&options).await;
    spinner.finish_and_clear();

    println!();
    for attempt in &report.attempts {
        let mark = if attempt.success { "ok  " } else { "FAIL" };
        println!(
            "  [{mark}] {:<9} {:>6.1}s  {}",
            attempt.strategy,
            attempt.duration_ms as f64 / 1000.0,
            attempt.message
        );
    }
    println!();
    println!("  Report: {}", orchestrator.report_path().display());

    match report.final_strategy {
        Some(strategy) => {
            println!("  Build succeeded with '{strategy}' strategy.");
            Ok(())
        }
        None => Err(eyre!(
            "all build strategies failed ({} attempts)",
            report.attempts.len()
        )),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FallbackTarget {
    List,
    Run(BuildStrategy),
}

/// Resolve the `fallback` positional argument. Without one, the strategy named
/// by `DEPLOYMENT_MODE` wins, then `fast`.
fn fallback_target(
    target: Option<&str>,
    from_env: Option<BuildStrategy>,
) -> coinpress_shared::Result<FallbackTarget> {
    let Some(name) = target.map(str::trim) else {
        return Ok(FallbackTarget::Run(from_env.unwrap_or(BuildStrategy::Fast)));
    };
    if ["list", "help"].iter().any(|word| name.eq_ignore_ascii_case(word)) {
        return Ok(FallbackTarget::List);
    }
    name.parse().map(FallbackTarget::Run)
}

fn print_strategies(config: &AppConfig) {
    println!("Build strategies, in fallback order:");
    for strategy in BuildStrategy::ORDER {
        let spec = strategy.spec(&config.build);
        println!();
        println!("  {strategy:<9} {}", strategy.description());
        println!(
            "            timeout {}s, memory {} MiB",
            spec.timeout.as_secs(),
            spec.memory_mib
        );
        for (key, value) in &spec.env {
            println!("            {key}={value}");
        }
        for pre in &spec.pre_commands {
            println!("            pre: {pre}");
        }
    }
}

async fn cmd_deploy(config_path: Option<&Path>, step: DeployStep) -> Result<()> {
    let config = resolve_config(config_path)?;
    let runner = ProcessRunner;
    let handler = DeploymentHandler::new(&runner, &config, DeployEnv::from_env());

    let spinner = spinner();
    spinner.set_message(format!("Running deploy step '{step}'"));
    let report = handler.run(step).await;
    spinner.finish_and_clear();

    println!();
    for result in &report.steps {
        let mark = if result.success { "ok  " } else { "FAIL" };
        println!("  [{mark}] {:<7} {}", result.step, result.message);
    }
    if let Some(path) = &report.error_report {
        println!();
        println!("  Error report: {}", path.display());
    }
    println!();

    if report.success {
        Ok(())
    } else {
        Err(eyre!("deploy step '{step}' failed"))
    }
}

async fn cmd_diagnose(
    config_path: Option<&Path>,
    log: Option<&Path>,
    message: &[String],
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let log_text = match log {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .map_err(|e| eyre!("cannot read log '{}': {e}", path.display()))?,
        ),
        None => None,
    };
    let message = message.join(" ");
    if message.trim().is_empty() && log_text.is_none() {
        return Err(eyre!("nothing to diagnose: pass a message or --log <file>"));
    }

    let env = DeployEnv::from_env();
    let report = ErrorReport::new(
        if message.trim().is_empty() { "build log analysis".to_string() } else { message },
        log_text.as_deref(),
        EnvironmentInfo::capture(env.deployment_mode),
    )
    .with_context("diagnose");

    let dir = config.build.project_path(&config.deploy.error_report_dir);
    let path = write_error_report(&dir, &report)?;

    println!("Category: {}", report.category);
    println!("Tips:");
    for tip in &report.tips {
        println!("  - {tip}");
    }
    println!("Report:   {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Newsletter
// ---------------------------------------------------------------------------

async fn cmd_subscribe(config_path: Option<&Path>, email: &str, tags: &[String]) -> Result<()> {
    let config = resolve_config(config_path)?;
    let client = NewsletterClient::from_config(&config.newsletter)?;
    let referrer = config.site.base()?.to_string();

    match client.subscribe(email, tags, Some(&referrer)).await? {
        SubscribeOutcome::Subscribed => println!("Subscribed {}.", email.trim()),
        SubscribeOutcome::AlreadySubscribed => {
            warn!("address already subscribed");
            println!("{} is already subscribed.", email.trim());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let path = init_config(&cwd)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Site build progress using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn artifact_written(&self, filename: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {filename}"));
    }

    fn done(&self, _result: &SiteBuildResult) {
        self.spinner.finish_and_clear();
    }
}
