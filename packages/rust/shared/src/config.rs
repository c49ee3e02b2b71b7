//! Application configuration for coinpress.
//!
//! The config file is `coinpress.toml` in the site's working directory, with
//! `~/.coinpress/coinpress.toml` as a user-level fallback.
//! CLI flags and environment variables override config file values, which
//! override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoinpressError, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "coinpress.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coinpress";

// ---------------------------------------------------------------------------
// Config structs (matching coinpress.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub newsletter: NewsletterConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title used in feeds and the manifest.
    #[serde(default = "default_site_title")]
    pub title: String,

    #[serde(default = "default_site_description")]
    pub description: String,

    /// Absolute public URL of the deployed site.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Extra static routes listed in the sitemap (e.g. `/about`).
    #[serde(default = "default_static_pages")]
    pub static_pages: Vec<String>,

    /// Maximum number of items in `rss.xml`.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_site_title(),
            description: default_site_description(),
            base_url: default_base_url(),
            language: default_language(),
            static_pages: default_static_pages(),
            feed_limit: default_feed_limit(),
        }
    }
}

impl SiteConfig {
    /// Parse `base_url`, normalized to end with a slash so joins keep the path.
    pub fn base(&self) -> Result<Url> {
        let raw = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        Url::parse(&raw).map_err(|e| {
            CoinpressError::config(format!("invalid site.base_url '{}': {e}", self.base_url))
        })
    }
}

fn default_site_title() -> String {
    "Coinpress".into()
}
fn default_site_description() -> String {
    "Cryptocurrency news, analysis and guides".into()
}
fn default_base_url() -> String {
    "https://example.com".into()
}
fn default_language() -> String {
    "en-us".into()
}
fn default_static_pages() -> Vec<String> {
    vec!["/articles".into(), "/about".into(), "/newsletter".into()]
}
fn default_feed_limit() -> usize {
    20
}

/// `[content]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Directory holding `*.md` / `*.mdx` article files.
    #[serde(default = "default_content_dir")]
    pub dir: String,

    /// Reading speed used for the reading-time estimate.
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,

    /// Number of related articles generated per article.
    #[serde(default = "default_related_limit")]
    pub related_limit: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            dir: default_content_dir(),
            words_per_minute: default_words_per_minute(),
            related_limit: default_related_limit(),
        }
    }
}

fn default_content_dir() -> String {
    "content/posts".into()
}
fn default_words_per_minute() -> u32 {
    200
}
fn default_related_limit() -> usize {
    3
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results for a query.
    #[serde(default = "default_search_limit")]
    pub limit: usize,

    /// Path prefix of article pages, used to build result URLs.
    #[serde(default = "default_article_base_path")]
    pub article_base_path: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            article_base_path: default_article_base_path(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}
fn default_article_base_path() -> String {
    "/articles".into()
}

/// `[build]` section: the external static-export build and site data output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Project directory the build tool runs in.
    #[serde(default = "default_project_dir")]
    pub project_dir: String,

    /// Build tool program.
    #[serde(default = "default_build_program")]
    pub program: String,

    /// Build tool arguments.
    #[serde(default = "default_build_args")]
    pub args: Vec<String>,

    /// File whose presence and size prove the build produced a site
    /// (relative to `project_dir`).
    #[serde(default = "default_marker_file")]
    pub marker_file: String,

    /// The marker must be strictly larger than this many bytes.
    #[serde(default = "default_min_marker_bytes")]
    pub min_marker_bytes: u64,

    /// Build cache directory cleared by the `basic` strategy (relative to `project_dir`).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Where `build-fallback-report.json` is written (relative to `project_dir`).
    #[serde(default = "default_fallback_report")]
    pub report_file: String,

    /// Directory receiving generated site data (relative to `project_dir`).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            program: default_build_program(),
            args: default_build_args(),
            marker_file: default_marker_file(),
            min_marker_bytes: default_min_marker_bytes(),
            cache_dir: default_cache_dir(),
            report_file: default_fallback_report(),
            data_dir: default_data_dir(),
        }
    }
}

impl BuildConfig {
    /// Resolve a path relative to the project directory.
    pub fn project_path(&self, relative: &str) -> PathBuf {
        Path::new(&self.project_dir).join(relative)
    }
}

fn default_project_dir() -> String {
    ".".into()
}
fn default_build_program() -> String {
    "npm".into()
}
fn default_build_args() -> Vec<String> {
    vec!["run".into(), "build".into()]
}
fn default_marker_file() -> String {
    "out/index.html".into()
}
fn default_min_marker_bytes() -> u64 {
    1024
}
fn default_cache_dir() -> String {
    ".next/cache".into()
}
fn default_fallback_report() -> String {
    "build-fallback-report.json".into()
}
fn default_data_dir() -> String {
    "public/data".into()
}

/// `[deploy]` section: the deployment error handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Full passes through the fallback chain before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Files that must exist after a build (relative to `project_dir`).
    #[serde(default = "default_required_outputs")]
    pub required_outputs: Vec<String>,

    /// Where `deployment-error-handling-report.json` is written.
    #[serde(default = "default_deploy_report")]
    pub report_file: String,

    /// Directory for timestamped error reports.
    #[serde(default = "default_error_report_dir")]
    pub error_report_dir: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            required_outputs: default_required_outputs(),
            report_file: default_deploy_report(),
            error_report_dir: default_error_report_dir(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_required_outputs() -> Vec<String> {
    vec!["out/index.html".into()]
}
fn default_deploy_report() -> String {
    "deployment-error-handling-report.json".into()
}
fn default_error_report_dir() -> String {
    "error-reports".into()
}

/// `[newsletter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterConfig {
    /// Subscriber endpoint of the mail API.
    #[serde(default = "default_newsletter_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_newsletter_key_env")]
    pub api_key_env: String,

    /// Tags attached to every signup.
    #[serde(default)]
    pub default_tags: Vec<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_newsletter_timeout")]
    pub timeout_secs: u64,
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            endpoint: default_newsletter_endpoint(),
            api_key_env: default_newsletter_key_env(),
            default_tags: Vec::new(),
            timeout_secs: default_newsletter_timeout(),
        }
    }
}

fn default_newsletter_endpoint() -> String {
    "https://api.buttondown.email/v1/subscribers".into()
}
fn default_newsletter_key_env() -> String {
    "NEWSLETTER_API_KEY".into()
}
fn default_newsletter_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the user config directory (`~/.coinpress/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CoinpressError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the user config file (`~/.coinpress/coinpress.toml`).
pub fn user_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config.
///
/// Looks for `coinpress.toml` in the working directory, then in the user
/// config directory. Returns defaults if neither exists.
pub fn load_config() -> Result<AppConfig> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return load_config_from(&local);
    }

    match user_config_path() {
        Ok(path) if path.exists() => load_config_from(&path),
        _ => {
            tracing::debug!("config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CoinpressError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CoinpressError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    // Fail early on an unusable base URL rather than at feed generation.
    config.site.base()?;
    Ok(config)
}

/// Write a default config file into `dir`. Refuses to overwrite an existing file.
/// Returns the path to the created file.
pub fn init_config(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| CoinpressError::io(dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(CoinpressError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CoinpressError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CoinpressError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
