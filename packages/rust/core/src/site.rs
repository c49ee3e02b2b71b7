//! End-to-end site data build: content → related → search → feeds → manifest.
//!
//! Output layout:
//! ```text
//! <output_dir>/
//! ├── articles.json      (article summaries, newest first)
//! ├── related.json       (slug → related summaries)
//! ├── search-index.json  (client-side search index)
//! ├── tags.json          (tag usage counts)
//! ├── rss.xml
//! ├── sitemap.xml
//! └── manifest.json      (checksums of everything above)
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use coinpress_artifacts::SiteUrls;
use coinpress_content::LoadOptions;
use coinpress_search::SearchIndex;
use coinpress_shared::{
    AppConfig, Article, ArticleSummary, ArtifactMeta, CURRENT_SCHEMA_VERSION, CoinpressError,
    Result, SearchConfig, SiteConfig, SiteManifest,
};

use crate::{catalog, related};

pub const MANIFEST_FILE: &str = "manifest.json";
const FEED_FILE: &str = "rss.xml";

/// Configuration for [`build_site`].
#[derive(Debug, Clone)]
pub struct SiteBuildConfig {
    /// Directory of article files.
    pub content_dir: PathBuf,
    /// Directory receiving the generated data.
    pub output_dir: PathBuf,
    pub load: LoadOptions,
    pub site: SiteConfig,
    pub search: SearchConfig,
    /// Related articles generated per article.
    pub related_limit: usize,
    /// Tool version string recorded in the manifest.
    pub tool_version: String,
}

impl SiteBuildConfig {
    /// Resolve paths and options from the application config.
    pub fn from_app(config: &AppConfig, tool_version: &str) -> Self {
        Self {
            content_dir: config.build.project_path(&config.content.dir),
            output_dir: config.build.project_path(&config.build.data_dir),
            load: LoadOptions {
                words_per_minute: config.content.words_per_minute,
            },
            site: config.site.clone(),
            search: config.search.clone(),
            related_limit: config.content.related_limit,
            tool_version: tool_version.to_string(),
        }
    }
}

/// Result of [`build_site`].
#[derive(Debug)]
pub struct SiteBuildResult {
    pub output_dir: PathBuf,
    pub article_count: usize,
    pub artifacts: Vec<ArtifactMeta>,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each artifact is written.
    fn artifact_written(&self, filename: &str, current: usize, total: usize);
    /// Called when the build completes.
    fn done(&self, result: &SiteBuildResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn artifact_written(&self, _filename: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &SiteBuildResult) {}
}

/// Run the full site data build.
///
/// 1. Load and validate content
/// 2. Compute related articles
/// 3. Build the search index
/// 4. Render feeds
/// 5. Write artifacts and the manifest
#[instrument(skip_all, fields(content = %config.content_dir.display(), out = %config.output_dir.display()))]
pub fn build_site(config: &SiteBuildConfig, progress: &dyn ProgressReporter) -> Result<SiteBuildResult> {
    let start = Instant::now();

    // --- Phase 1: Content ---
    progress.phase("Loading content");
    let articles = coinpress_content::load_dir(&config.content_dir, &config.load)?;

    // --- Phase 2: Derived data ---
    progress.phase("Computing related articles");
    let related = related_map(&articles, config.related_limit);

    progress.phase("Building search index");
    let index = SearchIndex::build(&articles, &config.search.article_base_path);

    progress.phase("Rendering feeds");
    let urls = SiteUrls::new(&config.site, &config.search.article_base_path)?;
    let rss = coinpress_artifacts::render_rss(&config.site, &urls, &articles, FEED_FILE)?;
    let sitemap =
        coinpress_artifacts::render_sitemap(&urls, &articles, &config.site.static_pages)?;

    let summaries: Vec<ArticleSummary> = articles.iter().map(Article::summary).collect();

    let outputs: Vec<(&str, String)> = vec![
        ("articles.json", to_json(&summaries)?),
        ("related.json", to_json(&related)?),
        ("search-index.json", index.to_json()?),
        ("tags.json", to_json(&catalog::tag_counts(&articles))?),
        (FEED_FILE, rss),
        ("sitemap.xml", sitemap),
    ];

    // --- Phase 3: Write ---
    progress.phase("Writing site data");
    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| CoinpressError::io(&config.output_dir, e))?;

    let total = outputs.len();
    let mut metas = Vec::with_capacity(total);
    for (i, (filename, content)) in outputs.iter().enumerate() {
        metas.push(write_artifact(&config.output_dir, filename, content)?);
        progress.artifact_written(filename, i + 1, total);
    }

    let manifest = SiteManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        site: config.site.title.clone(),
        tool_version: config.tool_version.clone(),
        generated_at: Utc::now(),
        article_count: articles.len(),
        artifacts: metas.clone(),
    };
    write_artifact(&config.output_dir, MANIFEST_FILE, &to_json(&manifest)?)?;

    let result = SiteBuildResult {
        output_dir: config.output_dir.clone(),
        article_count: articles.len(),
        artifacts: metas,
        elapsed: start.elapsed(),
    };

    info!(
        articles = result.article_count,
        artifacts = result.artifacts.len(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "site data build complete"
    );
    progress.done(&result);

    Ok(result)
}

/// Related summaries for every article, keyed by slug.
pub fn related_map(articles: &[Article], limit: usize) -> BTreeMap<String, Vec<ArticleSummary>> {
    articles
        .iter()
        .map(|article| {
            let related = related::related_articles(article, articles, limit)
                .into_iter()
                .map(Article::summary)
                .collect();
            (article.slug.clone(), related)
        })
        .collect()
}

/// Verify that a generated data directory is complete and untampered.
pub fn validate_output(output_dir: &Path) -> Result<SiteManifest> {
    let manifest_path = output_dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| CoinpressError::io(&manifest_path, e))?;
    let manifest: SiteManifest = serde_json::from_str(&content)
        .map_err(|e| CoinpressError::validation(format!("invalid {MANIFEST_FILE}: {e}")))?;

    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(CoinpressError::validation(format!(
            "unsupported schema_version: {} (expected {CURRENT_SCHEMA_VERSION})",
            manifest.schema_version
        )));
    }

    for artifact in &manifest.artifacts {
        let path = output_dir.join(&artifact.filename);
        let bytes = std::fs::read(&path).map_err(|e| CoinpressError::io(&path, e))?;
        if sha256_hex(&bytes) != artifact.sha256 {
            return Err(CoinpressError::validation(format!(
                "{} does not match its manifest checksum",
                artifact.filename
            )));
        }
    }

    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write one artifact atomically (temp file, then rename) and checksum it.
fn write_artifact(dir: &Path, filename: &str, content: &str) -> Result<ArtifactMeta> {
    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, content).map_err(|e| CoinpressError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| CoinpressError::io(&target, e))?;

    debug!(file = %filename, size = content.len(), "wrote artifact");

    Ok(ArtifactMeta {
        filename: filename.to_string(),
        sha256: sha256_hex(content.as_bytes()),
        size_bytes: content.len(),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn to_json<T: serde::Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| CoinpressError::validation(format!("JSON serialization failed: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
