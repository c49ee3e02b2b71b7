//! Article loading from front-matter content files.
//!
//! Reads `*.md` / `*.mdx` files, parses their front matter, validates the
//! required fields and dates, and derives slug, reading time and tags.

pub mod frontmatter;
pub mod text;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, instrument};

use coinpress_shared::{Article, CoinpressError, Result, eq_fold};

pub use frontmatter::{FieldValue, FrontMatter};
pub use text::{count_words, plain_text, reading_time};

/// Front-matter fields every article must declare.
pub const REQUIRED_FIELDS: [&str; 4] = ["title", "description", "author", "publishedAt"];

/// File extensions treated as article sources.
const CONTENT_EXTENSIONS: [&str; 2] = ["md", "mdx"];

/// Options for article loading.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Reading speed used for the reading-time estimate.
    pub words_per_minute: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            words_per_minute: 200,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load every article in `dir`, newest first.
///
/// Fails on the first invalid file, and when two files map to the same slug.
#[instrument(skip(opts), fields(dir = %dir.display()))]
pub fn load_dir(dir: &Path, opts: &LoadOptions) -> Result<Vec<Article>> {
    let files = content_files(dir)?;
    let mut articles = Vec::with_capacity(files.len());
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for path in files {
        let article = load_file(&path, opts)?;

        if let Some(previous) = seen.get(&article.slug) {
            return Err(CoinpressError::validation(format!(
                "duplicate slug '{}': {} and {}",
                article.slug,
                previous.display(),
                path.display()
            )));
        }
        seen.insert(article.slug.clone(), path);
        articles.push(article);
    }

    sort_newest_first(&mut articles);
    info!(count = articles.len(), "articles loaded");

    Ok(articles)
}

/// Load and validate a single article file.
pub fn load_file(path: &Path, opts: &LoadOptions) -> Result<Article> {
    let raw = std::fs::read_to_string(path).map_err(|e| CoinpressError::io(path, e))?;
    let slug = slug_from_path(path)?;
    parse_article(&path.display().to_string(), &slug, &raw, opts)
}

/// Parse an article from raw file text.
///
/// `source` names the file in error messages.
pub fn parse_article(source: &str, slug: &str, raw: &str, opts: &LoadOptions) -> Result<Article> {
    let (block, body) = frontmatter::split(raw).ok_or_else(|| {
        CoinpressError::validation(format!("{source}: missing front matter block"))
    })?;

    let fm = frontmatter::parse(block)
        .map_err(|e| CoinpressError::validation(format!("{source}: {e}")))?;

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| fm.text(field).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(CoinpressError::validation(format!(
            "{source}: missing required front matter field(s): {}",
            missing.join(", ")
        )));
    }

    // Presence was checked above.
    let required = |key: &str| fm.text(key).unwrap_or_default();

    let published_at = parse_date_field(source, "publishedAt", &required("publishedAt"))?;
    let updated_at = fm
        .text("updatedAt")
        .map(|raw| parse_date_field(source, "updatedAt", &raw))
        .transpose()?;

    let featured = match fm.text("featured") {
        Some(raw) => parse_bool(&raw).ok_or_else(|| {
            CoinpressError::validation(format!(
                "{source}: invalid boolean for featured: '{raw}'"
            ))
        })?,
        None => false,
    };

    let words = count_words(body);
    let article = Article {
        slug: slug.to_string(),
        title: required("title"),
        description: required("description"),
        author: required("author"),
        published_at,
        updated_at,
        tags: dedup_tags(fm.list("tags")),
        category: fm.text("category"),
        featured,
        hero_image: fm.text("heroImage"),
        reading_time: reading_time(words, opts.words_per_minute),
        content: body.trim().to_string(),
    };

    debug!(slug, words, tags = article.tags.len(), "parsed article");
    Ok(article)
}

/// Parse a front-matter date: RFC 3339, `YYYY-MM-DDTHH:MM:SS` (UTC) or
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Derive a URL-safe slug from a content file name.
pub fn slug_from_path(path: &Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            CoinpressError::validation(format!("{}: file name is not valid UTF-8", path.display()))
        })?;

    let slug: String = stem
        .trim()
        .to_lowercase()
        .replace([' ', '_'], "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect();

    if slug.is_empty() {
        return Err(CoinpressError::validation(format!(
            "{}: cannot derive a slug from the file name",
            path.display()
        )));
    }
    Ok(slug)
}

/// Sort articles by publish date, newest first, slug as tie-breaker.
pub fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.slug.cmp(&b.slug))
    });
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// List content files directly under `dir`, sorted by path.
fn content_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CoinpressError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CoinpressError::io(dir, e))?;
        let path = entry.path();
        let is_content = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if path.is_file() && is_content {
            files.push(path);
        }
    }

    files.sort();
    debug!(count = files.len(), "content files found");
    Ok(files)
}

fn parse_date_field(source: &str, field: &str, raw: &str) -> Result<DateTime<Utc>> {
    parse_date(raw).ok_or_else(|| {
        CoinpressError::validation(format!("{source}: invalid date for {field}: '{raw}'"))
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Trim tags, drop empties and case-insensitive duplicates, keep first spelling.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if tag.is_empty() || out.iter().any(|t| eq_fold(t, &tag)) {
            continue;
        }
        out.push(tag);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
