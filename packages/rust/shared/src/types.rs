//! Core domain types for coinpress sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for the generated `manifest.json`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// A single article loaded from a front-matter content file.
///
/// Articles are built once per load and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Unique key, derived from the file stem.
    pub slug: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Tags in declaration order, deduplicated case-insensitively.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image: Option<String>,
    /// Estimated reading time in whole minutes (at least 1).
    pub reading_time: u32,
    /// Raw body text following the front matter.
    pub content: String,
}

/// Unicode case-insensitive equality, used for tags, authors and categories.
pub fn eq_fold(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

impl Article {
    /// Last modification time: `updated_at` when present, otherwise `published_at`.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.published_at)
    }

    /// Case-insensitive tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| eq_fold(t, tag))
    }

    /// Metadata view without the body.
    pub fn summary(&self) -> ArticleSummary {
        ArticleSummary::from(self)
    }
}

/// An article without its body, as shipped in `articles.json` and `related.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image: Option<String>,
    pub reading_time: u32,
}

impl From<&Article> for ArticleSummary {
    fn from(a: &Article) -> Self {
        Self {
            slug: a.slug.clone(),
            title: a.title.clone(),
            description: a.description.clone(),
            author: a.author.clone(),
            published_at: a.published_at,
            updated_at: a.updated_at,
            tags: a.tags.clone(),
            category: a.category.clone(),
            featured: a.featured,
            hero_image: a.hero_image.clone(),
            reading_time: a.reading_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// A snippet of one matched field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    /// Field name (`title`, `tags`, `description`, `content`).
    pub field: String,
    pub snippet: String,
}

/// A single ranked search hit. Ephemeral, produced per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<FieldMatch>,
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// A tag with the number of articles carrying it (`tags.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Site manifest
// ---------------------------------------------------------------------------

/// Metadata for a single generated artifact file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// The `manifest.json` written next to the generated site data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteManifest {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// Site title from config.
    pub site: String,
    /// Tool version that generated the data.
    pub tool_version: String,
    pub generated_at: DateTime<Utc>,
    pub article_count: usize,
    pub artifacts: Vec<ArtifactMeta>,
}
