//! Shared types, error model, and configuration for coinpress.
//!
//! This crate is the foundation depended on by all other coinpress crates.
//! It provides:
//! - [`CoinpressError`], the unified error type
//! - Domain types ([`Article`], [`ArticleSummary`], [`SearchResult`], [`SiteManifest`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, ContentConfig, DeployConfig, NewsletterConfig, SearchConfig,
    SiteConfig, config_dir, init_config, load_config, load_config_from, user_config_path,
};
pub use error::{CoinpressError, Result};
pub use types::{
    Article, ArticleSummary, ArtifactMeta, CURRENT_SCHEMA_VERSION, FieldMatch, SearchResult,
    SiteManifest, TagCount, eq_fold,
};
