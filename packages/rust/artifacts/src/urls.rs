//! Absolute URL construction for feeds and sitemaps.

use url::Url;

use coinpress_shared::{CoinpressError, Result, SiteConfig};

/// Builds absolute URLs for site pages from the configured base URL.
#[derive(Debug, Clone)]
pub struct SiteUrls {
    base: Url,
    article_base_path: String,
}

impl SiteUrls {
    pub fn new(site: &SiteConfig, article_base_path: &str) -> Result<Self> {
        Ok(Self {
            base: site.base()?,
            article_base_path: article_base_path.trim_matches('/').to_string(),
        })
    }

    /// The site root.
    pub fn root(&self) -> String {
        self.base.to_string()
    }

    /// Absolute URL of a site-relative path such as `/about`.
    pub fn page(&self, path: &str) -> Result<String> {
        self.base
            .join(path.trim_start_matches('/'))
            .map(String::from)
            .map_err(|e| CoinpressError::config(format!("cannot build URL for '{path}': {e}")))
    }

    pub fn article(&self, slug: &str) -> Result<String> {
        self.page(&format!("{}/{slug}", self.article_base_path))
    }

    pub fn tag(&self, tag: &str) -> Result<String> {
        self.page(&format!("tags/{}", tag_slug(tag)))
    }
}

/// URL path segment for a tag: lowercase, whitespace runs become `-`.
pub fn tag_slug(tag: &str) -> String {
    tag.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(base: &str) -> SiteUrls {
        let site = SiteConfig {
            base_url: base.into(),
            ..SiteConfig::default()
        };
        SiteUrls::new(&site, "/articles").expect("valid base")
    }

    #[test]
    fn article_and_page_urls() {
        let u = urls("https://news.example.com");
        assert_eq!(u.root(), "https://news.example.com/");
        assert_eq!(
            u.article("eth-merge").unwrap(),
            "https://news.example.com/articles/eth-merge"
        );
        assert_eq!(u.page("/about").unwrap(), "https://news.example.com/about");
    }

    #[test]
    fn keeps_base_path() {
        let u = urls("https://example.com/blog");
        assert_eq!(u.article("x").unwrap(), "https://example.com/blog/articles/x");
    }

    #[test]
    fn tag_urls_are_slugged_and_encoded() {
        let u = urls("https://example.com");
        assert_eq!(u.tag("Layer 2").unwrap(), "https://example.com/tags/layer-2");
        assert_eq!(u.tag("Ça va").unwrap(), "https://example.com/tags/%C3%A7a-va");
    }
}
