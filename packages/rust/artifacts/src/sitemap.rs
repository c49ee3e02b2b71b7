//! `sitemap.xml` rendering.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use coinpress_shared::{Article, Result};

use crate::urls::{SiteUrls, tag_slug};
use crate::xml_escape;

/// Render a sitemap covering the root, static pages, articles and tag pages.
#[instrument(skip_all, fields(articles = articles.len(), static_pages = static_pages.len()))]
pub fn render_sitemap(
    urls: &SiteUrls,
    articles: &[Article],
    static_pages: &[String],
) -> Result<String> {
    let newest = articles.iter().map(Article::last_modified).max();

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");

    push_url(&mut xml, &urls.root(), newest);
    for page in static_pages {
        push_url(&mut xml, &urls.page(page)?, None);
    }

    let mut sorted: Vec<&Article> = articles.iter().collect();
    sorted.sort_by(|a, b| a.slug.cmp(&b.slug));
    for article in &sorted {
        push_url(
            &mut xml,
            &urls.article(&article.slug)?,
            Some(article.last_modified()),
        );
    }

    // One entry per tag page, dated by its most recently modified article.
    let mut tags: BTreeMap<String, (String, DateTime<Utc>)> = BTreeMap::new();
    for article in articles {
        for tag in &article.tags {
            let modified = article.last_modified();
            tags.entry(tag_slug(tag))
                .and_modify(|(_, latest)| *latest = (*latest).max(modified))
                .or_insert_with(|| (tag.clone(), modified));
        }
    }
    for (tag, latest) in tags.values() {
        push_url(&mut xml, &urls.tag(tag)?, Some(*latest));
    }

    xml.push_str("</urlset>\n");

    debug!(tags = tags.len(), bytes = xml.len(), "sitemap rendered");
    Ok(xml)
}

fn push_url(xml: &mut String, loc: &str, lastmod: Option<DateTime<Utc>>) {
    xml.push_str("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", xml_escape(loc)));
    if let Some(ts) = lastmod {
        xml.push_str(&format!("    <lastmod>{}</lastmod>\n", ts.format("%Y-%m-%d")));
    }
    xml.push_str("  </url>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use coinpress_shared::SiteConfig;

    fn article(slug: &str, tags: &[&str], day: u32) -> Article {
        Article {
            slug: slug.into(),
            title: slug.into(),
            description: "d".into(),
            author: "a".into(),
            published_at: Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap(),
            updated_at: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: None,
            featured: false,
            hero_image: None,
            reading_time: 1,
            content: String::new(),
        }
    }

    fn urls() -> SiteUrls {
        let site = SiteConfig {
            base_url: "https://example.com".into(),
            ..SiteConfig::default()
        };
        SiteUrls::new(&site, "/articles").unwrap()
    }

    #[test]
    fn lists_root_pages_articles_and_tags() {
        let articles = vec![
            article("halving", &["Bitcoin"], 10),
            article("etf", &["bitcoin", "Layer 2"], 20),
        ];
        let xml = render_sitemap(&urls(), &articles, &["/about".to_string()]).unwrap();

        assert!(xml.contains("<loc>https://example.com/</loc>\n    <lastmod>2024-02-20</lastmod>"));
        assert!(xml.contains("<loc>https://example.com/about</loc>"));
        assert!(xml.contains(
            "<loc>https://example.com/articles/halving</loc>\n    <lastmod>2024-02-10</lastmod>"
        ));
        assert!(xml.contains("<loc>https://example.com/tags/layer-2</loc>"));
        // Case variants of a tag collapse into one page dated by the newest article.
        assert_eq!(xml.matches("/tags/bitcoin<").count(), 1);
        assert!(xml.contains(
            "<loc>https://example.com/tags/bitcoin</loc>\n    <lastmod>2024-02-20</lastmod>"
        ));
    }

    #[test]
    fn empty_site_still_has_root() {
        let xml = render_sitemap(&urls(), &[], &[]).unwrap();
        assert_eq!(xml.matches("<url>").count(), 1);
        assert!(!xml.contains("<lastmod>"));
    }
}
