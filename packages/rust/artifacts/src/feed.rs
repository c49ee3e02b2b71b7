//! RSS 2.0 feed rendering.

use chrono::Utc;
use tracing::{debug, instrument};

use coinpress_shared::{Article, Result, SiteConfig};

use crate::urls::SiteUrls;
use crate::xml_escape;

/// Render `rss.xml` for the newest `site.feed_limit` articles.
///
/// `feed_path` is the site-relative location of the feed itself, used for
/// the `atom:link rel="self"` element.
#[instrument(skip_all, fields(articles = articles.len()))]
pub fn render_rss(
    site: &SiteConfig,
    urls: &SiteUrls,
    articles: &[Article],
    feed_path: &str,
) -> Result<String> {
    let mut items: Vec<&Article> = articles.iter().collect();
    items.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.slug.cmp(&b.slug))
    });
    items.truncate(site.feed_limit);

    let last_build = items
        .first()
        .map(|a| a.last_modified())
        .unwrap_or_else(Utc::now);

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(
        "<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n",
    );
    xml.push_str("  <channel>\n");
    xml.push_str(&format!("    <title>{}</title>\n", xml_escape(&site.title)));
    xml.push_str(&format!("    <link>{}</link>\n", xml_escape(&urls.root())));
    xml.push_str(&format!(
        "    <description>{}</description>\n",
        xml_escape(&site.description)
    ));
    xml.push_str(&format!("    <language>{}</language>\n", xml_escape(&site.language)));
    xml.push_str(&format!(
        "    <lastBuildDate>{}</lastBuildDate>\n",
        last_build.to_rfc2822()
    ));
    xml.push_str(&format!(
        "    <atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\"/>\n",
        xml_escape(&urls.page(feed_path)?)
    ));

    for article in &items {
        let link = xml_escape(&urls.article(&article.slug)?);
        xml.push_str("    <item>\n");
        xml.push_str(&format!("      <title>{}</title>\n", xml_escape(&article.title)));
        xml.push_str(&format!("      <link>{link}</link>\n"));
        xml.push_str(&format!("      <guid isPermaLink=\"true\">{link}</guid>\n"));
        xml.push_str(&format!(
            "      <pubDate>{}</pubDate>\n",
            article.published_at.to_rfc2822()
        ));
        xml.push_str(&format!(
            "      <description>{}</description>\n",
            xml_escape(&article.description)
        ));
        xml.push_str(&format!(
            "      <dc:creator>{}</dc:creator>\n",
            xml_escape(&article.author)
        ));
        for tag in &article.tags {
            xml.push_str(&format!("      <category>{}</category>\n", xml_escape(tag)));
        }
        xml.push_str("    </item>\n");
    }

    xml.push_str("  </channel>\n</rss>\n");

    debug!(items = items.len(), bytes = xml.len(), "rss rendered");
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(slug: &str, day: u32) -> Article {
        Article {
            slug: slug.into(),
            title: format!("Title {slug}"),
            description: "Prices & <volatility>".into(),
            author: "Ada".into(),
            published_at: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
            updated_at: None,
            tags: vec!["Bitcoin".into(), "Markets".into()],
            category: None,
            featured: false,
            hero_image: None,
            reading_time: 2,
            content: String::new(),
        }
    }

    fn site(limit: usize) -> (SiteConfig, SiteUrls) {
        let site = SiteConfig {
            title: "Chain & Coin".into(),
            base_url: "https://example.com".into(),
            feed_limit: limit,
            ..SiteConfig::default()
        };
        let urls = SiteUrls::new(&site, "/articles").unwrap();
        (site, urls)
    }

    #[test]
    fn renders_channel_and_items_newest_first() {
        let (site, urls) = site(10);
        let xml = render_rss(&site, &urls, &[article("old", 1), article("new", 19)], "/rss.xml")
            .unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<title>Chain &amp; Coin</title>"));
        assert!(xml.contains("href=\"https://example.com/rss.xml\""));
        let new_pos = xml.find("https://example.com/articles/new").unwrap();
        let old_pos = xml.find("https://example.com/articles/old").unwrap();
        assert!(new_pos < old_pos);
        assert!(xml.contains("<pubDate>Sun, 19 May 2024 12:00:00 +0000</pubDate>"));
        assert!(xml.contains("<category>Bitcoin</category>"));
    }

    #[test]
    fn escapes_item_text() {
        let (site, urls) = site(10);
        let xml = render_rss(&site, &urls, &[article("a", 1)], "/rss.xml").unwrap();
        assert!(xml.contains("Prices &amp; &lt;volatility&gt;"));
        assert!(!xml.contains("<volatility>"));
    }

    #[test]
    fn respects_feed_limit() {
        let (site, urls) = site(2);
        let articles: Vec<_> = (1..=5).map(|d| article(&format!("a{d}"), d)).collect();
        let xml = render_rss(&site, &urls, &articles, "/rss.xml").unwrap();
        assert_eq!(xml.matches("<item>").count(), 2);
        assert!(xml.contains("articles/a5"));
        assert!(xml.contains("articles/a4"));
        assert!(!xml.contains("articles/a3"));
    }

    #[test]
    fn empty_feed_is_valid() {
        let (site, urls) = site(10);
        let xml = render_rss(&site, &urls, &[], "/rss.xml").unwrap();
        assert!(xml.contains("<channel>"));
        assert!(!xml.contains("<item>"));
    }
}
