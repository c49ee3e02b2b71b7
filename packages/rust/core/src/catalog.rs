//! Read-only queries over a loaded set of articles.
//!
//! All functions expect nothing about input order and return newest first
//! unless noted.

use std::collections::HashMap;

use coinpress_shared::{Article, TagCount, eq_fold};

/// Look up an article by slug.
pub fn find<'a>(articles: &'a [Article], slug: &str) -> Option<&'a Article> {
    articles.iter().find(|a| a.slug == slug)
}

/// The `limit` most recent articles.
pub fn recent(articles: &[Article], limit: usize) -> Vec<&Article> {
    let mut out = newest_first(articles.iter());
    out.truncate(limit);
    out
}

/// Featured articles, at most `limit`.
pub fn featured(articles: &[Article], limit: usize) -> Vec<&Article> {
    let mut out = newest_first(articles.iter().filter(|a| a.featured));
    out.truncate(limit);
    out
}

/// Articles carrying `tag` (case-insensitive).
pub fn by_tag<'a>(articles: &'a [Article], tag: &str) -> Vec<&'a Article> {
    let tag = tag.trim();
    newest_first(articles.iter().filter(|a| a.has_tag(tag)))
}

/// Articles in `category` (case-insensitive).
pub fn by_category<'a>(articles: &'a [Article], category: &str) -> Vec<&'a Article> {
    let category = category.trim();
    newest_first(articles.iter().filter(|a| {
        a.category
            .as_deref()
            .is_some_and(|c| eq_fold(c.trim(), category))
    }))
}

/// Tag usage counts, most used first, then alphabetical.
///
/// Case variants are merged under the first spelling seen in newest-first order.
pub fn tag_counts(articles: &[Article]) -> Vec<TagCount> {
    let mut counts: HashMap<String, TagCount> = HashMap::new();

    for article in newest_first(articles.iter()) {
        for tag in &article.tags {
            counts
                .entry(tag.to_lowercase())
                .or_insert_with(|| TagCount {
                    tag: tag.clone(),
                    count: 0,
                })
                .count += 1;
        }
    }

    let mut out: Vec<TagCount> = counts.into_values().collect();
    out.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.tag.to_lowercase().cmp(&b.tag.to_lowercase()))
    });
    out
}

fn newest_first<'a>(iter: impl Iterator<Item = &'a Article>) -> Vec<&'a Article> {
    let mut out: Vec<&Article> = iter.collect();
    out.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.slug.cmp(&b.slug))
    });
    out
}
