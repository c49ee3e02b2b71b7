//! Article relatedness scoring.
//!
//! score(target, candidate) is a weighted sum:
//!
//! | signal | weight |
//! |---|---|
//! | each shared tag (case-insensitive) | 10 |
//! | same author | 5 |
//! | same category | 3 |
//! | published within 30 days | up to 2, linear decay |
//! | candidate is featured | 1, only on top of another signal |
//!
//! Candidates scoring above zero are ranked first; remaining slots are
//! filled with featured, then most recent, articles.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, instrument};

use coinpress_shared::{Article, eq_fold};

pub const SHARED_TAG_WEIGHT: f64 = 10.0;
pub const SAME_AUTHOR_WEIGHT: f64 = 5.0;
pub const SAME_CATEGORY_WEIGHT: f64 = 3.0;
pub const RECENCY_MAX_BONUS: f64 = 2.0;
pub const RECENCY_WINDOW_DAYS: f64 = 30.0;
pub const FEATURED_BONUS: f64 = 1.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Score of one candidate against a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relatedness {
    pub score: f64,
    pub shared_tags: usize,
}

/// Compute the relatedness of `candidate` to `target`.
pub fn score(target: &Article, candidate: &Article) -> Relatedness {
    let shared_tags = shared_tag_count(target, candidate);

    let mut score = SHARED_TAG_WEIGHT * shared_tags as f64;

    if eq_fold(target.author.trim(), candidate.author.trim()) {
        score += SAME_AUTHOR_WEIGHT;
    }

    if let (Some(a), Some(b)) = (&target.category, &candidate.category) {
        if eq_fold(a.trim(), b.trim()) {
            score += SAME_CATEGORY_WEIGHT;
        }
    }

    score += recency_bonus(target, candidate);

    if score > 0.0 && candidate.featured {
        score += FEATURED_BONUS;
    }

    Relatedness { score, shared_tags }
}

/// Linear bonus from [`RECENCY_MAX_BONUS`] at zero distance down to 0 at
/// [`RECENCY_WINDOW_DAYS`] or more.
pub fn recency_bonus(target: &Article, candidate: &Article) -> f64 {
    let seconds = (target.published_at - candidate.published_at)
        .num_seconds()
        .unsigned_abs() as f64;
    let days = seconds / SECONDS_PER_DAY;

    if days >= RECENCY_WINDOW_DAYS {
        0.0
    } else {
        RECENCY_MAX_BONUS * (1.0 - days / RECENCY_WINDOW_DAYS)
    }
}

/// Up to `limit` articles from `corpus` related to `target`, best first.
///
/// Never includes the target itself (matched by slug). When fewer than
/// `limit` candidates score above zero, the rest is filled with featured
/// articles and then the most recent ones.
#[instrument(skip_all, fields(target = %target.slug, corpus = corpus.len(), limit = limit))]
pub fn related_articles<'a>(
    target: &Article,
    corpus: &'a [Article],
    limit: usize,
) -> Vec<&'a Article> {
    if limit == 0 || corpus.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(&Article, Relatedness)> = corpus
        .iter()
        .filter(|c| c.slug != target.slug)
        .map(|c| (c, score(target, c)))
        .filter(|(_, r)| r.score > 0.0)
        .collect();

    scored.sort_by(|(a, ra), (b, rb)| {
        rb.score
            .total_cmp(&ra.score)
            .then_with(|| rb.shared_tags.cmp(&ra.shared_tags))
            .then_with(|| newest_first(a, b))
    });

    let mut picked: Vec<&Article> = scored.into_iter().map(|(a, _)| a).take(limit).collect();
    let scored_count = picked.len();

    if picked.len() < limit {
        let mut seen: HashSet<&str> = picked.iter().map(|a| a.slug.as_str()).collect();
        seen.insert(target.slug.as_str());

        let mut by_recency: Vec<&Article> = corpus.iter().collect();
        by_recency.sort_by(|a, b| newest_first(a, b));

        let featured = by_recency.iter().copied().filter(|a| a.featured);
        let recent = by_recency.iter().copied();

        for candidate in featured.chain(recent) {
            if picked.len() >= limit {
                break;
            }
            if seen.insert(candidate.slug.as_str()) {
                picked.push(candidate);
            }
        }
    }

    debug!(
        scored = scored_count,
        filled = picked.len() - scored_count,
        "related articles selected"
    );

    picked
}

fn shared_tag_count(a: &Article, b: &Article) -> usize {
    let theirs: HashSet<String> = b.tags.iter().map(|t| t.trim().to_lowercase()).collect();
    a.tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .collect::<HashSet<_>>()
        .iter()
        .filter(|t| theirs.contains(*t))
        .count()
}

fn newest_first(a: &Article, b: &Article) -> Ordering {
    b.published_at
        .cmp(&a.published_at)
        .then_with(|| a.slug.cmp(&b.slug))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn base() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn article(slug: &str, author: &str, tags: &[&str], days_ago: i64) -> Article {
        Article {
            slug: slug.into(),
            title: slug.into(),
            description: "d".into(),
            author: author.into(),
            published_at: base() - Duration::days(days_ago),
            updated_at: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: None,
            featured: false,
            hero_image: None,
            reading_time: 1,
            content: String::new(),
        }
    }

    #[test]
    fn unrelated_and_distant_scores_zero() {
        let target = article("t", "Ada", &["bitcoin"], 0);
        let mut other = article("o", "Linus", &["solana"], 31);
        other.category = Some("Guides".into());
        assert_eq!(score(&target, &other).score, 0.0);

        // Featured alone does not make an article related.
        other.featured = true;
        assert_eq!(score(&target, &other).score, 0.0);
    }

    #[test]
    fn weights_add_up() {
        let mut target = article("t", "Ada", &["Bitcoin", "ETF", "Macro"], 0);
        target.category = Some("Markets".into());
        let mut cand = article("c", "ada", &["bitcoin", "etf"], 15);
        cand.category = Some("markets".into());
        cand.featured = true;

        let r = score(&target, &cand);
        assert_eq!(r.shared_tags, 2);
        // 20 tags + 5 author + 3 category + 1 recency (half window) + 1 featured
        assert!((r.score - 30.0).abs() < 1e-9, "score = {}", r.score);
    }

    #[test]
    fn non_ascii_author_and_category_match_across_case() {
        let mut target = article("t", "Łukasz", &["Région"], 60);
        target.category = Some("Économie".into());
        let mut cand = article("c", "ŁUKASZ", &["RÉGION"], 0);
        cand.category = Some("ÉCONOMIE".into());

        let r = score(&target, &cand);
        assert_eq!(r.shared_tags, 1);
        // 10 tag + 5 author + 3 category, outside the recency window.
        assert!((r.score - 18.0).abs() < 1e-9, "score = {}", r.score);
    }

    #[test]
    fn recency_bonus_decays_linearly() {
        let target = article("t", "A", &[], 0);
        assert!((recency_bonus(&target, &article("a", "B", &[], 0)) - 2.0).abs() < 1e-9);
        assert!((recency_bonus(&target, &article("b", "B", &[], 15)) - 1.0).abs() < 1e-9);
        assert_eq!(recency_bonus(&target, &article("c", "B", &[], 30)), 0.0);
        assert_eq!(recency_bonus(&target, &article("d", "B", &[], 90)), 0.0);
        // Distance is symmetric.
        assert!((recency_bonus(&article("e", "B", &[], 15), &target) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn never_includes_target() {
        let corpus = vec![
            article("t", "Ada", &["bitcoin"], 0),
            article("a", "Ada", &["bitcoin"], 1),
            article("b", "Bob", &[], 100),
        ];
        for limit in 0..5 {
            let related = related_articles(&corpus[0], &corpus, limit);
            assert!(related.iter().all(|a| a.slug != "t"));
            assert!(related.len() <= limit);
        }
    }

    #[test]
    fn fills_to_limit_when_corpus_is_large_enough() {
        let corpus: Vec<Article> = (0..6)
            .map(|i| article(&format!("a{i}"), &format!("author{i}"), &[], 100 * i))
            .collect();
        let target = &corpus[0];
        for limit in 0..=5 {
            assert_eq!(related_articles(target, &corpus, limit).len(), limit);
        }
        assert_eq!(related_articles(target, &corpus, 10).len(), 5);
    }

    #[test]
    fn two_shared_tags_rank_above_one() {
        let target = article("t", "Ada", &["bitcoin", "etf", "macro"], 0);
        let one = article("one", "Bob", &["bitcoin"], 5);
        let two = article("two", "Cy", &["bitcoin", "etf"], 5);
        let corpus = vec![target.clone(), one, two];

        let related = related_articles(&target, &corpus, 2);
        assert_eq!(related[0].slug, "two");
        assert_eq!(related[1].slug, "one");
    }

    #[test]
    fn ties_break_by_shared_tags_then_recency() {
        let target = article("t", "Ada", &["bitcoin", "etf"], 0);
        // 10 (one tag) + 5 (author) = 15 vs 10 + 5 (author) = 15, same tags: newer first.
        let older = article("older", "Ada", &["bitcoin"], 60);
        let newer = article("newer", "Ada", &["etf"], 45);
        let corpus = vec![target.clone(), older, newer];

        let related = related_articles(&target, &corpus, 2);
        let slugs: Vec<_> = related.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["newer", "older"]);
    }

    #[test]
    fn equal_scores_prefer_more_shared_tags() {
        let mut target = article("t", "Ada", &["bitcoin"], 0);
        target.category = Some("Markets".into());
        // 10 (one shared tag), different author, outside the recency window.
        let tagged = article("zz-tagged", "Bob", &["bitcoin"], 60);
        // 5 (author) + 3 (category) + 2 (same day), no shared tags.
        let mut untagged = article("aa-untagged", "Ada", &[], 0);
        untagged.category = Some("Markets".into());

        assert_eq!(score(&target, &tagged).score, score(&target, &untagged).score);

        let corpus = vec![target.clone(), untagged, tagged];
        let related = related_articles(&target, &corpus, 2);
        let slugs: Vec<_> = related.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["zz-tagged", "aa-untagged"]);
    }

    #[test]
    fn untagged_target_falls_back_to_featured_then_recent() {
        let target = article("t", "Ada", &[], 0);
        let mut featured_old = article("featured-old", "Bob", &["x"], 400);
        featured_old.featured = true;
        let recent = article("recent", "Cy", &["y"], 200);
        let oldest = article("oldest", "Dee", &["z"], 500);
        let corpus = vec![target.clone(), oldest, recent, featured_old];

        let related = related_articles(&target, &corpus, 2);
        let slugs: Vec<_> = related.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["featured-old", "recent"]);
    }

    #[test]
    fn scored_results_come_before_fill() {
        let target = article("t", "Ada", &["defi"], 0);
        let related_one = article("match", "Bob", &["DeFi"], 300);
        let mut featured = article("feat", "Cy", &[], 400);
        featured.featured = true;
        let corpus = vec![target.clone(), featured, related_one];

        let related = related_articles(&target, &corpus, 3);
        let slugs: Vec<_> = related.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["match", "feat"]);
    }

    #[test]
    fn empty_corpus_and_zero_limit() {
        let target = article("t", "Ada", &["bitcoin"], 0);
        assert!(related_articles(&target, &[], 3).is_empty());
        assert!(related_articles(&target, std::slice::from_ref(&target), 0).is_empty());
        assert!(related_articles(&target, std::slice::from_ref(&target), 3).is_empty());
    }
}
