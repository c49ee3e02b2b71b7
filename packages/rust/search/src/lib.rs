//! Client-side lexical search.
//!
//! [`SearchIndex::build`] runs at site build time and the index ships as
//! `search-index.json`; [`SearchIndex::search`] answers queries against a
//! built or reloaded index. Ranking is a boosted TF-IDF sum with AND
//! semantics across query terms and prefix expansion for longer terms.

mod tokenize;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use coinpress_shared::{Article, CoinpressError, FieldMatch, Result, SearchResult};

pub use tokenize::tokenize;

/// Index format version, bumped on incompatible layout changes.
pub const INDEX_VERSION: u32 = 1;

/// Terms shorter than this only match exactly.
const MIN_PREFIX_CHARS: usize = 3;

/// Weight of a prefix match relative to an exact match.
const PREFIX_WEIGHT: f64 = 0.5;

/// Characters of context kept on each side of a snippet match.
const SNIPPET_CONTEXT: usize = 60;

// ---------------------------------------------------------------------------
// Index types
// ---------------------------------------------------------------------------

/// An indexed document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Tags,
    Description,
    Content,
}

impl Field {
    /// All fields in snippet order.
    pub const ALL: [Field; 4] = [Field::Title, Field::Tags, Field::Description, Field::Content];

    pub fn boost(self) -> f64 {
        match self {
            Self::Title => 10.0,
            Self::Tags => 5.0,
            Self::Description => 3.0,
            Self::Content => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Tags => "tags",
            Self::Description => "description",
            Self::Content => "content",
        }
    }
}

/// Stored fields of an indexed article, used to render results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDoc {
    pub slug: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Plain-text body.
    pub text: String,
}

impl IndexedDoc {
    fn field_text(&self, field: Field) -> String {
        match field {
            Field::Title => self.title.clone(),
            Field::Tags => self.tags.join(", "),
            Field::Description => self.description.clone(),
            Field::Content => self.text.clone(),
        }
    }
}

/// One occurrence list entry: `term` appears `tf` times in `field` of `doc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    #[serde(rename = "d")]
    pub doc: u32,
    #[serde(rename = "f")]
    pub field: Field,
    pub tf: u32,
}

/// Serializable inverted index over a set of articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub version: u32,
    /// Path prefix for result URLs (e.g. `/articles`).
    pub article_base_path: String,
    pub docs: Vec<IndexedDoc>,
    pub terms: BTreeMap<String, Vec<Posting>>,
}

// ---------------------------------------------------------------------------
// Build / serialize
// ---------------------------------------------------------------------------

impl SearchIndex {
    /// Build an index over `articles`.
    #[instrument(skip(articles), fields(count = articles.len()))]
    pub fn build(articles: &[Article], article_base_path: &str) -> Self {
        let mut docs = Vec::with_capacity(articles.len());
        let mut terms: BTreeMap<String, Vec<Posting>> = BTreeMap::new();

        for (idx, article) in articles.iter().enumerate() {
            let doc = IndexedDoc {
                slug: article.slug.clone(),
                title: article.title.clone(),
                description: article.description.clone(),
                tags: article.tags.clone(),
                text: coinpress_content::plain_text(&article.content),
            };

            for field in Field::ALL {
                let mut counts: HashMap<String, u32> = HashMap::new();
                for token in tokenize(&doc.field_text(field)) {
                    *counts.entry(token).or_default() += 1;
                }
                for (term, tf) in counts {
                    terms.entry(term).or_default().push(Posting {
                        doc: idx as u32,
                        field,
                        tf,
                    });
                }
            }

            docs.push(doc);
        }

        // HashMap iteration order leaks into postings; keep the JSON stable.
        for postings in terms.values_mut() {
            postings.sort_by(|a, b| a.doc.cmp(&b.doc).then(a.field.cmp(&b.field)));
        }

        debug!(docs = docs.len(), terms = terms.len(), "search index built");

        Self {
            version: INDEX_VERSION,
            article_base_path: article_base_path.to_string(),
            docs,
            terms,
        }
    }

    /// Serialize the index for client-side use.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| CoinpressError::Search(format!("failed to serialize index: {e}")))
    }

    /// Reload a serialized index, rejecting unknown versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let index: Self = serde_json::from_str(json)
            .map_err(|e| CoinpressError::Search(format!("invalid search index: {e}")))?;
        if index.version != INDEX_VERSION {
            return Err(CoinpressError::Search(format!(
                "unsupported index version {} (expected {INDEX_VERSION})",
                index.version
            )));
        }
        let doc_count = index.docs.len();
        for (term, postings) in &index.terms {
            if let Some(bad) = postings.iter().find(|p| p.doc as usize >= doc_count) {
                return Err(CoinpressError::Search(format!(
                    "invalid search index: term '{term}' points at document {} but only {doc_count} exist",
                    bad.doc
                )));
            }
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Per-document accumulator while scoring a query.
#[derive(Default)]
struct Hit {
    score: f64,
    matched_terms: BTreeSet<usize>,
    /// First query term (as typed) that matched each field.
    field_terms: BTreeMap<Field, String>,
}

impl SearchIndex {
    /// Run a query, returning at most `limit` results, best first.
    ///
    /// Every query term must match a document (exactly, or by prefix when
    /// the term has at least three characters).
    #[instrument(skip(self), fields(docs = self.docs.len()))]
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || limit == 0 || self.docs.is_empty() {
            return Vec::new();
        }

        let mut hits: HashMap<u32, Hit> = HashMap::new();
        for (qi, qterm) in query_terms.iter().enumerate() {
            for (term, weight) in self.expand(qterm) {
                let Some(postings) = self.terms.get(term) else {
                    continue;
                };
                let idf = self.idf(postings);
                for posting in postings {
                    let hit = hits.entry(posting.doc).or_default();
                    hit.score += weight * posting.field.boost() * f64::from(posting.tf) * idf;
                    hit.matched_terms.insert(qi);
                    hit.field_terms
                        .entry(posting.field)
                        .or_insert_with(|| qterm.clone());
                }
            }
        }

        let mut ranked: Vec<(u32, Hit)> = hits
            .into_iter()
            .filter(|(_, hit)| hit.matched_terms.len() == query_terms.len())
            .collect();

        ranked.sort_by(|(a_doc, a), (b_doc, b)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| self.docs[*a_doc as usize].slug.cmp(&self.docs[*b_doc as usize].slug))
        });
        ranked.truncate(limit);

        debug!(query, results = ranked.len(), "search complete");

        ranked
            .into_iter()
            .map(|(doc_idx, hit)| self.to_result(&self.docs[doc_idx as usize], hit))
            .collect()
    }

    /// Index terms matched by a query term, with their weights.
    fn expand<'a>(&'a self, qterm: &'a str) -> Vec<(&'a str, f64)> {
        let mut out = Vec::new();
        if self.terms.contains_key(qterm) {
            out.push((qterm, 1.0));
        }
        if qterm.chars().count() >= MIN_PREFIX_CHARS {
            out.extend(
                self.terms
                    .range::<str, _>((
                        std::ops::Bound::Excluded(qterm),
                        std::ops::Bound::Unbounded,
                    ))
                    .take_while(|(term, _)| term.starts_with(qterm))
                    .map(|(term, _)| (term.as_str(), PREFIX_WEIGHT)),
            );
        }
        out
    }

    /// `ln(1 + N / df)` where df counts distinct documents.
    fn idf(&self, postings: &[Posting]) -> f64 {
        let df = postings
            .iter()
            .map(|p| p.doc)
            .collect::<BTreeSet<_>>()
            .len()
            .max(1);
        (1.0 + self.docs.len() as f64 / df as f64).ln()
    }

    fn to_result(&self, doc: &IndexedDoc, hit: Hit) -> SearchResult {
        let matches = Field::ALL
            .iter()
            .filter_map(|field| {
                hit.field_terms.get(field).map(|term| FieldMatch {
                    field: field.as_str().to_string(),
                    snippet: snippet(&doc.field_text(*field), *field, term),
                })
            })
            .collect();

        SearchResult {
            slug: doc.slug.clone(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            url: format!("{}/{}", self.article_base_path.trim_end_matches('/'), doc.slug),
            score: hit.score,
            matches,
        }
    }
}

/// Text around the first occurrence of `term`, elided with `…`.
///
/// Titles and tag lists are short and returned whole.
fn snippet(text: &str, field: Field, term: &str) -> String {
    if matches!(field, Field::Title | Field::Tags) {
        return text.to_string();
    }

    let Some(offset) = tokenize::find_term(text, term) else {
        return text.chars().take(SNIPPET_CONTEXT * 2).collect();
    };

    let before: Vec<char> = text[..offset].chars().collect();
    let start = before.len().saturating_sub(SNIPPET_CONTEXT);
    let head: String = before[start..].iter().collect();

    let after_len = SNIPPET_CONTEXT + term.chars().count();
    let mut tail_chars = text[offset..].chars();
    let tail: String = tail_chars.by_ref().take(after_len).collect();

    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.push_str(&head);
    out.push_str(&tail);
    if tail_chars.next().is_some() {
        out.push('…');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn article(slug: &str, title: &str, description: &str, tags: &[&str], content: &str) -> Article {
        Article {
            slug: slug.into(),
            title: title.into(),
            description: description.into(),
            author: "Staff".into(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: None,
            featured: false,
            hero_image: None,
            reading_time: 1,
            content: content.into(),
        }
    }

    fn corpus() -> Vec<Article> {
        vec![
            article(
                "bitcoin-halving",
                "Bitcoin Halving Explained",
                "Block rewards drop by half",
                &["bitcoin", "mining"],
                "Every 210,000 blocks the **subsidy** paid to miners halves.",
            ),
            article(
                "ethereum-staking",
                "Ethereum Staking Guide",
                "How validators earn yield",
                &["ethereum", "staking"],
                "Validators lock 32 ETH. Some staking pools also accept bitcoin wrapped tokens.",
            ),
            article(
                "defi-primer",
                "DeFi Primer",
                "Lending, swaps and yield",
                &["defi"],
                "Decentralized finance rebuilds banking primitives on chain.",
            ),
        ]
    }

    #[test]
    fn title_match_outranks_content_match() {
        let index = SearchIndex::build(&corpus(), "/articles");
        let results = index.search("bitcoin", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].slug, "bitcoin-halving");
        assert_eq!(results[1].slug, "ethereum-staking");
        assert!(results[0].score > results[1].score);
        assert_eq!(results[0].url, "/articles/bitcoin-halving");
    }

    #[test]
    fn all_terms_must_match() {
        let index = SearchIndex::build(&corpus(), "/articles");
        let results = index.search("bitcoin validators", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].slug, "ethereum-staking");

        assert!(index.search("bitcoin solana", 10).is_empty());
    }

    #[test]
    fn prefix_matching_for_longer_terms() {
        let index = SearchIndex::build(&corpus(), "/articles");
        let results = index.search("decentral", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].slug, "defi-primer");

        // Two-character terms only match exactly.
        assert!(index.search("et", 10).is_empty());
    }

    #[test]
    fn empty_and_stop_word_queries_return_nothing() {
        let index = SearchIndex::build(&corpus(), "/articles");
        assert!(index.search("", 10).is_empty());
        assert!(index.search("   the of  ", 10).is_empty());
        assert!(index.search("bitcoin", 0).is_empty());
    }

    #[test]
    fn limit_truncates_results() {
        let index = SearchIndex::build(&corpus(), "/articles");
        assert_eq!(index.search("yield", 1).len(), 1);
        assert_eq!(index.search("yield", 10).len(), 2);
    }

    #[test]
    fn matches_report_fields_with_snippets() {
        let index = SearchIndex::build(&corpus(), "/articles/");
        let results = index.search("subsidy", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "/articles/bitcoin-halving");
        let content = results[0]
            .matches
            .iter()
            .find(|m| m.field == "content")
            .expect("content match");
        assert!(content.snippet.contains("subsidy paid to miners"));
        assert!(!content.snippet.contains("**"));
    }

    #[test]
    fn reloaded_index_gives_identical_results() {
        let index = SearchIndex::build(&corpus(), "/articles");
        let json = index.to_json().expect("serialize");
        let reloaded = SearchIndex::from_json(&json).expect("reload");
        assert_eq!(index, reloaded);
        assert_eq!(index.search("staking", 5), reloaded.search("staking", 5));
    }

    #[test]
    fn from_json_rejects_other_versions() {
        let mut index = SearchIndex::build(&corpus(), "/articles");
        index.version = 99;
        let json = serde_json::to_string(&index).unwrap();
        let err = SearchIndex::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported index version 99"));
    }

    #[test]
    fn from_json_rejects_dangling_postings() {
        let mut index = SearchIndex::build(&corpus()[..1], "/articles");
        index.terms.insert(
            "bitcoin".into(),
            vec![Posting {
                doc: 7,
                field: Field::Title,
                tf: 1,
            }],
        );
        let json = serde_json::to_string(&index).unwrap();
        let err = SearchIndex::from_json(&json).unwrap_err();
        assert!(matches!(err, CoinpressError::Search(_)));
        assert!(err.to_string().contains("document 7"), "{err}");
    }

    #[test]
    fn snippet_elides_long_text() {
        let text = format!("{} needle {}", "x ".repeat(100), "y ".repeat(100));
        let s = snippet(&text, Field::Content, "needle");
        assert!(s.starts_with('…'));
        assert!(s.ends_with('…'));
        assert!(s.contains("needle"));
        assert!(s.chars().count() < text.chars().count());
    }

    #[test]
    fn empty_index_is_searchable() {
        let index = SearchIndex::build(&[], "/articles");
        assert!(index.is_empty());
        assert!(index.search("bitcoin", 10).is_empty());
    }
}
