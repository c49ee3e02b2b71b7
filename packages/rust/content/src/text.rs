//! Plain-text extraction from Markdown/MDX bodies.
//!
//! Each pass is a function `&str -> String` applied in sequence. The result
//! feeds word counts, the search index and snippets.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Reduce a Markdown/MDX body to whitespace-normalized plain text.
pub fn plain_text(body: &str) -> String {
    let mut result = body.to_string();

    result = strip_code_blocks(&result);
    result = strip_mdx_statements(&result);
    result = flatten_html(&result);
    result = unwrap_links(&result);
    result = strip_block_markers(&result);
    result = strip_inline_markers(&result);

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Count words in a Markdown/MDX body, excluding code blocks and markup.
pub fn count_words(body: &str) -> usize {
    plain_text(body).split_whitespace().count()
}

/// Reading time in whole minutes, rounded up, never below one minute.
pub fn reading_time(words: usize, words_per_minute: u32) -> u32 {
    let wpm = words_per_minute.max(1) as usize;
    words.div_ceil(wpm).max(1) as u32
}

// ---------------------------------------------------------------------------
// Pass 1: fenced code
// ---------------------------------------------------------------------------

fn strip_code_blocks(md: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)(```|~~~).*?(```|~~~)").expect("valid regex")
    });

    FENCE_RE.replace_all(md, " ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: MDX import/export lines
// ---------------------------------------------------------------------------

fn strip_mdx_statements(md: &str) -> String {
    static STMT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^(import|export)\s.*$").expect("valid regex")
    });

    STMT_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: inline HTML / JSX components
// ---------------------------------------------------------------------------

/// Keep the text content of inline HTML and JSX, dropping the tags.
fn flatten_html(md: &str) -> String {
    if !md.contains('<') && !md.contains('&') {
        return md.to_string();
    }

    let fragment = Html::parse_fragment(md);
    fragment.root_element().text().collect::<String>()
}

// ---------------------------------------------------------------------------
// Pass 4: links and images
// ---------------------------------------------------------------------------

/// `![alt](src)` becomes `alt`, `[text](href)` becomes `text`.
fn unwrap_links(md: &str) -> String {
    static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("valid regex")
    });

    LINK_RE.replace_all(md, "$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: headings, quotes, list bullets
// ---------------------------------------------------------------------------

fn strip_block_markers(md: &str) -> String {
    static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^\s*(#{1,6}\s+|>\s?|[-*+]\s+|\d+\.\s+)").expect("valid regex")
    });

    BLOCK_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 6: emphasis, strikethrough, inline code ticks
// ---------------------------------------------------------------------------

fn strip_inline_markers(md: &str) -> String {
    static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\*\*|__|~~|[*`]").expect("valid regex")
    });

    INLINE_RE.replace_all(md, "").to_string()
}
