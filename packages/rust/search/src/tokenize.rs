//! Query and document tokenization.

use unicode_segmentation::UnicodeSegmentation;

/// Words dropped from both documents and queries.
const STOP_WORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in", "is",
    "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will", "with",
];

/// Minimum token length in characters.
const MIN_TOKEN_CHARS: usize = 2;

/// Split text into lowercase index terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|w| is_indexable(w))
        .collect()
}

/// Byte offset of the first word in `text` whose lowercase form starts with `term`.
pub(crate) fn find_term(text: &str, term: &str) -> Option<usize> {
    text.unicode_word_indices()
        .find(|(_, word)| word.to_lowercase().starts_with(term))
        .map(|(offset, _)| offset)
}

fn is_indexable(word: &str) -> bool {
    word.chars().count() >= MIN_TOKEN_CHARS && !STOP_WORDS.contains(&word)
}
