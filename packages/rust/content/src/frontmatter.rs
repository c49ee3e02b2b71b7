//! Front-matter block splitting and parsing.
//!
//! Supports the subset of YAML that article files actually use:
//! `key: value` scalars (optionally quoted), inline lists (`[a, "b"]`),
//! block lists (`key:` followed by `- item` lines) and `#` comment lines.

use std::collections::BTreeMap;

use coinpress_shared::{CoinpressError, Result};

const DELIMITER: &str = "---";

/// A parsed front-matter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// The value as a single string. Lists are joined with `", "`.
    pub fn as_text(&self) -> String {
        match self {
            Self::Scalar(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }

    /// The value as a list. A scalar is treated as a comma-separated list.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::Scalar(s) => split_list(s),
            Self::List(items) => items.clone(),
        }
    }
}

/// Parsed front matter, keyed by normalized field name.
///
/// Keys are normalized by lowercasing and dropping `_` and `-`, so
/// `publishedAt`, `published_at` and `published-at` are the same field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    fields: BTreeMap<String, FieldValue>,
}

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(&normalize_key(key))
    }

    /// Scalar text of a field, `None` when absent or blank.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(FieldValue::as_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(FieldValue::as_list).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split a document into its front-matter block and body.
///
/// Returns `None` when the document does not open with a `---` line or the
/// block is never closed.
pub fn split(raw: &str) -> Option<(&str, &str)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let first_end = raw.find('\n')?;
    if raw[..first_end].trim_end() != DELIMITER {
        return None;
    }

    let rest = &raw[first_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }

    None
}

/// Parse the inside of a front-matter block.
pub fn parse(block: &str) -> Result<FrontMatter> {
    let mut fields = BTreeMap::new();
    // Key of a `key:` line with no inline value, waiting for `- item` lines.
    let mut open_list: Option<(String, Vec<String>)> = None;

    for (idx, line) in block.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ").or(if trimmed == "-" { Some("") } else { None }) {
            match open_list.as_mut() {
                Some((_, items)) => {
                    let item = unquote(item.trim());
                    if !item.is_empty() {
                        items.push(item);
                    }
                    continue;
                }
                None => {
                    return Err(CoinpressError::parse(format!(
                        "line {}: list item without a key",
                        idx + 1
                    )));
                }
            }
        }

        if let Some((key, items)) = open_list.take() {
            fields.insert(key, FieldValue::List(items));
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(CoinpressError::parse(format!(
                "line {}: expected `key: value`, got '{trimmed}'",
                idx + 1
            )));
        };

        let key = normalize_key(key);
        if key.is_empty() {
            return Err(CoinpressError::parse(format!("line {}: empty key", idx + 1)));
        }

        let value = value.trim();
        if value.is_empty() {
            open_list = Some((key, Vec::new()));
        } else if value.starts_with('[') && value.ends_with(']') {
            fields.insert(key, FieldValue::List(split_list(&value[1..value.len() - 1])));
        } else {
            fields.insert(key, FieldValue::Scalar(unquote(value)));
        }
    }

    if let Some((key, items)) = open_list {
        fields.insert(key, FieldValue::List(items));
    }

    Ok(FrontMatter { fields })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Strip one level of matching single or double quotes.
fn unquote(value: &str) -> String {
    let v = value.trim();
    if v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')))
    {
        let inner = &v[1..v.len() - 1];
        if v.starts_with('"') {
            return inner.replace("\\\"", "\"").replace("\\\\", "\\");
        }
        return inner.replace("''", "'");
    }
    v.to_string()
}

/// Split a comma-separated list, honoring quotes around items.
fn split_list(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match (c, quote) {
            ('"' | '\'', None) => {
                quote = Some(c);
                current.push(c);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            (',', None) => {
                items.push(unquote(&current));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    items.push(unquote(&current));

    items.into_iter().filter(|i| !i.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_separates_block_and_body() {
        let raw = "---\ntitle: Hello\n---\nBody text\n";
        let (block, body) = split(raw).expect("front matter");
        assert_eq!(block, "title: Hello\n");
        assert_eq!(body, "Body text\n");
    }

    #[test]
    fn split_requires_opening_delimiter() {
        assert!(split("title: Hello\n---\nBody").is_none());
        assert!(split("---\ntitle: never closed\n").is_none());
    }

    #[test]
    fn split_handles_crlf() {
        let raw = "---\r\ntitle: Hi\r\n---\r\nBody";
        let (block, body) = split(raw).expect("front matter");
        assert!(block.contains("title: Hi"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn parse_scalars_and_quotes() {
        let fm = parse(
            "title: \"Ethereum's \\\"Merge\\\"\"\ndescription: 'It''s done'\nfeatured: true\n",
        )
        .unwrap();
        assert_eq!(fm.text("title").unwrap(), "Ethereum's \"Merge\"");
        assert_eq!(fm.text("description").unwrap(), "It's done");
        assert_eq!(fm.text("featured").unwrap(), "true");
    }

    #[test]
    fn parse_keeps_colons_in_values() {
        let fm = parse("heroImage: https://cdn.example.com/a.png\n").unwrap();
        assert_eq!(fm.text("heroImage").unwrap(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn parse_inline_and_block_lists() {
        let fm = parse("tags: [bitcoin, \"layer, two\", 'defi']\nauthors:\n  - Ada\n  - \"Linus\"\ntitle: X\n")
            .unwrap();
        assert_eq!(fm.list("tags"), vec!["bitcoin", "layer, two", "defi"]);
        assert_eq!(fm.list("authors"), vec!["Ada", "Linus"]);
        assert_eq!(fm.text("title").unwrap(), "X");
    }

    #[test]
    fn keys_are_normalized() {
        let fm = parse("published_at: 2024-01-01\nhero-image: /a.png\n").unwrap();
        assert!(fm.get("publishedAt").is_some());
        assert!(fm.get("heroImage").is_some());
    }

    #[test]
    fn comments_and_blanks_ignored() {
        let fm = parse("# draft notes\n\ntitle: A\n").unwrap();
        assert_eq!(fm.len(), 1);
    }

    #[test]
    fn malformed_line_is_parse_error() {
        let err = parse("title A\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));

        let err = parse("- orphan\n").unwrap_err();
        assert!(err.to_string().contains("list item without a key"));
    }

    #[test]
    fn scalar_as_list_splits_commas() {
        let fm = parse("tags: bitcoin, mining\n").unwrap();
        assert_eq!(fm.list("tags"), vec!["bitcoin", "mining"]);
    }
}
