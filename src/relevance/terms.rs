//! Term extraction for keyword overlap.

use std::collections::HashSet;

use once_cell::sync::Lazy;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "do", "does",
        "for", "from", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me",
        "my", "no", "not", "of", "on", "or", "our", "should", "so", "that", "the", "their",
        "them", "then", "there", "these", "this", "to", "up", "us", "was", "we", "what", "when",
        "where", "which", "who", "why", "will", "with", "would", "you", "your", "md",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(term)
}

/// Lowercased alphanumeric terms with stop words and single characters
/// removed. camelCase identifiers are also split into their parts.
pub fn terms(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        if word.is_empty() {
            continue;
        }
        push_term(&mut out, word);
        let parts = split_camel(word);
        if parts.len() > 1 {
            for part in parts {
                push_term(&mut out, &part);
            }
        }
    }
    out
}

fn push_term(out: &mut Vec<String>, raw: &str) {
    let term = raw.trim_matches('_').to_lowercase();
    if term.chars().count() < 2 || is_stop_word(&term) {
        return;
    }
    out.push(term);
}

fn split_camel(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in word.chars() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
