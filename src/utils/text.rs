//! Text processing utilities shared by chunking, keyword annotation and filtering.

use std::collections::HashMap;

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the number of tokens in a text.
///
/// Uses ~4 characters per token, rounded up. Chunk sizing and stored token
/// counts both go through this function.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Convert a token budget into a character budget.
pub fn tokens_to_chars(tokens: usize) -> usize {
    tokens * CHARS_PER_TOKEN
}

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "if", "in", "into", "is", "it", "its", "may", "more", "no", "not", "of",
    "on", "one", "or", "other", "our", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "those", "to", "under",
    "up", "was", "we", "were", "what", "when", "which", "while", "who", "will", "with", "would",
    "you", "your",
];

/// Split text into lowercase alphanumeric terms.
pub fn tokenize_terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Extract up to `max` keywords ordered by frequency, then first occurrence.
///
/// Stopwords, pure numbers and terms shorter than three characters are ignored.
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    if max == 0 {
        return Vec::new();
    }

    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, term) in tokenize_terms(text).enumerate() {
        if term.chars().count() < 3
            || term.chars().all(|c| c.is_ascii_digit())
            || STOPWORDS.contains(&term.as_str())
        {
            continue;
        }
        counts
            .entry(term)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, position));
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(term, (count, first))| (term, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(max).map(|(term, _, _)| term).collect()
}

/// Collapse runs of blank lines and trim trailing whitespace on each line.
pub fn normalize_whitespace(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        output.push_str(line);
        output.push('\n');
    }

    output.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("1234"), 1);
        assert_eq!(estimate_tokens("12345"), 2);
        assert_eq!(estimate_tokens("12345678"), 2);
        // counts characters, not bytes
        assert_eq!(estimate_tokens("äöüß"), 1);
    }

    #[test]
    fn test_extract_keywords_by_frequency() {
        let text = "Fitzer valves. The Fitzer pump feeds the valves; Fitzer again.";
        let keywords = extract_keywords(text, 2);
        assert_eq!(keywords, vec!["fitzer".to_string(), "valves".to_string()]);
    }

    #[test]
    fn test_extract_keywords_skips_noise() {
        let keywords = extract_keywords("the of 2024 an ok", 10);
        assert!(keywords.is_empty());
        assert!(extract_keywords("anything", 0).is_empty());
    }

    #[test]
    fn test_normalize_whitespace() {
        let text = "line one   \n\n\n\nline two\n\n";
        assert_eq!(normalize_whitespace(text), "line one\n\nline two");
    }
}
