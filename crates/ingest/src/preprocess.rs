//! Comment text normalization ahead of sentiment analysis.
//!
//! Lowercases, strips URLs, mentions and punctuation, and drops common
//! English stop words. Negations are kept since they flip sentiment.

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "am", "an", "and", "any", "are", "as", "at", "be",
    "because", "been", "before", "being", "both", "but", "by", "can", "could", "did", "do",
    "does", "doing", "each", "for", "from", "had", "has", "have", "having", "he", "her", "here",
    "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "my",
    "of", "off", "on", "once", "only", "or", "other", "our", "ours", "out", "over", "own", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "us",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours",
];

fn is_url(token: &str) -> bool {
    let t = token.to_ascii_lowercase();
    t.starts_with("http://") || t.starts_with("https://") || t.starts_with("www.")
}

/// Normalize one comment. Returns the trimmed original when nothing survives.
pub fn preprocess(text: &str) -> String {
    let kept: Vec<String> = text
        .split_whitespace()
        .filter(|token| !is_url(token) && !token.starts_with('@'))
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .map(|token| token.trim_matches('\'').to_string())
        .filter(|token| !token.is_empty() && !STOP_WORDS.contains(&token.as_str()))
        .collect();

    if kept.is_empty() {
        text.trim().to_string()
    } else {
        kept.join(" ")
    }
}
