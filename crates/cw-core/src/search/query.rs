//! Query segmentation shared by lexical recall, rerank payload windowing,
//! and expansion scoring.
//!
//! Produces a deduplicated token set from a free-form query: FTS operator
//! characters and boolean words are stripped, code-shaped tokens emit their
//! separator/case variants (`api_key` -> `apikey`, `apiKey`, `api`, `key`),
//! adjacent word pairs emit joined variants, and the sanitized remainder is
//! segmented with a Unicode word segmenter so CJK text still yields tokens.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// FTS operator characters stripped during sanitization.
const OPERATOR_CHARS: &str = "()\":*^.\\/:@#$%&=+[]{}<>|~`!?,;";

static BOOLEAN_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(AND|OR|NOT|NEAR)\b").expect("static regex"));

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));

/// Segment a query into the token set used across the search pipeline.
pub fn segment_query(query: &str) -> Vec<String> {
    let mut tokens = TokenSet::default();

    // Code-feature extraction runs on the *original* query tokens, before
    // sanitization strips the separators that make them code-shaped.
    let raw_tokens: Vec<&str> = query.split_whitespace().collect();
    for raw in &raw_tokens {
        if is_code_token(raw) {
            for variant in code_variants(raw) {
                tokens.push(variant);
            }
        }
    }

    // Adjacent plain words also behave like a split identifier: emit the
    // joined spellings so "api key" finds apiKey and api_key.
    for pair in raw_tokens.windows(2) {
        let (a, b) = (clean_word(pair[0]), clean_word(pair[1]));
        if !a.is_empty() && !b.is_empty() {
            tokens.push(format!("{a}{b}"));
            tokens.push(format!("{a}_{b}"));
            tokens.push(format!("{a}{}", capitalize(&b)));
        }
    }

    // Natural-language segmentation over the sanitized query.
    let sanitized = sanitize(query);
    for word in sanitized.unicode_words() {
        tokens.push(word.to_string());
        tokens.push(word.to_lowercase());
        if is_code_token(word) {
            for variant in code_variants(word) {
                tokens.push(variant);
            }
        }
    }

    tokens.into_vec()
}

/// Token-overlap score of a chunk against the query tokens: +1 for a
/// word-boundary match, +0.5 for a bare substring match.
pub fn token_overlap_score(text: &str, tokens: &[String]) -> f32 {
    let lower = text.to_lowercase();
    let mut score = 0.0;
    for token in tokens {
        let token = token.to_lowercase();
        if token.is_empty() {
            continue;
        }
        let boundary = Regex::new(&format!(r"\b{}\b", regex::escape(&token)));
        if boundary.map(|re| re.is_match(&lower)).unwrap_or(false) {
            score += 1.0;
        } else if lower.contains(&token) {
            score += 0.5;
        }
    }
    score
}

/// Keep the head and tail of an over-long string, eliding the middle.
pub fn truncate_middle(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 1 {
        return chars.into_iter().take(max_chars).collect();
    }
    let head = max_chars / 2;
    let tail = max_chars - head - 1;
    let mut out: String = chars[..head].iter().collect();
    out.push('\u{2026}');
    out.extend(chars[chars.len() - tail..].iter());
    out
}

/// Window `text` around the first query-token hit, bounded by `max_chars`.
pub fn extract_around_hit(text: &str, tokens: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let lower = text.to_lowercase();
    let hit_byte = tokens
        .iter()
        .filter(|t| !t.is_empty())
        .filter_map(|t| lower.find(&t.to_lowercase()))
        .min();

    let hit_char = match hit_byte {
        Some(byte) => lower[..byte].chars().count(),
        None => 0,
    };

    let half = max_chars / 2;
    let start = hit_char.saturating_sub(half);
    let end = (start + max_chars).min(chars.len());
    let start = end.saturating_sub(max_chars);
    chars[start..end].iter().collect()
}

// ============================================================================
// Internals
// ============================================================================

#[derive(Default)]
struct TokenSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl TokenSet {
    fn push(&mut self, token: String) {
        let token = token.trim().to_string();
        if token.is_empty() {
            return;
        }
        if self.seen.insert(token.clone()) {
            self.ordered.push(token);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.ordered
    }
}

fn sanitize(query: &str) -> String {
    let stripped: String = query
        .chars()
        .map(|c| if OPERATOR_CHARS.contains(c) { ' ' } else { c })
        .collect();
    let without_bools = BOOLEAN_WORDS.replace_all(&stripped, " ");
    without_bools.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A token is code-shaped if it carries a separator or a camelCase boundary.
fn is_code_token(token: &str) -> bool {
    token.contains('.')
        || token.contains('_')
        || token.contains('/')
        || CAMEL_BOUNDARY.is_match(token)
}

fn code_variants(token: &str) -> Vec<String> {
    let mut variants = vec![token.to_string(), token.to_lowercase()];

    let stripped: String = token
        .chars()
        .filter(|c| !matches!(c, '.' | '_' | '/' | '-'))
        .collect();
    variants.push(stripped.to_lowercase());

    // camelCase -> snake_case
    let snake = CAMEL_BOUNDARY
        .replace_all(token, "${1}_${2}")
        .to_lowercase();
    variants.push(snake.clone());

    // snake_case -> camelCase
    let parts: Vec<&str> = snake
        .split(|c: char| matches!(c, '.' | '_' | '/' | '-'))
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() > 1 {
        let mut camel = parts[0].to_lowercase();
        for part in &parts[1..] {
            camel.push_str(&capitalize(part));
        }
        variants.push(camel);
    }

    // Component words of the identifier.
    for part in parts {
        variants.push(part.to_lowercase());
    }

    variants
}

fn clean_word(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_query_emits_joined_variants() {
        let tokens = segment_query("api key");
        for expected in ["api", "key", "apikey", "api_key", "apiKey"] {
            assert!(
                tokens.iter().any(|t| t == expected),
                "missing {expected} in {tokens:?}"
            );
        }
    }

    #[test]
    fn camel_case_token_expands() {
        let tokens = segment_query("getUserProfile");
        for expected in ["getUserProfile", "getuserprofile", "get_user_profile", "get", "user", "profile"] {
            assert!(
                tokens.iter().any(|t| t == expected),
                "missing {expected} in {tokens:?}"
            );
        }
    }

    #[test]
    fn snake_case_token_expands() {
        let tokens = segment_query("api_key");
        for expected in ["api_key", "apikey", "apiKey", "api", "key"] {
            assert!(
                tokens.iter().any(|t| t == expected),
                "missing {expected} in {tokens:?}"
            );
        }
    }

    #[test]
    fn operators_and_boolean_words_are_stripped() {
        let tokens = segment_query("foo AND (bar) OR \"baz\"");
        assert!(tokens.iter().any(|t| t == "foo"));
        assert!(tokens.iter().any(|t| t == "bar"));
        assert!(tokens.iter().any(|t| t == "baz"));
        assert!(!tokens.iter().any(|t| t == "AND" || t == "OR"));
        assert!(!tokens.iter().any(|t| t.contains('(') || t.contains('"')));
    }

    #[test]
    fn cjk_text_yields_tokens() {
        let tokens = segment_query("\u{89e3}\u{6790}\u{914d}\u{7f6e} parser");
        assert!(tokens.iter().any(|t| t == "parser"));
        assert!(
            tokens.iter().any(|t| t.contains('\u{89e3}')),
            "expected CJK tokens in {tokens:?}"
        );
    }

    #[test]
    fn segmentation_is_deterministic() {
        let a = segment_query("api key handler");
        let b = segment_query("api key handler");
        assert_eq!(a, b);
    }

    #[test]
    fn overlap_score_word_boundary_beats_substring() {
        let tokens = vec!["key".to_string()];
        let exact = token_overlap_score("the key is here", &tokens);
        let substring = token_overlap_score("monkey business", &tokens);
        assert!((exact - 1.0).abs() < f32::EPSILON);
        assert!((substring - 0.5).abs() < f32::EPSILON);
        assert!((token_overlap_score("nothing", &tokens) - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn truncate_middle_keeps_ends() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let out = truncate_middle(text, 11);
        assert_eq!(out.chars().count(), 11);
        assert!(out.starts_with("abcde"));
        assert!(out.ends_with("vwxyz"));
        assert_eq!(truncate_middle("short", 10), "short");
    }

    #[test]
    fn extract_around_hit_centers_on_token() {
        let mut text = "x".repeat(300);
        text.push_str("needle");
        text.push_str(&"y".repeat(300));
        let out = extract_around_hit(&text, &["needle".to_string()], 50);
        assert!(out.contains("needle"));
        assert_eq!(out.chars().count(), 50);
    }

    #[test]
    fn extract_around_hit_defaults_to_prefix() {
        let text = "a".repeat(100);
        let out = extract_around_hit(&text, &["zzz".to_string()], 10);
        assert_eq!(out, "a".repeat(10));
    }
}
