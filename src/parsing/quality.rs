//! Heuristic quality scoring for extracted text.
//!
//! Parser output quality varies per document in ways no single parser
//! reports, so the arbiter scores each attempt's text sample on a 0-1
//! scale and compares. The score is a weighted sum of four character-
//! and token-level heuristics; it is not a language model judgment.

/// Weighting of the individual heuristics. Must sum to 1.0.
const WEIGHT_ALNUM: f64 = 0.40;
const WEIGHT_CLEAN: f64 = 0.30;
const WEIGHT_WHITESPACE: f64 = 0.20;
const WEIGHT_TOKENS: f64 = 0.10;

/// Whitespace ratio band considered healthy for prose.
const WHITESPACE_LOW: f64 = 0.05;
const WHITESPACE_HIGH: f64 = 0.30;

/// Longest token still considered recognizable prose.
const MAX_TOKEN_LEN: usize = 30;

/// Scores extracted text for "cleanliness".
#[derive(Debug, Clone, Default)]
pub struct QualityScorer;

impl QualityScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score a text sample in [0, 1]. Empty input scores 0.
    pub fn score(&self, text: &str) -> f64 {
        if text.is_empty() {
            return 0.0;
        }

        let total_chars = text.chars().count() as f64;

        let mut alnum = 0usize;
        let mut garbage = 0usize;
        let mut whitespace = 0usize;

        for c in text.chars() {
            if c.is_alphanumeric() {
                // Covers ASCII letters/digits and native scripts
                // (Hangul, CJK, Cyrillic, ...).
                alnum += 1;
            }
            if is_garbage_char(c) {
                garbage += 1;
            }
            if c.is_whitespace() {
                whitespace += 1;
            }
        }

        let alnum_ratio = alnum as f64 / total_chars;
        let clean_ratio = 1.0 - (garbage as f64 / total_chars);
        let whitespace_score = bounded_whitespace_score(whitespace as f64 / total_chars);
        let token_ratio = recognizable_token_ratio(text);

        let score = WEIGHT_ALNUM * alnum_ratio
            + WEIGHT_CLEAN * clean_ratio
            + WEIGHT_WHITESPACE * whitespace_score
            + WEIGHT_TOKENS * token_ratio;

        score.clamp(0.0, 1.0)
    }
}

/// Control characters (except layout whitespace) and replacement
/// characters mark mojibake or binary bleed-through.
fn is_garbage_char(c: char) -> bool {
    if c == '\n' || c == '\t' || c == '\r' {
        return false;
    }
    c.is_control() || c == '\u{FFFD}' || ('\u{FFF0}'..='\u{FFFF}').contains(&c)
}

/// 1.0 inside the healthy band, linear falloff outside it.
fn bounded_whitespace_score(ratio: f64) -> f64 {
    if ratio < WHITESPACE_LOW {
        ratio / WHITESPACE_LOW
    } else if ratio <= WHITESPACE_HIGH {
        1.0
    } else {
        ((1.0 - ratio) / (1.0 - WHITESPACE_HIGH)).max(0.0)
    }
}

/// Share of whitespace-delimited tokens that look like words: bounded
/// length and at least one alphanumeric character.
fn recognizable_token_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut recognizable = 0usize;
    for token in text.split_whitespace() {
        total += 1;
        let len = token.chars().count();
        if len <= MAX_TOKEN_LEN && token.chars().any(|c| c.is_alphanumeric()) {
            recognizable += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    recognizable as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(QualityScorer::new().score(""), 0.0);
    }

    #[test]
    fn test_clean_prose_scores_high() {
        let scorer = QualityScorer::new();
        let text = "The quarterly report covers network throughput, latency \
                    distributions, and capacity planning for the coming year.";
        assert!(scorer.score(text) > 0.8, "got {}", scorer.score(text));
    }

    #[test]
    fn test_korean_prose_scores_high() {
        let scorer = QualityScorer::new();
        let text = "네트워크 성능 보고서는 지연 시간 분포와 용량 계획을 다룬다.";
        assert!(scorer.score(text) > 0.8, "got {}", scorer.score(text));
    }

    #[test]
    fn test_mojibake_scores_lower_than_prose() {
        let scorer = QualityScorer::new();
        let clean = "Network capacity planning for the coming fiscal year.";
        let garbled = "N\u{FFFD}tw\u{FFFD}rk\u{0001}\u{0002} c\u{FFFD}p\u{FFFD}c\u{FFFD}ty\u{0003}\u{FFFD}\u{FFFD}\u{FFFD}\u{FFFD}";
        assert!(scorer.score(garbled) < scorer.score(clean));
    }

    #[test]
    fn test_whitespace_band() {
        assert_eq!(bounded_whitespace_score(0.15), 1.0);
        assert!(bounded_whitespace_score(0.0) < 0.01);
        assert!(bounded_whitespace_score(0.9) < 0.2);
    }

    #[test]
    fn test_token_ratio_penalizes_long_runs() {
        let good = recognizable_token_ratio("plain words here");
        let bad = recognizable_token_ratio(&"x".repeat(200));
        assert_eq!(good, 1.0);
        assert_eq!(bad, 0.0);
    }
}
