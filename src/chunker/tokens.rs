//! Deterministic token estimation.
//!
//! A full tokenizer would tie the chunker to one provider and make
//! cache keys fragile; instead we use a character-to-token ratio
//! calibrated per target provider, with a separate ratio for CJK and
//! Hangul text where tokenizers emit far more tokens per character.

use serde::{Deserialize, Serialize};

/// Character-to-token ratios. Defaults approximate common BPE
/// vocabularies: ~4 Latin characters per token, ~1.5 CJK/Hangul
/// characters per token.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenEstimator {
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,
    #[serde(default = "default_cjk_chars_per_token")]
    pub cjk_chars_per_token: f64,
}

fn default_chars_per_token() -> f64 {
    4.0
}

fn default_cjk_chars_per_token() -> f64 {
    1.5
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
            cjk_chars_per_token: default_cjk_chars_per_token(),
        }
    }
}

impl TokenEstimator {
    /// Estimate the token count of a text. Deterministic: identical
    /// input always yields an identical estimate.
    pub fn estimate(&self, text: &str) -> usize {
        let mut latin = 0usize;
        let mut cjk = 0usize;
        for c in text.chars() {
            if is_cjk(c) {
                cjk += 1;
            } else {
                latin += 1;
            }
        }
        let tokens =
            latin as f64 / self.chars_per_token + cjk as f64 / self.cjk_chars_per_token;
        tokens.ceil() as usize
    }
}

/// CJK ideographs, Hangul, and kana — scripts where per-character
/// token cost dominates.
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'   // Hangul Jamo
        | '\u{3040}'..='\u{30FF}' // Hiragana, Katakana
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{AC00}'..='\u{D7AF}' // Hangul Syllables
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
    )
}
