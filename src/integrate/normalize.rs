//! Script-aware term normalization for merging.
//!
//! Two surface forms merge only when their normalized forms match
//! exactly; there is no fuzzy matching in this layer. Normalization is
//! case-insensitive and strips one trailing grammatical particle from
//! Korean terms, so "네트워크는" and "네트워크" merge.

/// Korean postpositional particles, longest first so compound
/// particles strip before their suffixes.
const KOREAN_PARTICLES: &[&str] = &[
    "으로부터", "에서는", "에게서", "으로서", "으로써", "이라는", "라는", "부터", "까지", "에서",
    "에게", "으로", "처럼", "보다", "은", "는", "이", "가", "을", "를", "과", "와", "의", "에",
    "도", "만", "로",
];

/// Normalize a keyword or entity name for merge comparison.
pub fn normalize_term(term: &str) -> String {
    let trimmed = term
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && !is_hangul(c))
        .to_lowercase();
    strip_korean_particle(&trimmed)
}

/// Strip at most one trailing particle when the remainder still ends
/// in Hangul, so particle-like endings of non-Korean words are left
/// alone.
fn strip_korean_particle(term: &str) -> String {
    for particle in KOREAN_PARTICLES {
        if let Some(stem) = term.strip_suffix(particle) {
            if stem.chars().last().is_some_and(is_hangul) {
                return stem.to_string();
            }
        }
    }
    term.to_string()
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        assert_eq!(normalize_term("Network"), normalize_term("NETWORK"));
    }

    #[test]
    fn test_korean_particle_stripped() {
        assert_eq!(normalize_term("네트워크는"), "네트워크");
        assert_eq!(normalize_term("네트워크가"), "네트워크");
        assert_eq!(normalize_term("네트워크"), "네트워크");
        assert_eq!(normalize_term("서버에서"), "서버");
    }

    #[test]
    fn test_same_root_different_particles_merge() {
        assert_eq!(normalize_term("네트워크는"), normalize_term("네트워크"));
        assert_eq!(normalize_term("데이터를"), normalize_term("데이터"));
    }

    #[test]
    fn test_only_one_particle_stripped() {
        // Compound particle strips as one unit, not recursively.
        assert_eq!(normalize_term("서버으로부터"), "서버");
    }

    #[test]
    fn test_latin_words_untouched_by_particle_rules() {
        assert_eq!(normalize_term("visa"), "visa");
        assert_eq!(normalize_term("data"), "data");
    }

    #[test]
    fn test_punctuation_trimmed() {
        assert_eq!(normalize_term("  \"network\", "), "network");
    }

    #[test]
    fn test_particle_only_term_survives() {
        // A bare particle has no Hangul stem left; keep it as-is.
        assert_eq!(normalize_term("는"), "는");
    }
}
