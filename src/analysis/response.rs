//! Provider response validation.
//!
//! A response is accepted only when it contains one syntactically
//! complete JSON object matching the expected shape; anything partial
//! or truncated is a retryable failure, never a partial success.

use serde::Deserialize;

use super::provider::ProviderError;
use crate::models::{ChunkAnalysis, ChunkEntity, ChunkKeyword, ChunkRelation};

/// Wire format, tolerant of omitted optional sections.
#[derive(Debug, Deserialize)]
struct WireAnalysis {
    #[serde(default)]
    keywords: Vec<WireKeyword>,
    summary: String,
    #[serde(default)]
    structure_notes: Option<String>,
    #[serde(default)]
    entities: Vec<WireEntity>,
    #[serde(default)]
    relations: Vec<WireRelation>,
}

#[derive(Debug, Deserialize)]
struct WireKeyword {
    term: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct WireEntity {
    name: String,
    #[serde(default, alias = "type")]
    entity_type: String,
}

#[derive(Debug, Deserialize)]
struct WireRelation {
    source: String,
    target: String,
    #[serde(default, alias = "type")]
    relation_type: String,
}

/// Parse and validate a raw provider response into a `ChunkAnalysis`.
pub fn parse_chunk_analysis(raw: &str) -> Result<ChunkAnalysis, ProviderError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ProviderError::Malformed("no JSON object in response".to_string()))?;

    let wire: WireAnalysis = serde_json::from_str(json)
        .map_err(|e| ProviderError::Malformed(format!("invalid JSON payload: {}", e)))?;

    if wire.summary.trim().is_empty() {
        return Err(ProviderError::Malformed("empty summary".to_string()));
    }

    Ok(ChunkAnalysis {
        keywords: wire
            .keywords
            .into_iter()
            .filter(|k| !k.term.trim().is_empty())
            .map(|k| ChunkKeyword {
                term: k.term.trim().to_string(),
                score: k.score.clamp(0.0, 1.0),
            })
            .collect(),
        summary: wire.summary.trim().to_string(),
        structure_notes: wire
            .structure_notes
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        entities: wire
            .entities
            .into_iter()
            .filter(|e| !e.name.trim().is_empty())
            .map(|e| ChunkEntity {
                name: e.name.trim().to_string(),
                entity_type: e.entity_type.trim().to_lowercase(),
            })
            .collect(),
        relations: wire
            .relations
            .into_iter()
            .filter(|r| !r.source.trim().is_empty() && !r.target.trim().is_empty())
            .map(|r| ChunkRelation {
                source: r.source.trim().to_string(),
                target: r.target.trim().to_string(),
                relation_type: r.relation_type.trim().to_lowercase(),
            })
            .collect(),
    })
}

/// Locate the outermost balanced JSON object in a response, tolerating
/// markdown fences and prose around it. Returns None when no balanced
/// object exists (a truncated payload).
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
