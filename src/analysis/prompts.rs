//! Default prompts for chunk analysis.

/// Prompt for a regular chunk. Placeholders: {breadcrumb} (ancestor
/// section titles), {content} (chunk text).
pub const DEFAULT_CHUNK_PROMPT: &str = r#"You are analyzing one section of a larger document. Read the ENTIRE section before answering - key facts are often deep in the text, not in the first paragraph.

Section location in the document: {breadcrumb}

Section content:
{content}

Respond with ONLY a JSON object, no prose and no markdown fences, in exactly this shape:
{
  "keywords": [{"term": "...", "score": 0.0}],
  "summary": "...",
  "structure_notes": "...",
  "entities": [{"name": "...", "entity_type": "..."}],
  "relations": [{"source": "...", "target": "...", "relation_type": "..."}]
}

CRITICAL INSTRUCTIONS:
1. keywords: 5-10 terms with relevance scores in [0,1]. Prefer specific terms over generic ones.
2. summary: 2-4 sentences covering the section's main points, in the document's own language.
3. structure_notes: one sentence on how this section is organized (lists, tables, subsections), or null.
4. entities: real-world entities mentioned (people, organizations, systems, places). entity_type is a lowercase noun like "person", "organization", "system".
5. relations: directed relations between the entities above, relation_type a short verb phrase.
6. The JSON must be complete and parseable. Do not truncate."#;

/// Reduced prompt for oversized chunks: keywords and summary only, so
/// the relaxed budget goes to reading instead of exhaustive output.
pub const OVERSIZED_CHUNK_PROMPT: &str = r#"You are analyzing one very large section of a document. Read as much as possible and capture only the essentials.

Section location in the document: {breadcrumb}

Section content:
{content}

Respond with ONLY a JSON object, no prose and no markdown fences, in exactly this shape:
{
  "keywords": [{"term": "...", "score": 0.0}],
  "summary": "...",
  "structure_notes": null,
  "entities": [],
  "relations": []
}

CRITICAL INSTRUCTIONS:
1. keywords: 5-10 terms with relevance scores in [0,1].
2. summary: 3-5 sentences covering the whole section, not just its opening.
3. Leave structure_notes null and entities/relations empty.
4. The JSON must be complete and parseable. Do not truncate."#;

/// Render a prompt template with breadcrumb and content.
pub fn render(template: &str, breadcrumb: &str, content: &str) -> String {
    let crumb = if breadcrumb.is_empty() {
        "(document root)"
    } else {
        breadcrumb
    };
    template
        .replace("{breadcrumb}", crumb)
        .replace("{content}", content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholders() {
        let prompt = render(DEFAULT_CHUNK_PROMPT, "Ch 1 > Sec 2", "the text");
        assert!(prompt.contains("Ch 1 > Sec 2"));
        assert!(prompt.contains("the text"));
        assert!(!prompt.contains("{content}"));
        assert!(!prompt.contains("{breadcrumb}"));
    }

    #[test]
    fn test_empty_breadcrumb_replaced() {
        let prompt = render(DEFAULT_CHUNK_PROMPT, "", "text");
        assert!(prompt.contains("(document root)"));
    }
}
