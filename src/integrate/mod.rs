//! Hierarchical integration of per-chunk analysis results.
//!
//! Pure and single-threaded: no provider calls, no randomness, no
//! clock reads beyond the final timestamp. The same inputs always
//! produce the same merged content, which makes the merge properties
//! mechanically checkable.

mod normalize;

pub use normalize::normalize_term;

use std::collections::BTreeMap;

use chrono::Utc;

use crate::chunker::ChunkPlan;
use crate::models::{
    Chunk, ChunkAnalysisResult, ChunkKeyword, CoverageStats, DocumentTree,
    IntegratedAnalysisResult, Keyword, KgEntity, KgRelation, SectionSummary,
};

/// Marker inserted where a failed chunk leaves a hole in the summary
/// chain.
pub const GAP_MARKER: &str = "[analysis unavailable]";

/// Merges ordered per-chunk results into one document-level result.
#[derive(Debug, Clone, Default)]
pub struct ResultIntegrator;

impl ResultIntegrator {
    pub fn new() -> Self {
        Self
    }

    /// Integrate chunk results against the chunk plan they were
    /// produced from. Failed chunks participate as explicit gaps.
    pub fn integrate(
        &self,
        results: &[ChunkAnalysisResult],
        plan: &ChunkPlan,
    ) -> IntegratedAnalysisResult {
        let keywords = merge_keywords(results.iter().map(|r| {
            (
                r.chunk_index,
                r.analysis.as_ref().map(|a| a.keywords.as_slice()).unwrap_or(&[]),
            )
        }));
        let entities = merge_entities(results);
        let relations = merge_relations(results, &entities);

        let summaries = SummaryComposer::new(&plan.tree, &plan.chunks, results).compose();

        let coverage = CoverageStats {
            chunks_ok: results.iter().filter(|r| r.is_ok()).count(),
            chunks_failed: results.iter().filter(|r| !r.is_ok()).count(),
        };

        IntegratedAnalysisResult {
            document_summary: summaries.document_summary,
            keywords,
            entities,
            relations,
            section_summaries: summaries.sections,
            coverage,
            generated_at: Utc::now(),
        }
    }
}

/// Merge keywords across chunks by normalized form.
///
/// Commutative and idempotent: input order never changes the outcome,
/// and merging the same chunk twice adds nothing.
pub fn merge_keywords<'a, I>(per_chunk: I) -> Vec<Keyword>
where
    I: IntoIterator<Item = (usize, &'a [ChunkKeyword])>,
{
    // normalized form -> (best surface, max score, source chunk set)
    let mut merged: BTreeMap<String, (String, f64, Vec<usize>)> = BTreeMap::new();

    for (chunk_index, keywords) in per_chunk {
        for keyword in keywords {
            let norm = normalize_term(&keyword.term);
            if norm.is_empty() {
                continue;
            }
            let surface = keyword.term.trim().to_string();
            let entry = merged
                .entry(norm)
                .or_insert_with(|| (surface.clone(), keyword.score, Vec::new()));

            // Retain the max score; the surface form follows the
            // higher score, ties resolved lexicographically so merges
            // stay order-independent.
            if keyword.score > entry.1 || (keyword.score == entry.1 && surface < entry.0) {
                entry.0 = surface;
            }
            entry.1 = entry.1.max(keyword.score);
            if !entry.2.contains(&chunk_index) {
                entry.2.push(chunk_index);
            }
        }
    }

    let mut out: Vec<Keyword> = merged
        .into_values()
        .map(|(term, score, mut chunks)| {
            chunks.sort_unstable();
            Keyword {
                term,
                score,
                source_chunks: chunks,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.term.cmp(&b.term))
    });
    out
}

/// Merge entities by normalized name plus type. Exact-match only;
/// fuzzy resolution belongs to a later enrichment pass.
fn merge_entities(results: &[ChunkAnalysisResult]) -> Vec<KgEntity> {
    // (norm name, norm type) -> (surface counts, source chunks)
    let mut merged: BTreeMap<(String, String), (BTreeMap<String, usize>, Vec<usize>)> =
        BTreeMap::new();

    for result in results {
        let Some(analysis) = &result.analysis else {
            continue;
        };
        for entity in &analysis.entities {
            let key = (
                normalize_term(&entity.name),
                entity.entity_type.trim().to_lowercase(),
            );
            if key.0.is_empty() {
                continue;
            }
            let entry = merged.entry(key).or_default();
            *entry.0.entry(entity.name.trim().to_string()).or_insert(0) += 1;
            if !entry.1.contains(&result.chunk_index) {
                entry.1.push(result.chunk_index);
            }
        }
    }

    let mut out: Vec<KgEntity> = merged
        .into_iter()
        .map(|((_, entity_type), (surfaces, mut chunks))| {
            let mentions: usize = surfaces.values().sum();
            // Most frequent surface form wins; BTreeMap iteration
            // makes ties lexicographic.
            let name = surfaces
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(name, _)| name.clone())
                .unwrap_or_default();
            chunks.sort_unstable();
            KgEntity {
                name,
                entity_type,
                mentions,
                source_chunks: chunks,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.mentions
            .cmp(&a.mentions)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.entity_type.cmp(&b.entity_type))
    });
    out
}

/// Merge relations by (source, target, type) after entity merging;
/// duplicate relations collapse with evidence counts summed.
fn merge_relations(results: &[ChunkAnalysisResult], entities: &[KgEntity]) -> Vec<KgRelation> {
    // Map normalized entity names to their merged surface form so
    // relation endpoints line up with the entity list.
    let surface_by_norm: BTreeMap<String, &str> = entities
        .iter()
        .map(|e| (normalize_term(&e.name), e.name.as_str()))
        .collect();

    let resolve = |raw: &str| -> String {
        let norm = normalize_term(raw);
        surface_by_norm
            .get(&norm)
            .map(|s| s.to_string())
            .unwrap_or_else(|| raw.trim().to_string())
    };

    let mut merged: BTreeMap<(String, String, String), usize> = BTreeMap::new();
    for result in results {
        let Some(analysis) = &result.analysis else {
            continue;
        };
        for relation in &analysis.relations {
            let key = (
                resolve(&relation.source),
                resolve(&relation.target),
                relation.relation_type.trim().to_lowercase(),
            );
            if key.0.is_empty() || key.1.is_empty() {
                continue;
            }
            *merged.entry(key).or_insert(0) += 1;
        }
    }

    let mut out: Vec<KgRelation> = merged
        .into_iter()
        .map(|((source, target, relation_type), evidence_count)| KgRelation {
            source,
            target,
            relation_type,
            evidence_count,
        })
        .collect();

    out.sort_by(|a, b| {
        b.evidence_count
            .cmp(&a.evidence_count)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.target.cmp(&b.target))
            .then_with(|| a.relation_type.cmp(&b.relation_type))
    });
    out
}

/// Composes hierarchical summaries without re-invoking the provider.
struct SummaryComposer<'a> {
    tree: &'a DocumentTree,
    chunks: &'a [Chunk],
    results: &'a [ChunkAnalysisResult],
}

struct ComposedSummaries {
    document_summary: String,
    sections: Vec<SectionSummary>,
}

impl<'a> SummaryComposer<'a> {
    fn new(
        tree: &'a DocumentTree,
        chunks: &'a [Chunk],
        results: &'a [ChunkAnalysisResult],
    ) -> Self {
        Self {
            tree,
            chunks,
            results,
        }
    }

    fn compose(&self) -> ComposedSummaries {
        let document_summary = self.node_summary(0);

        let mut sections = Vec::new();
        for id in self.tree.pre_order() {
            let node = self.tree.node(id);
            if id == 0 || node.implicit || node.title.is_empty() {
                continue;
            }
            let summary = self.node_summary(id);
            if summary.is_empty() {
                continue;
            }
            sections.push(SectionSummary {
                node_id: id,
                title: node.title.clone(),
                summary,
            });
        }

        ComposedSummaries {
            document_summary,
            sections,
        }
    }

    /// A node covered by exactly one chunk inherits that chunk's local
    /// summary; a node spanning multiple chunks synthesizes one by
    /// concatenating child summaries in document order.
    fn node_summary(&self, node_id: usize) -> String {
        let covering: Vec<&Chunk> = self
            .chunks
            .iter()
            .filter(|c| c.covers_node(node_id))
            .collect();

        if covering.len() == 1 {
            return self.chunk_summary(covering[0].index);
        }

        let node = self.tree.node(node_id);
        if !node.is_leaf() {
            let parts: Vec<String> = node
                .children
                .iter()
                .map(|&child| self.node_summary(child))
                .filter(|s| !s.is_empty())
                .collect();
            return parts.join(" ");
        }

        // A leaf split across chunks: stitch its chunk summaries in
        // order.
        let parts: Vec<String> = covering
            .iter()
            .map(|c| self.chunk_summary(c.index))
            .filter(|s| !s.is_empty())
            .collect();
        parts.join(" ")
    }

    fn chunk_summary(&self, chunk_index: usize) -> String {
        match self.results.iter().find(|r| r.chunk_index == chunk_index) {
            Some(result) if result.is_ok() => result
                .analysis
                .as_ref()
                .map(|a| a.summary.clone())
                .unwrap_or_default(),
            Some(_) => GAP_MARKER.to_string(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChunkAnalysis, ChunkEntity, ChunkRelation, DocumentNode, NodeLevel,
    };

    fn keyword(term: &str, score: f64) -> ChunkKeyword {
        ChunkKeyword {
            term: term.to_string(),
            score,
        }
    }

    fn analysis(
        keywords: Vec<ChunkKeyword>,
        summary: &str,
        entities: Vec<ChunkEntity>,
        relations: Vec<ChunkRelation>,
    ) -> ChunkAnalysis {
        ChunkAnalysis {
            keywords,
            summary: summary.to_string(),
            structure_notes: None,
            entities,
            relations,
        }
    }

    fn ok_result(index: usize, a: ChunkAnalysis) -> ChunkAnalysisResult {
        ChunkAnalysisResult::ok(index, a, 1)
    }

    fn entity(name: &str, t: &str) -> ChunkEntity {
        ChunkEntity {
            name: name.to_string(),
            entity_type: t.to_string(),
        }
    }

    fn relation(s: &str, t: &str, r: &str) -> ChunkRelation {
        ChunkRelation {
            source: s.to_string(),
            target: t.to_string(),
            relation_type: r.to_string(),
        }
    }

    /// Flat plan: root plus one chunk per result.
    fn flat_plan(chunk_count: usize) -> ChunkPlan {
        let tree = DocumentTree::from_nodes(vec![DocumentNode {
            id: 0,
            level: NodeLevel::Document,
            title: String::new(),
            start: 0,
            end: chunk_count * 10,
            parent: None,
            children: vec![],
            implicit: false,
        }]);
        let chunks = (0..chunk_count)
            .map(|i| Chunk {
                index: i,
                start: i * 10,
                end: (i + 1) * 10,
                node_ids: vec![0],
                text: "x".repeat(10),
                estimated_tokens: 3,
                oversized: false,
            })
            .collect();
        ChunkPlan { tree, chunks }
    }

    #[test]
    fn test_keyword_merge_same_root_korean() {
        let merged = merge_keywords(vec![
            (0, &[keyword("네트워크는", 0.8)][..]),
            (1, &[keyword("네트워크", 0.6)][..]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].score, 0.8);
        assert_eq!(merged[0].source_chunks, vec![0, 1]);
    }

    #[test]
    fn test_keyword_merge_commutative() {
        let a = vec![keyword("Network", 0.5), keyword("latency", 0.7)];
        let b = vec![keyword("network", 0.9)];
        let c = vec![keyword("NETWORK", 0.9), keyword("throughput", 0.4)];

        let forward = merge_keywords(vec![(0, &a[..]), (1, &b[..]), (2, &c[..])]);
        let reversed = merge_keywords(vec![(2, &c[..]), (1, &b[..]), (0, &a[..])]);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_keyword_merge_idempotent() {
        let a = vec![keyword("network", 0.5)];
        let once = merge_keywords(vec![(0, &a[..])]);
        let twice = merge_keywords(vec![(0, &a[..]), (0, &a[..])]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_entity_exact_match_only() {
        let results = vec![
            ok_result(
                0,
                analysis(
                    vec![],
                    "s0",
                    vec![entity("ACME Corp", "organization")],
                    vec![],
                ),
            ),
            ok_result(
                1,
                analysis(
                    vec![],
                    "s1",
                    // Same normalized name, same type: merges.
                    vec![entity("acme corp", "organization"),
                         // Different type: stays separate.
                         entity("ACME Corp", "system")],
                    vec![],
                ),
            ),
        ];
        let merged = merge_entities(&results);
        assert_eq!(merged.len(), 2);
        let org = merged
            .iter()
            .find(|e| e.entity_type == "organization")
            .unwrap();
        assert_eq!(org.mentions, 2);
        assert_eq!(org.source_chunks, vec![0, 1]);
    }

    #[test]
    fn test_relations_deduplicated_with_evidence_counts() {
        let results = vec![
            ok_result(
                0,
                analysis(
                    vec![],
                    "s0",
                    vec![entity("ACME", "organization"), entity("Grid", "system")],
                    vec![relation("ACME", "Grid", "operates")],
                ),
            ),
            ok_result(
                1,
                analysis(
                    vec![],
                    "s1",
                    vec![],
                    vec![relation("acme", "grid", "Operates")],
                ),
            ),
        ];
        let entities = merge_entities(&results);
        let relations = merge_relations(&results, &entities);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].evidence_count, 2);
        assert_eq!(relations[0].source, "ACME");
    }

    #[test]
    fn test_integration_deterministic() {
        let results = vec![
            ok_result(
                0,
                analysis(vec![keyword("alpha", 0.9)], "First summary.", vec![], vec![]),
            ),
            ok_result(
                1,
                analysis(vec![keyword("beta", 0.8)], "Second summary.", vec![], vec![]),
            ),
        ];
        let plan = flat_plan(2);
        let integrator = ResultIntegrator::new();
        let a = integrator.integrate(&results, &plan);
        let b = integrator.integrate(&results, &plan);

        // Identical merged content; only the timestamp may differ.
        assert_eq!(a.document_summary, b.document_summary);
        assert_eq!(a.keywords, b.keywords);
        assert_eq!(a.entities, b.entities);
        assert_eq!(a.relations, b.relations);
        assert_eq!(a.section_summaries, b.section_summaries);
        assert_eq!(a.coverage, b.coverage);
    }

    #[test]
    fn test_failed_chunk_becomes_gap() {
        let results = vec![
            ok_result(0, analysis(vec![keyword("alpha", 0.9)], "Good part.", vec![], vec![])),
            ChunkAnalysisResult::failed(1, 3, "timed out".to_string()),
        ];
        let plan = flat_plan(2);
        let integrated = ResultIntegrator::new().integrate(&results, &plan);

        assert_eq!(integrated.coverage.chunks_ok, 1);
        assert_eq!(integrated.coverage.chunks_failed, 1);
        // Best-effort result still carries the surviving content.
        assert_eq!(integrated.keywords.len(), 1);
        assert!(integrated.document_summary.contains("Good part."));
        assert!(integrated.document_summary.contains(GAP_MARKER));
    }

    #[test]
    fn test_hierarchical_summary_composition() {
        // Root with two chapters; chapter 1 covered by chunk 0,
        // chapter 2 by chunk 1; root spans both.
        let tree = DocumentTree::from_nodes(vec![
            DocumentNode {
                id: 0,
                level: NodeLevel::Document,
                title: String::new(),
                start: 0,
                end: 20,
                parent: None,
                children: vec![1, 2],
                implicit: false,
            },
            DocumentNode {
                id: 1,
                level: NodeLevel::Chapter,
                title: "One".into(),
                start: 0,
                end: 10,
                parent: Some(0),
                children: vec![],
                implicit: false,
            },
            DocumentNode {
                id: 2,
                level: NodeLevel::Chapter,
                title: "Two".into(),
                start: 10,
                end: 20,
                parent: Some(0),
                children: vec![],
                implicit: false,
            },
        ]);
        let chunks = vec![
            Chunk {
                index: 0,
                start: 0,
                end: 10,
                node_ids: vec![0, 1],
                text: "aaaaaaaaaa".into(),
                estimated_tokens: 3,
                oversized: false,
            },
            Chunk {
                index: 1,
                start: 10,
                end: 20,
                node_ids: vec![0, 2],
                text: "bbbbbbbbbb".into(),
                estimated_tokens: 3,
                oversized: false,
            },
        ];
        let plan = ChunkPlan { tree, chunks };
        let results = vec![
            ok_result(0, analysis(vec![], "Chapter one covers A.", vec![], vec![])),
            ok_result(1, analysis(vec![], "Chapter two covers B.", vec![], vec![])),
        ];
        let integrated = ResultIntegrator::new().integrate(&results, &plan);

        // Each chapter inherits its single covering chunk's summary.
        assert_eq!(integrated.section_summaries.len(), 2);
        assert_eq!(integrated.section_summaries[0].summary, "Chapter one covers A.");
        assert_eq!(integrated.section_summaries[1].summary, "Chapter two covers B.");
        // The root spans both chunks: synthesized from children in
        // document order.
        assert_eq!(
            integrated.document_summary,
            "Chapter one covers A. Chapter two covers B."
        );
    }
}
