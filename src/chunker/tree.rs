//! Document tree construction from heading hints.
//!
//! Headings define the levels; unheaded text stays with the nearest
//! enclosing node, or the synthetic root when no heading precedes it.
//! A heading that skips levels (h1 followed by h3) gets implicit
//! bridge nodes so every node sits exactly one step below its parent.

use crate::models::{DocumentNode, DocumentTree, Heading, NodeLevel, StructuralHints};

/// Build the structural tree for a document's text.
pub fn build_tree(text: &str, hints: &StructuralHints) -> DocumentTree {
    let mut headings: Vec<&Heading> = hints
        .headings
        .iter()
        .filter(|h| h.offset <= text.len() && text.is_char_boundary(h.offset))
        .collect();
    headings.sort_by_key(|h| h.offset);

    let mut nodes = vec![DocumentNode {
        id: 0,
        level: NodeLevel::Document,
        title: String::new(),
        start: 0,
        end: text.len(),
        parent: None,
        children: Vec::new(),
        implicit: false,
    }];

    // Stack of currently-open node ids, root at the bottom.
    let mut stack: Vec<usize> = vec![0];
    let mut last_offset = 0usize;

    for heading in headings {
        if heading.offset < last_offset {
            // Out-of-order hint from a noisy adapter; skip it rather
            // than produce overlapping ranges.
            continue;
        }
        last_offset = heading.offset;

        let target = NodeLevel::from_heading_level(heading.level);

        // Close every open node at the same depth or deeper.
        while nodes[*stack.last().unwrap()].level.depth() >= target.depth() {
            let closed = stack.pop().unwrap();
            nodes[closed].end = heading.offset;
        }

        // Bridge skipped levels with implicit nodes.
        while nodes[*stack.last().unwrap()].level.depth() + 1 < target.depth() {
            let parent = *stack.last().unwrap();
            let level = nodes[parent].level.deeper();
            let id = push_node(
                &mut nodes,
                DocumentNode {
                    id: 0,
                    level,
                    title: String::new(),
                    start: heading.offset,
                    end: text.len(),
                    parent: Some(parent),
                    children: Vec::new(),
                    implicit: true,
                },
            );
            stack.push(id);
        }

        let parent = *stack.last().unwrap();
        let id = push_node(
            &mut nodes,
            DocumentNode {
                id: 0,
                level: target,
                title: heading.text.clone(),
                start: heading.offset,
                end: text.len(),
                parent: Some(parent),
                children: Vec::new(),
                implicit: false,
            },
        );
        stack.push(id);
    }

    DocumentTree::from_nodes(nodes)
}

fn push_node(nodes: &mut Vec<DocumentNode>, mut node: DocumentNode) -> usize {
    let id = nodes.len();
    node.id = id;
    if let Some(parent) = node.parent {
        nodes[parent].children.push(id);
    }
    nodes.push(node);
    id
}
