//! Hierarchical document structure.
//!
//! A `DocumentTree` is an arena of `DocumentNode`s built from heading
//! hints. Node 0 is always the document root; children are stored as
//! ordered ids so traversal stays allocation-light.

use serde::{Deserialize, Serialize};

/// Structural level of a node.
///
/// Levels always descend one step at a time; when source headings skip
/// a level, the tree builder inserts an `implicit` node to bridge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLevel {
    Document,
    Chapter,
    Section,
    Subsection,
}

impl NodeLevel {
    /// Depth below the root: Document = 0, Subsection = 3.
    pub fn depth(&self) -> u8 {
        match self {
            Self::Document => 0,
            Self::Chapter => 1,
            Self::Section => 2,
            Self::Subsection => 3,
        }
    }

    /// The level one step deeper, saturating at Subsection.
    pub fn deeper(&self) -> Self {
        match self {
            Self::Document => Self::Chapter,
            Self::Chapter => Self::Section,
            Self::Section | Self::Subsection => Self::Subsection,
        }
    }

    /// Map a 1-based heading level (h1..h6) onto the tree depth.
    /// Anything below h3 collapses into Subsection.
    pub fn from_heading_level(level: u8) -> Self {
        match level {
            0 | 1 => Self::Chapter,
            2 => Self::Section,
            _ => Self::Subsection,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Chapter => "chapter",
            Self::Section => "section",
            Self::Subsection => "subsection",
        }
    }
}

/// One structural unit of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentNode {
    /// Arena index; 0 is the root.
    pub id: usize,
    pub level: NodeLevel,
    /// Heading text; empty for the synthetic root and implicit nodes.
    pub title: String,
    /// Start byte offset into the document text (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Parent arena index; None only for the root.
    pub parent: Option<usize>,
    /// Ordered child arena indices.
    pub children: Vec<usize>,
    /// True when this node was inserted to bridge a skipped heading
    /// level and has no heading of its own.
    pub implicit: bool,
}

impl DocumentNode {
    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena-backed tree over a document's structural units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTree {
    nodes: Vec<DocumentNode>,
}

impl DocumentTree {
    /// Build a tree from a prepared arena. The first node must be the
    /// root covering the full text range.
    pub fn from_nodes(nodes: Vec<DocumentNode>) -> Self {
        debug_assert!(!nodes.is_empty());
        debug_assert!(nodes[0].parent.is_none());
        Self { nodes }
    }

    pub fn root(&self) -> &DocumentNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: usize) -> &DocumentNode {
        &self.nodes[id]
    }

    pub fn get(&self, id: usize) -> Option<&DocumentNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in arena order (which is also document order for the
    /// builder in `chunker::tree`).
    pub fn nodes(&self) -> &[DocumentNode] {
        &self.nodes
    }

    /// Pre-order traversal of node ids.
    pub fn pre_order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![0usize];
        while let Some(id) = stack.pop() {
            out.push(id);
            let node = &self.nodes[id];
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Titles of the ancestors of `id`, outermost first, skipping the
    /// untitled root and implicit nodes. Used to build prompt
    /// breadcrumbs.
    pub fn ancestor_titles(&self, id: usize) -> Vec<&str> {
        let mut titles = Vec::new();
        let mut current = self.nodes[id].parent;
        while let Some(pid) = current {
            let node = &self.nodes[pid];
            if !node.title.is_empty() && !node.implicit {
                titles.push(node.title.as_str());
            }
            current = node.parent;
        }
        titles.reverse();
        titles
    }
}
