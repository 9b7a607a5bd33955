//! Flattened positions over the node tree.
//!
//! Positions count one per text character, one per atom/divider, and one for
//! each container boundary. The [`DocIndex`] is rebuilt once per traversal
//! and carries every node's ancestor path and span, so consumers resolve
//! parents and owners without re-scanning the tree per node.

use crate::dom::node::{Node, OBJECT_REPLACEMENT};

/// One node's address and span within a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedNode {
    /// Child indices from the document root down to this node.
    pub path: Vec<usize>,
    /// Position before the node.
    pub start: usize,
    /// Position after the node (`start + size`).
    pub end: usize,
    pub protected: bool,
    pub is_block: bool,
}

impl IndexedNode {
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Content span of a container block (inside its boundaries).
    pub fn content_range(&self) -> std::ops::Range<usize> {
        self.start + 1..self.end.saturating_sub(1)
    }
}

/// Preorder index of every node in a document, built in one walk.
#[derive(Debug, Default)]
pub struct DocIndex {
    entries: Vec<IndexedNode>,
}

impl DocIndex {
    pub fn build(blocks: &[Node]) -> Self {
        let mut entries = Vec::new();
        let mut offset = 0;
        for (i, block) in blocks.iter().enumerate() {
            push_entries(block, vec![i], offset, &mut entries);
            offset += block.size();
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[IndexedNode] {
        &self.entries
    }

    /// Protected nodes whose span lies strictly within `[from, to)`, in
    /// document order.
    pub fn protected_within(&self, from: usize, to: usize) -> Vec<&IndexedNode> {
        self.entries
            .iter()
            .filter(|e| e.protected && e.start >= from && e.end <= to)
            .collect()
    }

    /// True if any protected node touches the window `[pos - window,
    /// pos + window]` around a caret.
    pub fn protected_near(&self, pos: usize, window: usize) -> bool {
        let lo = pos.saturating_sub(window);
        let hi = pos + window;
        self.entries
            .iter()
            .any(|e| e.protected && e.end > lo && e.start < hi)
    }

    /// True if any protected node intersects `[from, to)`.
    pub fn protected_intersects(&self, from: usize, to: usize) -> bool {
        self.entries
            .iter()
            .any(|e| e.protected && e.end > from && e.start < to)
    }

    /// The deepest node whose span contains `pos`.
    pub fn deepest_at(&self, pos: usize) -> Option<&IndexedNode> {
        self.entries
            .iter()
            .filter(|e| e.start <= pos && pos < e.end)
            .max_by_key(|e| e.depth())
    }

    /// The ancestor path of the deepest node containing `pos`, outermost
    /// first. Empty when `pos` falls in a top-level gap.
    pub fn ancestors_of(&self, pos: usize) -> Vec<&IndexedNode> {
        let mut chain: Vec<&IndexedNode> = self
            .entries
            .iter()
            .filter(|e| e.start <= pos && pos < e.end)
            .collect();
        chain.sort_by_key(|e| e.depth());
        chain
    }
}

fn push_entries(node: &Node, path: Vec<usize>, start: usize, out: &mut Vec<IndexedNode>) {
    out.push(IndexedNode {
        path: path.clone(),
        start,
        end: start + node.size(),
        protected: node.is_protected(),
        is_block: node.is_block(),
    });
    let mut offset = start + 1;
    for (i, child) in node.children().iter().enumerate() {
        let mut child_path = path.clone();
        child_path.push(i);
        push_entries(child, child_path, offset, out);
        offset += child.size();
    }
}

/// Total flattened size of a block sequence.
pub fn total_size(blocks: &[Node]) -> usize {
    blocks.iter().map(Node::size).sum()
}

/// Fetch a node by its path.
pub fn node_at<'a>(blocks: &'a [Node], path: &[usize]) -> Option<&'a Node> {
    let (&first, rest) = path.split_first()?;
    let mut node = blocks.get(first)?;
    for &i in rest {
        node = node.children().get(i)?;
    }
    Some(node)
}

/// Fetch a node mutably by its path.
pub fn node_at_mut<'a>(blocks: &'a mut [Node], path: &[usize]) -> Option<&'a mut Node> {
    let (&first, rest) = path.split_first()?;
    let mut node = blocks.get_mut(first)?;
    for &i in rest {
        node = node.children_mut()?.get_mut(i)?;
    }
    Some(node)
}

/// The character a position flattens to: a text character, the object
/// replacement placeholder for atoms and dividers, or `None` for container
/// boundaries.
pub fn char_at(blocks: &[Node], index: &DocIndex, pos: usize) -> Option<char> {
    let deepest = index.deepest_at(pos)?;
    let node = node_at(blocks, &deepest.path)?;
    match node {
        Node::Text { text, .. } => text.chars().nth(pos - deepest.start),
        n if n.is_atom() => Some(OBJECT_REPLACEMENT),
        Node::SectionDivider { .. } => Some(OBJECT_REPLACEMENT),
        _ => None,
    }
}

/// The nearest gap between top-level blocks at or after `pos`. Block
/// insertion lands on top-level gaps; positions inside a block round up to
/// the gap after it.
pub fn top_level_gap_at_or_after(blocks: &[Node], pos: usize) -> (usize, usize) {
    let mut offset = 0;
    for (i, block) in blocks.iter().enumerate() {
        if offset >= pos {
            return (i, offset);
        }
        offset += block.size();
    }
    (blocks.len(), offset)
}
