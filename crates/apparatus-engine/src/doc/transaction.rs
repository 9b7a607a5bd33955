//! Transactional mutation of the document tree.
//!
//! All edits are expressed as [`Step`]s collected into a [`Transaction`] and
//! applied in order; each step's positions address the document as it stands
//! when that step applies. Range deletion never merges partially-covered
//! blocks: each boundary block keeps its surviving content.

use crate::dom::mark::{Mark, MarkKind, add_mark, remove_mark_kind};
use crate::dom::node::Node;
use crate::dom::position::top_level_gap_at_or_after;

/// A single primitive edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Delete {
        from: usize,
        to: usize,
    },
    /// Insert nodes at a position. Block nodes land on the nearest top-level
    /// gap at or after `at`; inline nodes are placed inside the containing
    /// paragraph (or wrapped in a fresh paragraph when `at` is a gap).
    Insert {
        at: usize,
        nodes: Vec<Node>,
    },
    InsertText {
        at: usize,
        text: String,
        marks: Vec<Mark>,
    },
    /// Replace the node starting exactly at `at`.
    ReplaceNode {
        at: usize,
        node: Node,
    },
    AddMark {
        from: usize,
        to: usize,
        mark: Mark,
    },
    RemoveMark {
        from: usize,
        to: usize,
        kind: MarkKind,
    },
}

/// An ordered set of steps plus mutation metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transaction {
    steps: Vec<Step>,
    /// Cleared for programmatic mutations (hydration, resync, undo/redo
    /// restores) that must not enter the history.
    add_to_history: bool,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            add_to_history: true,
        }
    }

    pub fn delete(mut self, from: usize, to: usize) -> Self {
        self.steps.push(Step::Delete { from, to });
        self
    }

    pub fn insert(mut self, at: usize, nodes: Vec<Node>) -> Self {
        self.steps.push(Step::Insert { at, nodes });
        self
    }

    pub fn insert_text(mut self, at: usize, text: impl Into<String>, marks: Vec<Mark>) -> Self {
        self.steps.push(Step::InsertText {
            at,
            text: text.into(),
            marks,
        });
        self
    }

    pub fn replace_with(self, from: usize, to: usize, nodes: Vec<Node>) -> Self {
        // Positions of the insert address the post-delete document, where the
        // deleted span has collapsed onto `from`.
        self.delete(from, to).insert(from, nodes)
    }

    pub fn replace_node(mut self, at: usize, node: Node) -> Self {
        self.steps.push(Step::ReplaceNode { at, node });
        self
    }

    pub fn add_mark(mut self, from: usize, to: usize, mark: Mark) -> Self {
        self.steps.push(Step::AddMark { from, to, mark });
        self
    }

    pub fn remove_mark(mut self, from: usize, to: usize, kind: MarkKind) -> Self {
        self.steps.push(Step::RemoveMark { from, to, kind });
        self
    }

    /// Flag this transaction as invisible to the history manager.
    pub fn without_history(mut self) -> Self {
        self.add_to_history = false;
        self
    }

    pub fn add_to_history(&self) -> bool {
        self.add_to_history
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// True if applying this transaction can change document content.
    pub fn changes_content(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Apply one step to a block sequence.
pub(crate) fn apply_step(blocks: &mut Vec<Node>, step: &Step) {
    match step {
        Step::Delete { from, to } => {
            if from < to {
                delete_in_children(blocks, *from, *to);
                drop_empty_text(blocks);
            }
        }
        Step::Insert { at, nodes } => insert_nodes(blocks, *at, nodes.clone()),
        Step::InsertText { at, text, marks } => {
            insert_nodes(
                blocks,
                *at,
                vec![Node::Text {
                    text: text.clone(),
                    marks: marks.clone(),
                }],
            );
            merge_text_everywhere(blocks);
        }
        Step::ReplaceNode { at, node } => replace_node_at(blocks, *at, node.clone()),
        Step::AddMark { from, to, mark } => {
            mark_in_children(blocks, *from, *to, &mut |marks| {
                add_mark(marks, mark.clone());
            });
            merge_text_everywhere(blocks);
        }
        Step::RemoveMark { from, to, kind } => {
            mark_in_children(blocks, *from, *to, &mut |marks| {
                remove_mark_kind(marks, *kind);
            });
            merge_text_everywhere(blocks);
        }
    }
}

/// Delete `[from, to)` within a child sequence. Positions are relative to the
/// sequence; fully-covered children are removed, partially-covered text loses
/// the covered characters, partially-covered containers recurse.
fn delete_in_children(children: &mut Vec<Node>, from: usize, to: usize) {
    let mut offset = 0;
    let mut i = 0;
    while i < children.len() {
        let size = children[i].size();
        let (start, end) = (offset, offset + size);
        offset = end;

        if end <= from || start >= to {
            i += 1;
            continue;
        }
        if from <= start && end <= to {
            children.remove(i);
            continue;
        }

        match &mut children[i] {
            Node::Text { text, .. } => {
                let chars: Vec<char> = text.chars().collect();
                let del_from = from.saturating_sub(start);
                let del_to = (to - start).min(chars.len());
                let mut kept: String = chars[..del_from].iter().collect();
                kept.extend(&chars[del_to..]);
                *text = kept;
            }
            node if node.is_block() => {
                let content_start = start + 1;
                let content_end = end - 1;
                let inner_from = from.max(content_start) - content_start;
                let inner_to = to.min(content_end).saturating_sub(content_start);
                if inner_from < inner_to
                    && let Some(content) = node.children_mut()
                {
                    delete_in_children(content, inner_from, inner_to);
                }
            }
            // Atoms are size 1: always fully inside or fully outside.
            _ => {}
        }
        i += 1;
    }
}

fn drop_empty_text(children: &mut Vec<Node>) {
    children.retain_mut(|child| {
        if let Some(content) = child.children_mut() {
            drop_empty_text(content);
        }
        !matches!(child, Node::Text { text, .. } if text.is_empty())
    });
}

/// Insert nodes at a position, wrapping inline runs in paragraphs when the
/// target is a top-level gap.
fn insert_nodes(blocks: &mut Vec<Node>, at: usize, nodes: Vec<Node>) {
    if nodes.is_empty() {
        return;
    }
    let all_inline = nodes.iter().all(Node::is_inline);
    if all_inline {
        // Try the containing paragraph first.
        if insert_inline(blocks, at, &nodes) {
            return;
        }
        let (index, _) = top_level_gap_at_or_after(blocks, at);
        blocks.insert(index, Node::paragraph(nodes));
        return;
    }
    let wrapped = wrap_inline_runs(nodes);
    let (index, _) = top_level_gap_at_or_after(blocks, at);
    blocks.splice(index..index, wrapped);
}

/// Group consecutive inline nodes into paragraphs so a mixed node list can be
/// spliced at the top level.
fn wrap_inline_runs(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::new();
    let mut run = Vec::new();
    for node in nodes {
        if node.is_inline() {
            run.push(node);
        } else {
            if !run.is_empty() {
                out.push(Node::paragraph(std::mem::take(&mut run)));
            }
            out.push(node);
        }
    }
    if !run.is_empty() {
        out.push(Node::paragraph(run));
    }
    out
}

/// Insert inline nodes into the container whose content spans `at`. Returns
/// false when `at` does not fall inside any container.
fn insert_inline(children: &mut Vec<Node>, at: usize, nodes: &[Node]) -> bool {
    let mut offset = 0;
    for i in 0..children.len() {
        let size = children[i].size();
        let (start, end) = (offset, offset + size);
        offset = end;
        if at < start || at > end {
            continue;
        }

        match &mut children[i] {
            Node::Text { text, marks } if at > start && at < end => {
                // Split the text run and splice between the halves.
                let split = at - start;
                let chars: Vec<char> = text.chars().collect();
                let before: String = chars[..split].iter().collect();
                let after: String = chars[split..].iter().collect();
                let marks = marks.clone();
                let mut replacement = vec![Node::Text {
                    text: before,
                    marks: marks.clone(),
                }];
                replacement.extend(nodes.iter().cloned());
                replacement.push(Node::Text { text: after, marks });
                children.splice(i..=i, replacement);
                return true;
            }
            node if node.is_block() && at > start && at < end => {
                let content_at = at - (start + 1);
                if let Some(content) = node.children_mut() {
                    if insert_inline(content, content_at, nodes) {
                        return true;
                    }
                    // `at` sits on a child boundary inside this container;
                    // splice only where inline content is welcome.
                    if content.iter().all(Node::is_inline) {
                        let idx = child_index_at(content, content_at);
                        content.splice(idx..idx, nodes.iter().cloned());
                        return true;
                    }
                }
                return false;
            }
            _ if at == start || at == end => {
                // Boundary between siblings: only valid inside a container,
                // which the recursive caller handles via child_index_at.
                continue;
            }
            _ => continue,
        }
    }
    false
}

/// The child index whose start equals `at`, for splicing at a boundary.
fn child_index_at(children: &[Node], at: usize) -> usize {
    let mut offset = 0;
    for (i, child) in children.iter().enumerate() {
        if offset >= at {
            return i;
        }
        offset += child.size();
    }
    children.len()
}

fn replace_node_at(blocks: &mut [Node], at: usize, replacement: Node) {
    fn walk(children: &mut [Node], at: usize, replacement: &mut Option<Node>) {
        let mut offset = 0;
        for child in children.iter_mut() {
            let size = child.size();
            if offset == at
                && let Some(node) = replacement.take()
            {
                *child = node;
                return;
            }
            if at > offset && at < offset + size
                && let Some(content) = child.children_mut()
            {
                walk(content, at - (offset + 1), replacement);
                if replacement.is_none() {
                    return;
                }
            }
            offset += size;
        }
    }
    let mut slot = Some(replacement);
    walk(blocks, at, &mut slot);
}

/// Apply `f` to the mark set of every text span covered by `[from, to)`,
/// splitting partially-covered runs.
fn mark_in_children(
    children: &mut Vec<Node>,
    from: usize,
    to: usize,
    f: &mut impl FnMut(&mut Vec<Mark>),
) {
    let mut offset = 0;
    let mut i = 0;
    while i < children.len() {
        let size = children[i].size();
        let (start, end) = (offset, offset + size);
        offset = end;
        if end <= from || start >= to {
            i += 1;
            continue;
        }

        match &mut children[i] {
            Node::Text { text, marks } => {
                let chars: Vec<char> = text.chars().collect();
                let a = from.saturating_sub(start);
                let b = (to - start).min(chars.len());
                if a == 0 && b == chars.len() {
                    f(marks);
                    i += 1;
                    continue;
                }
                let mut pieces = Vec::new();
                if a > 0 {
                    pieces.push(Node::Text {
                        text: chars[..a].iter().collect(),
                        marks: marks.clone(),
                    });
                }
                let mut mid_marks = marks.clone();
                f(&mut mid_marks);
                pieces.push(Node::Text {
                    text: chars[a..b].iter().collect(),
                    marks: mid_marks,
                });
                if b < chars.len() {
                    pieces.push(Node::Text {
                        text: chars[b..].iter().collect(),
                        marks: marks.clone(),
                    });
                }
                let count = pieces.len();
                children.splice(i..=i, pieces);
                i += count;
            }
            node if node.is_block() => {
                let content_start = start + 1;
                let inner_from = from.max(content_start) - content_start;
                let inner_to = to.min(end - 1).saturating_sub(content_start);
                if inner_from < inner_to
                    && let Some(content) = node.children_mut()
                {
                    mark_in_children(content, inner_from, inner_to, f);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
}

/// Merge adjacent text runs carrying identical marks.
fn merge_text_everywhere(children: &mut Vec<Node>) {
    let mut i = 0;
    while i < children.len() {
        if let Some(content) = children[i].children_mut() {
            merge_text_everywhere(content);
        }
        if i + 1 < children.len() {
            let (left, right) = children.split_at_mut(i + 1);
            if let (Node::Text { text: a, marks: ma }, Node::Text { text: b, marks: mb }) =
                (&mut left[i], &right[0])
                && ma == mb
            {
                a.push_str(b);
                children.remove(i + 1);
                continue;
            }
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::DividerAttrs;
    use pretty_assertions::assert_eq;

    fn para(text: &str) -> Node {
        Node::paragraph(vec![Node::text(text)])
    }

    fn divider() -> Node {
        Node::SectionDivider {
            attrs: DividerAttrs::default(),
        }
    }

    fn texts(blocks: &[Node]) -> Vec<String> {
        blocks.iter().map(Node::readable_text).collect()
    }

    // ============ Delete step tests ============

    #[test]
    fn test_delete_inside_one_paragraph() {
        // para "hello world": open 0, chars at 1..=11, close 12
        let mut blocks = vec![para("hello world")];
        apply_step(&mut blocks, &Step::Delete { from: 6, to: 12 });
        assert_eq!(texts(&blocks), vec!["hello".to_string()]);
    }

    #[test]
    fn test_delete_text_range() {
        let mut blocks = vec![para("hello world")];
        apply_step(&mut blocks, &Step::Delete { from: 6, to: 11 });
        assert_eq!(texts(&blocks), vec!["hellod".to_string()]);
    }

    #[test]
    fn test_delete_whole_block() {
        let mut blocks = vec![para("one"), para("two")];
        // first para spans [0,5)
        apply_step(&mut blocks, &Step::Delete { from: 0, to: 5 });
        assert_eq!(texts(&blocks), vec!["two".to_string()]);
    }

    #[test]
    fn test_delete_across_blocks_keeps_partial_blocks() {
        // "one" [0,5), "two" [5,10)
        let mut blocks = vec![para("one"), para("two")];
        apply_step(&mut blocks, &Step::Delete { from: 3, to: 7 });
        assert_eq!(texts(&blocks), vec!["on".to_string(), "wo".to_string()]);
    }

    #[test]
    fn test_delete_covers_divider() {
        let mut blocks = vec![para("ab"), divider(), para("cd")];
        // spans: [0,4) [4,5) [5,9)
        apply_step(&mut blocks, &Step::Delete { from: 0, to: 9 });
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_delete_empty_range_is_noop() {
        let mut blocks = vec![para("ab")];
        apply_step(&mut blocks, &Step::Delete { from: 2, to: 2 });
        assert_eq!(texts(&blocks), vec!["ab".to_string()]);
    }

    // ============ Insert step tests ============

    #[test]
    fn test_insert_block_at_gap() {
        let mut blocks = vec![para("ab"), para("cd")];
        apply_step(
            &mut blocks,
            &Step::Insert {
                at: 4,
                nodes: vec![divider()],
            },
        );
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[1], Node::SectionDivider { .. }));
    }

    #[test]
    fn test_insert_block_inside_paragraph_rounds_up() {
        let mut blocks = vec![para("ab"), para("cd")];
        apply_step(
            &mut blocks,
            &Step::Insert {
                at: 2,
                nodes: vec![divider()],
            },
        );
        // Lands on the gap after the first paragraph
        assert!(matches!(blocks[1], Node::SectionDivider { .. }));
    }

    #[test]
    fn test_insert_inline_splits_text() {
        let mut blocks = vec![para("abcd")];
        let atom = Node::Siglum {
            attrs: crate::dom::node::SiglumAttrs {
                runs: vec![crate::dom::style::SiglumRun::plain("B")],
            },
        };
        apply_step(
            &mut blocks,
            &Step::Insert {
                at: 3,
                nodes: vec![atom],
            },
        );
        let children = blocks[0].children();
        assert_eq!(children.len(), 3);
        assert!(matches!(&children[0], Node::Text { text, .. } if text == "ab"));
        assert!(matches!(children[1], Node::Siglum { .. }));
        assert!(matches!(&children[2], Node::Text { text, .. } if text == "cd"));
    }

    #[test]
    fn test_insert_inline_at_gap_wraps_in_paragraph() {
        let mut blocks = vec![para("ab")];
        apply_step(
            &mut blocks,
            &Step::Insert {
                at: 4,
                nodes: vec![Node::text("tail")],
            },
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].readable_text(), "tail");
    }

    #[test]
    fn test_insert_text_merges_runs() {
        let mut blocks = vec![para("ad")];
        apply_step(
            &mut blocks,
            &Step::InsertText {
                at: 2,
                text: "bc".to_string(),
                marks: Vec::new(),
            },
        );
        assert_eq!(blocks[0].children().len(), 1);
        assert_eq!(blocks[0].readable_text(), "abcd");
    }

    #[test]
    fn test_replace_with_composes() {
        let mut blocks = vec![para("hello world")];
        let tr = Transaction::new().replace_with(7, 12, vec![Node::text("rust!")]);
        for step in tr.steps() {
            apply_step(&mut blocks, step);
        }
        assert_eq!(blocks[0].readable_text(), "hello rust!");
    }

    // ============ Mark step tests ============

    #[test]
    fn test_add_mark_splits_partial_run() {
        let mut blocks = vec![para("abcdef")];
        apply_step(
            &mut blocks,
            &Step::AddMark {
                from: 3,
                to: 5,
                mark: Mark::Bold,
            },
        );
        let children = blocks[0].children();
        assert_eq!(children.len(), 3);
        assert!(matches!(&children[1], Node::Text { text, marks } if text == "cd" && marks.contains(&Mark::Bold)));
    }

    #[test]
    fn test_remove_mark_then_merge() {
        let mut blocks = vec![Node::paragraph(vec![
            Node::text("ab"),
            Node::Text {
                text: "cd".to_string(),
                marks: vec![Mark::Bold],
            },
        ])];
        // whole content is [1,5)
        apply_step(
            &mut blocks,
            &Step::RemoveMark {
                from: 1,
                to: 5,
                kind: MarkKind::Bold,
            },
        );
        assert_eq!(blocks[0].children().len(), 1);
        assert_eq!(blocks[0].readable_text(), "abcd");
    }

    #[test]
    fn test_replace_node_step() {
        let mut blocks = vec![para("ab"), divider()];
        apply_step(
            &mut blocks,
            &Step::ReplaceNode {
                at: 4,
                node: para("new"),
            },
        );
        assert_eq!(texts(&blocks), vec!["ab".to_string(), "new".to_string()]);
    }

    #[test]
    fn test_transaction_metadata() {
        let tr = Transaction::new().delete(0, 1).without_history();
        assert!(!tr.add_to_history());
        assert!(tr.changes_content());
        assert!(Transaction::new().steps().is_empty());
    }
}
