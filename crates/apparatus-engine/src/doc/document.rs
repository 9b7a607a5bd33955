use std::collections::HashMap;

use uuid::Uuid;

use crate::doc::events::DeletedMarkKind;
use crate::doc::transaction::{Transaction, apply_step};
use crate::dom::mark::Mark;
use crate::dom::node::{ApparatusKind, Node};
use crate::dom::position::{DocIndex, node_at, total_size};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid document JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("document root must contain block nodes, found {0}")]
    InlineAtRoot(String),
    #[error("position {0} is out of bounds (document size {1})")]
    OutOfBounds(usize, usize),
}

/// A caret or range selection over flattened positions, normalized so that
/// `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
}

impl Selection {
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            from: a.min(b),
            to: a.max(b),
        }
    }

    pub fn caret(at: usize) -> Self {
        Self { from: at, to: at }
    }

    pub fn is_caret(&self) -> bool {
        self.from == self.to
    }
}

/// The authoritative document: an ordered sequence of top-level block nodes
/// plus a version counter incremented on each applied transaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    blocks: Vec<Node>,
    version: u64,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Node>) -> Result<Self, DocumentError> {
        if let Some(inline) = blocks.iter().find(|n| n.is_inline()) {
            return Err(DocumentError::InlineAtRoot(format!("{inline:?}")));
        }
        Ok(Self { blocks, version: 0 })
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let blocks: Vec<Node> = serde_json::from_str(json)?;
        Self::from_blocks(blocks)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.blocks).expect("document tree serializes")
    }

    pub fn blocks(&self) -> &[Node] {
        &self.blocks
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Node> {
        &mut self.blocks
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Total flattened size; select-all with no protected nodes spans
    /// `[0, size]`.
    pub fn size(&self) -> usize {
        total_size(&self.blocks)
    }

    /// Build the position index for this document state. Rebuilt per
    /// traversal; callers should reuse one index within a pass.
    pub fn index(&self) -> DocIndex {
        DocIndex::build(&self.blocks)
    }

    pub fn node_at_path(&self, path: &[usize]) -> Option<&Node> {
        node_at(&self.blocks, path)
    }

    /// Apply a transaction's steps in order. The version advances once per
    /// content-changing transaction.
    pub fn apply(&mut self, tr: &Transaction) {
        if tr.is_empty() {
            return;
        }
        for step in tr.steps() {
            apply_step(&mut self.blocks, step);
        }
        self.version += 1;
    }

    /// Depth-first traversal of the whole document with absolute positions.
    /// The visitor may return `false` to prune a subtree.
    pub fn descendants(&self, visitor: &mut impl FnMut(&Node, usize) -> bool) {
        let mut offset = 0;
        for block in &self.blocks {
            let base = offset;
            block.descendants(&mut |node, pos| visitor(node, base + pos));
            offset += block.size();
        }
    }

    /// Apparatus entry ids in document order.
    pub fn apparatus_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for block in &self.blocks {
            if let Node::ApparatusEntry { attrs, .. } = block {
                ids.push(attrs.id);
            }
        }
        ids
    }

    /// The apparatus entry with the given id, with its span.
    pub fn apparatus_entry(&self, id: Uuid) -> Option<(&Node, std::ops::Range<usize>)> {
        let mut offset = 0;
        for block in &self.blocks {
            let size = block.size();
            if let Node::ApparatusEntry { attrs, .. } = block
                && attrs.id == id
            {
                return Some((block, offset..offset + size));
            }
            offset += size;
        }
        None
    }

    /// All apparatus entries with spans, in document order.
    pub fn apparatus_entries(&self) -> Vec<(&Node, std::ops::Range<usize>)> {
        let mut out = Vec::new();
        let mut offset = 0;
        for block in &self.blocks {
            let size = block.size();
            if matches!(block, Node::ApparatusEntry { .. }) {
                out.push((block, offset..offset + size));
            }
            offset += size;
        }
        out
    }

    /// Ids of existing margin entries, by side.
    pub fn margin_ids(&self, kind: ApparatusKind) -> Vec<Uuid> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Node::ApparatusEntry { attrs, .. } if attrs.kind == kind => Some(attrs.id),
                _ => None,
            })
            .collect()
    }

    /// Every lemma in the document with its owning apparatus entry id (via
    /// the ancestor path) and start position, in document order.
    pub fn lemmas(&self) -> Vec<LemmaSite> {
        let mut sites = Vec::new();
        let mut offset = 0;
        for block in &self.blocks {
            if let Node::ApparatusEntry { attrs, .. } = block {
                let owner = attrs.id;
                let base = offset;
                block.descendants(&mut |node, pos| {
                    if let Node::Lemma { attrs } = node {
                        sites.push(LemmaSite {
                            owner,
                            lemma: attrs.clone(),
                            start: base + pos,
                        });
                    }
                    true
                });
            }
            offset += block.size();
        }
        sites
    }

    /// Concatenated readable text covered by `[from, to)`.
    pub fn text_between(&self, from: usize, to: usize) -> String {
        let mut out = String::new();
        self.descendants(&mut |node, pos| {
            if let Node::Text { text, .. } = node {
                let size = node.size();
                if pos + size <= from || pos >= to {
                    return true;
                }
                let chars: Vec<char> = text.chars().collect();
                let a = from.saturating_sub(pos);
                let b = (to - pos).min(chars.len());
                out.extend(&chars[a..b]);
            }
            true
        });
        out
    }

    /// All annotation marks (comment/bookmark/note) keyed by id, each with
    /// the concatenated text it covers. Used for deletion diffing between
    /// document states.
    pub fn annotation_marks(&self) -> HashMap<Uuid, (DeletedMarkKind, String)> {
        let mut map: HashMap<Uuid, (DeletedMarkKind, String)> = HashMap::new();
        self.descendants(&mut |node, _| {
            if let Node::Text { text, marks } = node {
                for mark in marks {
                    let (id, kind) = match mark {
                        Mark::Comment { id, .. } => (*id, DeletedMarkKind::Comment),
                        Mark::Bookmark { id, .. } => (*id, DeletedMarkKind::Bookmark),
                        Mark::Note { id } => (*id, DeletedMarkKind::Note),
                        _ => continue,
                    };
                    map.entry(id)
                        .and_modify(|(_, content)| content.push_str(text))
                        .or_insert_with(|| (kind, text.clone()));
                }
            }
            true
        });
        map
    }

    /// Minimal HTML rendering of the document: paragraphs, entries as
    /// paragraphs with a data attribute, dividers as rules, basic face marks.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for block in &self.blocks {
            render_block(block, &mut html);
        }
        html
    }
}

/// One lemma occurrence resolved to its owner.
#[derive(Debug, Clone)]
pub struct LemmaSite {
    pub owner: Uuid,
    pub lemma: crate::dom::node::LemmaAttrs,
    pub start: usize,
}

fn render_block(node: &Node, html: &mut String) {
    match node {
        Node::Paragraph { content, .. } => {
            html.push_str("<p>");
            for child in content {
                render_inline(child, html);
            }
            html.push_str("</p>");
        }
        Node::ApparatusEntry { attrs, content } => {
            html.push_str(&format!("<div data-apparatus-id=\"{}\">", attrs.id));
            for child in content {
                render_block(child, html);
            }
            html.push_str("</div>");
        }
        Node::SectionDivider { .. } => html.push_str("<hr>"),
        inline => render_inline(inline, html),
    }
}

fn render_inline(node: &Node, html: &mut String) {
    match node {
        Node::Text { text, marks } => {
            let mut open = String::new();
            let mut close = String::new();
            for mark in marks {
                let tag = match mark {
                    Mark::Bold => Some("strong"),
                    Mark::Italic => Some("em"),
                    Mark::Underline => Some("u"),
                    Mark::Strikethrough => Some("s"),
                    Mark::Superscript => Some("sup"),
                    Mark::Subscript => Some("sub"),
                    _ => None,
                };
                if let Some(tag) = tag {
                    open.push_str(&format!("<{tag}>"));
                    close.insert_str(0, &format!("</{tag}>"));
                }
            }
            html.push_str(&open);
            html.push_str(&escape_html(text));
            html.push_str(&close);
        }
        Node::Lemma { attrs } => {
            html.push_str(&format!(
                "<span data-lemma-id=\"{}\">{}</span>",
                attrs.id,
                escape_html(&attrs.display())
            ));
        }
        Node::Reading { attrs } => html.push_str(&escape_html(&attrs.text.content)),
        Node::ReadingSeparator { attrs } => html.push_str(&escape_html(&attrs.content)),
        Node::Siglum { attrs } => html.push_str(&escape_html(&attrs.text())),
        _ => {}
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
