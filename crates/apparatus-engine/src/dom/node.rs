use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dom::mark::Mark;
use crate::dom::style::{SiglumRun, StyledText};

/// Placeholder character standing in for an atomic inline node wherever the
/// document is flattened to plain text (selection trimming, clipboard).
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Apparatus entry kinds. At most one `InnerMargin` and one `OuterMargin`
/// entry may exist document-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApparatusKind {
    Critical,
    PageNotes,
    SectionNotes,
    InnerMargin,
    OuterMargin,
}

impl ApparatusKind {
    pub fn is_margin(&self) -> bool {
        matches!(self, ApparatusKind::InnerMargin | ApparatusKind::OuterMargin)
    }

    /// The opposite margin side; non-margin kinds are unchanged.
    pub fn swapped_margin(&self) -> ApparatusKind {
        match self {
            ApparatusKind::InnerMargin => ApparatusKind::OuterMargin,
            ApparatusKind::OuterMargin => ApparatusKind::InnerMargin,
            other => *other,
        }
    }
}

/// Variant categories a reading can record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Addition,
    Omission,
    Transposition,
    Deletion,
    Custom { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphAttrs {
    pub level: u8,
    pub indent: u8,
    pub style_id: String,
}

impl Default for ParagraphAttrs {
    fn default() -> Self {
        Self {
            level: 1,
            indent: 0,
            style_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttrs {
    pub id: Uuid,
    pub kind: ApparatusKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DividerAttrs {
    /// Optional section label ("Introduction", "Bibliography", ...).
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LemmaAttrs {
    /// Matches the owning apparatus entry's id.
    pub id: Uuid,
    pub lemma: StyledText,
    pub from_to_separator: StyledText,
    pub separator: StyledText,
}

impl LemmaAttrs {
    /// The elided display form of the lemma content.
    ///
    /// More than six words render as the first three and last three joined by
    /// the from-to separator; three to six words as the first and last word;
    /// two or fewer verbatim with no separator.
    pub fn display(&self) -> String {
        let words: Vec<&str> = self.lemma.content.split_whitespace().collect();
        let sep = self.from_to_separator.content.as_str();
        match words.len() {
            0..=2 => words.join(" "),
            3..=6 => format!("{} {} {}", words[0], sep, words[words.len() - 1]),
            _ => format!(
                "{} {} {}",
                words[..3].join(" "),
                sep,
                words[words.len() - 3..].join(" ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingAttrs {
    pub kind: ReadingKind,
    pub text: StyledText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiglumAttrs {
    pub runs: Vec<SiglumRun>,
}

impl SiglumAttrs {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.content.as_str()).collect()
    }
}

/// A node in the document tree.
///
/// Block nodes (`Paragraph`, `ApparatusEntry`, `SectionDivider`) live at the
/// top level; `ApparatusEntry` contains exactly one paragraph which holds the
/// inline nodes. All other variants are inline. `SectionDivider` and `Lemma`
/// are protected: ordinary edit operations must never remove them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Paragraph {
        attrs: ParagraphAttrs,
        #[serde(default)]
        content: Vec<Node>,
    },
    ApparatusEntry {
        attrs: EntryAttrs,
        #[serde(default)]
        content: Vec<Node>,
    },
    SectionDivider {
        #[serde(default)]
        attrs: DividerAttrs,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        marks: Vec<Mark>,
    },
    Lemma {
        attrs: LemmaAttrs,
    },
    Reading {
        attrs: ReadingAttrs,
    },
    ReadingSeparator {
        attrs: StyledText,
    },
    Siglum {
        attrs: SiglumAttrs,
    },
}

impl Node {
    pub fn paragraph(content: Vec<Node>) -> Node {
        Node::Paragraph {
            attrs: ParagraphAttrs::default(),
            content,
        }
    }

    /// The empty paragraph re-inserted after preserved protected nodes.
    pub fn empty_paragraph() -> Node {
        Node::paragraph(Vec::new())
    }

    pub fn text(text: impl Into<String>) -> Node {
        Node::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Node::Paragraph { .. } | Node::ApparatusEntry { .. } | Node::SectionDivider { .. }
        )
    }

    pub fn is_inline(&self) -> bool {
        !self.is_block()
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text { .. })
    }

    /// Inline leaves occupy a single position and flatten to the object
    /// replacement character.
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Node::Lemma { .. }
                | Node::Reading { .. }
                | Node::ReadingSeparator { .. }
                | Node::Siglum { .. }
        )
    }

    /// Protected nodes must survive ordinary deletion, cut, paste and drag.
    pub fn is_protected(&self) -> bool {
        matches!(self, Node::SectionDivider { .. } | Node::Lemma { .. })
    }

    pub fn children(&self) -> &[Node] {
        match self {
            Node::Paragraph { content, .. } | Node::ApparatusEntry { content, .. } => content,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Paragraph { content, .. } | Node::ApparatusEntry { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Size of this node in flattened positions: text counts one position per
    /// character, atoms and dividers count one, container blocks count their
    /// content plus an opening and a closing boundary.
    pub fn size(&self) -> usize {
        match self {
            Node::Text { text, .. } => text.chars().count(),
            Node::SectionDivider { .. } => 1,
            Node::Paragraph { content, .. } | Node::ApparatusEntry { content, .. } => {
                content.iter().map(Node::size).sum::<usize>() + 2
            }
            _ => 1,
        }
    }

    /// Depth-first traversal. The visitor receives each node with its start
    /// position and may return `false` to skip the node's children.
    pub fn descendants(&self, visitor: &mut impl FnMut(&Node, usize) -> bool) {
        fn walk(node: &Node, pos: usize, visitor: &mut impl FnMut(&Node, usize) -> bool) {
            if !visitor(node, pos) {
                return;
            }
            let mut offset = pos + 1;
            for child in node.children() {
                walk(child, offset, visitor);
                offset += child.size();
            }
        }
        walk(self, 0, visitor);
    }

    /// Concatenated plain text of this subtree, with atoms flattened to the
    /// object replacement character.
    pub fn flat_text(&self) -> String {
        let mut out = String::new();
        self.descendants(&mut |node, _| {
            match node {
                Node::Text { text, .. } => out.push_str(text),
                n if n.is_atom() => out.push(OBJECT_REPLACEMENT),
                Node::SectionDivider { .. } => out.push(OBJECT_REPLACEMENT),
                _ => {}
            }
            true
        });
        out
    }

    /// Readable content of this subtree: text runs plus the carried content
    /// of readings, separators and sigla. Lemmas contribute their elided
    /// display form. Used by clipboard synthesis and export.
    pub fn readable_text(&self) -> String {
        let mut out = String::new();
        self.descendants(&mut |node, _| {
            match node {
                Node::Text { text, .. } => out.push_str(text),
                Node::Lemma { attrs } => out.push_str(&attrs.display()),
                Node::Reading { attrs } => out.push_str(&attrs.text.content),
                Node::ReadingSeparator { attrs } => out.push_str(&attrs.content),
                Node::Siglum { attrs } => out.push_str(&attrs.text()),
                _ => {}
            }
            true
        });
        out
    }

    /// True if any descendant (or the node itself) is protected.
    pub fn contains_protected(&self) -> bool {
        let mut found = false;
        self.descendants(&mut |node, _| {
            if node.is_protected() {
                found = true;
                return false;
            }
            !found
        });
        found
    }
}
