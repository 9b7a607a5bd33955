use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inline marks attached to text runs.
///
/// The formatting marks are plain toggles or value-carriers; the annotation
/// marks (`Comment`, `Bookmark`, `Note`, `Citation`) carry identity and are
/// tracked across document states by id-set diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Superscript,
    Subscript,
    FontFamily { value: String },
    FontSize { value: u16 },
    TextColor { value: String },
    Highlight { color: String },
    Link { href: String },
    Comment { id: Uuid, highlight_color: String },
    Bookmark { id: Uuid, category_id: String },
    Note { id: Uuid },
    Citation { bibliography_id: String, citation_style: String },
}

/// Discriminant for mark comparison: two marks of the same kind are mutually
/// exclusive on a run (a run has at most one font size, one comment, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Superscript,
    Subscript,
    FontFamily,
    FontSize,
    TextColor,
    Highlight,
    Link,
    Comment,
    Bookmark,
    Note,
    Citation,
}

impl Mark {
    pub fn kind(&self) -> MarkKind {
        match self {
            Mark::Bold => MarkKind::Bold,
            Mark::Italic => MarkKind::Italic,
            Mark::Underline => MarkKind::Underline,
            Mark::Strikethrough => MarkKind::Strikethrough,
            Mark::Superscript => MarkKind::Superscript,
            Mark::Subscript => MarkKind::Subscript,
            Mark::FontFamily { .. } => MarkKind::FontFamily,
            Mark::FontSize { .. } => MarkKind::FontSize,
            Mark::TextColor { .. } => MarkKind::TextColor,
            Mark::Highlight { .. } => MarkKind::Highlight,
            Mark::Link { .. } => MarkKind::Link,
            Mark::Comment { .. } => MarkKind::Comment,
            Mark::Bookmark { .. } => MarkKind::Bookmark,
            Mark::Note { .. } => MarkKind::Note,
            Mark::Citation { .. } => MarkKind::Citation,
        }
    }

    /// Marks that cannot coexist with this one on the same run, beyond the
    /// same-kind rule. Superscript and subscript displace each other.
    pub fn displaces(&self, other: &Mark) -> bool {
        matches!(
            (self, other),
            (Mark::Superscript, Mark::Subscript) | (Mark::Subscript, Mark::Superscript)
        )
    }

    /// The annotation id carried by this mark, if it is an identity mark.
    pub fn annotation_id(&self) -> Option<Uuid> {
        match self {
            Mark::Comment { id, .. } | Mark::Bookmark { id, .. } | Mark::Note { id } => Some(*id),
            _ => None,
        }
    }
}

/// Add `mark` to a mark set, dropping any same-kind or displaced mark first.
pub fn add_mark(marks: &mut Vec<Mark>, mark: Mark) {
    marks.retain(|m| m.kind() != mark.kind() && !mark.displaces(m));
    marks.push(mark);
}

/// Remove all marks of `kind` from a mark set. Returns true if any were
/// removed.
pub fn remove_mark_kind(marks: &mut Vec<Mark>, kind: MarkKind) -> bool {
    let before = marks.len();
    marks.retain(|m| m.kind() != kind);
    marks.len() != before
}
