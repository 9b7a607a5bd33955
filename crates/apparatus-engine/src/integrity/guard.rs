//! Structural integrity rules for low-level input events.
//!
//! The guard is a pure decision layer: given an input event plus the current
//! document and selection, it returns a [`Disposition`] telling the facade
//! whether to let the event through, cancel it, run a replacement
//! transaction, adjust the selection, or synthesize a clipboard payload.
//! Nothing here mutates state, which keeps every rule independently testable.

use tracing::warn;

use crate::doc::document::{Document, DocumentError, Selection};
use crate::doc::events::EditorEvent;
use crate::doc::transaction::Transaction;
use crate::dom::mark::Mark;
use crate::dom::node::{Node, OBJECT_REPLACEMENT};
use crate::dom::position::{DocIndex, char_at, node_at};

/// Keys the guard cares about; everything else passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Backspace,
    Delete,
    Char(char),
}

/// A candidate input event, before the host applies its default behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key(Key),
    Cut,
    Copy,
    Paste { text: String },
    DragStart,
    Drop { at: usize },
    SelectAll,
    SelectStart { at: usize },
    MouseUp,
    Click { at: usize },
}

/// Synthesized clipboard content covering only non-protected nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClipboardPayload {
    pub text: String,
    pub html: String,
}

/// The guard's verdict on an event.
#[derive(Debug)]
pub enum Disposition {
    /// Let the host's default behavior run.
    Allow,
    /// Cancel the event entirely.
    Block,
    /// Cancel the event and dispatch this transaction instead.
    Transform(Transaction),
    /// Cancel the default selection change and apply this one.
    Select(Selection),
    /// Suppress the native clipboard write; place `payload` on the clipboard
    /// and, for cut, dispatch the accompanying transaction.
    Clipboard {
        payload: ClipboardPayload,
        then: Option<Transaction>,
    },
    /// Surface a semantic event; `block_default` cancels the native one.
    Emit {
        event: EditorEvent,
        block_default: bool,
    },
}

/// Caret lookahead/lookback window for protected-node adjacency.
const ADJACENCY_WINDOW: usize = 2;

#[derive(Debug, Default)]
pub struct IntegrityGuard;

impl IntegrityGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: &InputEvent, doc: &Document, sel: Selection) -> Disposition {
        let index = doc.index();
        match event {
            InputEvent::Key(Key::Backspace) | InputEvent::Key(Key::Delete) => {
                self.handle_removal_key(doc, &index, sel)
            }
            InputEvent::Key(Key::Char(_)) => {
                if in_lemmaless_entry(doc, &index, sel.from) {
                    Disposition::Block
                } else {
                    Disposition::Allow
                }
            }
            InputEvent::Cut => self.handle_clipboard(doc, &index, sel, true),
            InputEvent::Copy => self.handle_clipboard(doc, &index, sel, false),
            InputEvent::Paste { .. } => {
                if index.protected_near(sel.from, 1) || in_lemmaless_entry(doc, &index, sel.from) {
                    Disposition::Block
                } else {
                    Disposition::Allow
                }
            }
            InputEvent::DragStart => {
                if index.protected_intersects(sel.from, sel.to) {
                    Disposition::Block
                } else {
                    Disposition::Allow
                }
            }
            InputEvent::Drop { at } => {
                // Moving across a protected boundary: anything protected
                // between the drag origin and the drop point blocks the drop.
                let lo = sel.from.min(*at);
                let hi = sel.to.max(*at);
                if index.protected_intersects(lo, hi) {
                    Disposition::Block
                } else {
                    Disposition::Allow
                }
            }
            InputEvent::SelectAll => Disposition::Select(select_all_span(doc, &index)),
            InputEvent::SelectStart { at } => {
                if index.ancestors_of(*at).iter().any(|e| e.protected) {
                    Disposition::Block
                } else {
                    Disposition::Allow
                }
            }
            InputEvent::MouseUp => {
                if sel.is_caret() {
                    return Disposition::Allow;
                }
                let trimmed = trim_selection(doc, &index, sel);
                if trimmed == sel {
                    Disposition::Allow
                } else {
                    Disposition::Select(trimmed)
                }
            }
            InputEvent::Click { at } => self.handle_click(doc, &index, *at),
        }
    }

    fn handle_removal_key(&self, doc: &Document, index: &DocIndex, sel: Selection) -> Disposition {
        if !sel.is_caret() {
            if !index.protected_intersects(sel.from, sel.to) {
                return Disposition::Allow;
            }
            return match structural_delete(doc, index, sel.from, sel.to) {
                Ok(tr) => Disposition::Transform(tr),
                Err(err) => {
                    // The range still must not be deleted verbatim.
                    warn!(%err, "structural delete failed, blocking removal");
                    Disposition::Block
                }
            };
        }
        if in_lemmaless_entry(doc, index, sel.from) {
            return Disposition::Block;
        }
        if index.protected_near(sel.from, ADJACENCY_WINDOW) {
            return Disposition::Block;
        }
        Disposition::Allow
    }

    fn handle_clipboard(
        &self,
        doc: &Document,
        index: &DocIndex,
        sel: Selection,
        is_cut: bool,
    ) -> Disposition {
        if sel.is_caret() || !index.protected_intersects(sel.from, sel.to) {
            return Disposition::Allow;
        }
        let payload = clipboard_from_slice(doc, sel.from, sel.to);
        let then = if is_cut {
            match structural_delete(doc, index, sel.from, sel.to) {
                Ok(tr) => Some(tr),
                Err(err) => {
                    warn!(%err, "structural cut failed, copying only");
                    None
                }
            }
        } else {
            None
        };
        Disposition::Clipboard { payload, then }
    }

    fn handle_click(&self, doc: &Document, index: &DocIndex, at: usize) -> Disposition {
        let Some(deepest) = index.deepest_at(at) else {
            return Disposition::Allow;
        };
        let Some(node) = doc.node_at_path(&deepest.path) else {
            return Disposition::Allow;
        };
        match node {
            // A lemma is not a caret target: swallow the click and surface it
            // as a semantic event instead.
            Node::Lemma { attrs } => Disposition::Emit {
                event: EditorEvent::LemmaClicked { id: attrs.id },
                block_default: true,
            },
            Node::Text { marks, .. } => {
                for mark in marks {
                    let event = match mark {
                        Mark::Comment { id, .. } => EditorEvent::CommentClicked { id: *id },
                        Mark::Bookmark { id, .. } => EditorEvent::BookmarkClicked { id: *id },
                        Mark::Note { id } => EditorEvent::NoteClicked { id: *id },
                        _ => continue,
                    };
                    return Disposition::Emit {
                        event,
                        block_default: false,
                    };
                }
                Disposition::Allow
            }
            _ => Disposition::Allow,
        }
    }
}

/// Replacement for a verbatim range delete that would destroy protected
/// nodes: delete the range, then re-insert each protected node followed by a
/// fresh empty paragraph, preserving document segmentation.
fn structural_delete(
    doc: &Document,
    index: &DocIndex,
    from: usize,
    to: usize,
) -> Result<Transaction, DocumentError> {
    let mut nodes = Vec::new();
    for entry in index.protected_within(from, to) {
        let node = doc
            .node_at_path(&entry.path)
            .ok_or(DocumentError::OutOfBounds(entry.start, doc.size()))?;
        nodes.push(node.clone());
        nodes.push(Node::empty_paragraph());
    }
    Ok(Transaction::new().delete(from, to).insert(from, nodes))
}

/// Clipboard payload from `[from, to)`, protected nodes excluded.
fn clipboard_from_slice(doc: &Document, from: usize, to: usize) -> ClipboardPayload {
    let slice = slice_without_protected(doc, from, to);
    match Document::from_blocks(slice) {
        Ok(snippet) => ClipboardPayload {
            text: snippet
                .blocks()
                .iter()
                .map(Node::readable_text)
                .collect::<Vec<_>>()
                .join("\n"),
            html: snippet.to_html(),
        },
        Err(err) => {
            warn!(%err, "clipboard slice failed, writing empty payload");
            ClipboardPayload::default()
        }
    }
}

/// Clone the covered slice of the document and strip protected nodes.
fn slice_without_protected(doc: &Document, from: usize, to: usize) -> Vec<Node> {
    let mut copy = doc.clone();
    let size = copy.size();
    let mut tr = Transaction::new();
    if to < size {
        tr = tr.delete(to, size);
    }
    if from > 0 {
        tr = tr.delete(0, from);
    }
    copy.apply(&tr);

    let mut blocks = copy.blocks().to_vec();
    strip_protected(&mut blocks);
    blocks
}

fn strip_protected(nodes: &mut Vec<Node>) {
    nodes.retain_mut(|node| {
        if node.is_protected() {
            return false;
        }
        if let Some(content) = node.children_mut() {
            strip_protected(content);
        }
        true
    });
}

/// The span select-all should cover: the whole document when nothing is
/// protected, otherwise the span of non-protected top-level content.
fn select_all_span(doc: &Document, index: &DocIndex) -> Selection {
    let full = Selection::new(0, doc.size());
    if !index.protected_intersects(0, doc.size()) {
        return full;
    }
    let mut first = None;
    let mut last = None;
    let mut offset = 0;
    for block in doc.blocks() {
        let size = block.size();
        if !block.is_protected() {
            first.get_or_insert(offset);
            last = Some(offset + size);
        }
        offset += size;
    }
    match (first, last) {
        (Some(from), Some(to)) => Selection::new(from, to),
        // No selectable content: fall back to the full document.
        _ => full,
    }
}

/// Trim Unicode whitespace, atom placeholders and structural boundaries off
/// both selection ends. Linear scans only; no backtracking over the text.
fn trim_selection(doc: &Document, index: &DocIndex, sel: Selection) -> Selection {
    let trimmable = |pos: usize| match char_at(doc.blocks(), index, pos) {
        Some(c) => c.is_whitespace() || c == OBJECT_REPLACEMENT,
        None => true,
    };

    let mut from = sel.from;
    let mut to = sel.to.min(doc.size());
    while from < to && trimmable(from) {
        from += 1;
    }
    while to > from && trimmable(to - 1) {
        to -= 1;
    }
    if from >= to {
        Selection::caret(sel.from)
    } else {
        Selection::new(from, to)
    }
}

/// True when `pos` sits inside an apparatus entry that has no lemma anchor.
/// Such an entry must not accept free text.
fn in_lemmaless_entry(doc: &Document, index: &DocIndex, pos: usize) -> bool {
    for ancestor in index.ancestors_of(pos) {
        let Some(node) = node_at(doc.blocks(), &ancestor.path) else {
            continue;
        };
        if matches!(node, Node::ApparatusEntry { .. }) {
            return !node.contains_protected();
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::{ApparatusKind, DividerAttrs, EntryAttrs, LemmaAttrs};
    use crate::dom::style::StyledText;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn divider() -> Node {
        Node::SectionDivider {
            attrs: DividerAttrs::default(),
        }
    }

    fn lemma_node(id: Uuid) -> Node {
        Node::Lemma {
            attrs: LemmaAttrs {
                id,
                lemma: StyledText::plain("uerbum"),
                from_to_separator: StyledText::plain("…"),
                separator: StyledText::plain("]"),
            },
        }
    }

    fn entry(id: Uuid, with_lemma: bool) -> Node {
        let mut content = Vec::new();
        if with_lemma {
            content.push(lemma_node(id));
        }
        content.push(Node::text(" om. B"));
        Node::ApparatusEntry {
            attrs: EntryAttrs {
                id,
                kind: ApparatusKind::Critical,
            },
            content: vec![Node::paragraph(content)],
        }
    }

    fn doc_with_divider() -> Document {
        // para "ab" [0,4), divider [4,5), para "cd" [5,9)
        Document::from_blocks(vec![
            Node::paragraph(vec![Node::text("ab")]),
            divider(),
            Node::paragraph(vec![Node::text("cd")]),
        ])
        .unwrap()
    }

    fn guard() -> IntegrityGuard {
        IntegrityGuard::new()
    }

    fn lemma_count(doc: &Document) -> usize {
        let mut count = 0;
        doc.descendants(&mut |node, _| {
            if matches!(node, Node::Lemma { .. }) {
                count += 1;
            }
            true
        });
        count
    }

    // ============ Removal key tests ============

    #[test]
    fn test_range_delete_over_divider_preserves_divider() {
        let mut doc = doc_with_divider();
        let dispo = guard().handle(
            &InputEvent::Key(Key::Delete),
            &doc,
            Selection::new(0, doc.size()),
        );
        let Disposition::Transform(tr) = dispo else {
            panic!("expected transform, got {dispo:?}");
        };
        doc.apply(&tr);

        let dividers = doc
            .blocks()
            .iter()
            .filter(|b| matches!(b, Node::SectionDivider { .. }))
            .count();
        assert_eq!(dividers, 1);
        // Exactly one empty paragraph follows the preserved divider
        assert_eq!(doc.blocks().len(), 2);
        assert!(matches!(doc.blocks()[0], Node::SectionDivider { .. }));
        assert_eq!(doc.blocks()[1].children().len(), 0);
    }

    #[test]
    fn test_range_delete_without_protected_allows() {
        let doc = doc_with_divider();
        // inside first paragraph only
        let dispo = guard().handle(&InputEvent::Key(Key::Backspace), &doc, Selection::new(1, 3));
        assert!(matches!(dispo, Disposition::Allow));
    }

    #[test]
    fn test_caret_backspace_adjacent_to_divider_blocks() {
        let doc = doc_with_divider();
        // divider at [4,5); caret at 5 has it in the lookback window
        let dispo = guard().handle(&InputEvent::Key(Key::Backspace), &doc, Selection::caret(5));
        assert!(matches!(dispo, Disposition::Block));
    }

    #[test]
    fn test_caret_delete_far_from_divider_allows() {
        let doc = doc_with_divider();
        let dispo = guard().handle(&InputEvent::Key(Key::Delete), &doc, Selection::caret(1));
        assert!(matches!(dispo, Disposition::Allow));
    }

    #[test]
    fn test_lemma_survives_covering_range_delete() {
        let id = Uuid::new_v4();
        let mut doc = Document::from_blocks(vec![entry(id, true)]).unwrap();
        let before = lemma_count(&doc);

        let dispo = guard().handle(
            &InputEvent::Key(Key::Backspace),
            &doc,
            Selection::new(0, doc.size()),
        );
        if let Disposition::Transform(tr) = dispo {
            doc.apply(&tr);
        }
        assert_eq!(lemma_count(&doc), before);
    }

    #[test]
    fn test_caret_backspace_next_to_lemma_blocks() {
        let id = Uuid::new_v4();
        let doc = Document::from_blocks(vec![entry(id, true)]).unwrap();
        // lemma at [2,3); caret at 3 is immediately after it
        let dispo = guard().handle(&InputEvent::Key(Key::Backspace), &doc, Selection::caret(3));
        assert!(matches!(dispo, Disposition::Block));
    }

    // ============ Lemma-less entry tests ============

    #[test]
    fn test_typing_in_lemmaless_entry_blocks() {
        let doc = Document::from_blocks(vec![entry(Uuid::new_v4(), false)]).unwrap();
        let dispo = guard().handle(&InputEvent::Key(Key::Char('x')), &doc, Selection::caret(3));
        assert!(matches!(dispo, Disposition::Block));
    }

    #[test]
    fn test_paste_in_lemmaless_entry_blocks() {
        let doc = Document::from_blocks(vec![entry(Uuid::new_v4(), false)]).unwrap();
        let dispo = guard().handle(
            &InputEvent::Paste {
                text: "pasted".to_string(),
            },
            &doc,
            Selection::caret(3),
        );
        assert!(matches!(dispo, Disposition::Block));
    }

    #[test]
    fn test_typing_in_anchored_entry_allows() {
        let doc = Document::from_blocks(vec![entry(Uuid::new_v4(), true)]).unwrap();
        // caret inside the text run, outside the adjacency rules' reach
        let dispo = guard().handle(&InputEvent::Key(Key::Char('x')), &doc, Selection::caret(6));
        assert!(matches!(dispo, Disposition::Allow));
    }

    // ============ Clipboard tests ============

    #[test]
    fn test_copy_over_divider_synthesizes_payload() {
        let doc = doc_with_divider();
        let dispo = guard().handle(&InputEvent::Copy, &doc, Selection::new(0, doc.size()));
        let Disposition::Clipboard { payload, then } = dispo else {
            panic!("expected clipboard capture");
        };
        assert!(then.is_none());
        assert_eq!(payload.text, "ab\ncd");
        assert!(!payload.html.contains("<hr>"));
    }

    #[test]
    fn test_cut_over_divider_also_transforms() {
        let mut doc = doc_with_divider();
        let dispo = guard().handle(&InputEvent::Cut, &doc, Selection::new(0, doc.size()));
        let Disposition::Clipboard { then: Some(tr), .. } = dispo else {
            panic!("expected clipboard capture with transform");
        };
        doc.apply(&tr);
        assert!(matches!(doc.blocks()[0], Node::SectionDivider { .. }));
    }

    #[test]
    fn test_copy_without_protected_allows_native() {
        let doc = doc_with_divider();
        let dispo = guard().handle(&InputEvent::Copy, &doc, Selection::new(1, 3));
        assert!(matches!(dispo, Disposition::Allow));
    }

    // ============ Paste / drag tests ============

    #[test]
    fn test_paste_adjacent_to_divider_blocks() {
        let doc = doc_with_divider();
        let dispo = guard().handle(
            &InputEvent::Paste {
                text: "x".to_string(),
            },
            &doc,
            Selection::caret(4),
        );
        assert!(matches!(dispo, Disposition::Block));
    }

    #[test]
    fn test_paste_away_from_divider_allows() {
        let doc = doc_with_divider();
        let dispo = guard().handle(
            &InputEvent::Paste {
                text: "x".to_string(),
            },
            &doc,
            Selection::caret(2),
        );
        assert!(matches!(dispo, Disposition::Allow));
    }

    #[test]
    fn test_drag_start_with_protected_blocks() {
        let doc = doc_with_divider();
        let dispo = guard().handle(&InputEvent::DragStart, &doc, Selection::new(3, 6));
        assert!(matches!(dispo, Disposition::Block));
    }

    #[test]
    fn test_drop_across_divider_blocks() {
        let doc = doc_with_divider();
        // dragging the "cd" selection to before the divider
        let dispo = guard().handle(&InputEvent::Drop { at: 1 }, &doc, Selection::new(6, 8));
        assert!(matches!(dispo, Disposition::Block));
    }

    #[test]
    fn test_drop_on_same_side_allows() {
        let doc = doc_with_divider();
        let dispo = guard().handle(&InputEvent::Drop { at: 5 }, &doc, Selection::new(6, 8));
        assert!(matches!(dispo, Disposition::Allow));
    }

    // ============ Select-all tests ============

    #[test]
    fn test_select_all_without_protected_spans_document() {
        let doc = Document::from_blocks(vec![
            Node::paragraph(vec![Node::text("ab")]),
            Node::paragraph(vec![Node::text("cd")]),
        ])
        .unwrap();
        let dispo = guard().handle(&InputEvent::SelectAll, &doc, Selection::caret(0));
        let Disposition::Select(sel) = dispo else {
            panic!("expected selection");
        };
        assert_eq!(sel, Selection::new(0, doc.size()));
    }

    #[test]
    fn test_select_all_with_divider_narrows() {
        // divider first: selection starts after it
        let doc = Document::from_blocks(vec![
            divider(),
            Node::paragraph(vec![Node::text("ab")]),
            Node::paragraph(vec![Node::text("cd")]),
        ])
        .unwrap();
        let dispo = guard().handle(&InputEvent::SelectAll, &doc, Selection::caret(0));
        let Disposition::Select(sel) = dispo else {
            panic!("expected selection");
        };
        assert_eq!(sel, Selection::new(1, 9));
    }

    #[test]
    fn test_select_all_only_dividers_falls_back_to_full() {
        let doc = Document::from_blocks(vec![divider(), divider()]).unwrap();
        let dispo = guard().handle(&InputEvent::SelectAll, &doc, Selection::caret(0));
        let Disposition::Select(sel) = dispo else {
            panic!("expected selection");
        };
        assert_eq!(sel, Selection::new(0, 2));
    }

    // ============ Selectstart / click tests ============

    #[test]
    fn test_selectstart_inside_lemma_blocks() {
        let id = Uuid::new_v4();
        let doc = Document::from_blocks(vec![entry(id, true)]).unwrap();
        // lemma occupies position 2
        let dispo = guard().handle(&InputEvent::SelectStart { at: 2 }, &doc, Selection::caret(2));
        assert!(matches!(dispo, Disposition::Block));
    }

    #[test]
    fn test_click_on_lemma_emits_and_blocks() {
        let id = Uuid::new_v4();
        let doc = Document::from_blocks(vec![entry(id, true)]).unwrap();
        let dispo = guard().handle(&InputEvent::Click { at: 2 }, &doc, Selection::caret(2));
        let Disposition::Emit {
            event,
            block_default,
        } = dispo
        else {
            panic!("expected emit");
        };
        assert!(block_default);
        assert_eq!(event, EditorEvent::LemmaClicked { id });
    }

    #[test]
    fn test_click_on_comment_emits_without_blocking() {
        let comment_id = Uuid::new_v4();
        let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::Text {
            text: "noted".to_string(),
            marks: vec![Mark::Comment {
                id: comment_id,
                highlight_color: "#ffef99".to_string(),
            }],
        }])])
        .unwrap();
        let dispo = guard().handle(&InputEvent::Click { at: 2 }, &doc, Selection::caret(2));
        let Disposition::Emit {
            event,
            block_default,
        } = dispo
        else {
            panic!("expected emit");
        };
        assert!(!block_default);
        assert_eq!(event, EditorEvent::CommentClicked { id: comment_id });
    }

    // ============ Selection trimming tests ============

    #[test]
    fn test_mouse_up_trims_whitespace() {
        let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::text("  word  ")])]).unwrap();
        // chars at [1,9); select everything including padding
        let dispo = guard().handle(&InputEvent::MouseUp, &doc, Selection::new(1, 9));
        let Disposition::Select(sel) = dispo else {
            panic!("expected trimmed selection");
        };
        assert_eq!(doc.text_between(sel.from, sel.to), "word");
    }

    #[test]
    fn test_mouse_up_trims_unicode_whitespace() {
        // No-break and ideographic spaces count as trimmable whitespace
        let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::text(
            "\u{00A0}\u{3000}word\u{2009}",
        )])])
        .unwrap();
        let dispo = guard().handle(&InputEvent::MouseUp, &doc, Selection::new(1, 8));
        let Disposition::Select(sel) = dispo else {
            panic!("expected trimmed selection");
        };
        assert_eq!(doc.text_between(sel.from, sel.to), "word");
    }

    #[test]
    fn test_mouse_up_trims_atom_placeholders() {
        let id = Uuid::new_v4();
        let doc = Document::from_blocks(vec![Node::paragraph(vec![
            lemma_node(id),
            Node::text("kept"),
        ])])
        .unwrap();
        // lemma at 1, text [2,6)
        let dispo = guard().handle(&InputEvent::MouseUp, &doc, Selection::new(1, 6));
        let Disposition::Select(sel) = dispo else {
            panic!("expected trimmed selection");
        };
        assert_eq!(sel, Selection::new(2, 6));
    }

    #[test]
    fn test_mouse_up_keeps_tight_selection() {
        let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::text("word")])]).unwrap();
        let dispo = guard().handle(&InputEvent::MouseUp, &doc, Selection::new(1, 5));
        assert!(matches!(dispo, Disposition::Allow));
    }

    #[test]
    fn test_mouse_up_all_whitespace_collapses() {
        let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::text("   ")])]).unwrap();
        let dispo = guard().handle(&InputEvent::MouseUp, &doc, Selection::new(1, 4));
        let Disposition::Select(sel) = dispo else {
            panic!("expected collapse");
        };
        assert!(sel.is_caret());
    }
}
