//! Lemma-apparatus binding enforcement.
//!
//! Every apparatus entry must anchor to at least one lemma. Ordinary input
//! paths cannot remove a lemma (the guard blocks them), but programmatic
//! paths like `unset_lemma` can; this rule cascades the now-unanchored entry
//! out of the document on the next transaction.

use crate::doc::dispatch::CorrectionRule;
use crate::doc::document::{Document, DocumentError};
use crate::doc::transaction::Transaction;
use crate::dom::node::Node;

pub struct LemmaBinding;

fn has_lemma(entry: &Node) -> bool {
    let mut found = false;
    entry.descendants(&mut |node, _| {
        if matches!(node, Node::Lemma { .. }) {
            found = true;
        }
        !found
    });
    found
}

impl CorrectionRule for LemmaBinding {
    fn name(&self) -> &'static str {
        "lemma-binding"
    }

    fn correct(
        &self,
        _tr: &Transaction,
        _old: &Document,
        new: &Document,
    ) -> Result<Option<Transaction>, DocumentError> {
        let doomed: Vec<std::ops::Range<usize>> = new
            .apparatus_entries()
            .into_iter()
            .filter(|(entry, _)| !has_lemma(entry))
            .map(|(_, range)| range)
            .collect();

        if doomed.is_empty() {
            return Ok(None);
        }

        // Back to front so earlier deletions keep later ranges valid.
        let mut tr = Transaction::new().without_history();
        for range in doomed.iter().rev() {
            tr = tr.delete(range.start, range.end);
        }
        Ok(Some(tr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::dispatch::Dispatcher;
    use crate::dom::node::{ApparatusKind, EntryAttrs, LemmaAttrs};
    use crate::dom::style::StyledText;
    use uuid::Uuid;

    fn entry_with_lemma(id: Uuid) -> Node {
        Node::ApparatusEntry {
            attrs: EntryAttrs {
                id,
                kind: ApparatusKind::Critical,
            },
            content: vec![Node::paragraph(vec![
                Node::Lemma {
                    attrs: LemmaAttrs {
                        id,
                        lemma: StyledText::plain("uerbum"),
                        from_to_separator: StyledText::plain("…"),
                        separator: StyledText::plain("]"),
                    },
                },
                Node::text(" om. B"),
            ])],
        }
    }

    fn entry_without_lemma(id: Uuid) -> Node {
        Node::ApparatusEntry {
            attrs: EntryAttrs {
                id,
                kind: ApparatusKind::Critical,
            },
            content: vec![Node::paragraph(vec![Node::text("orphaned")])],
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut d = Dispatcher::new();
        d.push_rule(LemmaBinding);
        d
    }

    #[test]
    fn test_entry_without_lemma_is_cascaded() {
        let keep = Uuid::new_v4();
        let drop = Uuid::new_v4();
        let mut doc = Document::from_blocks(vec![
            entry_with_lemma(keep),
            entry_without_lemma(drop),
        ])
        .unwrap();

        let outcome = dispatcher().dispatch(&mut doc, &Transaction::new().insert_text(3, "x", vec![]));

        assert_eq!(outcome.corrections, vec!["lemma-binding"]);
        assert_eq!(doc.apparatus_ids(), vec![keep]);
    }

    #[test]
    fn test_multiple_orphans_deleted_in_one_pass() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let keep = Uuid::new_v4();
        let mut doc = Document::from_blocks(vec![
            entry_without_lemma(a),
            entry_with_lemma(keep),
            entry_without_lemma(b),
        ])
        .unwrap();

        dispatcher().dispatch(&mut doc, &Transaction::new().insert_text(0, "x", vec![]));

        assert_eq!(doc.apparatus_ids(), vec![keep]);
    }

    #[test]
    fn test_no_correction_when_all_entries_anchored() {
        let a = Uuid::new_v4();
        let mut doc = Document::from_blocks(vec![entry_with_lemma(a)]).unwrap();

        let outcome = dispatcher().dispatch(&mut doc, &Transaction::new().insert_text(4, "x", vec![]));

        assert!(outcome.corrections.is_empty());
        assert_eq!(doc.apparatus_ids(), vec![a]);
    }
}
