//! Apparatus entry construction and id-addressed mutation.
//!
//! All operations here compile to [`Transaction`]s against a document
//! snapshot; the facade dispatches them. Bulk hydration and lemma resync are
//! flagged out of history: they mirror external state rather than user
//! edits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::doc::document::{Document, Selection};
use crate::doc::transaction::Transaction;
use crate::dom::mark::Mark;
use crate::dom::node::{ApparatusKind, EntryAttrs, LemmaAttrs, Node, ParagraphAttrs};
use crate::dom::style::StyledText;

#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("no lemma node among the provided nodes")]
    MissingLemma,
    #[error("document already has a {0:?} entry")]
    DuplicateMargin(ApparatusKind),
}

/// Bulk-insert payload for one apparatus entry, as persisted documents carry
/// it. Entries without an id get a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApparatusEntrySpec {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub kind: ApparatusKind,
    pub lemma: StyledText,
    #[serde(default)]
    pub from_to_separator: StyledText,
    #[serde(default)]
    pub separator: StyledText,
    /// Reading/siglum/separator nodes following the lemma.
    #[serde(default)]
    pub readings: Vec<Node>,
}

/// Global emphasis applied to the placeholder text of reading-less entries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EmphasisSettings {
    pub bold: bool,
    pub italic: bool,
}

impl EmphasisSettings {
    fn marks(&self) -> Vec<Mark> {
        let mut marks = Vec::new();
        if self.bold {
            marks.push(Mark::Bold);
        }
        if self.italic {
            marks.push(Mark::Italic);
        }
        marks
    }
}

/// Hydrate entries from specs and append them at the document end.
///
/// Entries with no reading nodes get a single space placeholder carrying the
/// requested emphasis so they never render empty. Bulk hydration is not an
/// undoable user action, so the transaction bypasses history.
pub fn insert_apparatus_entries(
    doc: &Document,
    specs: Vec<ApparatusEntrySpec>,
    settings: EmphasisSettings,
) -> Result<Transaction, EntryError> {
    check_margin_capacity(doc, specs.iter().map(|s| s.kind))?;

    let nodes: Vec<Node> = specs.into_iter().map(|spec| build_entry(spec, settings)).collect();
    Ok(Transaction::new()
        .insert(doc.size(), nodes)
        .without_history())
}

fn build_entry(spec: ApparatusEntrySpec, settings: EmphasisSettings) -> Node {
    let id = spec.id.unwrap_or_else(Uuid::new_v4);
    let mut content = vec![Node::Lemma {
        attrs: LemmaAttrs {
            id,
            lemma: spec.lemma,
            from_to_separator: spec.from_to_separator,
            separator: spec.separator,
        },
    }];
    if spec.readings.is_empty() {
        content.push(Node::Text {
            text: " ".to_string(),
            marks: settings.marks(),
        });
    } else {
        content.extend(spec.readings);
    }
    Node::ApparatusEntry {
        attrs: EntryAttrs {
            id,
            kind: spec.kind,
        },
        content: vec![Node::Paragraph {
            attrs: ParagraphAttrs::default(),
            content,
        }],
    }
}

/// Promote an explicit node list (typically lifted from a margin context
/// action) into a new apparatus entry at the current selection, or at the
/// document end when the selection sits at position zero.
///
/// The new entry's id comes from the lemma found among the nodes.
pub fn insert_apparatus_entry_from_nodes(
    doc: &Document,
    nodes: Vec<Node>,
    kind: ApparatusKind,
    paragraph: ParagraphAttrs,
    selection: Selection,
) -> Result<Transaction, EntryError> {
    let id = nodes
        .iter()
        .find_map(|n| match n {
            Node::Lemma { attrs } => Some(attrs.id),
            _ => None,
        })
        .ok_or(EntryError::MissingLemma)?;
    check_margin_capacity(doc, std::iter::once(kind))?;

    let entry = Node::ApparatusEntry {
        attrs: EntryAttrs { id, kind },
        content: vec![Node::Paragraph {
            attrs: paragraph,
            content: nodes,
        }],
    };
    let at = if selection.from == 0 {
        doc.size()
    } else {
        selection.from
    };
    Ok(Transaction::new().insert(at, vec![entry]))
}

fn check_margin_capacity(
    doc: &Document,
    incoming: impl Iterator<Item = ApparatusKind>,
) -> Result<(), EntryError> {
    let mut inner = doc.margin_ids(ApparatusKind::InnerMargin).len();
    let mut outer = doc.margin_ids(ApparatusKind::OuterMargin).len();
    for kind in incoming {
        match kind {
            ApparatusKind::InnerMargin => inner += 1,
            ApparatusKind::OuterMargin => outer += 1,
            _ => continue,
        }
        if inner > 1 {
            return Err(EntryError::DuplicateMargin(ApparatusKind::InnerMargin));
        }
        if outer > 1 {
            return Err(EntryError::DuplicateMargin(ApparatusKind::OuterMargin));
        }
    }
    Ok(())
}

/// Delete the entries with the given ids. Ranges are deleted back to front so
/// earlier deletions do not invalidate later positions.
pub fn delete_apparatus_entries(doc: &Document, ids: &[Uuid]) -> Transaction {
    let mut ranges: Vec<std::ops::Range<usize>> = ids
        .iter()
        .filter_map(|id| doc.apparatus_entry(*id).map(|(_, range)| range))
        .collect();
    ranges.sort_by_key(|r| std::cmp::Reverse(r.start));

    let mut tr = Transaction::new();
    for range in ranges {
        tr = tr.delete(range.start, range.end);
    }
    tr
}

pub fn delete_all_apparatus_entries(doc: &Document) -> Transaction {
    delete_apparatus_entries(doc, &doc.apparatus_ids())
}

/// Swap every margin entry's side in one pass.
pub fn swap_margin_kinds(doc: &Document) -> Transaction {
    let mut tr = Transaction::new();
    for (node, range) in doc.apparatus_entries().into_iter().rev() {
        let Node::ApparatusEntry { attrs, content } = node else {
            continue;
        };
        if !attrs.kind.is_margin() {
            continue;
        }
        tr = tr.replace_node(
            range.start,
            Node::ApparatusEntry {
                attrs: EntryAttrs {
                    id: attrs.id,
                    kind: attrs.kind.swapped_margin(),
                },
                content: content.clone(),
            },
        );
    }
    tr
}

/// Resync lemma content from updates keyed by the owning entry's id. Only
/// `lemma.content` changes; separators and styling stay intact. Applied back
/// to front and outside history, like any external-state mirror.
pub fn update_apparatuses_lemma(doc: &Document, updates: &HashMap<Uuid, String>) -> Transaction {
    let mut tr = Transaction::new().without_history();
    for site in doc.lemmas().into_iter().rev() {
        let Some(content) = updates.get(&site.owner) else {
            continue;
        };
        let mut attrs = site.lemma.clone();
        attrs.lemma.content = content.clone();
        tr = tr.replace_node(site.start, Node::Lemma { attrs });
    }
    tr
}

/// The one sanctioned way to remove a lemma. The binding rule will cascade
/// the orphaned entry out on the same dispatch.
pub fn unset_lemma(doc: &Document, entry_id: Uuid) -> Transaction {
    let mut tr = Transaction::new();
    for site in doc.lemmas().into_iter().rev() {
        if site.owner == entry_id {
            tr = tr.delete(site.start, site.start + 1);
        }
    }
    tr
}
