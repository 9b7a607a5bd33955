//! End-to-end checks of the identity-gated history and the export
//! projection, driven through the facade.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use apparatus_engine::dom::node::EntryAttrs;
use apparatus_engine::{
    ApparatusEditor, ApparatusEntrySpec, ApparatusKind, Document, EditorOptions, EmphasisSettings,
    LemmaAttrs, Node, Selection, StyledText,
};
use uuid::Uuid;

const TICK: Duration = Duration::from_secs(1);

fn spec(lemma: &str, readings: Vec<Node>) -> ApparatusEntrySpec {
    ApparatusEntrySpec {
        id: None,
        kind: ApparatusKind::Critical,
        lemma: StyledText::plain(lemma),
        from_to_separator: StyledText::plain("…"),
        separator: StyledText::plain("]"),
        readings,
    }
}

fn separator() -> Node {
    Node::ReadingSeparator {
        attrs: StyledText::plain(" | "),
    }
}

fn entry_block(id: Uuid, lemma: &str, body: &str) -> Node {
    Node::ApparatusEntry {
        attrs: EntryAttrs {
            id,
            kind: ApparatusKind::Critical,
        },
        content: vec![Node::paragraph(vec![
            Node::Lemma {
                attrs: LemmaAttrs {
                    id,
                    lemma: StyledText::plain(lemma),
                    from_to_separator: StyledText::plain("…"),
                    separator: StyledText::plain("]"),
                },
            },
            Node::text(body),
        ])],
    }
}

fn editor(blocks: Vec<Node>) -> (ApparatusEditor, Instant) {
    let now = Instant::now();
    let doc = Document::from_blocks(blocks).unwrap();
    (ApparatusEditor::new(doc, EditorOptions::default(), now), now)
}

// ============ History ============

#[test]
fn undo_is_inert_across_apparatus_id_set_mismatch() {
    let x = Uuid::new_v4();
    let y = Uuid::new_v4();
    // Baseline snapshot A carries entries {x, y}
    let (mut ed, now) = editor(vec![
        entry_block(x, "primus", " om. B"),
        entry_block(y, "secundus", " add. C"),
    ]);

    // An external apparatus deletion produces snapshot B with {x}
    ed.delete_apparatus(y, now);
    ed.tick(now + TICK);

    // A later recorded edit produces snapshot C, still {x}
    ed.set_selection(Selection::caret(3));
    ed.type_char('!', now + TICK * 2);
    ed.tick(now + TICK * 3);

    // C -> B stays within the {x} era and works
    assert!(ed.undo(now));
    // B -> A would resurrect y: refused, document keeps {x}
    assert!(!ed.undo(now));
    assert_eq!(ed.get_apparatuses_ids(), vec![x]);
}

#[test]
fn history_capacity_evicts_oldest_snapshot() {
    let now = Instant::now();
    let options = EditorOptions {
        history_capacity: 3,
        ..EditorOptions::default()
    };
    let doc = Document::from_blocks(vec![Node::paragraph(vec![Node::text("seed")])]).unwrap();
    let mut ed = ApparatusEditor::new(doc, options, now);

    // Four distinct recorded changes into capacity 3
    for (i, c) in ['a', 'b', 'c', 'd'].into_iter().enumerate() {
        ed.set_selection(Selection::caret(1));
        ed.type_char(c, now + TICK * (i as u32 * 2));
        ed.tick(now + TICK * (i as u32 * 2 + 1));
    }

    // Three snapshots survive; undo walks back exactly twice from the newest
    assert!(ed.undo(now));
    assert!(ed.undo(now));
    assert!(!ed.can_undo());
}

#[test]
fn rapid_edits_coalesce_into_one_snapshot() {
    let (mut ed, now) = editor(vec![Node::paragraph(vec![Node::text("seed")])]);

    for (i, c) in "burst".chars().enumerate() {
        ed.set_selection(Selection::caret(1 + i));
        ed.type_char(c, now + Duration::from_millis(50 * i as u64));
    }
    ed.tick(now + Duration::from_secs(5));

    // One undo rolls the whole burst back
    assert!(ed.undo(now));
    assert_eq!(ed.document().blocks()[0].readable_text(), "seed");
    assert!(!ed.can_undo());
}

#[test]
fn undo_preserves_externally_renamed_lemma() {
    let id = Uuid::new_v4();
    let (mut ed, now) = editor(vec![entry_block(id, "original", " om. B")]);

    // A recorded body edit
    ed.set_selection(Selection::caret(4));
    ed.type_char('!', now);
    ed.tick(now + TICK);

    // The main text renames the lemma outside history
    let updates = HashMap::from([(id, "renamed".to_string())]);
    ed.update_apparatuses_lemma(&updates, now);

    // Undo rolls the body back but keeps the live lemma text
    assert!(ed.undo(now));
    let nodes = ed.get_apparatus_nodes(id).unwrap();
    let Node::Lemma { attrs } = &nodes[0] else {
        panic!("lemma first");
    };
    assert_eq!(attrs.lemma.content, "renamed");
    assert!(!ed.document().blocks()[0].readable_text().contains('!'));
}

#[test]
fn lemma_resync_bypasses_history() {
    let id = Uuid::new_v4();
    let (mut ed, now) = editor(vec![entry_block(id, "original", " om. B")]);

    let updates = HashMap::from([(id, "changed".to_string())]);
    ed.update_apparatuses_lemma(&updates, now);
    ed.tick(now + TICK * 10);

    assert!(!ed.can_undo());
}

// ============ Export ============

#[test]
fn export_headers_grow_to_union_of_reading_columns() {
    let (mut ed, now) = editor(vec![Node::paragraph(vec![Node::text("prose")])]);
    ed.insert_apparatus_entries(
        vec![
            spec("one", vec![Node::text("r1")]),
            spec(
                "three",
                vec![
                    Node::text("r1"),
                    separator(),
                    Node::text("r2"),
                    separator(),
                    Node::text("r3"),
                ],
            ),
            spec("two", vec![Node::text("r1"), separator(), Node::text("r2")]),
        ],
        EmphasisSettings::default(),
        now,
    )
    .unwrap();

    let export = ed.get_export_data("Apparatus", true, "Reading %d%");

    assert_eq!(
        export.additional_headers,
        vec!["Reading 1", "Reading 2", "Reading 3"]
    );
    assert_eq!(export.data.len(), 3);
    // Sparse rows omit higher-numbered keys instead of carrying empties
    assert!(!export.data[0].contains_key("Reading 2"));
    assert!(!export.data[2].contains_key("Reading 3"));
    assert_eq!(export.data[1]["Reading 3"], "r3");
}

#[test]
fn export_includes_lemma_and_separator_in_entry_text() {
    let (mut ed, now) = editor(vec![Node::paragraph(vec![Node::text("prose")])]);
    ed.insert_apparatus_entries(
        vec![spec("uerbum", vec![Node::text(" om. B")])],
        EmphasisSettings::default(),
        now,
    )
    .unwrap();

    let export = ed.get_export_data("Apparatus", false, "Reading %d%");
    assert_eq!(export.data[0]["Apparatus"], "uerbum] om. B");
}

#[test]
fn document_json_round_trips_through_set_content() {
    let id = Uuid::new_v4();
    let (ed, now) = editor(vec![
        Node::paragraph(vec![Node::text("intro")]),
        entry_block(id, "uerbum", " om. B"),
    ]);

    let json = serde_json::to_string(&ed.get_json()).unwrap();
    let mut restored = ApparatusEditor::from_json(Some(&json), EditorOptions::default(), now)
        .expect("round trip");

    assert_eq!(restored.get_apparatuses_ids(), vec![id]);
    assert_eq!(restored.get_json(), ed.get_json());
    // And the restored editor is fully operational
    restored.set_selection(Selection::caret(1));
    assert!(restored.type_char('x', now));
}
