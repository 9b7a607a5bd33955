//! The apparatus editor facade.
//!
//! Thin orchestration over the document, the integrity guard, the correction
//! dispatcher, the history manager and the search state. The surrounding
//! shell drives this surface and renders from `get_json`/`get_html`; all
//! invariants live in the layers below.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::doc::dispatch::Dispatcher;
use crate::doc::document::{Document, DocumentError, Selection};
use crate::doc::events::{
    DeletedMark, EditorEvent, EventBus, HIGHLIGHT_DURATION_MS, HandlerId,
};
use crate::doc::transaction::Transaction;
use crate::dom::mark::{Mark, MarkKind};
use crate::dom::node::{ApparatusKind, Node, ParagraphAttrs};
use crate::dom::style::{StyledText, TextStyle};
use crate::entry::{
    ApparatusEntrySpec, EmphasisSettings, EntryError, delete_all_apparatus_entries,
    delete_apparatus_entries, insert_apparatus_entries, insert_apparatus_entry_from_nodes,
    swap_margin_kinds, unset_lemma, update_apparatuses_lemma,
};
use crate::export::{BibliographyEntry, ExportData, get_export_data, get_inserted_bibliography_entries};
use crate::history::ApparatusHistory;
use crate::integrity::binding::LemmaBinding;
use crate::integrity::guard::{ClipboardPayload, Disposition, InputEvent, IntegrityGuard, Key};
use crate::search::{SearchOptions, SearchScope, SearchState};

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("cannot construct an editor without a document")]
    NoDocument,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Editor tunables; the config crate maps its TOML onto this.
#[derive(Debug, Clone)]
pub struct EditorOptions {
    pub history_capacity: usize,
    pub history_debounce: Duration,
    /// Live update callbacks are ignored until this much time after mount,
    /// debouncing startup churn.
    pub update_warmup: Duration,
    pub default_comment_color: String,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            history_capacity: crate::history::DEFAULT_CAPACITY,
            history_debounce: crate::history::DEFAULT_DEBOUNCE,
            update_warmup: Duration::from_secs(2),
            default_comment_color: "#fff59d".to_string(),
        }
    }
}

/// What the facade did with an input event.
#[derive(Debug, Default)]
pub struct InputResponse {
    /// True when the host must cancel its default behavior.
    pub handled: bool,
    /// Synthesized clipboard content to place on the clipboard.
    pub clipboard: Option<ClipboardPayload>,
}

pub struct ApparatusEditor {
    doc: Document,
    selection: Selection,
    bus: EventBus,
    guard: IntegrityGuard,
    dispatcher: Dispatcher,
    history: ApparatusHistory,
    search: Option<SearchState>,
    options: EditorOptions,
    mounted_at: Instant,
    focused: bool,
}

impl ApparatusEditor {
    pub fn new(doc: Document, options: EditorOptions, now: Instant) -> Self {
        let mut dispatcher = Dispatcher::new();
        dispatcher.push_rule(LemmaBinding);

        let mut history = ApparatusHistory::new(options.history_capacity, options.history_debounce);
        history.reset(&doc);

        Self {
            doc,
            selection: Selection::caret(0),
            bus: EventBus::new(),
            guard: IntegrityGuard::new(),
            dispatcher,
            history,
            search: None,
            options,
            mounted_at: now,
            focused: false,
        }
    }

    /// Construct from a persisted document. `None` means the host has no
    /// editor surface to give us; refusing here beats operating
    /// half-initialized.
    pub fn from_json(json: Option<&str>, options: EditorOptions, now: Instant) -> Result<Self, EditorError> {
        let json = json.ok_or(EditorError::NoDocument)?;
        let doc = Document::from_json(json)?;
        Ok(Self::new(doc, options, now))
    }

    // === Content lifecycle ===

    pub fn get_json(&self) -> serde_json::Value {
        self.doc.to_json()
    }

    pub fn get_html(&self) -> String {
        self.doc.to_html()
    }

    pub fn set_content(&mut self, json: &str) -> Result<(), EditorError> {
        self.doc = Document::from_json(json)?;
        self.selection = Selection::caret(0);
        self.history.reset(&self.doc);
        self.search = None;
        Ok(())
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    // === Selection & focus ===

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        let size = self.doc.size();
        self.selection = Selection::new(selection.from.min(size), selection.to.min(size));
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Whether live update callbacks are accepted yet (post-mount warm-up).
    pub fn accepts_updates(&self, now: Instant) -> bool {
        now.duration_since(self.mounted_at) >= self.options.update_warmup
    }

    // === Events ===

    pub fn on_event(&mut self, handler: impl FnMut(&EditorEvent) + 'static) -> HandlerId {
        self.bus.on(handler)
    }

    pub fn off_event(&mut self, id: HandlerId) -> bool {
        self.bus.off(id)
    }

    // === Dispatch plumbing ===

    /// Apply a transaction through the correction rules, diff annotation
    /// marks against the old state, and offer the result to the history.
    fn dispatch(&mut self, tr: Transaction, now: Instant) {
        let outcome = self.dispatcher.dispatch(&mut self.doc, &tr);
        self.emit_mark_deletions(&outcome.old);
        self.history.record(&tr, &self.doc, now);
        self.clamp_selection();
    }

    fn emit_mark_deletions(&mut self, old: &Document) {
        let old_marks = old.annotation_marks();
        let new_marks = self.doc.annotation_marks();
        let deleted: Vec<DeletedMark> = old_marks
            .into_iter()
            .filter(|(id, _)| !new_marks.contains_key(id))
            .map(|(id, (kind, content))| DeletedMark { id, kind, content })
            .collect();
        if !deleted.is_empty() {
            self.bus.emit(&EditorEvent::MarksDeleted { deleted });
        }
    }

    fn clamp_selection(&mut self) {
        let size = self.doc.size();
        self.selection = Selection::new(self.selection.from.min(size), self.selection.to.min(size));
    }

    /// Fire the history debounce if due. The host calls this from its tick.
    pub fn tick(&mut self, now: Instant) {
        self.history.tick(now);
    }

    // === Input events ===

    /// Route a low-level input event through the integrity guard.
    pub fn handle_input(&mut self, event: &InputEvent, now: Instant) -> InputResponse {
        match self.guard.handle(event, &self.doc, self.selection) {
            Disposition::Allow => InputResponse::default(),
            Disposition::Block => InputResponse {
                handled: true,
                ..Default::default()
            },
            Disposition::Transform(tr) => {
                self.dispatch(tr, now);
                self.selection = Selection::caret(self.selection.from.min(self.doc.size()));
                InputResponse {
                    handled: true,
                    ..Default::default()
                }
            }
            Disposition::Select(selection) => {
                self.selection = selection;
                InputResponse {
                    handled: true,
                    ..Default::default()
                }
            }
            Disposition::Clipboard { payload, then } => {
                if let Some(tr) = then {
                    self.dispatch(tr, now);
                    self.selection = Selection::caret(self.selection.from.min(self.doc.size()));
                }
                InputResponse {
                    handled: true,
                    clipboard: Some(payload),
                }
            }
            Disposition::Emit {
                event,
                block_default,
            } => {
                self.bus.emit(&event);
                InputResponse {
                    handled: block_default,
                    ..Default::default()
                }
            }
        }
    }

    /// Type one character at the selection, guard permitting.
    pub fn type_char(&mut self, c: char, now: Instant) -> bool {
        if self.handle_input(&InputEvent::Key(Key::Char(c)), now).handled {
            return false;
        }
        let sel = self.selection;
        let mut tr = Transaction::new();
        if !sel.is_caret() {
            tr = tr.delete(sel.from, sel.to);
        }
        tr = tr.insert_text(sel.from, c.to_string(), Vec::new());
        self.dispatch(tr, now);
        self.selection = Selection::caret(sel.from + 1);
        true
    }

    /// Backspace at the selection, guard permitting.
    pub fn press_backspace(&mut self, now: Instant) -> bool {
        if self
            .handle_input(&InputEvent::Key(Key::Backspace), now)
            .handled
        {
            return true;
        }
        let sel = self.selection;
        if !sel.is_caret() {
            self.dispatch(Transaction::new().delete(sel.from, sel.to), now);
            self.selection = Selection::caret(sel.from);
        } else if sel.from > 0 {
            self.dispatch(Transaction::new().delete(sel.from - 1, sel.from), now);
            self.selection = Selection::caret(sel.from - 1);
        }
        true
    }

    /// Insert one raw character by code point; invalid code points are
    /// ignored.
    pub fn insert_character(&mut self, code_point: u32, now: Instant) -> bool {
        match char::from_u32(code_point) {
            Some(c) => self.type_char(c, now),
            None => false,
        }
    }

    // === Apparatus CRUD ===

    pub fn insert_apparatus_entries(
        &mut self,
        specs: Vec<ApparatusEntrySpec>,
        settings: EmphasisSettings,
        now: Instant,
    ) -> Result<(), EntryError> {
        let tr = insert_apparatus_entries(&self.doc, specs, settings)?;
        self.dispatch(tr, now);
        Ok(())
    }

    pub fn insert_apparatus_entry_from_nodes(
        &mut self,
        nodes: Vec<Node>,
        kind: ApparatusKind,
        paragraph: ParagraphAttrs,
        now: Instant,
    ) -> Result<(), EntryError> {
        let tr =
            insert_apparatus_entry_from_nodes(&self.doc, nodes, kind, paragraph, self.selection)?;
        self.dispatch(tr, now);
        Ok(())
    }

    pub fn get_apparatuses_ids(&self) -> Vec<Uuid> {
        self.doc.apparatus_ids()
    }

    /// Content nodes of one entry (the inline sequence of its paragraph).
    pub fn get_apparatus_nodes(&self, id: Uuid) -> Option<Vec<Node>> {
        let (entry, _) = self.doc.apparatus_entry(id)?;
        Some(entry.children().first()?.children().to_vec())
    }

    pub fn get_all_apparatus_nodes(&self) -> Vec<(Uuid, Vec<Node>)> {
        self.doc
            .apparatus_ids()
            .into_iter()
            .filter_map(|id| Some((id, self.get_apparatus_nodes(id)?)))
            .collect()
    }

    pub fn delete_apparatus(&mut self, id: Uuid, now: Instant) {
        self.delete_apparatuses(&[id], now);
    }

    pub fn delete_apparatuses(&mut self, ids: &[Uuid], now: Instant) {
        let tr = delete_apparatus_entries(&self.doc, ids);
        self.dispatch(tr, now);
    }

    pub fn delete_all_apparatuses(&mut self, now: Instant) {
        let tr = delete_all_apparatus_entries(&self.doc);
        self.dispatch(tr, now);
    }

    pub fn swap_margin_apparatuses(&mut self, now: Instant) {
        let tr = swap_margin_kinds(&self.doc);
        self.dispatch(tr, now);
    }

    pub fn update_apparatuses_lemma(&mut self, updates: &HashMap<Uuid, String>, now: Instant) {
        let tr = update_apparatuses_lemma(&self.doc, updates);
        self.dispatch(tr, now);
    }

    /// Re-style every lemma in place: any provided piece (content style,
    /// separator, from-to separator) overwrites the stored one. Mirrors
    /// external settings, so it bypasses history.
    pub fn update_lemmas_appearance(
        &mut self,
        style: Option<TextStyle>,
        separator: Option<StyledText>,
        from_to_separator: Option<StyledText>,
        now: Instant,
    ) {
        let mut tr = Transaction::new().without_history();
        for site in self.doc.lemmas().into_iter().rev() {
            let mut attrs = site.lemma.clone();
            if let Some(style) = &style {
                attrs.lemma.style = style.clone();
            }
            if let Some(separator) = &separator {
                attrs.separator = separator.clone();
            }
            if let Some(from_to) = &from_to_separator {
                attrs.from_to_separator = from_to.clone();
            }
            tr = tr.replace_node(site.start, Node::Lemma { attrs });
        }
        self.dispatch(tr, now);
    }

    pub fn unset_lemma(&mut self, entry_id: Uuid, now: Instant) {
        let tr = unset_lemma(&self.doc, entry_id);
        self.dispatch(tr, now);
    }

    // === Navigation ===

    /// Ask the shell to scroll to an entry, then highlight it transiently.
    pub fn scroll_to_apparatus(&mut self, id: Uuid) -> bool {
        if self.doc.apparatus_entry(id).is_none() {
            return false;
        }
        self.bus.emit(&EditorEvent::ScrollTo { id });
        self.bus.emit(&EditorEvent::ApparatusHighlight {
            id,
            duration_ms: HIGHLIGHT_DURATION_MS,
        });
        true
    }

    /// Scroll, highlight, and move the caret into the entry's content.
    pub fn focus_apparatus(&mut self, id: Uuid) -> bool {
        let Some((_, range)) = self.doc.apparatus_entry(id) else {
            return false;
        };
        let caret = range.start + 2;
        if !self.scroll_to_apparatus(id) {
            return false;
        }
        self.focused = true;
        self.selection = Selection::caret(caret);
        true
    }

    // === Comments ===

    /// Attach a comment mark over the current selection. Early-returns when
    /// nothing is selected.
    pub fn add_comment(&mut self, highlight_color: Option<String>, now: Instant) -> Option<Uuid> {
        let sel = self.selection;
        if sel.is_caret() {
            return None;
        }
        let id = Uuid::new_v4();
        let mark = Mark::Comment {
            id,
            highlight_color: highlight_color
                .unwrap_or_else(|| self.options.default_comment_color.clone()),
        };
        self.dispatch(Transaction::new().add_mark(sel.from, sel.to, mark), now);
        Some(id)
    }

    pub fn get_comment_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        self.doc.descendants(&mut |node, _| {
            if let Node::Text { marks, .. } = node {
                for mark in marks {
                    if let Mark::Comment { id, .. } = mark
                        && !ids.contains(id)
                    {
                        ids.push(*id);
                    }
                }
            }
            true
        });
        ids
    }

    /// The flattened span a comment covers, if it exists.
    pub fn comment_range(&self, id: Uuid) -> Option<std::ops::Range<usize>> {
        let mut from = None;
        let mut to = None;
        self.doc.descendants(&mut |node, pos| {
            if let Node::Text { marks, .. } = node
                && marks
                    .iter()
                    .any(|m| matches!(m, Mark::Comment { id: mid, .. } if *mid == id))
            {
                from.get_or_insert(pos);
                to = Some(pos + node.size());
            }
            true
        });
        Some(from?..to?)
    }

    pub fn select_comment(&mut self, id: Uuid) -> bool {
        match self.comment_range(id) {
            Some(range) => {
                self.selection = Selection::new(range.start, range.end);
                true
            }
            None => false,
        }
    }

    pub fn scroll_to_comment(&mut self, id: Uuid) -> bool {
        if self.comment_range(id).is_none() {
            return false;
        }
        self.bus.emit(&EditorEvent::ScrollTo { id });
        true
    }

    /// Strip the given comment marks wherever they occur.
    pub fn unset_comments(&mut self, ids: &[Uuid], now: Instant) {
        let mut sites: Vec<(usize, Node)> = Vec::new();
        self.doc.descendants(&mut |node, pos| {
            if let Node::Text { text, marks } = node
                && marks.iter().any(
                    |m| matches!(m, Mark::Comment { id, .. } if ids.contains(id)),
                )
            {
                let kept: Vec<Mark> = marks
                    .iter()
                    .filter(|m| !matches!(m, Mark::Comment { id, .. } if ids.contains(id)))
                    .cloned()
                    .collect();
                sites.push((
                    pos,
                    Node::Text {
                        text: text.clone(),
                        marks: kept,
                    },
                ));
            }
            true
        });
        let mut tr = Transaction::new();
        for (pos, node) in sites.into_iter().rev() {
            tr = tr.replace_node(pos, node);
        }
        self.dispatch(tr, now);
    }

    /// True when every comment mark in the document carries the configured
    /// default highlight color.
    pub fn comments_match_default_color(&self) -> bool {
        let mut unanimous = true;
        self.doc.descendants(&mut |node, _| {
            if let Node::Text { marks, .. } = node {
                for mark in marks {
                    if let Mark::Comment {
                        highlight_color, ..
                    } = mark
                        && highlight_color != &self.options.default_comment_color
                    {
                        unanimous = false;
                    }
                }
            }
            unanimous
        });
        unanimous
    }

    // === Character formatting ===

    fn marked_selection(&mut self) -> Option<Selection> {
        let sel = self.selection;
        if sel.is_caret() { None } else { Some(sel) }
    }

    fn apply_mark(&mut self, mark: Mark, now: Instant) -> bool {
        let Some(sel) = self.marked_selection() else {
            return false;
        };
        self.dispatch(Transaction::new().add_mark(sel.from, sel.to, mark), now);
        true
    }

    fn clear_mark(&mut self, kind: MarkKind, now: Instant) -> bool {
        let Some(sel) = self.marked_selection() else {
            return false;
        };
        self.dispatch(Transaction::new().remove_mark(sel.from, sel.to, kind), now);
        true
    }

    pub fn set_bold(&mut self, on: bool, now: Instant) -> bool {
        if on {
            self.apply_mark(Mark::Bold, now)
        } else {
            self.clear_mark(MarkKind::Bold, now)
        }
    }

    pub fn set_italic(&mut self, on: bool, now: Instant) -> bool {
        if on {
            self.apply_mark(Mark::Italic, now)
        } else {
            self.clear_mark(MarkKind::Italic, now)
        }
    }

    pub fn set_underline(&mut self, on: bool, now: Instant) -> bool {
        if on {
            self.apply_mark(Mark::Underline, now)
        } else {
            self.clear_mark(MarkKind::Underline, now)
        }
    }

    pub fn set_strikethrough(&mut self, on: bool, now: Instant) -> bool {
        if on {
            self.apply_mark(Mark::Strikethrough, now)
        } else {
            self.clear_mark(MarkKind::Strikethrough, now)
        }
    }

    /// Superscript and subscript are mutually exclusive; applying one clears
    /// the other (handled by mark displacement).
    pub fn set_superscript(&mut self, now: Instant) -> bool {
        self.apply_mark(Mark::Superscript, now)
    }

    pub fn set_subscript(&mut self, now: Instant) -> bool {
        self.apply_mark(Mark::Subscript, now)
    }

    pub fn set_font_family(&mut self, value: impl Into<String>, now: Instant) -> bool {
        self.apply_mark(
            Mark::FontFamily {
                value: value.into(),
            },
            now,
        )
    }

    pub fn set_font_size(&mut self, value: u16, now: Instant) -> bool {
        self.apply_mark(Mark::FontSize { value }, now)
    }

    pub fn set_text_color(&mut self, value: impl Into<String>, now: Instant) -> bool {
        self.apply_mark(
            Mark::TextColor {
                value: value.into(),
            },
            now,
        )
    }

    pub fn set_highlight(&mut self, color: impl Into<String>, now: Instant) -> bool {
        self.apply_mark(
            Mark::Highlight {
                color: color.into(),
            },
            now,
        )
    }

    pub fn set_link(&mut self, href: impl Into<String>, now: Instant) -> bool {
        self.apply_mark(Mark::Link { href: href.into() }, now)
    }

    pub fn unset_link(&mut self, now: Instant) -> bool {
        self.clear_mark(MarkKind::Link, now)
    }

    // === Search & replace ===

    pub fn start_search(&mut self, query: &str, options: SearchOptions, scope: SearchScope) -> usize {
        let mut state = SearchState::new(query, options, scope);
        state.run(&self.doc);
        if let Some(range) = state.active_range() {
            self.selection = Selection::new(range.start, range.end);
        }
        let count = state.matches().len();
        self.search = Some(state);
        count
    }

    pub fn clear_search(&mut self) {
        self.search = None;
    }

    pub fn search_match_count(&self) -> usize {
        self.search.as_ref().map_or(0, |s| s.matches().len())
    }

    pub fn next_search_match(&mut self) -> bool {
        let Some(search) = self.search.as_mut() else {
            return false;
        };
        match search.next_match() {
            Some(range) => {
                self.selection = Selection::new(range.start, range.end);
                true
            }
            None => false,
        }
    }

    pub fn prev_search_match(&mut self) -> bool {
        let Some(search) = self.search.as_mut() else {
            return false;
        };
        match search.prev_match() {
            Some(range) => {
                self.selection = Selection::new(range.start, range.end);
                true
            }
            None => false,
        }
    }

    pub fn set_replace_enabled(&mut self, enabled: bool) {
        if let Some(search) = self.search.as_mut() {
            search.set_replace_enabled(enabled);
        }
    }

    /// Replace the active match and re-run the search.
    pub fn replace_active_match(&mut self, replacement: &str, now: Instant) -> bool {
        let Some(tr) = self.search.as_ref().and_then(|s| s.replace_active(replacement)) else {
            return false;
        };
        self.dispatch(tr, now);
        if let Some(search) = self.search.as_mut() {
            search.run(&self.doc);
        }
        true
    }

    /// Replace every match in one transaction.
    pub fn replace_all_matches(&mut self, replacement: &str, now: Instant) -> usize {
        let Some(search) = self.search.as_ref() else {
            return 0;
        };
        let count = search.matches().len();
        let Some(tr) = search.replace_all(replacement) else {
            return 0;
        };
        self.dispatch(tr, now);
        if let Some(search) = self.search.as_mut() {
            search.run(&self.doc);
        }
        count
    }

    // === Export ===

    pub fn get_export_data(
        &self,
        title: &str,
        extract_reading_data: bool,
        reading_column_template: &str,
    ) -> ExportData {
        get_export_data(&self.doc, title, extract_reading_data, reading_column_template)
    }

    pub fn get_inserted_bibliography_entries(
        &self,
        existing: Vec<BibliographyEntry>,
    ) -> Vec<BibliographyEntry> {
        get_inserted_bibliography_entries(&self.doc, existing)
    }

    // === Undo / redo ===

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Step the document back one snapshot. A refused gate is a silent
    /// no-op, not an error.
    pub fn undo(&mut self, now: Instant) -> bool {
        let Some(target) = self.history.undo(&self.doc) else {
            return false;
        };
        self.restore(target, now);
        true
    }

    pub fn redo(&mut self, now: Instant) -> bool {
        let Some(target) = self.history.redo(&self.doc) else {
            return false;
        };
        self.restore(target, now);
        true
    }

    fn restore(&mut self, target: Document, now: Instant) {
        let tr = Transaction::new()
            .delete(0, self.doc.size())
            .insert(0, target.blocks().to_vec())
            .without_history();
        self.dispatch(tr, now);
        // Deferred release: the restore's own dispatch has fully settled.
        self.history.end_restore();
    }
}
