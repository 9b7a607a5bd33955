//! Apparatus-aware undo/redo over full-document snapshots.
//!
//! The history is a bounded list of document clones plus a cursor. Recording
//! is debounced so a burst of keystrokes collapses into one snapshot, and
//! undo/redo is gated on apparatus identity: when the set of live apparatus
//! entry ids differs between the current and the target snapshot, the step is
//! silently refused. Apparatus entries are created and destroyed by the main
//! text editor reacting to lemma changes elsewhere; an ungated undo would
//! resurrect entries whose anchors no longer exist.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::doc::document::Document;
use crate::doc::transaction::Transaction;
use crate::dom::node::Node;

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A timer-owning debounce slot: last write wins, nothing fires until the
/// window elapses or the owner flushes. Time is passed in explicitly so the
/// component has no hidden clock.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            deadline: None,
        }
    }

    /// Replace any pending payload and restart the window.
    pub fn schedule(&mut self, payload: T, now: Instant) {
        self.pending = Some(payload);
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    /// Take the pending payload immediately, regardless of the deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    /// Take the pending payload if its window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Bounded, identity-gated snapshot history.
#[derive(Debug)]
pub struct ApparatusHistory {
    snapshots: Vec<Document>,
    cursor: Option<usize>,
    capacity: usize,
    debounce: Debouncer<Document>,
    /// Re-entrancy guard held while a restore's own transaction settles.
    restoring: bool,
}

impl Default for ApparatusHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_DEBOUNCE)
    }
}

impl ApparatusHistory {
    pub fn new(capacity: usize, debounce_window: Duration) -> Self {
        Self {
            snapshots: Vec::new(),
            cursor: None,
            capacity: capacity.max(1),
            debounce: Debouncer::new(debounce_window),
            restoring: false,
        }
    }

    /// Drop everything and store `doc` as the baseline snapshot.
    pub fn reset(&mut self, doc: &Document) {
        self.debounce.cancel();
        self.snapshots.clear();
        self.snapshots.push(doc.clone());
        self.cursor = Some(0);
        self.restoring = false;
    }

    /// Observe a dispatched transaction. Content-preserving transactions,
    /// transactions flagged out of history, and anything seen while a
    /// restore settles are ignored; the rest is debounced into one snapshot.
    pub fn record(&mut self, tr: &Transaction, doc: &Document, now: Instant) {
        if self.restoring || !tr.add_to_history() || !tr.changes_content() {
            return;
        }
        self.debounce.schedule(doc.clone(), now);
    }

    /// Fire the debounce if its window has elapsed.
    pub fn tick(&mut self, now: Instant) {
        if let Some(doc) = self.debounce.poll(now) {
            self.push(doc);
        }
    }

    /// Commit any pending snapshot immediately.
    pub fn flush(&mut self) {
        if let Some(doc) = self.debounce.flush() {
            self.push(doc);
        }
    }

    fn push(&mut self, doc: Document) {
        // A new snapshot discards the redo future.
        if let Some(c) = self.cursor {
            self.snapshots.truncate(c + 1);
        } else {
            self.snapshots.clear();
        }
        self.snapshots.push(doc);
        if self.snapshots.len() > self.capacity {
            let excess = self.snapshots.len() - self.capacity;
            self.snapshots.drain(..excess);
        }
        self.cursor = Some(self.snapshots.len() - 1);
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.snapshots.len())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// True while a restore's resulting transaction has not settled yet.
    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    /// Deferred release of the re-entrancy guard; the facade calls this once
    /// the restore's dispatch has fully completed.
    pub fn end_restore(&mut self) {
        self.restoring = false;
    }

    /// Step back one snapshot, if the apparatus id sets allow it.
    ///
    /// Returns the document to restore; the caller applies it with a
    /// non-history transaction. Lemma content is first re-aligned from
    /// `current` for every entry id present in both snapshots, so an
    /// apparatus-body-only undo does not roll back independently edited
    /// lemma text. The alignment deliberately covers all matching ids, as
    /// the source behavior does, even though that can touch entries
    /// unrelated to the undone edit.
    pub fn undo(&mut self, current: &Document) -> Option<Document> {
        // A late-firing snapshot must not overwrite the restored state.
        self.debounce.cancel();

        let c = self.cursor?;
        if c == 0 {
            return None;
        }
        let current_ids = apparatus_id_set(&self.snapshots[c]);
        let target_ids = apparatus_id_set(&self.snapshots[c - 1]);
        if current_ids != target_ids {
            debug!("undo refused: apparatus id sets diverged");
            return None;
        }

        let live_lemmas: HashMap<Uuid, String> = current
            .lemmas()
            .into_iter()
            .map(|site| (site.owner, site.lemma.lemma.content))
            .collect();
        let mut target = self.snapshots[c - 1].clone();
        align_lemma_content(target.blocks_mut(), &live_lemmas);
        self.snapshots[c - 1] = target.clone();

        self.cursor = Some(c - 1);
        self.restoring = true;
        Some(target)
    }

    /// Step forward one snapshot, same id-set gate, no lemma re-alignment:
    /// lemma content flows forward from the newer snapshot as-is.
    pub fn redo(&mut self, _current: &Document) -> Option<Document> {
        self.debounce.cancel();

        let c = self.cursor?;
        if c + 1 >= self.snapshots.len() {
            return None;
        }
        let current_ids = apparatus_id_set(&self.snapshots[c]);
        let target_ids = apparatus_id_set(&self.snapshots[c + 1]);
        if current_ids != target_ids {
            debug!("redo refused: apparatus id sets diverged");
            return None;
        }

        let target = self.snapshots[c + 1].clone();
        self.cursor = Some(c + 1);
        self.restoring = true;
        Some(target)
    }
}

fn apparatus_id_set(doc: &Document) -> BTreeSet<Uuid> {
    doc.apparatus_ids().into_iter().collect()
}

/// Overwrite lemma content in a snapshot tree from the live values, keyed by
/// owning entry id. Other lemma attributes stay untouched.
fn align_lemma_content(nodes: &mut [Node], live: &HashMap<Uuid, String>) {
    for node in nodes {
        if let Node::ApparatusEntry { attrs, content } = node {
            let Some(content_now) = live.get(&attrs.id) else {
                continue;
            };
            set_lemma_content(content, content_now);
        }
    }
}

fn set_lemma_content(nodes: &mut [Node], value: &str) {
    for node in nodes {
        match node {
            Node::Lemma { attrs } => attrs.lemma.content = value.to_string(),
            _ => {
                if let Some(children) = node.children_mut() {
                    set_lemma_content(children, value);
                }
            }
        }
    }
}
