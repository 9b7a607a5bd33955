//! Scoped find & replace over the document's text runs.
//!
//! Queries are escaped and compiled into a regex so case folding comes from
//! the regex engine; whole-word matching is a boundary check on the
//! flattened text. Matches are expressed as flattened position ranges, ready
//! to become selections or replacement transactions.

use regex::RegexBuilder;
use uuid::Uuid;

use crate::doc::document::Document;
use crate::doc::transaction::Transaction;
use crate::dom::node::{Node, OBJECT_REPLACEMENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub whole_word: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            whole_word: false,
        }
    }
}

/// Where to look: the whole document or a single apparatus entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    WholeDocument,
    Apparatus(Uuid),
}

/// Document text flattened for matching, with a position for every char.
/// Block boundaries contribute newline sentinels (position `usize::MAX`) so
/// matches cannot silently span blocks.
struct FlatText {
    text: String,
    positions: Vec<usize>,
}

const SENTINEL: usize = usize::MAX;

fn flatten(doc: &Document, scope: SearchScope) -> FlatText {
    let range = match scope {
        SearchScope::WholeDocument => 0..doc.size(),
        SearchScope::Apparatus(id) => match doc.apparatus_entry(id) {
            Some((_, range)) => range,
            None => 0..0,
        },
    };

    let mut text = String::new();
    let mut positions = Vec::new();
    doc.descendants(&mut |node, pos| {
        if pos >= range.end || pos + node.size() <= range.start {
            return false;
        }
        match node {
            Node::Text { text: run, .. } => {
                for (i, c) in run.chars().enumerate() {
                    let p = pos + i;
                    if range.contains(&p) {
                        text.push(c);
                        positions.push(p);
                    }
                }
            }
            n if n.is_atom() => {
                text.push(OBJECT_REPLACEMENT);
                positions.push(pos);
            }
            n if n.is_block() => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                    positions.push(SENTINEL);
                }
            }
            _ => {}
        }
        true
    });
    FlatText { text, positions }
}

fn is_word_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Active search session: query, options, scope, and the match cursor.
#[derive(Debug)]
pub struct SearchState {
    query: String,
    options: SearchOptions,
    scope: SearchScope,
    matches: Vec<std::ops::Range<usize>>,
    active: Option<usize>,
    replace_enabled: bool,
}

impl SearchState {
    pub fn new(query: impl Into<String>, options: SearchOptions, scope: SearchScope) -> Self {
        Self {
            query: query.into(),
            options,
            scope,
            matches: Vec::new(),
            active: None,
            replace_enabled: true,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[std::ops::Range<usize>] {
        &self.matches
    }

    pub fn active_range(&self) -> Option<std::ops::Range<usize>> {
        self.active.map(|i| self.matches[i].clone())
    }

    pub fn set_replace_enabled(&mut self, enabled: bool) {
        self.replace_enabled = enabled;
    }

    pub fn replace_enabled(&self) -> bool {
        self.replace_enabled
    }

    /// Recompute matches against the current document state. The active
    /// match resets to the first hit.
    pub fn run(&mut self, doc: &Document) {
        self.matches.clear();
        self.active = None;
        if self.query.is_empty() {
            return;
        }
        let flat = flatten(doc, self.scope);
        let Ok(re) = RegexBuilder::new(&regex::escape(&self.query))
            .case_insensitive(!self.options.case_sensitive)
            .build()
        else {
            return;
        };

        let char_of_byte: Vec<usize> = {
            let mut map = vec![0; flat.text.len() + 1];
            for (ci, (bi, _)) in flat.text.char_indices().enumerate() {
                map[bi] = ci;
            }
            map[flat.text.len()] = flat.positions.len();
            map
        };

        for m in re.find_iter(&flat.text) {
            let start = char_of_byte[m.start()];
            let end = char_of_byte[m.end()];
            if start >= end {
                continue;
            }
            // Matches touching a block-boundary sentinel are not real text.
            if flat.positions[start..end].contains(&SENTINEL) {
                continue;
            }
            if self.options.whole_word {
                let before = start.checked_sub(1).map(|i| flat.text.chars().nth(i));
                let before = before.flatten();
                let after = flat.text.chars().nth(end);
                if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
                    continue;
                }
            }
            let from = flat.positions[start];
            let to = flat.positions[end - 1] + 1;
            self.matches.push(from..to);
        }
        if !self.matches.is_empty() {
            self.active = Some(0);
        }
    }

    /// Cycle to the next match, wrapping at the end.
    pub fn next_match(&mut self) -> Option<std::ops::Range<usize>> {
        if self.matches.is_empty() {
            return None;
        }
        self.active = Some(match self.active {
            Some(i) => (i + 1) % self.matches.len(),
            None => 0,
        });
        self.active_range()
    }

    /// Cycle to the previous match, wrapping at the start.
    pub fn prev_match(&mut self) -> Option<std::ops::Range<usize>> {
        if self.matches.is_empty() {
            return None;
        }
        self.active = Some(match self.active {
            Some(0) | None => self.matches.len() - 1,
            Some(i) => i - 1,
        });
        self.active_range()
    }

    /// Replace the active match. Returns `None` when replace is disabled or
    /// nothing is active; the caller must re-run the search afterwards.
    pub fn replace_active(&self, replacement: &str) -> Option<Transaction> {
        if !self.replace_enabled {
            return None;
        }
        let range = self.active_range()?;
        Some(
            Transaction::new()
                .delete(range.start, range.end)
                .insert_text(range.start, replacement, Vec::new()),
        )
    }

    /// Replace every match in one transaction, back to front so earlier
    /// replacements keep later positions valid.
    pub fn replace_all(&self, replacement: &str) -> Option<Transaction> {
        if !self.replace_enabled || self.matches.is_empty() {
            return None;
        }
        let mut tr = Transaction::new();
        for range in self.matches.iter().rev() {
            tr = tr
                .delete(range.start, range.end)
                .insert_text(range.start, replacement, Vec::new());
        }
        Some(tr)
    }
}
