//! Per-editor event bus.
//!
//! Semantic events replace the host-level DOM events the integrity layer
//! intercepts: a click on a lemma surfaces as [`EditorEvent::LemmaClicked`]
//! rather than a caret placement, annotation removals surface as a batched
//! [`EditorEvent::MarksDeleted`], and navigation emits scroll/highlight
//! requests for the shell to honor.

use uuid::Uuid;

/// How long a navigated-to apparatus entry stays highlighted.
pub const HIGHLIGHT_DURATION_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletedMarkKind {
    Comment,
    Bookmark,
    Note,
}

/// One annotation whose mark disappeared between two document states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedMark {
    pub id: Uuid,
    pub kind: DeletedMarkKind,
    /// Concatenated text the mark covered in the old state.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    LemmaClicked { id: Uuid },
    CommentClicked { id: Uuid },
    BookmarkClicked { id: Uuid },
    NoteClicked { id: Uuid },
    MarksDeleted { deleted: Vec<DeletedMark> },
    ApparatusHighlight { id: Uuid, duration_ms: u64 },
    ScrollTo { id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Box<dyn FnMut(&EditorEvent)>;

/// Registration list for event handlers, `emit`/`on`/`off` style.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: Vec<(HandlerId, Handler)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, handler: impl FnMut(&EditorEvent) + 'static) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn off(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: &EditorEvent) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
