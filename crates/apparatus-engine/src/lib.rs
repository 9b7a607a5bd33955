/*!
 * # Apparatus Engine
 *
 * Core document model for critical-apparatus editing. The engine owns:
 *
 * - **The node tree** (`dom`): typed block and inline nodes with tagged
 *   attribute records, marks on text runs, and a flattened position scheme
 *   with a per-traversal ancestor index.
 * - **Transactional mutation** (`doc`): all edits compile to step lists
 *   applied through a dispatcher that runs an ordered set of correction
 *   rules after every transaction.
 * - **Structural integrity** (`integrity`): input-event guarding for
 *   protected nodes (section dividers, lemma anchors) and the
 *   lemma-apparatus binding invariant.
 * - **Identity-gated history** (`history`): bounded, debounced full-document
 *   snapshots whose undo/redo refuses to desynchronize the apparatus id set.
 * - **Entry model & export** (`entry`, `export`): apparatus entry
 *   construction, id-addressed mutation, and the flat tabular projection
 *   with dynamically discovered reading columns.
 * - **The facade** (`editor`): the operation surface the shell drives.
 *
 * The engine is single-threaded and synchronous; the only time-dependent
 * pieces (history debounce, update warm-up) take explicit `Instant`s so
 * hosts and tests control the clock.
 */

pub mod doc;
pub mod dom;
pub mod editor;
pub mod entry;
pub mod export;
pub mod history;
pub mod integrity;
pub mod search;

// Public API re-exports
pub use doc::{
    DeletedMark, DeletedMarkKind, Document, DocumentError, EditorEvent, EventBus, Selection, Step,
    Transaction,
};
pub use dom::{
    ApparatusKind, LemmaAttrs, Mark, MarkKind, Node, ParagraphAttrs, ReadingAttrs, ReadingKind,
    Script, SiglumAttrs, SiglumRun, StyledText, TextStyle,
};
pub use editor::{ApparatusEditor, EditorError, EditorOptions, InputResponse};
pub use entry::{ApparatusEntrySpec, EmphasisSettings, EntryError};
pub use export::{BibliographyEntry, ExportData};
pub use history::{ApparatusHistory, Debouncer};
pub use integrity::{ClipboardPayload, Disposition, InputEvent, IntegrityGuard, Key};
pub use search::{SearchOptions, SearchScope, SearchState};
