//! Document state, transactional mutation, dispatch and events.

pub mod dispatch;
pub mod document;
pub mod events;
pub mod transaction;

pub use dispatch::{CorrectionRule, DispatchOutcome, Dispatcher};
pub use document::{Document, DocumentError, LemmaSite, Selection};
pub use events::{
    DeletedMark, DeletedMarkKind, EditorEvent, EventBus, HIGHLIGHT_DURATION_MS, HandlerId,
};
pub use transaction::{Step, Transaction};
