//! The apparatus document tree: typed nodes, marks, styles, and the
//! flattened-position index.

pub mod mark;
pub mod node;
pub mod position;
pub mod style;

pub use mark::{Mark, MarkKind, add_mark, remove_mark_kind};
pub use node::{
    ApparatusKind, DividerAttrs, EntryAttrs, LemmaAttrs, Node, OBJECT_REPLACEMENT, ParagraphAttrs,
    ReadingAttrs, ReadingKind, SiglumAttrs,
};
pub use position::{DocIndex, IndexedNode, char_at, node_at, node_at_mut, total_size};
pub use style::{Script, SiglumRun, StyledText, TextStyle};
