//! Structural integrity enforcement: the input-event guard and the
//! lemma-apparatus binding rule.

pub mod binding;
pub mod guard;

pub use binding::LemmaBinding;
pub use guard::{ClipboardPayload, Disposition, InputEvent, IntegrityGuard, Key};
