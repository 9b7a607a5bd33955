//! Transaction dispatch with correction middleware.
//!
//! The host engine's plugin chain is modeled as an explicit, ordered list of
//! pure rules. Each rule inspects the applied transaction together with the
//! old and new document states and may append a correction transaction. Rule
//! failures are logged and skipped: a missed correction on one edit is
//! recoverable (the rule re-runs on the next transaction), an aborted edit is
//! not.

use tracing::warn;

use crate::doc::document::{Document, DocumentError};
use crate::doc::transaction::Transaction;

/// A post-transaction document-consistency rule.
///
/// Rules never reject the transaction; they may only append corrective steps.
/// Returning `Ok(None)` means the invariant already holds, which is required
/// to avoid correction loops.
pub trait CorrectionRule {
    fn name(&self) -> &'static str;

    fn correct(
        &self,
        tr: &Transaction,
        old: &Document,
        new: &Document,
    ) -> Result<Option<Transaction>, DocumentError>;
}

/// Result of dispatching one transaction.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Document state before the transaction, for observers that diff.
    pub old: Document,
    /// Corrections applied after the main transaction, in rule order.
    pub corrections: Vec<&'static str>,
}

/// Applies transactions and runs the correction rules in order.
#[derive(Default)]
pub struct Dispatcher {
    rules: Vec<Box<dyn CorrectionRule>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rule(&mut self, rule: impl CorrectionRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Apply `tr` to `doc`, then give every rule one chance to append a
    /// correction. Corrections apply immediately, so later rules see the
    /// corrected state.
    pub fn dispatch(&self, doc: &mut Document, tr: &Transaction) -> DispatchOutcome {
        let old = doc.clone();
        doc.apply(tr);

        let mut corrections = Vec::new();
        for rule in &self.rules {
            match rule.correct(tr, &old, doc) {
                Ok(Some(correction)) if !correction.is_empty() => {
                    doc.apply(&correction);
                    corrections.push(rule.name());
                }
                Ok(_) => {}
                Err(err) => {
                    // Fail open: the edit stands, the rule re-runs next time.
                    warn!(rule = rule.name(), %err, "correction pass failed, skipping");
                }
            }
        }

        DispatchOutcome { old, corrections }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("Dispatcher").field("rules", &names).finish()
    }
}
