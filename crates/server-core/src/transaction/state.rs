use std::fmt;

/// Per-transaction stage state machine
///
/// `Created -> Extracted -> Validated -> Handled -> Applied`, with
/// `Rejected` reachable from any pre-apply state and always followed by
/// `AppliedError`, and `ShortCircuited` (a handler answered or skipped the
/// operation) reachable from any pre-apply state and terminal. There is no
/// backward transition and no stage re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Extracted,
    Validated,
    Handled,
    Applied,
    Rejected,
    AppliedError,
    ShortCircuited,
}

impl TransactionState {
    pub fn can_transition_to(self, to: TransactionState) -> bool {
        use TransactionState::*;
        match (self, to) {
            (Created, Extracted) => true,
            (Extracted, Validated) => true,
            (Validated, Handled) => true,
            (Handled, Applied) => true,
            (Created | Extracted | Validated | Handled, Rejected) => true,
            (Created | Extracted | Validated | Handled, ShortCircuited) => true,
            (Rejected, AppliedError) => true,
            _ => false,
        }
    }

    /// Whether the transaction has reached a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Applied
                | TransactionState::AppliedError
                | TransactionState::ShortCircuited
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Created => "created",
            TransactionState::Extracted => "extracted",
            TransactionState::Validated => "validated",
            TransactionState::Handled => "handled",
            TransactionState::Applied => "applied",
            TransactionState::Rejected => "rejected",
            TransactionState::AppliedError => "applied-error",
            TransactionState::ShortCircuited => "short-circuited",
        };
        f.write_str(name)
    }
}
