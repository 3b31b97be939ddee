//! Planned transactions
//!
//! Business rules read the last committed state and return a [`Plan`]: the
//! mutations to commit as one store transaction and the outcome to hand back
//! once that commit succeeds. Nothing is written while planning.

use surety_store::Mutation;

/// Mutations to commit together, plus the caller-visible outcome
#[derive(Debug, Clone)]
pub struct Plan<T> {
    /// Committed atomically, in order
    pub mutations: Vec<Mutation>,

    /// Returned to the caller after the commit
    pub outcome: T,
}

impl<T> Plan<T> {
    /// Plan with mutations
    pub fn new(mutations: Vec<Mutation>, outcome: T) -> Self {
        Self { mutations, outcome }
    }

    /// Plan that writes nothing
    pub fn noop(outcome: T) -> Self {
        Self {
            mutations: Vec::new(),
            outcome,
        }
    }
}
