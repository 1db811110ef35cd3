use std::sync::Arc;

use crate::cell::Cell;
use crate::key::Key;
use crate::lattice::Lattice;
use crate::outcome::Outcome;

/// The write side of a [`Cell`], handed out separately from the read side so
/// that a cell's producer and its consumers go through different APIs (a
/// consumer holding only the `Arc<Cell<_, _>>` cannot complete it directly).
pub struct CellCompleter<K: Key<L>, L: Lattice>(pub(crate) Arc<Cell<K, L>>);

impl<K: Key<L>, L: Lattice> CellCompleter<K, L> {
    /// Joins `value` in as a non-final refinement.
    pub fn put(&self, value: L::Value) {
        self.0.trigger();
        self.0.apply(Outcome::Next(value));
    }

    /// Joins `value` in and marks the cell as having reached its terminal
    /// answer; no further `put`/`put_final` call has any effect afterwards.
    pub fn put_final(&self, value: L::Value) {
        self.0.trigger();
        self.0.apply(Outcome::Final(value));
    }

    /// The cell this completer writes to.
    pub fn cell(&self) -> &Arc<Cell<K, L>> {
        &self.0
    }
}
