use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cell::{Cell, CellId};
use crate::lattice::Lattice;

/// A per-cell policy carrier supplying cycle-resolution and fallback
/// behaviour, parameterised by the [`Lattice`] its cells draw values from.
///
/// Concrete lattices and keys are external collaborators of this crate (see
/// `spec.md` §1 "Out of scope"); `latticework` only needs the two entry
/// points below, invoked exactly at the two quiescence-triggered moments
/// described in `spec.md` §4.6.
pub trait Key<L: Lattice>: Send + Sync + 'static {
    /// Invoked once for every closed strongly-connected component detected
    /// at quiescence. Must return a terminal value for every cell in
    /// `cells`; cells not present in the returned map are left untouched
    /// (and the resolution pass will be considered to have made no
    /// progress for them).
    fn resolve(&self, cells: &[Arc<Cell<Self, L>>]) -> BTreeMap<CellId, L::Value>
    where
        Self: Sized;

    /// Invoked at final quiescence for triggered cells that remain
    /// incomplete and are not members of any closed cycle. Same contract as
    /// [`resolve`](Key::resolve).
    fn fallback(&self, cells: &[Arc<Cell<Self, L>>]) -> BTreeMap<CellId, L::Value>
    where
        Self: Sized;
}

/// The key used when no application-specific resolution policy is
/// supplied: both [`resolve`](Key::resolve) and [`fallback`](Key::fallback)
/// assign each cell its own current value, per `spec.md` §6.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKey;

impl<L: Lattice> Key<L> for DefaultKey {
    fn resolve(&self, cells: &[Arc<Cell<Self, L>>]) -> BTreeMap<CellId, L::Value> {
        cells.iter().map(|cell| (cell.id(), cell.get_result())).collect()
    }

    fn fallback(&self, cells: &[Arc<Cell<Self, L>>]) -> BTreeMap<CellId, L::Value> {
        cells.iter().map(|cell| (cell.id(), cell.get_result())).collect()
    }
}
