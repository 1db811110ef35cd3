use std::collections::BTreeSet;

use latticework::Lattice;

/// Grows by taking the numeric maximum of every contribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxLattice;

impl Lattice for MaxLattice {
    type Value = u64;

    fn bottom(&self) -> u64 {
        0
    }

    fn join(&self, a: &u64, b: &u64) -> u64 {
        *a.max(b)
    }

    fn equals(&self, a: &u64, b: &u64) -> bool {
        a == b
    }
}

/// Grows by set union; the canonical "grows forever, never shrinks" lattice.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnionLattice;

impl Lattice for UnionLattice {
    type Value = BTreeSet<i32>;

    fn bottom(&self) -> BTreeSet<i32> {
        BTreeSet::new()
    }

    fn join(&self, a: &BTreeSet<i32>, b: &BTreeSet<i32>) -> BTreeSet<i32> {
        a.union(b).copied().collect()
    }

    fn equals(&self, a: &BTreeSet<i32>, b: &BTreeSet<i32>) -> bool {
        a == b
    }
}
