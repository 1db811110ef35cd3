use std::collections::BTreeMap;
use std::sync::Arc;

use latticework::{Cell, CellId, Key, Outcome, Pool};

use _block_on::block_on;

mod _lattices;
use _lattices::MaxLattice;

/// A resolution policy that assigns every cell in the cycle the *sum* of
/// their pre-resolution values, rather than each cell's own value.
#[derive(Debug, Clone, Copy, Default)]
struct SumKey;

impl Key<MaxLattice> for SumKey {
    fn resolve(&self, cells: &[Arc<Cell<Self, MaxLattice>>]) -> BTreeMap<CellId, u64> {
        let sum: u64 = cells.iter().map(|cell| cell.get_result()).sum();
        cells.iter().map(|cell| (cell.id(), sum)).collect()
    }

    fn fallback(&self, cells: &[Arc<Cell<Self, MaxLattice>>]) -> BTreeMap<CellId, u64> {
        self.resolve(cells)
    }
}

#[test]
fn a_custom_key_can_resolve_to_something_other_than_the_current_value() {
    let pool = Pool::builder().build().unwrap();

    let (x, completer_x) = pool.cell(SumKey, MaxLattice);
    let (y, completer_y) = pool.cell(SumKey, MaxLattice);

    // Register the dependency edges (so the resolver sees a closed cycle)
    // without ever forwarding a value across them, so the only way either
    // cell reaches 4 is through `SumKey::resolve`.
    x.when(&y, |_, _: Outcome<u64>| Outcome::NoOutcome);
    y.when(&x, |_, _: Outcome<u64>| Outcome::NoOutcome);

    completer_x.put(3);
    completer_y.put(1);
    block_on(pool.quiesce());

    assert_eq!(x.get_result(), 3);
    assert_eq!(y.get_result(), 1);

    block_on(pool.quiescent_resolve_cycles());

    assert!(x.is_completed());
    assert!(y.is_completed());
    assert_eq!(x.get_result(), 4);
    assert_eq!(y.get_result(), 4);
}
