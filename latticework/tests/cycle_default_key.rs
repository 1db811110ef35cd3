use latticework::{DefaultKey, Pool};

use _block_on::block_on;

mod _lattices;
use _lattices::MaxLattice;

/// Two cells that only ever depend on each other form a closed cycle with
/// no external driver; `DefaultKey` breaks it by completing each cell with
/// whatever value it already holds.
#[test]
fn a_closed_two_cycle_resolves_to_its_own_values() {
    let pool = Pool::builder().build().unwrap();

    let (x, completer_x) = pool.cell(DefaultKey, MaxLattice);
    let (y, completer_y) = pool.cell(DefaultKey, MaxLattice);

    x.when(&y, |_, outcome| outcome);
    y.when(&x, |_, outcome| outcome);

    completer_x.put(3);
    completer_y.put(1);

    block_on(pool.quiesce());
    // No cell pushed a `Final` outcome, so the cycle is still open.
    assert!(!x.is_completed());
    assert!(!y.is_completed());

    block_on(pool.quiescent_resolve_cycles());

    assert!(x.is_completed());
    assert!(y.is_completed());
    // `DefaultKey::resolve` assigns each cell its own current value; by the
    // time the cycle closes, the join of `when`-forwarded updates has
    // already equalized both cells at 3.
    assert_eq!(x.get_result(), 3);
    assert_eq!(y.get_result(), 3);
}

#[test]
fn resolving_an_already_closed_pool_is_a_no_op() {
    let pool = Pool::builder().build().unwrap();
    block_on(pool.quiescent_resolve_cycles());
    block_on(pool.quiescent_resolve_cycles());
    assert!(pool.quiescent_incomplete_cells().is_empty());
}
