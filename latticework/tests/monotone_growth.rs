use latticework::{DefaultKey, Pool};

mod _lattices;
use _lattices::UnionLattice;

#[test]
fn repeated_contributions_only_ever_grow_the_value() {
    let pool = Pool::builder().build().unwrap();
    let (cell, completer) = pool.cell(DefaultKey, UnionLattice);

    completer.put([1, 2].into_iter().collect());
    assert_eq!(cell.get_result(), [1, 2].into_iter().collect());

    completer.put([2, 3].into_iter().collect());
    assert_eq!(cell.get_result(), [1, 2, 3].into_iter().collect());

    // A subset of what's already there: a genuine no-op, value unchanged.
    completer.put([1].into_iter().collect());
    assert_eq!(cell.get_result(), [1, 2, 3].into_iter().collect());

    completer.put_final([9].into_iter().collect());
    assert!(cell.is_completed());
    assert_eq!(cell.get_result(), [1, 2, 3, 9].into_iter().collect());

    // Nothing can move a completed cell, not even a genuinely new value.
    completer.put([100].into_iter().collect());
    assert_eq!(cell.get_result(), [1, 2, 3, 9].into_iter().collect());
}
