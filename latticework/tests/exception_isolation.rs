use std::sync::{Arc, Mutex};

use latticework::{DefaultKey, Outcome, Pool, TaskKind};

use _block_on::block_on;

mod _lattices;
use _lattices::MaxLattice;

#[test]
fn a_panicking_init_is_isolated_and_reported_but_does_not_wedge_the_pool() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let pool = {
        let errors = Arc::clone(&errors);
        Pool::builder()
            .on_task_error(move |error| errors.lock().unwrap().push(error.kind()))
            .build()
            .unwrap()
    };

    let doomed = pool.cell_with_init(DefaultKey, MaxLattice, |_| panic!("synthetic failure"));
    let fine = pool.cell_with_init(DefaultKey, MaxLattice, |_| Outcome::Final(42));

    doomed.trigger();
    fine.trigger();

    block_on(pool.quiesce());

    assert_eq!(*errors.lock().unwrap(), vec![TaskKind::Init]);
    assert!(!doomed.is_completed());
    assert!(fine.is_completed());
    assert_eq!(fine.get_result(), 42);
}
