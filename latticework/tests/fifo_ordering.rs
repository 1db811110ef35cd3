use latticework::{DefaultKey, Outcome, Pool};

use _block_on::block_on;

mod _validator;
use _validator::Recorder;

mod _lattices;
use _lattices::MaxLattice;

/// Every update from one upstream cell is serialized into the downstream
/// cell's per-cell queue in submission order, even though each one is
/// actually applied on a pool worker thread.
#[test]
fn updates_into_one_cell_are_applied_in_submission_order() {
    let pool = Pool::builder().build().unwrap();
    let recorder: &'static Recorder<u64> = Box::leak(Box::new(Recorder::new()));

    let (upstream, completer) = pool.cell(DefaultKey, MaxLattice);
    let downstream = pool.cell_with_init(DefaultKey, MaxLattice, {
        let upstream = upstream.clone();
        move |downstream| {
            downstream.when(&upstream, move |_, outcome: Outcome<u64>| {
                if let Outcome::Next(v) | Outcome::Final(v) = &outcome {
                    recorder.push(*v);
                }
                outcome
            });
            Outcome::NoOutcome
        }
    });
    downstream.trigger();

    for v in 1..20u64 {
        completer.put(v);
    }
    completer.put_final(20);

    block_on(pool.quiesce());

    recorder.expect(1..=20);
    assert_eq!(downstream.get_result(), 20);
}
