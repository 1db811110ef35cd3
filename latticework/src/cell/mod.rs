//! Cells: the monotone, lattice-valued storage cells that the pool drives to
//! completion.

mod completer;

pub use completer::CellCompleter;

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{TaskError, TaskKind};
use crate::key::Key;
use crate::lattice::Lattice;
use crate::outcome::Outcome;
use crate::pool::Pool;

/// Identifies a cell for the lifetime of the pool that created it.
///
/// Deliberately opaque and `Copy`: callers compare and order ids, they never
/// construct one directly (mirroring how `isoprenoid`'s `GlobalSignalsRuntime`
/// keys its registry by raw pointer rather than a caller-supplied name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(u64);

impl CellId {
    pub(crate) fn fresh(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a cell sits in its lazy-triggering/completion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created but not yet demanded; its `init` has not run.
    Untriggered,
    /// Demanded at least once; may still receive refinements.
    Triggered,
    /// Holds its terminal value; no further refinements are accepted.
    Completed,
}

type Notify<V> = Arc<dyn Fn(Outcome<V>) + Send + Sync>;

struct Inner<K: Key<L>, L: Lattice> {
    phase: Phase,
    value: L::Value,
    /// Downstream cells subscribed via [`Cell::when`], keyed by their id.
    callbacks: BTreeMap<CellId, Notify<L::Value>>,
    /// Upstream cells this cell has itself subscribed to, so that on
    /// completion it can sever those subscriptions in turn.
    deps: BTreeMap<CellId, Arc<dyn ErasedCell>>,
    /// Subset of `deps` whose upstream has not yet completed. A combine
    /// result that resolves to `Outcome::Final` while this is non-empty is
    /// downgraded to `Outcome::Next`: a dependent with several live parents
    /// only really finalizes once every one of them has.
    pending_deps: BTreeSet<CellId>,
    init: Option<Box<dyn FnOnce(Arc<Cell<K, L>>) -> Outcome<L::Value> + Send>>,
}

/// A single lattice-valued cell, owned by exactly one [`Pool`].
///
/// Cells are always handled behind `Arc`: the pool's registry, dependency
/// edges and scheduled callbacks all hold clones of the same handle.
pub struct Cell<K: Key<L>, L: Lattice> {
    id: CellId,
    key: K,
    lattice: L,
    pool: Pool,
    inner: Mutex<Inner<K, L>>,
}

impl<K: Key<L>, L: Lattice> Cell<K, L> {
    pub(crate) fn new(
        id: CellId,
        key: K,
        lattice: L,
        pool: Pool,
        init: Option<Box<dyn FnOnce(Arc<Cell<K, L>>) -> Outcome<L::Value> + Send>>,
    ) -> Arc<Self> {
        let bottom = lattice.bottom();
        Arc::new(Self {
            id,
            key,
            lattice,
            pool,
            inner: Mutex::new(Inner {
                phase: Phase::Untriggered,
                value: bottom,
                callbacks: BTreeMap::new(),
                deps: BTreeMap::new(),
                pending_deps: BTreeSet::new(),
                init,
            }),
        })
    }

    pub(crate) fn already_completed(id: CellId, key: K, lattice: L, pool: Pool, value: L::Value) -> Arc<Self> {
        Arc::new(Self {
            id,
            key,
            lattice,
            pool,
            inner: Mutex::new(Inner {
                phase: Phase::Completed,
                value,
                callbacks: BTreeMap::new(),
                deps: BTreeMap::new(),
                pending_deps: BTreeSet::new(),
                init: None,
            }),
        })
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// The cell's current value. Reflects whatever has been joined in so
    /// far; may still change unless [`is_completed`](Cell::is_completed).
    pub fn get_result(&self) -> L::Value {
        self.inner.lock().value.clone()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.inner.lock().phase, Phase::Completed)
    }

    /// Forces lazy evaluation: runs `init` exactly once, the first time any
    /// caller demands this cell (directly, or by registering a dependency on
    /// it via [`when`](Cell::when)).
    pub fn trigger(self: &Arc<Self>) {
        let init = {
            let mut guard = self.inner.lock();
            if !matches!(guard.phase, Phase::Untriggered) {
                return;
            }
            guard.phase = Phase::Triggered;
            guard.init.take()
        };
        let Some(init) = init else { return };
        let this = Arc::clone(self);
        self.pool.execute(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let this = Arc::clone(&this);
                init(this)
            }));
            match outcome {
                Ok(outcome) => this.apply(outcome),
                Err(payload) => this.pool.report_error(TaskError::new(TaskKind::Init, payload)),
            }
        });
    }

    /// Registers a dependency on `upstream`: whenever `upstream` advances,
    /// `combine` is invoked (serialized per-`self` with any other callback
    /// targeting this cell) and its result is joined into `self`. If
    /// `upstream` already holds a non-bottom value at subscription time, that
    /// value is delivered immediately (as `Outcome::Next` if `upstream` is
    /// still open, `Outcome::Final` if it's already complete) so a late
    /// subscriber never misses a refinement that happened before it asked.
    ///
    /// `combine` sees one dependency update at a time (the changed cell's id
    /// and its new outcome), not a snapshot of every dependency; see
    /// `DESIGN.md` for why this convention was chosen over passing the full
    /// dependency set. A combine result of `Outcome::Final` only actually
    /// finalizes `self` once every dependency registered via `when` has
    /// itself completed — otherwise it's folded in as `Outcome::Next`, so one
    /// parent finishing in a diamond-shaped dependency graph doesn't sever
    /// `self` before its siblings get a chance to contribute.
    pub fn when<K2, L2, F>(self: &Arc<Self>, upstream: &Arc<Cell<K2, L2>>, combine: F)
    where
        K2: Key<L2> + 'static,
        L2: Lattice,
        F: Fn(CellId, Outcome<L2::Value>) -> Outcome<L::Value> + Send + Sync + 'static,
    {
        self.trigger();
        upstream.trigger();

        let combine = Arc::new(combine);
        let downstream = Arc::clone(self);
        let downstream_id = self.id;
        let upstream_id = upstream.id;

        enum Snapshot<V> {
            None,
            Current(V),
            Final(V),
        }

        let snapshot = {
            let mut guard = upstream.inner.lock();
            match guard.phase {
                Phase::Completed => Snapshot::Final(guard.value.clone()),
                _ => {
                    let pool = self.pool.clone();
                    let combine = Arc::clone(&combine);
                    let downstream = Arc::clone(&downstream);
                    let notify: Notify<L2::Value> = Arc::new(move |outcome: Outcome<L2::Value>| {
                        let dep_was_final = outcome.is_final();
                        let combined = combine(upstream_id, outcome);
                        let downstream = Arc::clone(&downstream);
                        pool.schedule_sequential(
                            downstream_id,
                            Box::new(move || {
                                let settled = downstream.settle_dependency(upstream_id, dep_was_final, combined);
                                downstream.apply(settled);
                            }),
                        );
                    });
                    guard.callbacks.insert(downstream_id, notify);
                    if upstream.lattice.equals(&guard.value, &upstream.lattice.bottom()) {
                        Snapshot::None
                    } else {
                        Snapshot::Current(guard.value.clone())
                    }
                }
            }
        };

        {
            let mut guard = self.inner.lock();
            guard.deps.insert(upstream_id, upstream.clone() as Arc<dyn ErasedCell>);
            if !matches!(snapshot, Snapshot::Final(_)) {
                guard.pending_deps.insert(upstream_id);
            }
        }

        let (dep_was_final, raw) = match snapshot {
            Snapshot::None => return,
            Snapshot::Current(value) => (false, Outcome::Next(value)),
            Snapshot::Final(value) => (true, Outcome::Final(value)),
        };
        let combined = combine(upstream_id, raw);
        let downstream = Arc::clone(self);
        self.pool.schedule_sequential(
            downstream_id,
            Box::new(move || {
                let settled = downstream.settle_dependency(upstream_id, dep_was_final, combined);
                downstream.apply(settled);
            }),
        );
    }

    /// Marks `dep_id` as no longer live if `dep_was_final`, and downgrades
    /// `outcome` from `Final` to `Next` if other dependencies registered via
    /// [`when`](Cell::when) are still open. See `when`'s doc comment.
    fn settle_dependency(self: &Arc<Self>, dep_id: CellId, dep_was_final: bool, outcome: Outcome<L::Value>) -> Outcome<L::Value> {
        let mut guard = self.inner.lock();
        if dep_was_final {
            guard.pending_deps.remove(&dep_id);
        }
        match outcome {
            Outcome::Final(value) if !guard.pending_deps.is_empty() => Outcome::Next(value),
            other => other,
        }
    }

    /// Joins `outcome` into this cell's value, notifies dependents, and on
    /// [`Outcome::Final`] tears down this cell's subscriptions in both
    /// directions: upstream cells stop scheduling callbacks into this (now
    /// deregistered) cell, and this cell's own dependency bookkeeping is
    /// dropped.
    pub(crate) fn apply(self: &Arc<Self>, outcome: Outcome<L::Value>) {
        let is_final = outcome.is_final();
        let incoming = match outcome {
            Outcome::NoOutcome => return,
            Outcome::Next(v) | Outcome::Final(v) => v,
        };

        let (callbacks, deps_to_sever, joined) = {
            let mut guard = self.inner.lock();
            if matches!(guard.phase, Phase::Completed) {
                return;
            }
            let joined = self.lattice.join(&guard.value, &incoming);
            if !is_final && self.lattice.equals(&joined, &guard.value) {
                return;
            }
            guard.value = joined.clone();
            if is_final {
                guard.phase = Phase::Completed;
            }
            let callbacks: Vec<_> = guard.callbacks.values().cloned().collect();
            let deps_to_sever = if is_final {
                std::mem::take(&mut guard.callbacks);
                std::mem::take(&mut guard.deps).into_values().collect()
            } else {
                Vec::new()
            };
            (callbacks, deps_to_sever, joined)
        };

        for callback in callbacks {
            let outcome = if is_final { Outcome::Final(joined.clone()) } else { Outcome::Next(joined.clone()) };
            callback(outcome);
        }

        if is_final {
            for upstream in deps_to_sever {
                upstream.sever_edge_to(self.id);
            }
            self.pool.deregister(self.id);
        }
    }
}

/// Type-erased facet of a [`Cell`], used by the pool's registry and the
/// cycle resolver, neither of which can be generic over every concrete
/// `(Key, Lattice)` pair in the pool at once.
pub(crate) trait ErasedCell: Send + Sync {
    fn id(&self) -> CellId;
    fn phase(&self) -> Phase;
    fn dependency_ids(&self) -> Vec<CellId>;
    /// Removes `downstream`'s subscription from this cell, if any.
    fn sever_edge_to(&self, downstream: CellId);
    /// The `TypeId` of this cell's concrete `Key` implementation, used to
    /// group strongly-connected components into type-homogeneous batches
    /// before calling [`resolve_family`](ErasedCell::resolve_family).
    fn key_family(&self) -> TypeId;
    /// The `TypeId` of this cell's concrete `Lattice::Value`, so cells
    /// sharing a `Key` type but drawing from different lattices are never
    /// grouped into the same resolve batch.
    fn value_family(&self) -> TypeId;
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    /// Calls this cell's key's `resolve` over `group` (all members of one
    /// closed strongly-connected component sharing this cell's concrete
    /// `Key`/`Lattice` types) and applies the results as final values.
    /// Returns how many cells were newly completed.
    fn resolve_family(&self, group: &[Arc<dyn ErasedCell>]) -> usize;
    /// As [`resolve_family`](ErasedCell::resolve_family), but for the
    /// fallback policy applied to stuck, non-cyclic cells.
    fn fallback_family(&self, group: &[Arc<dyn ErasedCell>]) -> usize;
}

impl<K: Key<L> + 'static, L: Lattice> ErasedCell for Cell<K, L> {
    fn id(&self) -> CellId {
        self.id
    }

    fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    fn dependency_ids(&self) -> Vec<CellId> {
        self.inner.lock().deps.keys().copied().collect()
    }

    fn sever_edge_to(&self, downstream: CellId) {
        self.inner.lock().callbacks.remove(&downstream);
    }

    fn key_family(&self) -> TypeId {
        TypeId::of::<K>()
    }

    fn value_family(&self) -> TypeId {
        TypeId::of::<L::Value>()
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self as Arc<dyn Any + Send + Sync>
    }

    fn resolve_family(&self, group: &[Arc<dyn ErasedCell>]) -> usize {
        run_family(group, |typed| self.key.resolve(typed))
    }

    fn fallback_family(&self, group: &[Arc<dyn ErasedCell>]) -> usize {
        run_family(group, |typed| self.key.fallback(typed))
    }
}

fn run_family<K, L>(group: &[Arc<dyn ErasedCell>], call: impl FnOnce(&[Arc<Cell<K, L>>]) -> BTreeMap<CellId, L::Value>) -> usize
where
    K: Key<L> + 'static,
    L: Lattice,
{
    let typed: Vec<Arc<Cell<K, L>>> = group
        .iter()
        .cloned()
        .map(|cell| {
            cell.as_any_arc()
                .downcast::<Cell<K, L>>()
                .expect("group passed to run_family must share one concrete Key/Lattice type")
        })
        .collect();
    let outcomes = call(&typed);
    let mut completed = 0;
    for cell in &typed {
        if let Some(value) = outcomes.get(&cell.id) {
            if !cell.is_completed() {
                completed += 1;
            }
            cell.apply(Outcome::Final(value.clone()));
        }
    }
    completed
}
