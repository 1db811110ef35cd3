//! The handler pool: a work-stealing executor with quiescence detection,
//! per-cell FIFO callback scheduling, and the cell registry the cycle
//! resolver walks.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use futures_channel::oneshot;
use parking_lot::Mutex;

use crate::cell::{Cell, CellCompleter, CellId, ErasedCell, Phase};
use crate::error::{TaskError, TaskKind};
use crate::key::Key;
use crate::lattice::Lattice;
use crate::outcome::Outcome;
use crate::resolver;

type QueuedTask = Box<dyn FnOnce() + Send>;
type QuiescentHandler = Box<dyn FnOnce() + Send>;

struct PoolState {
    /// Tasks submitted to `rayon` but not yet finished, counting both
    /// directly-executed tasks and per-cell queued callbacks.
    submitted: u64,
    handlers: Vec<QuiescentHandler>,
}

struct PoolInner {
    rayon_pool: rayon::ThreadPool,
    state: Mutex<PoolState>,
    registry: Mutex<BTreeMap<CellId, Arc<dyn ErasedCell>>>,
    queues: Mutex<BTreeMap<CellId, VecDeque<QueuedTask>>>,
    id_counter: AtomicU64,
    exception_handler: Box<dyn Fn(TaskError) + Send + Sync>,
}

/// A cheap, `Clone`-able handle to a handler pool.
///
/// Every [`Cell`] holds one of these rather than a reference, so that
/// scheduled callbacks and cells can outlive the scope that built the pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Creates a cell whose value is driven entirely by the returned
    /// completer (no lazy `init`). Useful for cells that represent external
    /// input rather than a computation over other cells.
    pub fn cell<K, L>(&self, key: K, lattice: L) -> (Arc<Cell<K, L>>, CellCompleter<K, L>)
    where
        K: Key<L> + 'static,
        L: Lattice,
    {
        let id = CellId::fresh(&self.inner.id_counter);
        let cell = Cell::new(id, key, lattice, self.clone(), None);
        self.register(Arc::clone(&cell) as Arc<dyn ErasedCell>);
        let completer = CellCompleter(Arc::clone(&cell));
        (cell, completer)
    }

    /// Creates a lazily-triggered cell: `init` only runs the first time the
    /// cell is demanded, via [`Cell::trigger`] (directly, or transitively
    /// through [`Cell::when`]).
    pub fn cell_with_init<K, L, F>(&self, key: K, lattice: L, init: F) -> Arc<Cell<K, L>>
    where
        K: Key<L> + 'static,
        L: Lattice,
        F: FnOnce(Arc<Cell<K, L>>) -> Outcome<L::Value> + Send + 'static,
    {
        let id = CellId::fresh(&self.inner.id_counter);
        let cell = Cell::new(id, key, lattice, self.clone(), Some(Box::new(init)));
        self.register(Arc::clone(&cell) as Arc<dyn ErasedCell>);
        cell
    }

    /// Creates a cell that is already complete, e.g. a constant or a value
    /// adopted from outside the pool.
    pub fn completed_cell<K, L>(&self, key: K, lattice: L, value: L::Value) -> Arc<Cell<K, L>>
    where
        K: Key<L> + 'static,
        L: Lattice,
    {
        let id = CellId::fresh(&self.inner.id_counter);
        Cell::already_completed(id, key, lattice, self.clone(), value)
    }

    pub(crate) fn register(&self, cell: Arc<dyn ErasedCell>) {
        self.inner.registry.lock().insert(cell.id(), cell);
    }

    pub(crate) fn deregister(&self, id: CellId) {
        self.inner.registry.lock().remove(&id);
    }

    pub(crate) fn report_error(&self, error: TaskError) {
        (self.inner.exception_handler)(error);
    }

    /// Runs `task` on the pool, counted towards quiescence.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
        self.inc();
        let pool = self.clone();
        self.inner.rayon_pool.spawn(move || {
            task();
            pool.dec();
        });
    }

    /// Enqueues `task` onto `cell`'s FIFO queue, guaranteeing callbacks
    /// targeting the same cell never run concurrently or out of order.
    pub(crate) fn schedule_sequential(&self, cell: CellId, task: QueuedTask) {
        self.inc();
        let should_spawn = {
            let mut queues = self.inner.queues.lock();
            let queue = queues.entry(cell).or_default();
            queue.push_back(task);
            queue.len() == 1
        };
        if should_spawn {
            let pool = self.clone();
            self.inner.rayon_pool.spawn(move || pool.drain(cell));
        }
    }

    fn drain(&self, cell: CellId) {
        loop {
            let task = {
                let mut queues = self.inner.queues.lock();
                match queues.get_mut(&cell).and_then(VecDeque::pop_front) {
                    Some(task) => task,
                    None => {
                        queues.remove(&cell);
                        return;
                    }
                }
            };
            if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
                self.report_error(TaskError::new(TaskKind::Combine, payload));
            }
            self.dec();
        }
    }

    fn inc(&self) {
        self.inner.state.lock().submitted += 1;
    }

    fn dec(&self) {
        let handlers = {
            let mut state = self.inner.state.lock();
            state.submitted -= 1;
            if state.submitted == 0 {
                std::mem::take(&mut state.handlers)
            } else {
                Vec::new()
            }
        };
        for handler in handlers {
            handler();
        }
    }

    /// Runs `handler` once the pool has no outstanding or queued work. If
    /// the pool is already quiescent, runs it inline.
    pub fn on_quiescent(&self, handler: impl FnOnce() + Send + 'static) {
        let mut state = self.inner.state.lock();
        if state.submitted == 0 {
            drop(state);
            handler();
        } else {
            state.handlers.push(Box::new(handler));
        }
    }

    /// The ids of every registered, not-yet-completed cell.
    pub fn quiescent_incomplete_cells(&self) -> Vec<CellId> {
        self.inner
            .registry
            .lock()
            .values()
            .filter(|cell| !matches!(cell.phase(), Phase::Completed))
            .map(|cell| cell.id())
            .collect()
    }

    pub(crate) fn registry_snapshot(&self) -> BTreeMap<CellId, Arc<dyn ErasedCell>> {
        self.inner.registry.lock().clone()
    }

    /// Resolves once the pool has no outstanding or queued work, without
    /// running any cycle/fallback resolution. Useful as a plain
    /// synchronization barrier in tests and in callers that drive
    /// completion entirely through [`CellCompleter`].
    pub fn quiesce(&self) -> impl Future<Output = ()> {
        let (tx, rx) = oneshot::channel();
        self.on_quiescent(move || {
            let _ = tx.send(());
        });
        async move {
            let _ = rx.await;
        }
    }

    /// Resolves closed strongly-connected components only: at each
    /// quiescence, runs one cycle-resolution round; if it closed a cycle,
    /// runs another (closing one cycle can make a previously-open one
    /// closed), and so on. Settles as soon as a round finds no closed SCC.
    /// Never touches `fallback` — a stuck cell with no cyclic dependency at
    /// all is left incomplete.
    pub fn quiescent_resolve_cycles(&self) -> impl Future<Output = ()> {
        let (tx, rx) = oneshot::channel();
        self.run_cycles_only(tx);
        async move {
            let _ = rx.await;
        }
    }

    fn run_cycles_only(&self, tx: oneshot::Sender<()>) {
        let pool = self.clone();
        self.on_quiescent(move || {
            let progressed = resolver::resolve_once(&pool, false);
            if progressed {
                pool.run_cycles_only(tx);
            } else {
                let _ = tx.send(());
            }
        });
    }

    /// Resolves stuck, non-cyclic cells only: at each quiescence, applies
    /// `fallback` to every triggered cell outside a closed SCC, repeating
    /// until a round makes no progress. Skips cycle detection entirely;
    /// cheaper when the caller already knows the dependency graph is
    /// acyclic, and never completes a cell that's part of a genuine cycle.
    pub fn quiescent_resolve_defaults(&self) -> impl Future<Output = ()> {
        let (tx, rx) = oneshot::channel();
        self.run_defaults_only(tx);
        async move {
            let _ = rx.await;
        }
    }

    fn run_defaults_only(&self, tx: oneshot::Sender<()>) {
        let pool = self.clone();
        self.on_quiescent(move || {
            let progressed = resolver::resolve_once(&pool, true);
            if progressed {
                pool.run_defaults_only(tx);
            } else {
                let _ = tx.send(());
            }
        });
    }

    /// Drives the pool to a true fixed point: at each quiescence, closed
    /// strongly-connected components among triggered, incomplete cells are
    /// resolved via their keys' `resolve`; once no more cycles can be
    /// closed, any remaining stuck cells are completed via `fallback`. Both
    /// phases repeat, alternating, until a full round makes no progress.
    pub fn quiescent_resolve_cell(&self) -> impl Future<Output = ()> {
        let (tx, rx) = oneshot::channel();
        self.run_resolution_round(tx, false);
        async move {
            let _ = rx.await;
        }
    }

    fn run_resolution_round(&self, tx: oneshot::Sender<()>, fallback_phase: bool) {
        let pool = self.clone();
        self.on_quiescent(move || {
            let progressed = resolver::resolve_once(&pool, fallback_phase);
            match (progressed, fallback_phase) {
                (true, _) => pool.run_resolution_round(tx, false),
                (false, false) => pool.run_resolution_round(tx, true),
                (false, true) => {
                    let _ = tx.send(());
                }
            }
        });
    }

    /// Stops accepting new work once currently scheduled tasks finish.
    /// `rayon::ThreadPool`'s own `Drop` impl already waits for in-flight
    /// tasks, so this mainly exists to make the intent explicit at call
    /// sites.
    pub fn shutdown(self) {
        drop(self);
    }
}

/// Builds a [`Pool`], defaulting its worker count the way `rayon`'s own
/// global pool does.
pub struct PoolBuilder {
    num_threads: Option<usize>,
    exception_handler: Box<dyn Fn(TaskError) + Send + Sync>,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self {
            num_threads: None,
            exception_handler: Box::new(|error| {
                #[cfg(feature = "tracing")]
                tracing::error!(%error, "task panicked in handler pool");
                #[cfg(not(feature = "tracing"))]
                let _ = error;
            }),
        }
    }
}

impl PoolBuilder {
    /// Sets the worker thread count. Defaults to
    /// [`std::thread::available_parallelism`].
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Installs a callback invoked whenever a task panics instead of
    /// completing normally.
    pub fn on_task_error(mut self, handler: impl Fn(TaskError) + Send + Sync + 'static) -> Self {
        self.exception_handler = Box::new(handler);
        self
    }

    pub fn build(self) -> Result<Pool, rayon::ThreadPoolBuildError> {
        let num_threads = self
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(Into::into).unwrap_or(1));
        let rayon_pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build()?;
        Ok(Pool {
            inner: Arc::new(PoolInner {
                rayon_pool,
                state: Mutex::new(PoolState { submitted: 0, handlers: Vec::new() }),
                registry: Mutex::new(BTreeMap::new()),
                queues: Mutex::new(BTreeMap::new()),
                id_counter: AtomicU64::new(0),
                exception_handler: self.exception_handler,
            }),
        })
    }
}
