//! A reactive concurrent dataflow engine over monotone lattices.
//!
//! Cells hold values drawn from a [`Lattice`]: they only ever grow, joining
//! new contributions into what they already have, until they reach a
//! terminal value. A [`Pool`] drives the whole graph: it runs `init`
//! closures and `when` callbacks on a work-stealing executor, tracks when
//! the graph has gone quiescent (no task running, no per-cell queue
//! non-empty), and at that point resolves any closed cycles (mutually
//! waiting cells) via an application-supplied [`Key`].
//!
//! ```
//! use latticework::{Lattice, Outcome, Pool};
//!
//! #[derive(Clone, Copy)]
//! struct MaxLattice;
//!
//! impl Lattice for MaxLattice {
//!     type Value = u64;
//!     fn bottom(&self) -> u64 { 0 }
//!     fn join(&self, a: &u64, b: &u64) -> u64 { *a.max(b) }
//!     fn equals(&self, a: &u64, b: &u64) -> bool { a == b }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::builder().build()?;
//! let (cell, completer) = pool.cell(latticework::DefaultKey, MaxLattice);
//! completer.put_final(7);
//! assert_eq!(cell.get_result(), 7);
//! # Ok(())
//! # }
//! ```

mod cell;
mod error;
mod key;
mod lattice;
mod outcome;
mod pool;
mod resolver;

pub use cell::{Cell, CellCompleter, CellId, Phase};
pub use error::{TaskError, TaskKind};
pub use key::{DefaultKey, Key};
pub use lattice::Lattice;
pub use outcome::Outcome;
pub use pool::{Pool, PoolBuilder};
