/// The result shape of an `init` or a `when` combine callback.
///
/// Mirrors the teacher's [`isoprenoid::runtime::Propagation`] three-way
/// split (`Halt` / `Propagate` / `FlushOut`), but carries the refined value
/// itself rather than leaving the runtime to re-read it, since cells here
/// are plain lattice-valued state rather than lazily-recomputed caches.
#[derive(Debug, Clone)]
pub enum Outcome<V> {
    /// A non-final refinement: `v` is joined into the cell, and if that
    /// strictly increases the cell's value, dependents are notified.
    Next(V),
    /// `v` is the cell's terminal answer. No further refinements are
    /// accepted after this.
    Final(V),
    /// Nothing to contribute this time.
    NoOutcome,
}

impl<V> Outcome<V> {
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Outcome<U> {
        match self {
            Outcome::Next(v) => Outcome::Next(f(v)),
            Outcome::Final(v) => Outcome::Final(f(v)),
            Outcome::NoOutcome => Outcome::NoOutcome,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Outcome::Final(_))
    }
}
