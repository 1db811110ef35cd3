/// The algebra a cell's value is drawn from.
///
/// Implementations are expected to be cheap, stateless policy objects (often
/// zero-sized), in the way the teacher's `isoprenoid::runtime::SignalsRuntimeRef`
/// implementations (`GlobalSignalsRuntime`, `&ASignalsRuntime`) are thin
/// handles rather than the data itself.
///
/// # Contract
///
/// - [`join`](Lattice::join) must be commutative, associative and idempotent.
/// - `join(a, b)` must be `>=` both `a` and `b` in the lattice order induced
///   by [`equals`](Lattice::equals) (`a <= b` iff `join(a, b) == b`).
/// - An update is a no-op exactly when `join(current, incoming) == current`;
///   cells rely on this to suppress redundant propagation.
pub trait Lattice: Send + Sync + 'static {
    /// The value type held by cells parameterised over this lattice.
    type Value: Clone + Send + Sync + 'static;

    /// The initial value of a cell before any update is applied.
    fn bottom(&self) -> Self::Value;

    /// The least upper bound of `a` and `b`.
    fn join(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// Whether `a` and `b` denote the same lattice element.
    fn equals(&self, a: &Self::Value, b: &Self::Value) -> bool;
}
