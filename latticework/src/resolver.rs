//! Closed strongly-connected-component detection and cycle/fallback
//! resolution, run at each quiescence by [`crate::pool::Pool`].

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cell::{CellId, ErasedCell, Phase};
use crate::pool::Pool;

/// Runs one resolution pass: either cycle-closing (`fallback_phase ==
/// false`) or fallback (`fallback_phase == true`). Returns whether any cell
/// was newly completed.
pub(crate) fn resolve_once(pool: &Pool, fallback_phase: bool) -> bool {
    let registry = pool.registry_snapshot();
    let incomplete: Vec<Arc<dyn ErasedCell>> = registry
        .values()
        .filter(|cell| matches!(cell.phase(), Phase::Triggered))
        .cloned()
        .collect();
    if incomplete.is_empty() {
        return false;
    }

    let closed_sccs = tarjan_closed_sccs(&incomplete);

    if !fallback_phase {
        closed_sccs.iter().map(|scc| resolve_group(scc, false)).sum::<usize>() > 0
    } else {
        let in_cycle: BTreeSet<CellId> = closed_sccs.iter().flatten().map(|cell| cell.id()).collect();
        let stuck: Vec<Arc<dyn ErasedCell>> =
            incomplete.into_iter().filter(|cell| !in_cycle.contains(&cell.id())).collect();
        if stuck.is_empty() {
            return false;
        }
        resolve_group(&stuck, true) > 0
    }
}

/// Splits `group` by concrete `Key` type (a closed SCC can in principle span
/// more than one `Key`/`Lattice` pair; see `DESIGN.md` for why resolution is
/// applied per type-homogeneous sub-group rather than as one call) and
/// dispatches to each representative cell's erased resolve/fallback.
fn resolve_group(group: &[Arc<dyn ErasedCell>], fallback: bool) -> usize {
    let mut by_family: BTreeMap<(TypeId, TypeId), Vec<Arc<dyn ErasedCell>>> = BTreeMap::new();
    for cell in group {
        by_family
            .entry((cell.key_family(), cell.value_family()))
            .or_default()
            .push(Arc::clone(cell));
    }
    by_family
        .values()
        .map(|members| {
            let representative = &members[0];
            if fallback {
                representative.fallback_family(members)
            } else {
                representative.resolve_family(members)
            }
        })
        .sum()
}

/// Tarjan's algorithm over the dependency graph restricted to `cells`,
/// keeping only components that are closed: every dependency of every
/// member lies within the same component (dependencies already completed
/// are not tracked here and don't count against closure).
fn tarjan_closed_sccs(cells: &[Arc<dyn ErasedCell>]) -> Vec<Vec<Arc<dyn ErasedCell>>> {
    let index_of: BTreeMap<CellId, usize> = cells.iter().enumerate().map(|(i, cell)| (cell.id(), i)).collect();
    let n = cells.len();

    let mut state = TarjanState {
        indices: vec![None; n],
        lowlink: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        counter: 0,
        sccs: Vec::new(),
    };

    for v in 0..n {
        if state.indices[v].is_none() {
            strongconnect(v, cells, &index_of, &mut state);
        }
    }

    state
        .sccs
        .into_iter()
        .filter(|component| is_closed(component, cells, &index_of))
        .map(|component| component.into_iter().map(|i| Arc::clone(&cells[i])).collect())
        .collect()
}

struct TarjanState {
    indices: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    counter: usize,
    sccs: Vec<Vec<usize>>,
}

fn strongconnect(
    v: usize,
    cells: &[Arc<dyn ErasedCell>],
    index_of: &BTreeMap<CellId, usize>,
    state: &mut TarjanState,
) {
    state.indices[v] = Some(state.counter);
    state.lowlink[v] = state.counter;
    state.counter += 1;
    state.stack.push(v);
    state.on_stack[v] = true;

    for dep_id in cells[v].dependency_ids() {
        let Some(&w) = index_of.get(&dep_id) else { continue };
        if state.indices[w].is_none() {
            strongconnect(w, cells, index_of, state);
            state.lowlink[v] = state.lowlink[v].min(state.lowlink[w]);
        } else if state.on_stack[w] {
            state.lowlink[v] = state.lowlink[v].min(state.indices[w].expect("visited node has an index"));
        }
    }

    if state.lowlink[v] == state.indices[v].expect("just assigned") {
        let mut component = Vec::new();
        loop {
            let w = state.stack.pop().expect("v's own index is still on the stack");
            state.on_stack[w] = false;
            component.push(w);
            if w == v {
                break;
            }
        }
        state.sccs.push(component);
    }
}

fn is_closed(component: &[usize], cells: &[Arc<dyn ErasedCell>], index_of: &BTreeMap<CellId, usize>) -> bool {
    let members: BTreeSet<usize> = component.iter().copied().collect();
    let mut has_internal_edge = false;
    for &v in component {
        for dep_id in cells[v].dependency_ids() {
            if let Some(&w) = index_of.get(&dep_id) {
                if members.contains(&w) {
                    has_internal_edge = true;
                } else {
                    return false;
                }
            }
        }
    }
    has_internal_edge
}
