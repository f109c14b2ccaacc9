//! Prerequisite engine: topological levels, `required_finish_day`, and the
//! level-biased shuffle used to seed half of the GA's initial population.
//!
//! Built the same way as [`crate::domain`]'s cycle check — a `daggy::Dag`
//! walked with `petgraph::visit::Topo` — generalized here to also compute
//! per-node levels rather than just a single topological walk.

use crate::domain::{ComponentId, ComponentMap, NormalizedView};
use daggy::{Dag, NodeIndex};
use petgraph::visit::Topo;
use rustc_hash::FxHashMap;

/// A component's topological level: leaves (no prerequisites) are level 0;
/// any other component is one more than the maximum level of its
/// prerequisites.
pub type Level = u32;

/// Per-component derived scheduling facts that don't change across GA
/// generations: its level and its lead-time-adjusted finish deadline.
#[derive(Debug, Clone)]
pub struct PrerequisiteFacts {
    /// Topological level, leaves at 0.
    pub levels: FxHashMap<ComponentId, Level>,
    /// `required_finish_day(x) = due_day(x) - lead_time_days(x)`, may be
    /// non-positive for components with generous lead time against an early
    /// due day — callers treat that as "already late".
    pub required_finish_day: FxHashMap<ComponentId, i64>,
    /// Components grouped by level, in ascending level order. Used by the
    /// GA's level-biased shuffle.
    pub by_level: Vec<Vec<ComponentId>>,
}

/// Build a `daggy::Dag` over `view`'s components, edges from prerequisite to
/// dependent. `view` is already validated acyclic, so construction cannot
/// fail here.
fn dep_dag(components: &ComponentMap) -> (Dag<ComponentId, ()>, FxHashMap<ComponentId, NodeIndex>) {
    let mut dag = Dag::<ComponentId, ()>::with_capacity(
        components.len(),
        components.values().map(|c| c.prerequisites.len()).sum(),
    );
    let mut index_of = FxHashMap::default();
    for id in components.keys() {
        index_of.insert(id.clone(), dag.add_node(id.clone()));
    }
    for c in components.values() {
        for p in &c.prerequisites {
            let _ = dag.add_edge(index_of[p], index_of[&c.id], ());
        }
    }
    (dag, index_of)
}

/// Compute per-component levels and required finish days for every
/// component in `view`.
pub fn analyze(view: &NormalizedView) -> PrerequisiteFacts {
    let (dag, index_of) = dep_dag(&view.components);

    let mut levels: FxHashMap<ComponentId, Level> = FxHashMap::default();
    // Topo gives a valid processing order: every prerequisite is visited
    // before its dependents, so one forward pass suffices.
    let mut topo = Topo::new(&dag);
    while let Some(node) = topo.next(&dag) {
        let id = &dag[node];
        let level = view.components[id]
            .prerequisites
            .iter()
            .map(|p| levels.get(p).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        levels.insert(id.clone(), level);
    }
    let _ = index_of;

    let required_finish_day: FxHashMap<ComponentId, i64> = view
        .components
        .values()
        .map(|c| {
            (
                c.id.clone(),
                c.due_day as i64 - c.lead_time_days as i64,
            )
        })
        .collect();

    let max_level = levels.values().copied().max().unwrap_or(0);
    let mut by_level: Vec<Vec<ComponentId>> = vec![Vec::new(); max_level as usize + 1];
    for id in &view.topo_order {
        by_level[levels[id] as usize].push(id.clone());
    }

    PrerequisiteFacts {
        levels,
        required_finish_day,
        by_level,
    }
}

/// Shuffle each level's members independently using `rng`, then concatenate
/// levels in ascending order. The result never places a higher-level
/// component before one of its own level or a lower one, which is exactly
/// the bias §4.2 asks seeded permutations to preserve; it does not guarantee
/// every individual prerequisite edge is respected when sibling levels
/// interleave arbitrarily within a level, which is why the decoder still
/// enforces the hard invariant independently.
pub fn level_biased_shuffle(
    facts: &PrerequisiteFacts,
    rng: &mut crate::ga::SplitMix64,
) -> Vec<ComponentId> {
    let mut out = Vec::with_capacity(facts.by_level.iter().map(Vec::len).sum());
    for level in &facts.by_level {
        let mut level = level.clone();
        fisher_yates(&mut level, rng);
        out.extend(level);
    }
    out
}

fn fisher_yates<T>(items: &mut [T], rng: &mut crate::ga::SplitMix64) {
    for i in (1..items.len()).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
