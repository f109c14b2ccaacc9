//! Genetic algorithm driver (§4.5): tournament selection, order crossover,
//! swap mutation, elitism, and topological repair over permutations of
//! component ids, with fitness evaluated in parallel across a generation.
//!
//! Parallel fitness evaluation builds a scoped `rayon::ThreadPool` and
//! drives work through `pool.install(|| ... .par_iter() ...)`, collecting
//! results indexed by genome position so selection stays deterministic
//! given a seed (§5).

use crate::decoder::{self, DecodeParams, DecodeResult};
use crate::domain::{ComponentId, NormalizedView};
use crate::error::SchedulingError;
use crate::fitness::{self, Weights};
use crate::topo::PrerequisiteFacts;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A small, fast, explicit-state pseudo-random generator (splitmix64), kept
/// as a single stream owned by the driver per §9 ("prefer a lightweight
/// deterministic generator whose state is an explicit value passed by the
/// driver"). Not used anywhere inside [`crate::decoder`].
#[derive(Debug, Clone, Copy)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    /// Seed a new stream. Any `u64` is a valid seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Advance the stream and return the next pseudo-random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Next pseudo-random value in `[0.0, 1.0)`.
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform index in `[0, n)`. `n` must be nonzero.
    fn next_index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

/// Tuning knobs for one [`run`] call, corresponding to the request's GA
/// fields plus the driver-internal `worker_threads` knob.
#[derive(Debug, Clone)]
pub struct GaParams {
    /// Number of genomes per generation. Must be `>= 2`.
    pub pop_size: usize,
    /// Number of complete generations to run.
    pub n_generations: u32,
    /// Per-genome probability of one swap mutation, in `[0, 1]`.
    pub mutation_rate: f64,
    /// Seed for the driver's single [`SplitMix64`] stream.
    pub seed: u64,
    /// Optional wall-clock budget; exceeding it stops at the next
    /// generation boundary (§5, §7 `OVER_BUDGET`).
    pub time_budget: Option<Duration>,
    /// Optional rayon thread count; `None` uses rayon's global pool sizing.
    pub worker_threads: Option<usize>,
}

/// The GA's result: the best genome found, its decoded schedule and score,
/// whether a time budget or cancellation cut the run short, and how many
/// generations actually completed.
#[derive(Debug, Clone)]
pub struct GaOutcome {
    /// The winning permutation.
    pub best_perm: Vec<ComponentId>,
    /// Its decoded schedule.
    pub best_decoded: DecodeResult,
    /// Its fitness score (lower is better).
    pub best_score: f64,
    /// `true` when `time_budget` was exceeded or `cancel` was observed set
    /// before `n_generations` completed.
    pub partial: bool,
    /// Number of generations actually completed.
    pub generations_run: u32,
}

/// Run the GA to completion (or until cancelled / over budget) and return
/// the best genome's decoded schedule.
pub fn run(
    view: &NormalizedView,
    facts: &PrerequisiteFacts,
    decode_params: &DecodeParams,
    weights: &Weights,
    ga_params: &GaParams,
    cancel: &AtomicBool,
) -> Result<GaOutcome, SchedulingError> {
    let universe = view.topo_order.clone();
    let prereq_map: FxHashMap<ComponentId, Vec<ComponentId>> = view
        .components
        .iter()
        .map(|(id, c)| (id.clone(), c.prerequisites.iter().cloned().collect()))
        .collect();

    let mut rng = SplitMix64::new(ga_params.seed);
    let mut population = seed_population(&universe, facts, ga_params.pop_size, &prereq_map, &mut rng);

    let pool = {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = ga_params.worker_threads {
            builder = builder.num_threads(n);
        }
        builder
            .build()
            .map_err(|e| SchedulingError::internal(format!("failed to build rayon thread pool: {e}")))?
    };

    let start = Instant::now();
    let mut overall_best: Option<(f64, DecodeResult, Vec<ComponentId>)> = None;
    let mut generations_run = 0u32;
    let mut partial = false;

    for gen_idx in 0..ga_params.n_generations {
        let evals = evaluate_population(&pool, view, decode_params, weights, &population)?;
        let best_idx = best_index(&evals);
        let is_new_best = match &overall_best {
            None => true,
            Some((best_score, _, _)) => evals[best_idx].0 < *best_score,
        };
        if is_new_best {
            overall_best = Some((
                evals[best_idx].0,
                evals[best_idx].1.clone(),
                population[best_idx].clone(),
            ));
        }
        generations_run = gen_idx + 1;
        tracing::debug!(
            generation = gen_idx,
            best_score = evals[best_idx].0,
            worst_score = evals.iter().map(|(s, _)| *s).fold(f64::MIN, f64::max),
            "generation evaluated"
        );

        if generations_run == ga_params.n_generations {
            break;
        }
        if over_budget(ga_params, start) || cancel.load(Ordering::Relaxed) {
            partial = true;
            break;
        }

        population = next_generation(
            &population,
            &evals,
            best_idx,
            &prereq_map,
            ga_params.mutation_rate,
            &mut rng,
        );
    }

    let (best_score, best_decoded, best_perm) = overall_best.ok_or_else(|| {
        SchedulingError::internal("GA completed zero generations (n_generations must be >= 1)")
    })?;

    tracing::info!(
        generations_run,
        best_score,
        partial,
        "GA run complete"
    );

    Ok(GaOutcome {
        best_perm,
        best_decoded,
        best_score,
        partial,
        generations_run,
    })
}

fn over_budget(ga_params: &GaParams, start: Instant) -> bool {
    ga_params
        .time_budget
        .is_some_and(|budget| start.elapsed() >= budget)
}

fn evaluate_population(
    pool: &rayon::ThreadPool,
    view: &NormalizedView,
    decode_params: &DecodeParams,
    weights: &Weights,
    population: &[Vec<ComponentId>],
) -> Result<Vec<(f64, DecodeResult)>, SchedulingError> {
    use rayon::prelude::*;
    pool.install(|| {
        population
            .par_iter()
            .map(|perm| {
                let decoded = decoder::decode(view, perm, decode_params)?;
                let s = fitness::score(view, &decoded, weights);
                Ok((s, decoded))
            })
            .collect()
    })
}

/// Lowest score wins; ties keep the lowest index, since later entries only
/// replace the running best on a strict improvement (§5: "ties in score are
/// broken by lower genome index").
fn best_index(evals: &[(f64, DecodeResult)]) -> usize {
    let mut best = 0;
    for (i, (score, _)) in evals.iter().enumerate().skip(1) {
        if *score < evals[best].0 {
            best = i;
        }
    }
    let _ = evals[best].0;
    best
}

/// First half of the population comes from the level-biased shuffle (§4.2);
/// the second half is a uniform random permutation, repaired to respect
/// topological order (§4.5).
fn seed_population(
    universe: &[ComponentId],
    facts: &PrerequisiteFacts,
    pop_size: usize,
    prereq_map: &FxHashMap<ComponentId, Vec<ComponentId>>,
    rng: &mut SplitMix64,
) -> Vec<Vec<ComponentId>> {
    let biased_count = pop_size / 2;
    let mut population = Vec::with_capacity(pop_size);
    for _ in 0..biased_count {
        population.push(crate::topo::level_biased_shuffle(facts, rng));
    }
    for _ in biased_count..pop_size {
        let mut perm = universe.to_vec();
        fisher_yates(&mut perm, rng);
        repair(&mut perm, prereq_map);
        population.push(perm);
    }
    population
}

fn fisher_yates(items: &mut [ComponentId], rng: &mut SplitMix64) {
    for i in (1..items.len()).rev() {
        let j = rng.next_index(i + 1);
        items.swap(i, j);
    }
}

/// Walk left to right; whenever the component at `i` has a prerequisite
/// sitting later in the permutation, swap it in from its earliest later
/// occurrence and recheck `i`. Terminates because the prerequisite graph is
/// acyclic (validated at input time) and each swap strictly increases the
/// number of positions already in valid relative order.
fn repair(perm: &mut [ComponentId], prereq_map: &FxHashMap<ComponentId, Vec<ComponentId>>) {
    let mut pos: FxHashMap<ComponentId, usize> = perm
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    let mut i = 0;
    while i < perm.len() {
        let cur = perm[i].clone();
        let mut earliest_violation: Option<(usize, ComponentId)> = None;
        for p in prereq_map.get(&cur).into_iter().flatten() {
            let Some(&pp) = pos.get(p) else { continue };
            if pp > i && earliest_violation.as_ref().is_none_or(|(ep, _)| pp < *ep) {
                earliest_violation = Some((pp, p.clone()));
            }
        }
        match earliest_violation {
            Some((j, p)) => {
                perm.swap(i, j);
                pos.insert(cur, j);
                pos.insert(p, i);
            }
            None => i += 1,
        }
    }
}

/// Order crossover (OX, §4.5): copy parent A's `[cut1, cut2]` slice
/// verbatim, fill the remaining positions in parent B's relative order,
/// skipping ids already placed.
fn order_crossover(
    a: &[ComponentId],
    b: &[ComponentId],
    rng: &mut SplitMix64,
) -> Vec<ComponentId> {
    let n = a.len();
    if n == 0 {
        return Vec::new();
    }
    let mut cut1 = rng.next_index(n);
    let mut cut2 = rng.next_index(n);
    if cut1 > cut2 {
        std::mem::swap(&mut cut1, &mut cut2);
    }

    let slice_set: FxHashSet<ComponentId> = a[cut1..=cut2].iter().cloned().collect();
    let mut child: Vec<Option<ComponentId>> = vec![None; n];
    for i in cut1..=cut2 {
        child[i] = Some(a[i].clone());
    }

    let mut fill = b.iter().filter(|id| !slice_set.contains(id));
    for offset in 0..n {
        let idx = (cut2 + 1 + offset) % n;
        if child[idx].is_none() {
            child[idx] = fill.next().cloned();
        }
    }

    child
        .into_iter()
        .map(|slot| slot.expect("OX fills every position from parent A's slice or parent B's order"))
        .collect()
}

/// One swap of two distinct random positions.
fn mutate(perm: &mut [ComponentId], rng: &mut SplitMix64) {
    if perm.len() < 2 {
        return;
    }
    let i = rng.next_index(perm.len());
    let mut j = rng.next_index(perm.len());
    while j == i {
        j = rng.next_index(perm.len());
    }
    perm.swap(i, j);
}

fn next_generation(
    population: &[Vec<ComponentId>],
    evals: &[(f64, DecodeResult)],
    best_idx: usize,
    prereq_map: &FxHashMap<ComponentId, Vec<ComponentId>>,
    mutation_rate: f64,
    rng: &mut SplitMix64,
) -> Vec<Vec<ComponentId>> {
    let scores: Vec<f64> = evals.iter().map(|(s, _)| *s).collect();
    let mut next = Vec::with_capacity(population.len());
    next.push(population[best_idx].clone()); // elitism

    while next.len() < population.len() {
        let parent_a = tournament_select(population, &scores, rng);
        let parent_b = tournament_select(population, &scores, rng);
        let mut child = order_crossover(parent_a, parent_b, rng);
        if rng.next_f64() < mutation_rate {
            mutate(&mut child, rng);
        }
        repair(&mut child, prereq_map);
        next.push(child);
    }
    next
}

fn tournament_select<'a>(
    population: &'a [Vec<ComponentId>],
    scores: &[f64],
    rng: &mut SplitMix64,
) -> &'a [ComponentId] {
    let i = rng.next_index(population.len());
    let j = rng.next_index(population.len());
    if scores[i] <= scores[j] {
        &population[i]
    } else {
        &population[j]
    }
}
