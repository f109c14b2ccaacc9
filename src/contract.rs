//! The request/response contract (§6): the logical JSON shape callers (CLI,
//! HTTP, or an in-process embedder) send and receive, plus [`schedule`], the
//! single entry point that wires the validator, prerequisite engine,
//! decoder, fitness evaluator, and GA driver together.
//!
//! The serde conventions here (newtype ids, `#[serde(default)]` for optional
//! fields) follow [`crate::domain`].

use crate::decoder::{Assignment, DecodeParams};
use crate::domain::{self, ComponentId, Machine, Mold, RawInput};
use crate::error::{SchedulingError, ValidationError};
use crate::fitness::Weights;
use crate::ga::{self, GaParams};
use crate::topo;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// Seed used when a request omits `seed`. Chosen arbitrarily but fixed, so
/// that "no seed supplied" is itself a deterministic, reproducible choice
/// rather than a source of nondeterminism (§5, §8 "Determinism").
pub const DEFAULT_SEED: u64 = 0x5A17_5A17_5A17_5A17;

/// The scheduler's request body (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    /// Number of days in the scheduling horizon.
    pub month_days: u32,
    /// Hours consumed by a CHANGE_MOLD task.
    pub mold_change_time_hours: f64,
    /// Hours consumed by a CHANGE_COLOR task.
    pub color_change_time_hours: f64,
    /// The machine fleet.
    pub machines: Vec<Machine>,
    /// The mold library.
    pub molds: Vec<Mold>,
    /// Component demands for the month.
    pub components: Vec<domain::Component>,
    /// GA population size, must be `>= 2`.
    pub pop_size: usize,
    /// GA generation count, must be `>= 1`.
    pub n_generations: u32,
    /// Per-genome swap-mutation probability, in `[0, 1]`.
    pub mutation_rate: f64,
    /// Seed for the GA's pseudo-random stream; defaults to [`DEFAULT_SEED`].
    #[serde(default)]
    pub seed: Option<u64>,
    /// Overrides for a subset of the fitness weights (§4.4).
    #[serde(default)]
    pub weights: Option<WeightsOverride>,
    /// Optional wall-clock budget; exceeding it returns the best-so-far
    /// schedule with `partial: true` instead of failing (§5, §7).
    #[serde(default)]
    pub time_budget_seconds: Option<f64>,
    /// Optional rayon worker-thread count for fitness evaluation.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

/// Partial override of [`Weights`]; any field left `None` keeps its
/// recommended default (§4.4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WeightsOverride {
    /// Overrides [`Weights::w_unmet`].
    pub w_unmet: Option<f64>,
    /// Overrides [`Weights::w_tardy`].
    pub w_tardy: Option<f64>,
    /// Overrides [`Weights::w_setup`].
    pub w_setup: Option<f64>,
    /// Overrides [`Weights::w_wait`].
    pub w_wait: Option<f64>,
}

impl WeightsOverride {
    fn apply(self, base: Weights) -> Weights {
        Weights {
            w_unmet: self.w_unmet.unwrap_or(base.w_unmet),
            w_tardy: self.w_tardy.unwrap_or(base.w_tardy),
            w_setup: self.w_setup.unwrap_or(base.w_setup),
            w_wait: self.w_wait.unwrap_or(base.w_wait),
        }
    }
}

/// The CLI's GA/scoring configuration file (`scheduler.json`): every field
/// of [`ScheduleRequest`] except the entity arrays, which the CLI loads
/// from their own files instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of days in the scheduling horizon.
    pub month_days: u32,
    /// Hours consumed by a CHANGE_MOLD task.
    pub mold_change_time_hours: f64,
    /// Hours consumed by a CHANGE_COLOR task.
    pub color_change_time_hours: f64,
    /// GA population size, must be `>= 2`.
    pub pop_size: usize,
    /// GA generation count, must be `>= 1`.
    pub n_generations: u32,
    /// Per-genome swap-mutation probability, in `[0, 1]`.
    pub mutation_rate: f64,
    /// Seed for the GA's pseudo-random stream; defaults to [`DEFAULT_SEED`].
    pub seed: Option<u64>,
    /// Overrides for a subset of the fitness weights (§4.4).
    pub weights: Option<WeightsOverride>,
    /// Optional wall-clock budget in seconds.
    pub time_budget_seconds: Option<f64>,
    /// Optional rayon worker-thread count for fitness evaluation.
    pub worker_threads: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            month_days: 30,
            mold_change_time_hours: 1.0,
            color_change_time_hours: 0.5,
            pop_size: 50,
            n_generations: 200,
            mutation_rate: 0.1,
            seed: None,
            weights: None,
            time_budget_seconds: None,
            worker_threads: None,
        }
    }
}

/// The scheduler's response body (§6): the emitted timeline, residual
/// demand, and the winning genome's score.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResponse {
    /// Every emitted timeline atom.
    pub assignments: Vec<Assignment>,
    /// Residual pieces per component; components fully produced are absent.
    pub unmet: FxHashMap<ComponentId, u64>,
    /// The winning genome's fitness score (§4.4). Lower is better.
    pub score: f64,
    /// `true` when `time_budget_seconds` was exceeded, or the caller's
    /// cancellation flag was observed, before `n_generations` completed
    /// (§7 `OVER_BUDGET`). The schedule is still the best genome found so
    /// far and satisfies every invariant in §3.
    pub partial: bool,
}

/// Run one complete scheduling request, uncancellable. Equivalent to
/// [`schedule_cancellable`] with a flag that is never set.
pub fn schedule(request: ScheduleRequest) -> Result<ScheduleResponse, SchedulingError> {
    schedule_cancellable(request, &AtomicBool::new(false))
}

/// Run one complete scheduling request. `cancel` is polled by [`ga::run`] at
/// generation boundaries; setting it from another thread aborts the GA and
/// returns the best-so-far schedule with `partial: true`.
pub fn schedule_cancellable(
    request: ScheduleRequest,
    cancel: &AtomicBool,
) -> Result<ScheduleResponse, SchedulingError> {
    let ScheduleRequest {
        month_days,
        mold_change_time_hours,
        color_change_time_hours,
        machines,
        molds,
        components,
        pop_size,
        n_generations,
        mutation_rate,
        seed,
        weights,
        time_budget_seconds,
        worker_threads,
    } = request;

    require("request", "month_days", month_days as f64, month_days >= 1)?;
    require(
        "request",
        "mold_change_time_hours",
        mold_change_time_hours,
        mold_change_time_hours >= 0.0,
    )?;
    require(
        "request",
        "color_change_time_hours",
        color_change_time_hours,
        color_change_time_hours >= 0.0,
    )?;
    require("request", "pop_size", pop_size as f64, pop_size >= 2)?;
    require(
        "request",
        "n_generations",
        n_generations as f64,
        n_generations >= 1,
    )?;
    require(
        "request",
        "mutation_rate",
        mutation_rate,
        (0.0..=1.0).contains(&mutation_rate),
    )?;

    let view = domain::validate(RawInput {
        machines,
        molds,
        components,
    })?;
    domain::check_feasible(&view)?;

    let facts = topo::analyze(&view);
    let decode_params = DecodeParams {
        month_days,
        mold_change_time_hours,
        color_change_time_hours,
    };
    let resolved_weights = weights.unwrap_or_default().apply(Weights::default());
    let ga_params = GaParams {
        pop_size,
        n_generations,
        mutation_rate,
        seed: seed.unwrap_or(DEFAULT_SEED),
        time_budget: time_budget_seconds.map(Duration::from_secs_f64),
        worker_threads,
    };

    let outcome = ga::run(&view, &facts, &decode_params, &resolved_weights, &ga_params, cancel)?;

    Ok(ScheduleResponse {
        assignments: outcome.best_decoded.assignments,
        unmet: outcome.best_decoded.unmet,
        score: outcome.best_score,
        partial: outcome.partial,
    })
}

fn require(entity: &'static str, field: &'static str, value: f64, ok: bool) -> Result<(), SchedulingError> {
    if ok {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            entity,
            id: entity.to_string(),
            field,
            value: value.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Component, MachineGroup};

    fn minimal_request() -> ScheduleRequest {
        ScheduleRequest {
            month_days: 3,
            mold_change_time_hours: 1.0,
            color_change_time_hours: 0.5,
            machines: vec![Machine {
                id: "M1".into(),
                name: "M1".to_string(),
                group: MachineGroup::Small,
                tonnage: 120.0,
                hours_per_day: 12.0,
                efficiency: 1.0,
            }],
            molds: vec![Mold {
                id: "MO1".into(),
                name: "MO1".to_string(),
                group: MachineGroup::Small,
                tonnage: 80.0,
            }],
            components: vec![Component {
                id: "C1".into(),
                name: "C1".to_string(),
                mold_id: "MO1".into(),
                color: "red".to_string(),
                cycle_time_sec: 40.0,
                quantity: 800,
                due_day: 1,
                lead_time_days: 0,
                prerequisites: Default::default(),
            }],
            pop_size: 6,
            n_generations: 4,
            mutation_rate: 0.2,
            seed: Some(1),
            weights: None,
            time_budget_seconds: None,
            worker_threads: Some(1),
        }
    }

    #[test]
    fn empty_components_score_zero() {
        let mut req = minimal_request();
        req.components.clear();
        req.molds.clear();
        let resp = schedule(req).unwrap();
        assert!(resp.assignments.is_empty());
        assert!(resp.unmet.is_empty());
        assert_eq!(resp.score, 0.0);
    }

    #[test]
    fn pop_size_below_two_is_rejected() {
        let mut req = minimal_request();
        req.pop_size = 1;
        assert!(matches!(
            schedule(req),
            Err(SchedulingError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn feasible_request_reports_unmet_or_empty() {
        let resp = schedule(minimal_request()).unwrap();
        assert!(resp.score >= 0.0);
    }

    #[test]
    fn weights_override_is_applied() {
        let mut req = minimal_request();
        req.weights = Some(WeightsOverride {
            w_unmet: Some(1.0),
            ..Default::default()
        });
        // Cheap request; just confirm it still runs end to end with an override set.
        let resp = schedule(req).unwrap();
        assert!(resp.score.is_finite());
    }
}
