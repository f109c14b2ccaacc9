//! Scores a decoded schedule by weighted sum of unmet demand, changeover
//! overhead, tardiness, and wait time (§4.4).
//!
//! The weighted-sum shape and the `pub const` defaults follow the
//! convention [`crate::domain`]/[`crate::decoder`] already established:
//! newtype-free plain `f64`, `FxHashMap` lookups, `serde`-able tuning knobs
//! so the contract layer can override them from a request.

use crate::decoder::DecodeResult;
use crate::domain::NormalizedView;
use serde::{Deserialize, Serialize};

/// Recommended default for `w_unmet` (§4.4).
pub const DEFAULT_W_UNMET: f64 = 100.0;
/// Recommended default for `w_tardy` (§4.4).
pub const DEFAULT_W_TARDY: f64 = 10.0;
/// Recommended default for `w_setup` (§4.4).
pub const DEFAULT_W_SETUP: f64 = 1.0;
/// Recommended default for `w_wait` (§4.4).
pub const DEFAULT_W_WAIT: f64 = 0.5;

/// Tuning constants for [`score`]. Exposed so callers can override any
/// subset via the request's optional `weights` object (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    /// Penalty per unmet piece.
    pub w_unmet: f64,
    /// Penalty per tardy-day-piece (`max(0, finish_day - due_day) * quantity`).
    pub w_tardy: f64,
    /// Penalty per changeover hour (CHANGE_MOLD or CHANGE_COLOR).
    pub w_setup: f64,
    /// Penalty per WAIT hour.
    pub w_wait: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            w_unmet: DEFAULT_W_UNMET,
            w_tardy: DEFAULT_W_TARDY,
            w_setup: DEFAULT_W_SETUP,
            w_wait: DEFAULT_W_WAIT,
        }
    }
}

/// `score(S)` per §4.4. Lower is better; a perfectly met, changeover-free,
/// on-time, wait-free schedule scores `0.0`.
pub fn score(view: &NormalizedView, decoded: &DecodeResult, weights: &Weights) -> f64 {
    let unmet_term: u64 = decoded.unmet.values().sum();

    let mut setup_hours = 0.0;
    let mut wait_hours = 0.0;
    for a in &decoded.assignments {
        match a.task_type {
            crate::decoder::TaskType::ChangeMold | crate::decoder::TaskType::ChangeColor => {
                setup_hours += a.used_hours;
            }
            crate::decoder::TaskType::Wait => wait_hours += a.used_hours,
            crate::decoder::TaskType::Produce => {}
        }
    }

    let mut tardy_term = 0.0;
    let mut finish_day: rustc_hash::FxHashMap<&crate::domain::ComponentId, u32> =
        rustc_hash::FxHashMap::default();
    for a in &decoded.assignments {
        if a.task_type == crate::decoder::TaskType::Produce {
            let id = a.component_id.as_ref().expect("PRODUCE carries component_id");
            finish_day
                .entry(id)
                .and_modify(|d| *d = (*d).max(a.day))
                .or_insert(a.day);
        }
    }
    for (id, finish) in &finish_day {
        let c = view.component(id);
        let tardy_days = finish.saturating_sub(c.due_day);
        if tardy_days > 0 {
            tardy_term += tardy_days as f64 * c.quantity as f64;
        }
    }

    weights.w_unmet * unmet_term as f64
        + weights.w_setup * setup_hours
        + weights.w_tardy * tardy_term
        + weights.w_wait * wait_hours
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Assignment, TaskType};
    use crate::domain::{Component, Machine, MachineGroup, Mold, RawInput, validate};

    fn view() -> NormalizedView {
        let raw = RawInput {
            machines: vec![Machine {
                id: "M1".into(),
                name: "M1".to_string(),
                group: MachineGroup::Small,
                tonnage: 100.0,
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
                cycle_time_sec: 30.0,
                quantity: 100,
                due_day: 1,
                lead_time_days: 0,
                prerequisites: Default::default(),
            }],
        };
        validate(raw).unwrap()
    }

    #[test]
    fn empty_schedule_scores_zero() {
        let view = view();
        let decoded = crate::decoder::DecodeResult {
            assignments: vec![],
            unmet: Default::default(),
            used_hours_total: 0.0,
            changeover_count: 0,
        };
        assert_eq!(score(&view, &decoded, &Weights::default()), 0.0);
    }

    #[test]
    fn unmet_demand_is_penalized() {
        let view = view();
        let mut unmet = rustc_hash::FxHashMap::default();
        unmet.insert(crate::domain::ComponentId("C1".to_string()), 10u64);
        let decoded = crate::decoder::DecodeResult {
            assignments: vec![],
            unmet,
            used_hours_total: 0.0,
            changeover_count: 0,
        };
        let weights = Weights::default();
        assert_eq!(score(&view, &decoded, &weights), weights.w_unmet * 10.0);
    }

    #[test]
    fn tardy_production_is_penalized_by_quantity() {
        let view = view();
        let decoded = crate::decoder::DecodeResult {
            assignments: vec![Assignment {
                day: 3,
                machine_id: "M1".into(),
                machine_name: "M1".to_string(),
                sequence_in_day: 1,
                task_type: TaskType::Produce,
                start_hour: 0.0,
                end_hour: 1.0,
                used_hours: 1.0,
                utilization: 1.0 / 12.0,
                component_id: Some("C1".into()),
                component_name: Some("C1".to_string()),
                produced_qty: Some(100),
                mold_id: Some("MO1".into()),
                color: Some("red".to_string()),
                from_color: None,
                to_color: None,
                from_mold_id: None,
                to_mold_id: None,
            }],
            unmet: Default::default(),
            used_hours_total: 1.0,
            changeover_count: 0,
        };
        let weights = Weights::default();
        // due_day 1, finish day 3 => 2 tardy days * 100 quantity
        assert_eq!(score(&view, &decoded, &weights), weights.w_tardy * 200.0);
    }
}
