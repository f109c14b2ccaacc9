//! The deterministic greedy decoder: turns a permutation of component ids
//! into a concrete day-by-day per-machine timeline.
//!
//! This is the largest module in the crate. The surrounding idiom (newtype
//! ids, `FxHashMap` state, `thiserror`-raised internal invariant guards)
//! follows `domain`/`error` throughout.

use crate::domain::{ComponentId, MachineId, MoldId, NormalizedView};
use crate::error::SchedulingError;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Mold-exclusivity intervals recorded for one (mold, day): almost always a
/// handful of PRODUCE/CHANGE_MOLD runs, so an inline `SmallVec` avoids a
/// heap allocation for the common case.
type MoldIntervals = SmallVec<[(f64, f64); 4]>;

/// Parameters that are constant for one decode, independent of the genome.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// Number of days in the scheduling horizon.
    pub month_days: u32,
    /// Hours consumed by a CHANGE_MOLD task.
    pub mold_change_time_hours: f64,
    /// Hours consumed by a CHANGE_COLOR task.
    pub color_change_time_hours: f64,
}

/// Kind of timeline atom (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Color purge/changeover, does not occupy `mold_busy`.
    ChangeColor,
    /// Mold swap, occupies `mold_busy` for its duration.
    ChangeMold,
    /// Idle time: either bridging to a mold-exclusivity window or bridging
    /// to a prerequisite's same-day completion.
    Wait,
    /// Actual production of pieces.
    Produce,
}

/// One timeline atom on a (machine, day), exactly as described in §3/§6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// 1-based day within the horizon.
    pub day: u32,
    /// Machine this assignment runs on.
    pub machine_id: MachineId,
    /// Denormalized machine name, for display without a second lookup.
    pub machine_name: String,
    /// 1-based rank within (machine, day).
    pub sequence_in_day: u32,
    /// Kind of atom.
    pub task_type: TaskType,
    /// Start hour within the day.
    pub start_hour: f64,
    /// End hour within the day.
    pub end_hour: f64,
    /// `end_hour - start_hour`.
    pub used_hours: f64,
    /// `used_hours / machine capacity`.
    pub utilization: f64,

    /// PRODUCE only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<ComponentId>,
    /// PRODUCE only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
    /// PRODUCE only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub produced_qty: Option<u64>,
    /// PRODUCE only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mold_id: Option<MoldId>,
    /// PRODUCE only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// CHANGE_COLOR only. `"none"` sentinel when there was no prior color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_color: Option<String>,
    /// CHANGE_COLOR only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_color: Option<String>,

    /// CHANGE_MOLD only. `"none"` sentinel when there was no prior mold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_mold_id: Option<String>,
    /// CHANGE_MOLD only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_mold_id: Option<String>,
}

/// The decoder's complete output for one genome.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    /// Every emitted timeline atom, in commit order (not necessarily sorted
    /// by day across machines, since machines advance independently).
    pub assignments: Vec<Assignment>,
    /// Residual pieces per component that never got produced within the
    /// horizon. Components that are fully produced are absent.
    pub unmet: FxHashMap<ComponentId, u64>,
    /// Sum of every assignment's `used_hours`.
    pub used_hours_total: f64,
    /// Number of CHANGE_MOLD + CHANGE_COLOR assignments.
    pub changeover_count: u64,
}

#[derive(Debug, Clone, Default)]
struct MachineState {
    day: u32,
    used_hours_today: f64,
    current_mold_id: Option<MoldId>,
    current_color: Option<String>,
    next_sequence_in_day: u32,
}

impl MachineState {
    fn fresh() -> Self {
        Self {
            day: 1,
            used_hours_today: 0.0,
            current_mold_id: None,
            current_color: None,
            next_sequence_in_day: 1,
        }
    }

    fn reset_day(&mut self, day: u32) {
        self.day = day;
        self.used_hours_today = 0.0;
        self.next_sequence_in_day = 1;
    }
}

/// Sentinel gate for a component whose prerequisites are not yet (and may
/// never be) fully produced at the time it's reached: pushed one day past
/// the horizon so any attempt to place it always exhausts the month and the
/// full quantity lands in `unmet`, letting the fitness function's
/// `w_unmet` penalty supply the GA's selection pressure instead of the
/// decoder special-casing an unreachable component.
fn unreachable_gate(params: &DecodeParams) -> (u32, f64) {
    (params.month_days + 1, 0.0)
}

/// Outcome of attempting to advance one machine far enough to commit (or, in
/// peek mode, merely to locate) the next production run of `x`.
struct RunOutcome {
    day: u32,
    start_hour: f64,
    mold_changed: bool,
    color_changed: bool,
    remaining_capacity_after: f64,
    produced_qty: u64,
}

/// Decode permutation `perm` into a full schedule.
pub fn decode(
    view: &NormalizedView,
    perm: &[ComponentId],
    params: &DecodeParams,
) -> Result<DecodeResult, SchedulingError> {
    let mut machine_state: FxHashMap<MachineId, MachineState> = view
        .machines
        .keys()
        .map(|id| (id.clone(), MachineState::fresh()))
        .collect();
    let mut mold_busy: FxHashMap<(MoldId, u32), MoldIntervals> = FxHashMap::default();
    let mut remaining: FxHashMap<ComponentId, u64> = view
        .components
        .iter()
        .map(|(id, c)| (id.clone(), c.quantity))
        .collect();
    let mut produced_to_date: FxHashMap<ComponentId, u64> =
        view.components.keys().map(|id| (id.clone(), 0)).collect();
    let mut complete: FxHashMap<ComponentId, Option<(u32, f64)>> =
        view.components.keys().map(|id| (id.clone(), None)).collect();
    let mut assignments = Vec::new();
    let mut changeover_count = 0u64;

    for x_id in perm {
        let x = view.component(x_id);
        let candidates = view
            .admitting_machines
            .get(&x.mold_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if candidates.is_empty() {
            return Err(SchedulingError::internal(format!(
                "component {} has no admitting machine at decode time despite passing feasibility",
                x.id
            )));
        }

        let mut best: Option<(MachineId, RunCost)> = None;
        for mid in candidates {
            let snapshot = machine_state[mid].clone();
            if let Some(outcome) = plan_run(
                view,
                params,
                mid,
                &snapshot,
                &mold_busy,
                &complete,
                produced_to_date[&x.id],
                remaining[&x.id],
                x,
            ) {
                let cost = run_cost(&outcome, mid);
                let better = match &best {
                    None => true,
                    Some((_, cur_cost)) => cost < *cur_cost,
                };
                if better {
                    best = Some((mid.clone(), cost));
                }
            }
        }

        let Some((machine_id, _)) = best else {
            // No candidate machine can fit even one piece within the
            // horizon; the component's full quantity remains unmet.
            continue;
        };

        commit_component(
            view,
            params,
            &machine_id,
            x,
            &mut machine_state,
            &mut mold_busy,
            &mut remaining,
            &mut produced_to_date,
            &mut complete,
            &mut assignments,
            &mut changeover_count,
        )?;
    }

    let used_hours_total = assignments.iter().map(|a| a.used_hours).sum();
    let unmet = remaining.into_iter().filter(|&(_, qty)| qty > 0).collect();

    Ok(DecodeResult {
        assignments,
        unmet,
        used_hours_total,
        changeover_count,
    })
}

type RunCost = (u32, ordered_f64::OrderedF64, bool, bool, ordered_f64::OrderedF64, String);

fn run_cost(outcome: &RunOutcome, machine_id: &MachineId) -> RunCost {
    (
        outcome.day,
        ordered_f64::OrderedF64(outcome.start_hour),
        outcome.mold_changed,
        outcome.color_changed,
        ordered_f64::OrderedF64(outcome.remaining_capacity_after),
        machine_id.0.clone(),
    )
}

/// Small ordered wrapper so `f64` costs can sit in a tuple compared with
/// `<`; inputs are always finite hours/capacities, never NaN.
mod ordered_f64 {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct OrderedF64(pub f64);

    impl Eq for OrderedF64 {}
    impl PartialOrd for OrderedF64 {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for OrderedF64 {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
        }
    }
}

/// Peek variant: determine the (day, start_hour) and changeover shape of
/// the next production run for `x` on the machine described by `snapshot`,
/// without mutating any shared state. Returns `None` when the horizon is
/// exhausted before a single piece could be placed.
#[allow(clippy::too_many_arguments)]
fn plan_run(
    view: &NormalizedView,
    params: &DecodeParams,
    machine_id: &MachineId,
    snapshot: &MachineState,
    mold_busy: &FxHashMap<(MoldId, u32), MoldIntervals>,
    complete: &FxHashMap<ComponentId, Option<(u32, f64)>>,
    produced_so_far: u64,
    remaining_qty: u64,
    x: &crate::domain::Component,
) -> Option<RunOutcome> {
    let mut state = snapshot.clone();
    let gate = if produced_so_far == 0 {
        gate_for(view, params, x, complete)
    } else {
        (1, 0.0)
    };
    let capacity = view.machine(machine_id).capacity();

    loop {
        if state.day > params.month_days {
            return None;
        }
        let target_day = gate.0.max(state.day);
        if target_day != state.day {
            state.reset_day(target_day);
        }
        if state.day > params.month_days {
            return None;
        }

        let needs_color = state.current_color.as_deref() != Some(x.color.as_str());
        let needs_mold = state.current_mold_id.as_ref() != Some(&x.mold_id);
        let h = x.hours_per_piece();

        let base = state.used_hours_today;
        let pos_after_color = base + if needs_color { params.color_change_time_hours } else { 0.0 };
        let mold_change = if needs_mold { params.mold_change_time_hours } else { 0.0 };
        let gate_hour = (state.day == gate.0).then_some(gate.1);
        let busy = mold_busy
            .get(&(x.mold_id.clone(), state.day))
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        let (_, production_start, production_window) =
            place_production(busy, pos_after_color, mold_change, gate_hour);

        let total_needed = (production_start - base) + h;
        if base + total_needed > capacity + 1e-9 {
            state.day += 1;
            state.reset_day(state.day);
            continue;
        }

        let r = (capacity - production_start).min(production_window);
        let q = remaining_qty.min((r / h).floor().max(0.0) as u64);
        if q == 0 {
            state.day += 1;
            state.reset_day(state.day);
            continue;
        }

        return Some(RunOutcome {
            day: state.day,
            start_hour: production_start,
            mold_changed: needs_mold,
            color_changed: needs_color,
            remaining_capacity_after: capacity - (production_start + q as f64 * h),
            produced_qty: q,
        });
    }
}

/// Compute the earliest (day, hour) at which every prerequisite of `x` has
/// fully completed. Unsatisfied or not-yet-reached prerequisites push the
/// gate to [`unreachable_gate`].
fn gate_for(
    view: &NormalizedView,
    params: &DecodeParams,
    x: &crate::domain::Component,
    complete: &FxHashMap<ComponentId, Option<(u32, f64)>>,
) -> (u32, f64) {
    let _ = view;
    x.prerequisites
        .iter()
        .map(|p| complete.get(p).and_then(|c| *c).unwrap_or_else(|| unreachable_gate(params)))
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)))
        .unwrap_or((1, 0.0))
}

/// Find where production for `x` can begin against already-recorded
/// exclusivity intervals for its mold on this day, and how many hours of
/// uninterrupted production fit before the next recorded interval starts.
///
/// `desired_mold_occupy` is the earliest point the machine is free to start
/// occupying the mold (after any CHANGE_COLOR); `mold_change` is the
/// CHANGE_MOLD duration to add on top of that if one is needed;
/// `gate_hour` is the prerequisite-bridging target hour, if its day matches
/// this one. Slides forward whenever the prefix (mold change, then the
/// prerequisite wait) would run into a recorded interval, re-deriving
/// `gate_wait` at the new position each time, until the whole prefix fits in
/// a gap — this is the "slide to the first free window" step of §4.3 Step
/// C, generalized so a window must be *wide enough*, not merely clear of
/// the start point.
///
/// Returns `(mold_occupy_start, production_start, production_window)`;
/// `production_window` is `f64::INFINITY` when nothing else is booked
/// against this mold today.
fn place_production(
    intervals: &[(f64, f64)],
    mut desired_mold_occupy: f64,
    mold_change: f64,
    gate_hour: Option<f64>,
) -> (f64, f64, f64) {
    loop {
        for &(s, e) in intervals {
            if desired_mold_occupy >= s && desired_mold_occupy < e {
                desired_mold_occupy = e;
            }
        }
        let pos_after_mold = desired_mold_occupy + mold_change;
        let gate_wait = gate_hour.map_or(0.0, |g| (g - pos_after_mold).max(0.0));
        let production_start = pos_after_mold + gate_wait;

        match intervals.iter().find(|&&(s, _)| s > desired_mold_occupy + 1e-9) {
            Some(&(next_start, next_end)) if production_start > next_start + 1e-9 => {
                // The mold change and/or prerequisite wait would run past the
                // next machine's claim on this mold; jump past it and redo
                // the whole placement from there.
                desired_mold_occupy = next_end;
            }
            Some(&(next_start, _)) => {
                return (
                    desired_mold_occupy,
                    production_start,
                    (next_start - production_start).max(0.0),
                );
            }
            None => return (desired_mold_occupy, production_start, f64::INFINITY),
        }
    }
}

/// Commit variant: repeatedly run [`plan_run`]'s logic against the machine's
/// *real* state, mutating `mold_busy`/`remaining`/`produced_to_date`/
/// `complete` and appending assignments, until `x` is fully produced or the
/// horizon is exhausted.
#[allow(clippy::too_many_arguments)]
fn commit_component(
    view: &NormalizedView,
    params: &DecodeParams,
    machine_id: &MachineId,
    x: &crate::domain::Component,
    machine_state: &mut FxHashMap<MachineId, MachineState>,
    mold_busy: &mut FxHashMap<(MoldId, u32), MoldIntervals>,
    remaining: &mut FxHashMap<ComponentId, u64>,
    produced_to_date: &mut FxHashMap<ComponentId, u64>,
    complete: &mut FxHashMap<ComponentId, Option<(u32, f64)>>,
    assignments: &mut Vec<Assignment>,
    changeover_count: &mut u64,
) -> Result<(), SchedulingError> {
    let machine = view.machine(machine_id);
    let capacity = machine.capacity();

    loop {
        if remaining[&x.id] == 0 {
            return Ok(());
        }
        let state = machine_state.get_mut(machine_id).expect("machine id is valid");
        if state.day > params.month_days {
            return Ok(());
        }

        let gate = if produced_to_date[&x.id] == 0 {
            gate_for(view, params, x, complete)
        } else {
            (1, 0.0)
        };
        let target_day = gate.0.max(state.day);
        if target_day != state.day {
            state.reset_day(target_day);
        }
        if state.day > params.month_days {
            return Ok(());
        }

        let needs_color = state.current_color.as_deref() != Some(x.color.as_str());
        let needs_mold = state.current_mold_id.as_ref() != Some(&x.mold_id);
        let h = x.hours_per_piece();
        let base = state.used_hours_today;
        let pos_after_color = base + if needs_color { params.color_change_time_hours } else { 0.0 };
        let mold_change = if needs_mold { params.mold_change_time_hours } else { 0.0 };
        let gate_hour = (state.day == gate.0).then_some(gate.1);

        let busy_key = (x.mold_id.clone(), state.day);
        let (actual_mold_occupy, production_start, production_window) = {
            let busy = mold_busy.get(&busy_key).map(|v| v.as_slice()).unwrap_or(&[]);
            place_production(busy, pos_after_color, mold_change, gate_hour)
        };
        let slide_delay = actual_mold_occupy - pos_after_color;
        let pos_after_mold = actual_mold_occupy + mold_change;
        let gate_wait = production_start - pos_after_mold;
        let total_needed = (production_start - base) + h;

        if base + total_needed > capacity + 1e-9 {
            state.day += 1;
            let next_day = state.day;
            state.reset_day(next_day);
            continue;
        }

        let r = (capacity - production_start).min(production_window);
        let q = remaining[&x.id].min((r / h).floor().max(0.0) as u64);
        if q == 0 {
            state.day += 1;
            let next_day = state.day;
            state.reset_day(next_day);
            continue;
        }

        // Commit, in order: CHANGE_COLOR, mold-exclusivity WAIT, CHANGE_MOLD,
        // prerequisite WAIT, PRODUCE. Color always precedes mold when both
        // are needed, since mold occupancy is the scarcer shared resource.
        let mut cursor = base;
        let day = state.day;

        if needs_color {
            let from = state.current_color.clone();
            let to = x.color.clone();
            assignments.push(emit(
                view, machine_id, day, &mut state_seq(state), TaskType::ChangeColor,
                cursor, cursor + params.color_change_time_hours, capacity,
                None, None, None, None, None,
                Some(from.unwrap_or_else(|| "none".to_string())), Some(to.clone()),
                None, None,
            ));
            cursor += params.color_change_time_hours;
            state.current_color = Some(to);
            *changeover_count += 1;
        }

        if slide_delay > 1e-9 {
            assignments.push(emit(
                view, machine_id, day, &mut state_seq(state), TaskType::Wait,
                cursor, cursor + slide_delay, capacity,
                None, None, None, None, None, None, None, None, None,
            ));
            cursor += slide_delay;
        }

        if needs_mold {
            let from = state.current_mold_id.as_ref().map(|m| m.0.clone());
            let to = x.mold_id.0.clone();
            assignments.push(emit(
                view, machine_id, day, &mut state_seq(state), TaskType::ChangeMold,
                cursor, cursor + params.mold_change_time_hours, capacity,
                None, None, None, None, None, None, None,
                Some(from.unwrap_or_else(|| "none".to_string())), Some(to.clone()),
            ));
            insert_busy(mold_busy, &busy_key, cursor, cursor + params.mold_change_time_hours)?;
            cursor += params.mold_change_time_hours;
            state.current_mold_id = Some(x.mold_id.clone());
            *changeover_count += 1;
        }

        if gate_wait > 1e-9 {
            assignments.push(emit(
                view, machine_id, day, &mut state_seq(state), TaskType::Wait,
                cursor, cursor + gate_wait, capacity,
                None, None, None, None, None, None, None, None, None,
            ));
            cursor += gate_wait;
        }

        if (cursor - production_start).abs() > 1e-6 {
            return Err(SchedulingError::internal(format!(
                "decoder cursor {cursor} diverged from planned production start {production_start} for component {}",
                x.id
            )));
        }

        let end = cursor + q as f64 * h;
        if end > capacity + 1e-6 {
            return Err(SchedulingError::internal(format!(
                "PRODUCE for component {} would exceed daily capacity on machine {}",
                x.id, machine_id
            )));
        }
        assignments.push(emit(
            view, machine_id, day, &mut state_seq(state), TaskType::Produce,
            cursor, end, capacity,
            Some(x.id.clone()), Some(x.name.clone()), Some(q), Some(x.mold_id.clone()), Some(x.color.clone()),
            None, None, None, None,
        ));
        insert_busy(mold_busy, &busy_key, cursor, end)?;
        state.used_hours_today = end;

        *produced_to_date.get_mut(&x.id).expect("component id valid") += q;
        *remaining.get_mut(&x.id).expect("component id valid") -= q;
        if remaining[&x.id] == 0 {
            complete.insert(x.id.clone(), Some((day, end)));
        }
    }
}

fn state_seq(state: &mut MachineState) -> u32 {
    let seq = state.next_sequence_in_day;
    state.next_sequence_in_day += 1;
    seq
}

/// Record a PRODUCE/CHANGE_MOLD interval for (mold, day), raising an
/// internal error if it overlaps one already recorded by another machine.
/// This is the emit-time guard for mold exclusivity (§7): by the time
/// [`place_production`] has chosen `start`, a surviving overlap means a bug
/// in the placement logic above rather than a reachable scheduling state.
fn insert_busy(
    mold_busy: &mut FxHashMap<(MoldId, u32), MoldIntervals>,
    key: &(MoldId, u32),
    start: f64,
    end: f64,
) -> Result<(), SchedulingError> {
    let intervals = mold_busy.entry(key.clone()).or_default();
    let pos = intervals.partition_point(|&(s, _)| s < start);
    if pos > 0 && intervals[pos - 1].1 > start + 1e-9 {
        return Err(SchedulingError::internal(format!(
            "mold {} on day {} has overlapping claims: existing {:?} against new ({start}, {end})",
            key.0, key.1, intervals[pos - 1]
        )));
    }
    if let Some(&(next_start, _)) = intervals.get(pos) {
        if next_start < end - 1e-9 {
            return Err(SchedulingError::internal(format!(
                "mold {} on day {} has overlapping claims: existing {:?} against new ({start}, {end})",
                key.0, key.1, intervals[pos]
            )));
        }
    }
    intervals.insert(pos, (start, end));
    Ok(())
}


#[allow(clippy::too_many_arguments)]
fn emit(
    view: &NormalizedView,
    machine_id: &MachineId,
    day: u32,
    seq: &mut u32,
    task_type: TaskType,
    start_hour: f64,
    end_hour: f64,
    capacity: f64,
    component_id: Option<ComponentId>,
    component_name: Option<String>,
    produced_qty: Option<u64>,
    mold_id: Option<MoldId>,
    color: Option<String>,
    from_color: Option<String>,
    to_color: Option<String>,
    from_mold_id: Option<String>,
    to_mold_id: Option<String>,
) -> Assignment {
    let used_hours = end_hour - start_hour;
    Assignment {
        day,
        machine_id: machine_id.clone(),
        machine_name: view.machine(machine_id).name.clone(),
        sequence_in_day: *seq,
        task_type,
        start_hour,
        end_hour,
        used_hours,
        utilization: used_hours / capacity,
        component_id,
        component_name,
        produced_qty,
        mold_id,
        color,
        from_color,
        to_color,
        from_mold_id,
        to_mold_id,
    }
}
