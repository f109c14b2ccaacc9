//! Typed entities (machines, molds, components) and the request validator.
//!
//! The `id_type!` macro below builds a newtype/Display/Map/Set bundle per
//! entity kind; ids here are caller-supplied strings rather than internally
//! generated integers, so there's no atomic counter to thread through it.

use crate::error::{SchedulingError, ValidationError};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$m:meta])* $Type:ident) => {
        ::paste::paste! {
            #[doc = " Code uniquely identifying a [`" $Type "`]."]
            $(#[$m])*
            #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct [<$Type Id>](pub String);

            impl std::fmt::Display for [<$Type Id>] {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<String> for [<$Type Id>] {
                fn from(s: String) -> Self {
                    Self(s)
                }
            }

            impl From<&str> for [<$Type Id>] {
                fn from(s: &str) -> Self {
                    Self(s.to_string())
                }
            }

            #[doc = " A dictionary associating [`" [<$Type Id>] "`]s with `T`."]
            pub type [<$Type Map>]<T = $Type> = FxHashMap<[<$Type Id>], T>;

            #[doc = " A set of [`" [<$Type Id>] "`]s."]
            pub type [<$Type Set>] = FxHashSet<[<$Type Id>]>;
        }
    };
}

id_type!(Machine);
id_type!(Mold);
id_type!(Component);

/// Tonnage/footprint class shared by machines and molds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineGroup {
    /// Small-frame machines/molds.
    Small,
    /// Medium-frame machines/molds.
    Medium,
    /// Large-frame machines/molds.
    Large,
}

impl std::fmt::Display for MachineGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

/// An injection-molding machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// Unique id.
    pub id: MachineId,
    /// Display name.
    pub name: String,
    /// Tonnage/footprint class.
    pub group: MachineGroup,
    /// Clamping tonnage.
    pub tonnage: f64,
    /// Nominal working hours in a calendar day.
    pub hours_per_day: f64,
    /// Efficiency multiplier applied to `hours_per_day`.
    pub efficiency: f64,
}

impl Machine {
    /// `hours_per_day * efficiency`, the per-day upper bound on used hours.
    pub fn capacity(&self) -> f64 {
        self.hours_per_day * self.efficiency
    }

    /// Whether this machine admits `mold`: matching group and sufficient
    /// tonnage.
    pub fn admits(&self, mold: &Mold) -> bool {
        self.group == mold.group && mold.tonnage <= self.tonnage
    }
}

/// A mold that can be mounted in an admitting machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mold {
    /// Unique id.
    pub id: MoldId,
    /// Display name.
    pub name: String,
    /// Tonnage/footprint class.
    pub group: MachineGroup,
    /// Required clamping tonnage.
    pub tonnage: f64,
}

/// A demand for a fixed quantity of a component, with a due day and
/// optional prerequisites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Unique id.
    pub id: ComponentId,
    /// Display name.
    pub name: String,
    /// Mold this component is produced with.
    pub mold_id: MoldId,
    /// Free-form color label; drives CHANGE_COLOR detection.
    pub color: String,
    /// Per-piece cycle time, in seconds.
    pub cycle_time_sec: f64,
    /// Total pieces demanded.
    pub quantity: u64,
    /// Day (1-based) by which the full quantity is due.
    pub due_day: u32,
    /// Days of lead time subtracted from `due_day` to get
    /// `required_finish_day` (see [`crate::topo`]).
    pub lead_time_days: u32,
    /// Ids of components that must fully complete before this one starts.
    #[serde(default)]
    pub prerequisites: ComponentSet,
}

impl Component {
    /// Per-piece hours, `cycle_time_sec / 3600`.
    pub fn hours_per_piece(&self) -> f64 {
        self.cycle_time_sec / 3600.0
    }
}

/// The raw request body's entity arrays, pre-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInput {
    /// Machines available for the month.
    pub machines: Vec<Machine>,
    /// Molds available for the month.
    pub molds: Vec<Mold>,
    /// Component demands for the month.
    pub components: Vec<Component>,
}

/// Precomputed, validated view over a [`RawInput`], handed to the decoder
/// and GA driver. Holds the lookup tables named in the prerequisite
/// engine's contract.
#[derive(Debug, Clone)]
pub struct NormalizedView {
    /// Machines by id.
    pub machines: MachineMap,
    /// Molds by id.
    pub molds: MoldMap,
    /// Components by id.
    pub components: ComponentMap,
    /// Components in Kahn topological order, ties broken by ascending
    /// `due_day` then ascending id.
    pub topo_order: Vec<ComponentId>,
    /// For each mold id, the machines admitting it, sorted by ascending
    /// tonnage then ascending id.
    pub admitting_machines: FxHashMap<MoldId, Vec<MachineId>>,
}

impl NormalizedView {
    /// Convenience lookup, used pervasively by the decoder.
    pub fn machine(&self, id: &MachineId) -> &Machine {
        self.machines
            .get(id)
            .expect("machine id originates from a validated NormalizedView")
    }

    /// Convenience lookup, used pervasively by the decoder.
    pub fn mold(&self, id: &MoldId) -> &Mold {
        self.molds
            .get(id)
            .expect("mold id originates from a validated NormalizedView")
    }

    /// Convenience lookup, used pervasively by the decoder.
    pub fn component(&self, id: &ComponentId) -> &Component {
        self.components
            .get(id)
            .expect("component id originates from a validated NormalizedView")
    }
}

/// Validate `raw`, failing on the first structural or numeric problem found,
/// and return the [`NormalizedView`] used by every downstream module.
///
/// Checks, in order: duplicate/empty ids within each kind, unknown mold
/// foreign keys, unknown/self prerequisites, numeric bounds, then cycle
/// detection (which also produces the topological order). Feasibility
/// (every mold admitted by some machine) is checked separately by
/// [`crate::decoder`] callers via [`check_feasible`], since spec treats it as
/// a distinct error kind from structural validation.
pub fn validate(raw: RawInput) -> Result<NormalizedView, SchedulingError> {
    let mut machines = MachineMap::default();
    for m in raw.machines {
        if m.id.0.is_empty() {
            return Err(ValidationError::DuplicateOrEmptyId {
                kind: "machine",
                id: None,
            }
            .into());
        }
        check_range("machine", &m.id.0, "tonnage", m.tonnage, m.tonnage > 0.0)?;
        check_range(
            "machine",
            &m.id.0,
            "hours_per_day",
            m.hours_per_day,
            m.hours_per_day > 0.0,
        )?;
        check_range(
            "machine",
            &m.id.0,
            "efficiency",
            m.efficiency,
            m.efficiency > 0.0 && m.efficiency <= 1.5,
        )?;
        let id = m.id.clone();
        if machines.insert(m.id.clone(), m).is_some() {
            return Err(duplicate("machine", id));
        }
    }

    let mut molds = MoldMap::default();
    for m in raw.molds {
        if m.id.0.is_empty() {
            return Err(ValidationError::DuplicateOrEmptyId {
                kind: "mold",
                id: None,
            }
            .into());
        }
        check_range("mold", &m.id.0, "tonnage", m.tonnage, m.tonnage > 0.0)?;
        let id = m.id.clone();
        if molds.insert(m.id.clone(), m).is_some() {
            return Err(duplicate("mold", id));
        }
    }

    let mut components = ComponentMap::default();
    for c in raw.components {
        if c.id.0.is_empty() {
            return Err(ValidationError::DuplicateOrEmptyId {
                kind: "component",
                id: None,
            }
            .into());
        }
        if !molds.contains_key(&c.mold_id) {
            return Err(ValidationError::UnknownMold {
                component: c.id.0.clone(),
                mold: c.mold_id.0.clone(),
            }
            .into());
        }
        for p in &c.prerequisites {
            if *p == c.id {
                return Err(ValidationError::BadPrerequisite {
                    component: c.id.0.clone(),
                    prerequisite: p.0.clone(),
                }
                .into());
            }
        }
        check_range(
            "component",
            &c.id.0,
            "cycle_time_sec",
            c.cycle_time_sec,
            c.cycle_time_sec > 0.0,
        )?;
        check_range(
            "component",
            &c.id.0,
            "quantity",
            c.quantity as f64,
            c.quantity > 0,
        )?;
        check_range(
            "component",
            &c.id.0,
            "due_day",
            c.due_day as f64,
            c.due_day >= 1,
        )?;
        let id = c.id.clone();
        if components.insert(c.id.clone(), c).is_some() {
            return Err(duplicate("component", id));
        }
    }

    // unknown-prerequisite check needs the full component map
    for c in components.values() {
        for p in &c.prerequisites {
            if !components.contains_key(p) {
                return Err(ValidationError::BadPrerequisite {
                    component: c.id.0.clone(),
                    prerequisite: p.0.clone(),
                }
                .into());
            }
        }
    }

    let topo_order = topo_sort(&components)?;

    let mut admitting_machines: FxHashMap<MoldId, Vec<MachineId>> = FxHashMap::default();
    for mold in molds.values() {
        let mut admitting: Vec<MachineId> = machines
            .values()
            .filter(|m| m.admits(mold))
            .map(|m| m.id.clone())
            .collect();
        admitting.sort_by(|a, b| {
            let ma = &machines[a];
            let mb = &machines[b];
            ma.tonnage
                .partial_cmp(&mb.tonnage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        admitting_machines.insert(mold.id.clone(), admitting);
    }

    Ok(NormalizedView {
        machines,
        molds,
        components,
        topo_order,
        admitting_machines,
    })
}

/// Kahn's algorithm over the prerequisite DAG, ties broken by ascending
/// `due_day` then ascending id. Doubles as cycle detection: a remaining
/// in-degree after exhaustion means a cycle, reported against one of its
/// members.
fn topo_sort(components: &ComponentMap) -> Result<Vec<ComponentId>, SchedulingError> {
    let mut indegree: FxHashMap<ComponentId, usize> = components
        .keys()
        .map(|id| (id.clone(), 0usize))
        .collect();
    let mut dependents: FxHashMap<ComponentId, Vec<ComponentId>> = FxHashMap::default();
    for c in components.values() {
        for p in &c.prerequisites {
            *indegree.get_mut(&c.id).expect("component id in map") += 1;
            dependents.entry(p.clone()).or_default().push(c.id.clone());
        }
    }

    let mut ready: Vec<ComponentId> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    sort_by_due_then_id(&mut ready, components);

    let mut order = Vec::with_capacity(components.len());
    while let Some(next) = ready.pop() {
        order.push(next.clone());
        if let Some(deps) = dependents.get(&next) {
            let mut newly_ready = Vec::new();
            for d in deps {
                let deg = indegree.get_mut(d).expect("dependent id in map");
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(d.clone());
                }
            }
            ready.extend(newly_ready);
        }
        sort_by_due_then_id(&mut ready, components);
    }

    if order.len() != components.len() {
        let stuck = components
            .keys()
            .find(|id| !order.contains(id))
            .expect("at least one component remains when a cycle exists");
        return Err(ValidationError::PrerequisiteCycle(stuck.0.clone()).into());
    }

    Ok(order)
}

fn sort_by_due_then_id(ids: &mut [ComponentId], components: &ComponentMap) {
    ids.sort_by(|a, b| {
        let ca = &components[a];
        let cb = &components[b];
        cb.due_day
            .cmp(&ca.due_day)
            .then_with(|| b.0.cmp(&a.0))
    });
}

/// Separate feasibility check (§7 `INFEASIBLE_INPUT`): every mold actually
/// used by some component must admit at least one machine.
pub fn check_feasible(view: &NormalizedView) -> Result<(), SchedulingError> {
    for c in view.components.values() {
        let mold = view.mold(&c.mold_id);
        let admits = view
            .admitting_machines
            .get(&c.mold_id)
            .is_some_and(|v| !v.is_empty());
        if !admits {
            return Err(crate::error::InfeasibleError::NoAdmittingMachine {
                mold: mold.id.0.clone(),
                group: mold.group,
            }
            .into());
        }
    }
    Ok(())
}

fn check_range(
    entity: &'static str,
    id: &str,
    field: &'static str,
    value: f64,
    ok: bool,
) -> Result<(), SchedulingError> {
    if ok {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            entity,
            id: id.to_string(),
            field,
            value: value.to_string(),
        }
        .into())
    }
}

fn duplicate(kind: &'static str, id: impl Into<String>) -> SchedulingError {
    ValidationError::DuplicateOrEmptyId {
        kind,
        id: Some(id.into()),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(id: &str, group: MachineGroup, tonnage: f64) -> Machine {
        Machine {
            id: id.into(),
            name: id.to_string(),
            group,
            tonnage,
            hours_per_day: 12.0,
            efficiency: 1.0,
        }
    }

    fn mold(id: &str, group: MachineGroup, tonnage: f64) -> Mold {
        Mold {
            id: id.into(),
            name: id.to_string(),
            group,
            tonnage,
        }
    }

    fn component(id: &str, mold_id: &str, due_day: u32, prereqs: &[&str]) -> Component {
        Component {
            id: id.into(),
            name: id.to_string(),
            mold_id: mold_id.into(),
            color: "red".to_string(),
            cycle_time_sec: 30.0,
            quantity: 100,
            due_day,
            lead_time_days: 0,
            prerequisites: prereqs.iter().map(|p| (*p).into()).collect(),
        }
    }

    #[test]
    fn duplicate_machine_id_rejected() {
        let raw = RawInput {
            machines: vec![
                machine("M1", MachineGroup::Small, 100.0),
                machine("M1", MachineGroup::Small, 100.0),
            ],
            molds: vec![],
            components: vec![],
        };
        assert!(matches!(
            validate(raw),
            Err(SchedulingError::Validation(ValidationError::DuplicateOrEmptyId { .. }))
        ));
    }

    #[test]
    fn unknown_mold_rejected() {
        let raw = RawInput {
            machines: vec![machine("M1", MachineGroup::Small, 100.0)],
            molds: vec![],
            components: vec![component("C1", "MO1", 1, &[])],
        };
        assert!(matches!(
            validate(raw),
            Err(SchedulingError::Validation(ValidationError::UnknownMold { .. }))
        ));
    }

    #[test]
    fn cyclic_prerequisites_rejected() {
        let raw = RawInput {
            machines: vec![machine("M1", MachineGroup::Small, 100.0)],
            molds: vec![mold("MO1", MachineGroup::Small, 80.0)],
            components: vec![
                component("C1", "MO1", 1, &["C2"]),
                component("C2", "MO1", 1, &["C1"]),
            ],
        };
        assert!(matches!(
            validate(raw),
            Err(SchedulingError::Validation(ValidationError::PrerequisiteCycle(_)))
        ));
    }

    #[test]
    fn topo_order_respects_prerequisites() {
        let raw = RawInput {
            machines: vec![machine("M1", MachineGroup::Small, 100.0)],
            molds: vec![mold("MO1", MachineGroup::Small, 80.0)],
            components: vec![
                component("C1", "MO1", 5, &[]),
                component("C2", "MO1", 3, &["C1"]),
            ],
        };
        let view = validate(raw).unwrap();
        let pos_c1 = view.topo_order.iter().position(|id| id.0 == "C1").unwrap();
        let pos_c2 = view.topo_order.iter().position(|id| id.0 == "C2").unwrap();
        assert!(pos_c1 < pos_c2);
    }

    #[test]
    fn no_admitting_machine_is_infeasible() {
        let raw = RawInput {
            machines: vec![machine("M1", MachineGroup::Small, 100.0)],
            molds: vec![mold("MO1", MachineGroup::Large, 500.0)],
            components: vec![component("C1", "MO1", 1, &[])],
        };
        let view = validate(raw).unwrap();
        assert!(matches!(
            check_feasible(&view),
            Err(SchedulingError::Infeasible(_))
        ));
    }
}
