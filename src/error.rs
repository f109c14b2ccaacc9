//! Error taxonomy for the scheduler core.
//!
//! `OVER_BUDGET` from the taxonomy is intentionally absent here: it is not a
//! failure, it is the `partial` flag on [`crate::contract::ScheduleResponse`].

use thiserror::Error;

/// Everything that can stop [`crate::ga::run`] before it produces a
/// schedule, plus the one guard that should never trip.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// Bad input structure: duplicate/empty ids, unknown foreign keys,
    /// cyclic prerequisites, or numeric bounds violated. Reports the first
    /// offending item only.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Input was internally consistent but cannot be scheduled at all, e.g.
    /// a mold's group matches no machine.
    #[error("infeasible input: {0}")]
    Infeasible(#[from] InfeasibleError),

    /// A decoder invariant was violated at emit time. This should never
    /// happen for validated input; it indicates a bug in the decoder, not a
    /// problem with the caller's data.
    #[error("internal scheduler invariant violated: {0}")]
    Internal(String),
}

impl SchedulingError {
    /// Machine-readable taxonomy tag, for the HTTP/CLI adapters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Infeasible(_) => "INFEASIBLE_INPUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build an [`SchedulingError::Internal`] carrying `context`. Called at
    /// every decoder commit point that asserts an invariant from §3.
    pub fn internal(context: impl std::fmt::Display) -> Self {
        Self::Internal(context.to_string())
    }
}

/// Reasons a request is rejected before any scheduling occurs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// An id was empty or repeated within its kind (machine/mold/component).
    #[error("duplicate or empty {kind} id: {id:?}")]
    DuplicateOrEmptyId {
        /// `"machine"`, `"mold"`, or `"component"`.
        kind: &'static str,
        /// The offending id, `None` when it was empty.
        id: Option<String>,
    },

    /// A component referenced a mold id that does not exist.
    #[error("component {component} references unknown mold {mold}")]
    UnknownMold {
        /// The offending component's id.
        component: String,
        /// The mold id that does not exist.
        mold: String,
    },

    /// A component listed itself, or an unknown component, as a prerequisite.
    #[error("component {component} has an invalid prerequisite {prerequisite}")]
    BadPrerequisite {
        /// The offending component's id.
        component: String,
        /// The prerequisite id that is unknown, or equal to `component`.
        prerequisite: String,
    },

    /// The prerequisite graph is cyclic.
    #[error("prerequisite graph contains a cycle through component {0}")]
    PrerequisiteCycle(String),

    /// A numeric field was outside its allowed range.
    #[error("{entity} {id}: {field} = {value} is out of range")]
    OutOfRange {
        /// `"machine"`, `"mold"`, or `"component"`.
        entity: &'static str,
        /// The offending entity's id.
        id: String,
        /// The offending field's name.
        field: &'static str,
        /// The offending value, stringified for display.
        value: String,
    },
}

/// Reasons a validated request still cannot be scheduled.
#[derive(Debug, Error)]
pub enum InfeasibleError {
    /// No machine admits the given mold (group mismatch or tonnage excess
    /// against every machine of the matching group).
    #[error("mold {mold} (group {group:?}) is admitted by no machine")]
    NoAdmittingMachine {
        /// The mold with no admitting machine.
        mold: String,
        /// The mold's group.
        group: crate::domain::MachineGroup,
    },
}
