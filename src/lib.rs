//! # taskalign-scheduler
//!
//! The monthly production scheduler at the heart of TaskAlign: a
//! constraint-aware planner that, given a fleet of injection-molding
//! machines, a library of molds, and a set of component demands with due
//! dates and dependencies, produces a day-by-day per-machine timeline of
//! tasks.
//!
//! The core is arranged leaves-first, mirroring the module list a caller
//! actually needs to walk to build a [`contract::ScheduleRequest`] into a
//! [`contract::ScheduleResponse`]:
//!
//! 1. [`domain`] — typed entities and the request validator.
//! 2. [`topo`] — the prerequisite engine (topological levels, seed bias).
//! 3. [`decoder`] — the deterministic permutation-to-schedule constructor.
//! 4. [`fitness`] — the scoring function.
//! 5. [`ga`] — the genetic algorithm driver.
//! 6. [`contract`] — the request/response types and the `schedule` entry
//!    point that wires 1-5 together.
//! 7. [`http`] — an optional `rouille`-backed HTTP adapter over `contract`.
//!
//! [`error`] is used throughout rather than sitting in the pipeline itself.

#![deny(clippy::undocumented_unsafe_blocks, clippy::missing_safety_doc)]
#![cfg_attr(
    not(any(test, debug_assertions)),
    deny(
        clippy::missing_panics_doc,
        clippy::panic,
        clippy::unimplemented,
        clippy::unwrap_used,
        reason = "prefer errors over panicking"
    )
)]
#![cfg_attr(
    not(any(test, debug_assertions)),
    forbid(clippy::todo, reason = "production code should not use `todo`")
)]

pub mod contract;
pub mod decoder;
pub mod domain;
pub mod error;
pub mod fitness;
pub mod ga;
pub mod http;
pub mod topo;
