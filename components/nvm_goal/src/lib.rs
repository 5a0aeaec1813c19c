//! Persistent Memory Capacity Goals
//!
//! Turns a platform-wide capacity request into per-DIMM goals, moves those goals in and out of DIMM staging areas, and
//! records them in portable goal files.
//!
//! ```text
//!   GoalInput ──▶ planner::GoalPlanner ──▶ GoalPlan ──▶ staging::GoalStager ──▶ DIMMs
//!                                                            │
//!                                 persistence::GoalFile ◀────┘ (dump / load)
//! ```
//!
//! Planning is pure: it reads the device catalog and capabilities and touches no hardware. Every goal set that leaves
//! this crate, whether planned or loaded from a file, passes the [validate] checks.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
pub mod persistence;
pub mod planner;
pub mod staging;
pub mod validate;

#[cfg(test)]
mod test_support;

pub use persistence::GoalFile;
pub use planner::{GoalPlan, GoalPlanner, PlanError};
pub use staging::{GoalStager, StageFailure};
