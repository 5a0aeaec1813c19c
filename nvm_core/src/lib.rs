//! NVM Management Core
//!
//! The session-level surface of persistent memory module management. A [session::NvmSession] is opened over a set
//! of [session::PlatformServices] and exposes capacity goal planning and staging, goal file persistence, the
//! security state machine of every manageable device, and raw command pass-through.
//!
//! ```text
//!                 +-------------+
//!   nvmctl ------>| NvmSession  |---- SessionLock ----+
//!                 +-------------+                     |
//!                   |   |    |                        v
//!      DeviceCatalog|   |    |SecurityMachine    GoalPlanner / GoalStager / GoalFile
//!                   v   v    v
//!        DeviceEnumerator  FirmwareMailbox  NamespaceInventory  EventSink  PassThrough
//! ```
//!
//! [simulator::SimulatedPlatform] implements every service in memory and backs both the `nvmctl` tool and the
//! integration tests.
//!
//! ## Logging
//!
//! The session logs with the `nvm_session` target and the simulator with `nvm_simulator`. The component crates use
//! `nvm_inventory`, `nvm_goal` and `nvm_security`.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod passthrough;
pub mod session;
pub mod session_lock;
pub mod simulator;

pub use session::{NvmSession, PlatformServices, SessionGuard};
pub use simulator::{Fault, PlatformDescription, SimulatedPlatform};
