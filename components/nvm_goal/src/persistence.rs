//! Goal Files
//!
//! A goal file records a platform's staged goals so they can be replayed on another platform with the same layout.
//! Entries are keyed by socket and by the DIMM's position among that socket's manageable DIMMs, never by device id,
//! so a file dumped on one machine resolves onto the matching DIMMs of another.
//!
//! ```json
//! {
//!   "version": 1,
//!   "goals": [
//!     {
//!       "socket_id": 0,
//!       "dimm_index": 0,
//!       "capacity": 17179869184,
//!       "volatile_size": 4294967296,
//!       "storage_capacity": 0,
//!       "slots": [ ... ]
//!     }
//!   ]
//! }
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use nvm_inventory::{DeviceCatalog, PortableKey};
use nvm_sdk::error::{NvmError, Result, Violation};
use nvm_sdk::goal::{ConfigGoal, ConfigGoalStatus, GoalSlot};

use crate::validate::check_goal_set;

/// The only goal file version this crate reads and writes.
pub const GOAL_FILE_VERSION: u32 = 1;

/// Serialized form of a set of goals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalFile {
    pub version: u32,
    pub goals: Vec<GoalFileEntry>,
}

/// One DIMM's goal, keyed by its position on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalFileEntry {
    pub socket_id: u16,
    pub dimm_index: u16,
    /// Capacity of the DIMM the goal was dumped from.
    pub capacity: u64,
    pub volatile_size: u64,
    pub storage_capacity: u64,
    #[serde(default)]
    pub slots: Vec<GoalSlot>,
}

impl GoalFile {
    /// Records goals against the positions of their DIMMs in `catalog`.
    pub fn from_goals(goals: &[ConfigGoal], catalog: &DeviceCatalog) -> Result<Self> {
        if goals.is_empty() {
            return Err(Violation::NoGoalStaged.into());
        }
        let mut entries = Vec::with_capacity(goals.len());
        for goal in goals {
            let device = catalog.manageable_device(&goal.uid)?;
            let key = catalog.portable_key(&goal.uid).ok_or_else(|| NvmError::DeviceNotManageable(goal.uid.clone()))?;
            entries.push(GoalFileEntry {
                socket_id: key.socket_id,
                dimm_index: key.dimm_index,
                capacity: device.capacity,
                volatile_size: goal.volatile_size,
                storage_capacity: goal.storage_capacity,
                slots: goal.slots.clone(),
            });
        }
        entries.sort_by_key(|entry| (entry.socket_id, entry.dimm_index));
        Ok(Self { version: GOAL_FILE_VERSION, goals: entries })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| NvmError::Parse(err.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| NvmError::Parse(format!("goal file: {err}")))
    }

    /// Writes the file, replacing any existing file at `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|err| NvmError::Io(format!("{}: {err}", path.display())))?;
        log::info!(target: "nvm_goal", "Wrote {} goals to {}", self.goals.len(), path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|err| NvmError::Io(format!("{}: {err}", path.display())))?;
        Self::from_json(&json)
    }

    /// Maps the file's entries onto the DIMMs of `catalog` and validates the result as a goal set.
    ///
    /// Every target must be at least as large as the DIMM the entry was dumped from. Goals are never scaled.
    pub fn resolve(&self, catalog: &DeviceCatalog) -> Result<Vec<ConfigGoal>> {
        if self.version != GOAL_FILE_VERSION {
            return Err(Violation::UnsupportedFileVersion(self.version).into());
        }

        let mut keys = BTreeSet::new();
        let mut goals = Vec::with_capacity(self.goals.len());
        for entry in &self.goals {
            let key = PortableKey { socket_id: entry.socket_id, dimm_index: entry.dimm_index };
            let device = catalog.by_portable_key(key).ok_or(Violation::MissingTargetDimm {
                socket_id: entry.socket_id,
                dimm_index: entry.dimm_index,
            })?;
            if !keys.insert(key) {
                return Err(Violation::DuplicateGoal(device.uid.clone()).into());
            }
            if device.capacity < entry.capacity {
                log::warn!(
                    target: "nvm_goal",
                    "{} holds {:#x} bytes, goal was dumped from a {:#x} byte DIMM",
                    device.uid,
                    device.capacity,
                    entry.capacity
                );
                return Err(Violation::TargetCapacityTooSmall {
                    uid: device.uid.clone(),
                    required: entry.capacity,
                    available: device.capacity,
                }
                .into());
            }
            goals.push(ConfigGoal {
                uid: device.uid.clone(),
                socket_id: entry.socket_id,
                volatile_size: entry.volatile_size,
                storage_capacity: entry.storage_capacity,
                slots: entry.slots.clone(),
                status: ConfigGoalStatus::New,
            });
        }

        check_goal_set(&goals, catalog)?;
        Ok(goals)
    }
}
