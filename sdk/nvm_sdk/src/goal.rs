//! Capacity Goals
//!
//! A goal is a capacity configuration request staged on each DIMM and processed by the BIOS on the next platform
//! boot. [GoalInput] is what an operator asks for; [ConfigGoal] is the per-DIMM result of planning, and also what is
//! read back from a DIMM's staging area.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use serde::{Deserialize, Serialize};

use crate::device::Uid;
use crate::error::{NvmError, Result};
use crate::interleave::{InterleaveSize, InterleaveType, InterleaveWays};

/// Layout requested for App Direct capacity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistentMemType {
    /// Stripe App Direct capacity across the DIMMs of a socket.
    #[default]
    AppDirect,
    /// One App Direct region per DIMM.
    AppDirectNotInterleaved,
}

/// Handling of one DIMM per socket that is kept out of interleaving.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveDimm {
    #[default]
    None,
    /// Reserve the DIMM as unmapped storage. Not supported.
    Storage,
    /// Reserve the DIMM as a non-interleaved App Direct region.
    AppDirectNotInterleaved,
}

/// Namespace label schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelVersion {
    pub major: u16,
    pub minor: u16,
}

impl LabelVersion {
    pub const V1_1: LabelVersion = LabelVersion { major: 1, minor: 1 };
    pub const V1_2: LabelVersion = LabelVersion { major: 1, minor: 2 };

    pub fn is_supported(&self) -> bool {
        *self == Self::V1_1 || *self == Self::V1_2
    }
}

impl Default for LabelVersion {
    fn default() -> Self {
        Self::V1_2
    }
}

/// A capacity goal request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalInput {
    pub persistent_mem_type: PersistentMemType,
    /// Percentage of each DIMM's capacity mapped as volatile Memory Mode.
    pub volatile_percent: u8,
    /// Percentage of the persistent portion left unmapped.
    pub reserved_percent: u8,
    pub reserve_dimm: ReserveDimm,
    pub label_version: LabelVersion,
    /// Request mirrored App Direct interleave sets.
    pub mirrored: bool,
}

impl GoalInput {
    /// Checks caller-supplied values without consulting any device.
    pub fn validate(&self) -> Result<()> {
        if self.volatile_percent > 100 {
            return Err(NvmError::InvalidParameter("volatile percent must be 0 to 100"));
        }
        if self.reserved_percent > 100 {
            return Err(NvmError::InvalidParameter("reserved percent must be 0 to 100"));
        }
        if !self.label_version.is_supported() {
            return Err(NvmError::InvalidParameter("namespace label version must be 1.1 or 1.2"));
        }
        if self.reserve_dimm == ReserveDimm::Storage {
            return Err(NvmError::NotSupported("reserving a DIMM as storage"));
        }
        Ok(())
    }

    /// True if the request maps any App Direct capacity.
    pub fn wants_app_direct(&self) -> bool {
        self.volatile_percent < 100 && self.reserved_percent < 100
    }
}

/// Status of a goal, either planned or as reported back by a DIMM.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigGoalStatus {
    /// No goal is staged, or the last goal was applied successfully.
    #[default]
    NoGoalOrSuccess,
    /// A goal is staged and the BIOS has not processed it.
    Unknown,
    /// The goal is new and valid.
    New,
    BadRequest,
    InsufficientResources,
    FirmwareError,
    UnknownError,
}

impl ConfigGoalStatus {
    pub const fn raw(&self) -> u8 {
        match self {
            ConfigGoalStatus::NoGoalOrSuccess => 0,
            ConfigGoalStatus::Unknown => 1,
            ConfigGoalStatus::New => 2,
            ConfigGoalStatus::BadRequest => 3,
            ConfigGoalStatus::InsufficientResources => 4,
            ConfigGoalStatus::FirmwareError => 5,
            ConfigGoalStatus::UnknownError => 6,
        }
    }

    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ConfigGoalStatus::NoGoalOrSuccess),
            1 => Some(ConfigGoalStatus::Unknown),
            2 => Some(ConfigGoalStatus::New),
            3 => Some(ConfigGoalStatus::BadRequest),
            4 => Some(ConfigGoalStatus::InsufficientResources),
            5 => Some(ConfigGoalStatus::FirmwareError),
            6 => Some(ConfigGoalStatus::UnknownError),
            _ => None,
        }
    }

    /// True if the status reports a rejected goal.
    pub fn is_failure(&self) -> bool {
        !matches!(self, ConfigGoalStatus::NoGoalOrSuccess | ConfigGoalStatus::Unknown | ConfigGoalStatus::New)
    }
}

/// A DIMM's share of one App Direct interleave set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalSlot {
    pub interleave_type: InterleaveType,
    /// Physical bytes this DIMM contributes to the set.
    pub appdirect_size: u64,
    pub imc: InterleaveSize,
    pub channel: InterleaveSize,
    pub ways: InterleaveWays,
    pub appdirect_index: u8,
}

/// Planned or staged capacity configuration of one DIMM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigGoal {
    pub uid: Uid,
    pub socket_id: u16,
    pub volatile_size: u64,
    /// Capacity neither volatile nor App Direct mapped.
    pub storage_capacity: u64,
    pub slots: Vec<GoalSlot>,
    pub status: ConfigGoalStatus,
}

impl ConfigGoal {
    /// Number of persistent regions described by the goal.
    pub fn persistent_regions(&self) -> usize {
        self.slots.len()
    }

    /// Total App Direct bytes this DIMM contributes.
    pub fn appdirect_size(&self) -> u64 {
        self.slots.iter().map(|slot| slot.appdirect_size).sum()
    }

    /// Total bytes accounted for by the goal.
    pub fn allocated(&self) -> u64 {
        self.volatile_size.saturating_add(self.appdirect_size()).saturating_add(self.storage_capacity)
    }
}
