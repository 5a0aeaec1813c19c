//! Capacity Goal Planner
//!
//! Translates a [GoalInput] into per-DIMM [ConfigGoal]s and the interleave sets they form. Planning never touches
//! hardware; the result is handed to the [stager](crate::staging::GoalStager) or written to a goal file.
//!
//! ## Algorithm
//!
//! Interleave sets never cross sockets, so each socket is planned on its own, in ascending socket order:
//!
//! 1. When a DIMM is reserved, the last target DIMM of the socket in topology order is set aside.
//! 2. The remaining DIMMs are grouped by capacity and SKU. Only DIMMs in the same group can share a set.
//! 3. Each DIMM's volatile share is `capacity * volatile_percent / 100`, aligned down to the Memory Mode alignment.
//!    The persistent remainder loses `reserved_percent` and is aligned down to the App Direct alignment; whatever
//!    is left over is reported as storage capacity.
//! 4. Each group becomes one interleave set using the densest supported format whose ways match the group size.
//!    Non-interleaved requests give every DIMM its own one-way set. The reserved DIMM gets a one-way set after the
//!    socket's groups.
//! 5. `appdirect_index` values are handed out from a platform-wide counter in set creation order.
//!
//! Any DIMM that cannot be planned is reported with a failure status and fails the whole call.
//!
//! ## Logging
//!
//! Planning decisions are logged using the `nvm_goal` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;
use std::collections::BTreeSet;

use nvm_inventory::DeviceCatalog;
use nvm_sdk::capabilities::NvmCapabilities;
use nvm_sdk::config::NvmConfiguration;
use nvm_sdk::device::{Device, DeviceCapabilities, Uid};
use nvm_sdk::error::{NvmError, Violation};
use nvm_sdk::goal::{ConfigGoal, ConfigGoalStatus, GoalInput, GoalSlot, PersistentMemType, ReserveDimm};
use nvm_sdk::interleave::{InterleaveFormat, InterleaveSet, InterleaveSetHealth, InterleaveType, InterleaveWays};
use nvm_sdk::service::NamespaceInventory;
use nvm_sdk::NVM_MAX_DEVICES_PER_SOCKET;

use crate::validate;

/// A validated capacity plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalPlan {
    /// One goal per target DIMM, in topology order.
    pub goals: Vec<ConfigGoal>,
    /// The App Direct interleave sets the goals form, in creation order.
    pub interleave_sets: Vec<InterleaveSet>,
}

/// A failed plan.
///
/// When the failure is attributable to individual DIMMs, `goals` carries every target's goal with its status so the
/// caller can see which DIMMs were rejected. Otherwise it is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanError {
    pub kind: NvmError,
    pub goals: Vec<ConfigGoal>,
}

impl PlanError {
    /// Goals that were rejected.
    pub fn rejected(&self) -> impl Iterator<Item = &ConfigGoal> {
        self.goals.iter().filter(|goal| goal.status.is_failure())
    }
}

impl From<NvmError> for PlanError {
    fn from(kind: NvmError) -> Self {
        PlanError { kind, goals: Vec::new() }
    }
}

impl From<PlanError> for NvmError {
    fn from(value: PlanError) -> Self {
        value.kind
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        let rejected = self.rejected().count();
        if rejected > 0 {
            write!(f, " ({rejected} of {} DIMMs rejected)", self.goals.len())?;
        }
        Ok(())
    }
}

impl core::error::Error for PlanError {}

/// Rounds `value` down to a multiple of `alignment`.
fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value - value % alignment
}

/// `value * percent / 100`, rounded down, without intermediate overflow.
fn percent_of(value: u64, percent: u8) -> u64 {
    (value as u128 * percent as u128 / 100) as u64
}

/// Plans capacity goals against one catalog snapshot.
pub struct GoalPlanner<'a> {
    catalog: &'a DeviceCatalog,
    capabilities: &'a NvmCapabilities,
    config: &'a NvmConfiguration,
}

impl<'a> GoalPlanner<'a> {
    pub fn new(catalog: &'a DeviceCatalog, capabilities: &'a NvmCapabilities, config: &'a NvmConfiguration) -> Self {
        Self { catalog, capabilities, config }
    }

    /// Plans a goal for the target devices, or for every manageable device when `targets` is empty.
    ///
    /// `current_sets` are the interleave sets currently mapped by the BIOS; a set touching a target must be fully
    /// targeted since the goal replaces it.
    pub fn plan(
        &self,
        input: &GoalInput,
        targets: &[Uid],
        namespaces: &dyn NamespaceInventory,
        current_sets: &[InterleaveSet],
    ) -> Result<GoalPlan, PlanError> {
        input.validate()?;
        self.check_platform(input)?;

        let targets = self.catalog.resolve_targets(targets)?;
        validate::check_namespaces(&targets, namespaces)?;
        validate::check_current_sets(&targets, current_sets)?;

        log::debug!(target: "nvm_goal", "Planning {:?} for {} DIMMs", input, targets.len());

        let mut builder = PlanBuilder::new(self, input, &targets);
        let sockets: BTreeSet<u16> = targets.iter().map(|device| device.socket_id()).collect();
        for socket_id in sockets {
            let socket_targets: Vec<&Device> =
                targets.iter().copied().filter(|device| device.socket_id() == socket_id).collect();
            builder.plan_socket(socket_id, &socket_targets)?;
        }
        builder.finish()
    }

    /// Rejects requests the platform as a whole cannot satisfy.
    fn check_platform(&self, input: &GoalInput) -> Result<(), NvmError> {
        if input.mirrored && input.persistent_mem_type == PersistentMemType::AppDirectNotInterleaved {
            return Err(NvmError::InvalidParameter("mirrored App Direct must be interleaved"));
        }
        let platform = &self.capabilities.platform;
        if !platform.bios_config_support {
            return Err(NvmError::NotSupported("BIOS does not support configuration goals"));
        }
        if self.capabilities.sku.sku_violation {
            return Err(NvmError::NotSupported("a DIMM is configured outside of its SKU"));
        }
        if input.volatile_percent > 0 && !self.capabilities.memory_mode_usable() {
            return Err(NvmError::NotSupported("Memory Mode"));
        }
        if input.wants_app_direct() && !self.capabilities.app_direct_usable() {
            return Err(NvmError::NotSupported("App Direct"));
        }
        if input.mirrored && !platform.memory_mirror_supported {
            return Err(NvmError::NotSupported("mirrored App Direct"));
        }
        Ok(())
    }

    fn volatile_alignment(&self) -> u64 {
        self.capabilities.platform.memory_mode.alignment().unwrap_or(self.config.volatile_alignment)
    }

    fn app_direct_alignment(&self) -> u64 {
        self.capabilities.platform.app_direct_mode.alignment().unwrap_or(self.config.app_direct_alignment)
    }

    /// Densest supported format for the requested width: largest IMC size, then largest channel size.
    fn select_format(&self, ways: InterleaveWays) -> Option<InterleaveFormat> {
        self.capabilities
            .app_direct_formats()
            .iter()
            .filter(|format| format.ways == ways)
            .max_by_key(|format| (format.imc, format.channel, format.recommended))
            .copied()
    }
}

/// Per-DIMM sizing before interleave sets are formed.
#[derive(Debug, Clone, Copy)]
struct Sizing {
    volatile: u64,
    app_direct: u64,
}

struct PlanBuilder<'p, 'a> {
    planner: &'p GoalPlanner<'a>,
    input: &'p GoalInput,
    devices: Vec<&'a Device>,
    goals: Vec<ConfigGoal>,
    sets: Vec<InterleaveSet>,
    /// `None` once every App Direct index is taken.
    next_index: Option<u8>,
}

impl<'p, 'a> PlanBuilder<'p, 'a> {
    fn new(planner: &'p GoalPlanner<'a>, input: &'p GoalInput, targets: &[&'a Device]) -> Self {
        let goals = targets
            .iter()
            .map(|device| ConfigGoal {
                uid: device.uid.clone(),
                socket_id: device.socket_id(),
                volatile_size: 0,
                storage_capacity: device.capacity,
                slots: Vec::new(),
                status: ConfigGoalStatus::New,
            })
            .collect();
        Self { planner, input, devices: targets.to_vec(), goals, sets: Vec::new(), next_index: Some(0) }
    }

    fn position(&self, device: &Device) -> usize {
        self.devices.iter().position(|candidate| candidate.uid == device.uid).unwrap_or_default()
    }

    fn reject(&mut self, device: &Device, status: ConfigGoalStatus) {
        let position = self.position(device);
        log::warn!(target: "nvm_goal", "Goal for {} rejected: {:?}", device.uid, status);
        self.goals[position].status = status;
    }

    fn sizing(&self, device: &Device, reserved: bool) -> Sizing {
        let volatile = if reserved {
            0
        } else {
            align_down(percent_of(device.capacity, self.input.volatile_percent), self.planner.volatile_alignment())
        };
        if !self.input.wants_app_direct() {
            return Sizing { volatile, app_direct: 0 };
        }
        let persistent = device.capacity - volatile;
        let budget = persistent - percent_of(persistent, self.input.reserved_percent);
        let mut alignment = self.planner.app_direct_alignment();
        if self.input.mirrored && !reserved {
            alignment = alignment.saturating_mul(2);
        }
        Sizing { volatile, app_direct: align_down(budget, alignment) }
    }

    fn apply_volatile(&mut self, device: &Device, sizing: Sizing) {
        if sizing.volatile > 0 && !device.device_capabilities.contains(DeviceCapabilities::MEMORY_MODE) {
            log::warn!(target: "nvm_goal", "{} does not support Memory Mode", device.uid);
            self.reject(device, ConfigGoalStatus::BadRequest);
            return;
        }
        let position = self.position(device);
        let goal = &mut self.goals[position];
        goal.volatile_size = sizing.volatile;
        goal.storage_capacity = device.capacity - sizing.volatile;
    }

    fn plan_socket(&mut self, socket_id: u16, targets: &[&'a Device]) -> Result<(), PlanError> {
        if targets.len() > NVM_MAX_DEVICES_PER_SOCKET {
            return Err(NvmError::from(Violation::TooManyDimmsInSet { socket_id }).into());
        }

        let (interleaved, reserved) = match self.input.reserve_dimm {
            ReserveDimm::AppDirectNotInterleaved => match targets.split_last() {
                Some((last, rest)) if !rest.is_empty() => (rest, Some(*last)),
                _ => return Err(NvmError::from(Violation::ReserveDimmRequiresTwoDimms { socket_id }).into()),
            },
            _ => (targets, None),
        };

        for device in interleaved {
            let sizing = self.sizing(device, false);
            self.apply_volatile(device, sizing);
        }
        if let Some(device) = reserved {
            let sizing = self.sizing(device, true);
            self.apply_volatile(device, sizing);
        }

        if self.input.wants_app_direct() {
            match self.input.persistent_mem_type {
                PersistentMemType::AppDirect => {
                    for group in group_by_sku(interleaved) {
                        self.build_set(socket_id, &group, false);
                    }
                }
                PersistentMemType::AppDirectNotInterleaved => {
                    for device in interleaved {
                        self.build_set(socket_id, &[*device], false);
                    }
                }
            }
            if let Some(device) = reserved {
                log::debug!(target: "nvm_goal", "Reserving {} on socket {}", device.uid, socket_id);
                self.build_set(socket_id, &[device], true);
            }
        }
        Ok(())
    }

    /// Forms one interleave set from DIMMs of identical capacity and SKU.
    fn build_set(&mut self, socket_id: u16, members: &[&'a Device], reserved: bool) {
        let Some(first) = members.first() else {
            return;
        };
        // A set either includes every member or none of them.
        if members.iter().any(|device| self.goals[self.position(device)].status.is_failure()) {
            for device in members {
                self.reject(device, ConfigGoalStatus::BadRequest);
            }
            return;
        }

        let sizing = self.sizing(first, reserved);
        if sizing.app_direct == 0 {
            log::debug!(target: "nvm_goal", "No App Direct capacity left on {} after alignment", first.uid);
            return;
        }
        if let Some(device) =
            members.iter().find(|device| !device.device_capabilities.contains(DeviceCapabilities::APP_DIRECT))
        {
            log::warn!(target: "nvm_goal", "{} does not support App Direct", device.uid);
            for member in members {
                self.reject(member, ConfigGoalStatus::BadRequest);
            }
            return;
        }
        let single = members.len() == 1;
        let mirrored = self.input.mirrored && !reserved;
        if mirrored && single {
            log::warn!(target: "nvm_goal", "Mirrored App Direct needs at least two DIMMs on socket {}", socket_id);
            self.reject(first, ConfigGoalStatus::BadRequest);
            return;
        }

        let format = InterleaveWays::from_count(members.len()).and_then(|ways| self.planner.select_format(ways));
        let Some(format) = format else {
            log::warn!(
                target: "nvm_goal",
                "No supported {}-way App Direct format on socket {}",
                members.len(),
                socket_id
            );
            for member in members {
                self.reject(member, ConfigGoalStatus::InsufficientResources);
            }
            return;
        };

        let interleave_type = if mirrored {
            InterleaveType::Mirrored
        } else if single {
            InterleaveType::NotInterleaved
        } else {
            InterleaveType::Interleaved
        };
        let Some(appdirect_index) = self.next_index else {
            log::warn!(target: "nvm_goal", "No App Direct index left for a set on socket {}", socket_id);
            for member in members {
                self.reject(member, ConfigGoalStatus::InsufficientResources);
            }
            return;
        };
        self.next_index = appdirect_index.checked_add(1);

        let slot = GoalSlot {
            interleave_type,
            appdirect_size: sizing.app_direct,
            imc: format.imc,
            channel: format.channel,
            ways: format.ways,
            appdirect_index,
        };
        for device in members {
            let position = self.position(device);
            let goal = &mut self.goals[position];
            goal.slots.push(slot);
            goal.storage_capacity = device.capacity - goal.volatile_size - goal.appdirect_size();
        }

        let size = sizing.app_direct * members.len() as u64;
        log::info!(
            target: "nvm_goal",
            "Interleave set {} on socket {}: {} DIMMs, {}, size {:#x}",
            appdirect_index,
            socket_id,
            members.len(),
            format,
            size
        );
        self.sets.push(InterleaveSet {
            set_index: appdirect_index as u32,
            socket_id,
            size,
            available_size: if mirrored { size / 2 } else { size },
            format,
            dimms: members.iter().map(|device| device.uid.clone()).collect(),
            mirrored,
            health: InterleaveSetHealth::Unknown,
            encryption: InterleaveSet::encryption_for(members.iter().copied()),
            erase_capable: InterleaveSet::erase_capable_for(members.iter().copied()),
        });
    }

    fn finish(mut self) -> Result<GoalPlan, PlanError> {
        for (goal, device) in self.goals.iter_mut().zip(self.devices.iter()) {
            if goal.status.is_failure() {
                continue;
            }
            if let Err(err) = validate::check_device_goal(goal, device) {
                log::warn!(target: "nvm_goal", "Goal for {} failed validation: {}", device.uid, err);
                goal.status = ConfigGoalStatus::BadRequest;
            }
        }

        if self.goals.iter().any(|goal| goal.status == ConfigGoalStatus::InsufficientResources) {
            return Err(PlanError {
                kind: NvmError::ResourceExhausted("no interleave format or App Direct index available"),
                goals: self.goals,
            });
        }
        if self.goals.iter().any(|goal| goal.status.is_failure()) {
            return Err(PlanError { kind: Violation::GoalRejected.into(), goals: self.goals });
        }
        if let Err(kind) = validate::check_set_completeness(&self.goals) {
            return Err(PlanError { kind, goals: self.goals });
        }
        Ok(GoalPlan { goals: self.goals, interleave_sets: self.sets })
    }
}

/// Groups DIMMs by capacity and SKU, in order of each group's first member.
fn group_by_sku<'a>(devices: &[&'a Device]) -> Vec<Vec<&'a Device>> {
    let mut groups: Vec<Vec<&'a Device>> = Vec::new();
    for device in devices {
        match groups
            .iter_mut()
            .find(|group| group[0].capacity == device.capacity && group[0].dimm_sku == device.dimm_sku)
        {
            Some(group) => group.push(device),
            None => groups.push(vec![device]),
        }
    }
    groups
}
