//! Goal Validation
//!
//! Checks shared by planning, committing and loading goals. A goal set is only ever committed whole, so these checks
//! look at the set as a unit: every multi-DIMM interleave set it describes must be described completely.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::collections::{BTreeMap, BTreeSet};

use nvm_inventory::DeviceCatalog;
use nvm_sdk::device::{Device, Uid};
use nvm_sdk::error::{NvmError, Result, Violation};
use nvm_sdk::goal::{ConfigGoal, GoalSlot};
use nvm_sdk::interleave::InterleaveSet;
use nvm_sdk::service::NamespaceInventory;
use nvm_sdk::{MAX_IS_PER_DIMM, NVM_MAX_DEVICES_PER_SOCKET};

/// Fails if any target has namespaces carved from its capacity.
pub fn check_namespaces(targets: &[&Device], namespaces: &dyn NamespaceInventory) -> Result<()> {
    for device in targets {
        if namespaces.has_namespaces(&device.uid)? {
            log::warn!(target: "nvm_goal", "Namespaces exist on {}", device.uid);
            return Err(Violation::NamespacesPresent(device.uid.clone()).into());
        }
    }
    Ok(())
}

/// Fails if a current interleave set spans a target and a DIMM that is not a target.
pub fn check_current_sets(targets: &[&Device], current_sets: &[InterleaveSet]) -> Result<()> {
    let targeted: BTreeSet<&Uid> = targets.iter().map(|device| &device.uid).collect();
    for set in current_sets {
        let Some(touched) = set.dimms.iter().find(|uid| targeted.contains(uid)) else {
            continue;
        };
        if let Some(outside) = set.dimms.iter().find(|uid| !targeted.contains(uid)) {
            log::warn!(
                target: "nvm_goal",
                "Interleave set {} spans {} but {} is not targeted",
                set.set_index,
                touched,
                outside
            );
            return Err(Violation::GoalAffectsUnspecifiedDimm(touched.clone()).into());
        }
    }
    Ok(())
}

/// Validates a goal set against a catalog and returns the devices it targets, in goal order.
pub fn check_goal_set<'a>(goals: &[ConfigGoal], catalog: &'a DeviceCatalog) -> Result<Vec<&'a Device>> {
    if goals.is_empty() {
        return Err(NvmError::InvalidParameter("goal set is empty"));
    }

    let mut seen = BTreeSet::new();
    let mut devices = Vec::with_capacity(goals.len());
    for goal in goals {
        let device = catalog.manageable_device(&goal.uid)?;
        if !seen.insert(&goal.uid) {
            return Err(Violation::DuplicateGoal(goal.uid.clone()).into());
        }
        if goal.socket_id != device.socket_id() {
            return Err(NvmError::InvalidParameter("goal socket does not match the device"));
        }
        if goal.status.is_failure() {
            return Err(NvmError::InvalidParameter("goal was rejected during planning"));
        }
        check_device_goal(goal, device)?;
        devices.push(device);
    }

    check_set_completeness(goals)?;
    Ok(devices)
}

/// Checks a single DIMM's goal against the DIMM's capacity and the per-DIMM set limit.
pub fn check_device_goal(goal: &ConfigGoal, device: &Device) -> Result<()> {
    if goal.slots.len() > MAX_IS_PER_DIMM {
        return Err(Violation::TooManyInterleaveSets(device.uid.clone()).into());
    }
    let allocated = goal
        .slots
        .iter()
        .map(|slot| slot.appdirect_size)
        .try_fold(goal.volatile_size, u64::checked_add)
        .and_then(|total| total.checked_add(goal.storage_capacity));
    match allocated {
        Some(total) if total <= device.capacity => Ok(()),
        _ => Err(Violation::CapacityExceeded(device.uid.clone()).into()),
    }
}

/// Every interleave set a goal set describes must list exactly `ways` members, all agreeing on the geometry.
pub fn check_set_completeness(goals: &[ConfigGoal]) -> Result<()> {
    let mut sets: BTreeMap<(u16, u8), Vec<&GoalSlot>> = BTreeMap::new();
    for goal in goals {
        for slot in &goal.slots {
            sets.entry((goal.socket_id, slot.appdirect_index)).or_default().push(slot);
        }
    }

    for ((socket_id, appdirect_index), slots) in sets {
        let incomplete = Violation::IncompleteInterleaveSet { socket_id, appdirect_index };
        let first = slots[0];
        let consistent = slots.iter().all(|slot| {
            slot.ways == first.ways
                && slot.interleave_type == first.interleave_type
                && slot.appdirect_size == first.appdirect_size
                && slot.imc == first.imc
                && slot.channel == first.channel
        });
        if !consistent {
            return Err(incomplete.into());
        }
        if slots.len() > NVM_MAX_DEVICES_PER_SOCKET {
            return Err(Violation::TooManyDimmsInSet { socket_id }.into());
        }
        if slots.len() != first.ways.count() {
            log::warn!(
                target: "nvm_goal",
                "Interleave set {} on socket {} has {} of {} members",
                appdirect_index,
                socket_id,
                slots.len(),
                first.ways.count()
            );
            return Err(incomplete.into());
        }
    }
    Ok(())
}
