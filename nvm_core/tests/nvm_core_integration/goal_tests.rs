//! Capacity goal planning and staging through a session.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use nvm_core::Fault;
use nvm_sdk::error::{NvmError, ReturnCode, Violation};
use nvm_sdk::event::Severity;
use nvm_sdk::goal::{ConfigGoalStatus, GoalInput, PersistentMemType, ReserveDimm};
use nvm_sdk::interleave::{InterleaveSize, InterleaveType, InterleaveWays};
use nvm_sdk::mailbox::{opcode, sub_opcode, FwStatus};
use nvm_sdk::security::SecurityState;

use crate::nvm_core_integration::common::{self, description, open, open_yaml, uid, GIB, MIB};

#[test]
fn two_dimms_form_one_shared_set() {
    let harness = open_yaml(common::TWO_DIMMS);
    let mut guard = harness.session.acquire();
    let input = GoalInput { volatile_percent: 25, ..Default::default() };

    let plan = guard.plan_goal(&input, &[]).unwrap();
    assert_eq!(plan.interleave_sets.len(), 1);
    let set = &plan.interleave_sets[0];
    assert_eq!(set.size, 2 * 75 * GIB);
    assert_eq!(set.format.ways, InterleaveWays::Ways2);
    assert_eq!(set.format.channel, InterleaveSize::Size4KB);
    assert_eq!(set.dimms, vec![uid("dimm-0-0"), uid("dimm-0-1")]);

    let goals = guard.create_goal(&input, &[]).unwrap();
    assert_eq!(goals, plan.goals);
    for goal in &goals {
        assert_eq!(goal.volatile_size, 25 * GIB);
        assert_eq!(goal.slots.len(), 1);
        assert_eq!(goal.slots[0].appdirect_index, 0);
        assert_eq!(goal.slots[0].appdirect_size, 75 * GIB);
        assert_eq!(goal.slots[0].interleave_type, InterleaveType::Interleaved);
        assert_eq!(goal.storage_capacity, 512 * MIB);
    }

    assert_eq!(guard.get_goal(&[]).unwrap(), goals);
    assert!(harness.platform.events().is_empty());
}

#[test]
fn reserved_dimm_gets_a_separate_region() {
    let harness = open(description("dimm", &[(0, 64 * GIB), (0, 64 * GIB), (0, 64 * GIB)]));
    let mut guard = harness.session.acquire();
    let input = GoalInput { reserve_dimm: ReserveDimm::AppDirectNotInterleaved, ..Default::default() };

    let goals = guard.create_goal(&input, &[]).unwrap();
    assert_eq!(goals.len(), 3);
    for goal in &goals[..2] {
        assert_eq!(goal.slots[0].appdirect_index, 0);
        assert_eq!(goal.slots[0].ways, InterleaveWays::Ways2);
    }
    assert_eq!(goals[2].uid, uid("dimm-0-2"));
    assert_eq!(goals[2].slots[0].appdirect_index, 1);
    assert_eq!(goals[2].slots[0].interleave_type, InterleaveType::NotInterleaved);
    assert_eq!(goals[2].slots[0].appdirect_size, 64 * GIB);
}

#[test]
fn planning_touches_no_hardware() {
    let harness = open(description("dimm", &[(0, 32 * GIB), (0, 32 * GIB)]));
    let guard = harness.session.acquire();
    let input = GoalInput { persistent_mem_type: PersistentMemType::AppDirectNotInterleaved, ..Default::default() };

    let goals = guard.compute_goal(&input, &[]).unwrap();
    assert_eq!(goals.len(), 2);
    assert_ne!(goals[0].slots[0].appdirect_index, goals[1].slots[0].appdirect_index);
    assert!(harness.platform.commands().is_empty());
}

#[test]
fn rejected_plans_report_every_target() {
    let harness = open(description("dimm", &[(0, 16 * GIB); 5]));
    let guard = harness.session.acquire();

    let err = guard.plan_goal(&GoalInput::default(), &[]).unwrap_err();
    assert_eq!(err.goals.len(), 5);
    assert!(err.goals.iter().all(|goal| goal.status == ConfigGoalStatus::InsufficientResources));
    assert!(harness.platform.commands().is_empty());

    let events = harness.platform.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
}

#[test]
fn namespaces_block_goal_creation() {
    let mut platform = description("dimm", &[(0, 32 * GIB), (0, 32 * GIB)]);
    platform.namespaces = vec![uid("dimm-0-1")];
    let harness = open(platform);
    let mut guard = harness.session.acquire();

    let err = guard.create_goal(&GoalInput::default(), &[]).unwrap_err();
    assert_eq!(err, NvmError::ValidationFailed(Violation::NamespacesPresent(uid("dimm-0-1"))));
    assert_eq!(err.return_code(), ReturnCode::RegionGoalNamespaceExists);
    assert!(guard.get_goal(&[]).unwrap().is_empty());
}

#[test]
fn rejected_stage_restores_earlier_dimms() {
    let harness = open(description("dimm", &[(0, 32 * GIB), (0, 32 * GIB)]));
    let mut guard = harness.session.acquire();
    let original = guard.create_goal(&GoalInput::default(), &[]).unwrap();

    harness.platform.inject(Fault::rejected(
        &uid("dimm-0-1"),
        opcode::SET_ADMIN_FEATURES,
        Some(sub_opcode::PLATFORM_CONFIG_DATA),
        FwStatus::ConfigLocked,
    ));
    let err = guard.create_goal(&GoalInput { volatile_percent: 50, ..Default::default() }, &[]).unwrap_err();
    assert_eq!(err, NvmError::FirmwareRejected { uid: uid("dimm-0-1"), status: FwStatus::ConfigLocked });

    assert_eq!(guard.get_goal(&[]).unwrap(), original);
    assert_eq!(guard.unsettled().count(), 0);
}

#[test]
fn lost_stage_leaves_the_dimm_unsettled_until_read() {
    let harness = open(description("dimm", &[(0, 32 * GIB), (0, 32 * GIB)]));
    let mut guard = harness.session.acquire();
    let target = uid("dimm-0-1");

    harness.platform.inject(Fault::lost(&target, opcode::SET_ADMIN_FEATURES, sub_opcode::PLATFORM_CONFIG_DATA));
    let err = guard.create_goal(&GoalInput::default(), &[]).unwrap_err();
    assert!(matches!(err, NvmError::TransportFailure { uid: ref failed, .. } if *failed == target));
    assert_eq!(guard.unsettled().cloned().collect::<Vec<_>>(), vec![target.clone()]);

    // Nothing is staged on either DIMM, and the lost one refuses changes until read back.
    assert!(harness.platform.staged_payload(&uid("dimm-0-0")).is_empty());
    assert_eq!(guard.create_goal(&GoalInput::default(), &[]), Err(NvmError::UnknownState(target.clone())));
    assert_eq!(guard.delete_goal(&[target.clone()]), Err(NvmError::UnknownState(target.clone())));

    assert!(guard.get_goal(&[target]).unwrap().is_empty());
    assert_eq!(guard.unsettled().count(), 0);
    assert_eq!(guard.create_goal(&GoalInput::default(), &[]).unwrap().len(), 2);
}

#[test]
fn shared_sets_are_deleted_as_a_whole() {
    let harness = open(description("dimm", &[(0, 32 * GIB), (0, 32 * GIB), (1, 32 * GIB)]));
    let mut guard = harness.session.acquire();
    guard.create_goal(&GoalInput::default(), &[]).unwrap();

    assert_eq!(
        guard.delete_goal(&[uid("dimm-0-0")]),
        Err(NvmError::ValidationFailed(Violation::GoalAffectsUnspecifiedDimm(uid("dimm-0-0"))))
    );
    assert_eq!(guard.get_goal(&[]).unwrap().len(), 3);

    guard.delete_goal(&[uid("dimm-1-0")]).unwrap();
    assert_eq!(guard.get_goal(&[]).unwrap().len(), 2);

    guard.delete_goal(&[]).unwrap();
    assert!(guard.get_goal(&[]).unwrap().is_empty());
}

#[test]
fn goals_on_secured_dimms_raise_a_warning() {
    let mut platform = description("dimm", &[(0, 32 * GIB), (0, 32 * GIB)]);
    platform.devices[0].lock_state = SecurityState::Unlocked;
    platform.passphrases.insert(uid("dimm-0-0"), "secret".into());
    let harness = open(platform);
    let mut guard = harness.session.acquire();

    guard.create_goal(&GoalInput::default(), &[]).unwrap();
    let events = harness.platform.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].code, ReturnCode::WarnGoalCreationSecurityUnlocked);
    assert_eq!(events[0].uid, Some(uid("dimm-0-0")));
}

#[test]
fn unknown_targets_fail_before_staging() {
    let harness = open(description("dimm", &[(0, 32 * GIB), (0, 32 * GIB)]));
    let mut guard = harness.session.acquire();

    let err = guard.create_goal(&GoalInput::default(), &[uid("dimm-9-9")]).unwrap_err();
    assert_eq!(err, NvmError::DeviceNotFound(uid("dimm-9-9")));
    assert!(harness.platform.commands().is_empty());
}
