//! Goal files moved between platforms.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use nvm_goal::persistence::GoalFile;
use nvm_sdk::error::{NvmError, ReturnCode, Violation};
use nvm_sdk::goal::GoalInput;

use crate::nvm_core_integration::common::{description, open, uid, GIB};

#[test]
fn dumped_goals_load_onto_a_matching_platform() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("goal.json");

    let source = open(description("host-a", &[(0, 64 * GIB), (0, 64 * GIB), (1, 64 * GIB)]));
    let dumped = {
        let mut guard = source.session.acquire();
        let goals = guard.create_goal(&GoalInput { volatile_percent: 20, ..Default::default() }, &[]).unwrap();
        assert_eq!(guard.dump_goal(&path).unwrap(), 3);
        goals
    };

    let file = GoalFile::read(&path).unwrap();
    assert_eq!(file.goals.len(), 3);
    assert_eq!((file.goals[2].socket_id, file.goals[2].dimm_index), (1, 0));

    // Larger DIMMs on the target are fine; goals are applied as recorded.
    let target = open(description("host-b", &[(0, 64 * GIB), (0, 64 * GIB), (1, 128 * GIB)]));
    let mut guard = target.session.acquire();
    let loaded = guard.load_goal(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0].uid, uid("host-b-0-0"));
    assert_eq!(loaded[2].uid, uid("host-b-1-0"));
    for (loaded, dumped) in loaded.iter().zip(&dumped) {
        assert_eq!(loaded.volatile_size, dumped.volatile_size);
        assert_eq!(loaded.slots, dumped.slots);
    }
    assert_eq!(guard.get_goal(&[]).unwrap(), loaded);
}

#[test]
fn smaller_dimms_reject_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("goal.json");

    let source = open(description("host-a", &[(0, 64 * GIB), (0, 64 * GIB)]));
    {
        let mut guard = source.session.acquire();
        guard.create_goal(&GoalInput::default(), &[]).unwrap();
        guard.dump_goal(&path).unwrap();
    }

    let target = open(description("host-b", &[(0, 64 * GIB), (0, 32 * GIB)]));
    let mut guard = target.session.acquire();
    let err = guard.load_goal(&path).unwrap_err();
    assert_eq!(
        err,
        NvmError::ValidationFailed(Violation::TargetCapacityTooSmall {
            uid: uid("host-b-0-1"),
            required: 64 * GIB,
            available: 32 * GIB,
        })
    );
    assert_eq!(err.return_code(), ReturnCode::LoadImproperConfig);
    assert!(target.platform.commands().is_empty());
}

#[test]
fn missing_dimms_reject_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("goal.json");

    let source = open(description("host-a", &[(0, 32 * GIB), (1, 32 * GIB)]));
    {
        let mut guard = source.session.acquire();
        guard.create_goal(&GoalInput::default(), &[]).unwrap();
        guard.dump_goal(&path).unwrap();
    }

    let target = open(description("host-b", &[(0, 32 * GIB)]));
    let mut guard = target.session.acquire();
    assert_eq!(
        guard.load_goal(&path),
        Err(NvmError::ValidationFailed(Violation::MissingTargetDimm { socket_id: 1, dimm_index: 0 }))
    );
}

#[test]
fn nothing_to_dump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("goal.json");

    let harness = open(description("host-a", &[(0, 32 * GIB)]));
    let mut guard = harness.session.acquire();
    assert_eq!(guard.dump_goal(&path), Err(NvmError::ValidationFailed(Violation::NoGoalStaged)));
    assert!(!path.exists());
}

#[test]
fn unreadable_files_are_io_errors() {
    let dir = tempfile::tempdir().unwrap();
    let harness = open(description("host-a", &[(0, 32 * GIB)]));
    let mut guard = harness.session.acquire();

    let err = guard.load_goal(&dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, NvmError::Io(_)));

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{ not json").unwrap();
    assert!(matches!(guard.load_goal(&garbage), Err(NvmError::Parse(_))));
}
