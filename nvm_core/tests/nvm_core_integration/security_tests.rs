//! Security state machine flows through a session.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use nvm_core::{Fault, PlatformDescription, SessionGuard};
use nvm_sdk::device::Uid;
use nvm_sdk::error::{NvmError, ReturnCode};
use nvm_sdk::event::{EventType, Severity};
use nvm_sdk::mailbox::{opcode, sub_opcode, FwStatus};
use nvm_sdk::security::SecurityState;

use crate::nvm_core_integration::common::{description, open, uid, GIB};

/// One DIMM starting in `state`, with passphrase `secret` when security is enabled.
fn single(state: SecurityState) -> PlatformDescription {
    let mut platform = description("dimm", &[(0, 32 * GIB)]);
    platform.devices[0].lock_state = state;
    platform.devices[0].master_passphrase_enabled = true;
    if state.is_enabled() {
        platform.passphrases.insert(uid("dimm-0-0"), "secret".into());
    }
    platform
}

fn rejected_with(result: Result<(), NvmError>, expected: FwStatus) {
    match result {
        Err(NvmError::FirmwareRejected { status, .. }) => assert_eq!(status, expected),
        other => panic!("expected a {expected:?} rejection, got {other:?}"),
    }
}

/// Every state changing operation is refused without a command reaching the device.
fn assert_all_refused(guard: &mut SessionGuard<'_>, dimm: &Uid) {
    let results = [
        guard.set_passphrase(dimm, Some("secret"), "another"),
        guard.remove_passphrase(dimm, "secret"),
        guard.unlock(dimm, "secret"),
        guard.freeze_lock(dimm),
        guard.erase(dimm, Some("secret")),
        guard.set_master_passphrase(dimm, "master", "another"),
    ];
    for result in results {
        assert!(
            matches!(result, Err(NvmError::FirmwareRejected { .. } | NvmError::NotSupported(_))),
            "unexpected result {result:?}"
        );
    }
}

#[test]
fn set_passphrase_twice_rotates() {
    let harness = open(single(SecurityState::Disabled));
    let mut guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    guard.set_passphrase(&dimm, None, "first").unwrap();
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Unlocked);

    guard.set_passphrase(&dimm, Some("first"), "second").unwrap();
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Unlocked);

    rejected_with(guard.set_passphrase(&dimm, Some("first"), "third"), FwStatus::IncorrectPassphrase);
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Unlocked);

    guard.remove_passphrase(&dimm, "second").unwrap();
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Disabled);
}

#[test]
fn frozen_devices_refuse_changes_until_reset() {
    let harness = open(single(SecurityState::Unlocked));
    let mut guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    guard.freeze_lock(&dimm).unwrap();
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Frozen);
    assert!(guard.is_frozen(&dimm).unwrap());

    let sent = harness.platform.commands().len();
    assert_all_refused(&mut guard, &dimm);
    assert_eq!(harness.platform.commands().len(), sent);
    assert!(guard.is_frozen(&dimm).unwrap());

    // Rediscovery does not forget the freeze.
    guard.rediscover().unwrap();
    assert!(guard.is_frozen(&dimm).unwrap());

    harness.platform.reset();
    guard.notify_platform_reset();
    assert!(!guard.is_frozen(&dimm).unwrap());
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Unknown);
    assert_eq!(guard.unlock(&dimm, "secret"), Err(NvmError::UnknownState(dimm.clone())));

    assert_eq!(guard.refresh_security_state(&dimm).unwrap(), SecurityState::Locked);
    guard.unlock(&dimm, "secret").unwrap();
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Unlocked);
}

#[test]
fn passphrase_limit_is_terminal() {
    let harness = open(single(SecurityState::Locked));
    let mut guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    rejected_with(guard.unlock(&dimm, "wrong"), FwStatus::IncorrectPassphrase);
    rejected_with(guard.unlock(&dimm, "wrong"), FwStatus::IncorrectPassphrase);
    rejected_with(guard.unlock(&dimm, "wrong"), FwStatus::SecurityCountExpired);
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::PassphraseLimit);

    let sent = harness.platform.commands().len();
    let err = guard.unlock(&dimm, "secret").unwrap_err();
    assert_eq!(err.return_code(), ReturnCode::SecurityUserPpCountExpired);
    rejected_with(guard.set_passphrase(&dimm, Some("secret"), "another"), FwStatus::SecurityCountExpired);
    assert_eq!(harness.platform.commands().len(), sent);

    assert_eq!(guard.refresh_security_state(&dimm).unwrap(), SecurityState::PassphraseLimit);
}

#[test]
fn lost_responses_leave_the_state_unknown() {
    let harness = open(single(SecurityState::Disabled));
    let mut guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    harness.platform.inject(Fault::response_lost(&dimm, opcode::SET_SECURITY_INFO, sub_opcode::SET_PASSPHRASE));
    let err = guard.set_passphrase(&dimm, None, "first").unwrap_err();
    assert!(matches!(err, NvmError::TransportFailure { .. }));
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Unknown);
    assert_eq!(guard.set_passphrase(&dimm, None, "first"), Err(NvmError::UnknownState(dimm.clone())));

    // The device acted on the command before the response was lost.
    assert_eq!(guard.refresh_security_state(&dimm).unwrap(), SecurityState::Unlocked);
    guard.set_passphrase(&dimm, Some("first"), "second").unwrap();

    let events = harness.platform.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.event_type == EventType::Security && event.severity == Severity::Critical));
    assert_eq!(events[0].code, ReturnCode::DeviceBusy);
}

#[test]
fn failed_read_back_leaves_the_state_unknown() {
    let harness = open(single(SecurityState::Disabled));
    let mut guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    harness.platform.inject(Fault::rejected(
        &dimm,
        opcode::GET_SECURITY_INFO,
        Some(sub_opcode::GET_SECURITY_STATE),
        FwStatus::DeviceBusy,
    ));
    assert_eq!(guard.set_passphrase(&dimm, None, "first"), Err(NvmError::UnknownState(dimm.clone())));
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Unknown);

    // The passphrase was set; nothing more is sent until the state is read back.
    let sent = harness.platform.commands().len();
    assert_eq!(guard.set_passphrase(&dimm, None, "second"), Err(NvmError::UnknownState(dimm.clone())));
    assert_eq!(harness.platform.commands().len(), sent);

    assert_eq!(guard.refresh_security_state(&dimm).unwrap(), SecurityState::Unlocked);
    guard.set_passphrase(&dimm, Some("first"), "second").unwrap();
}

#[test]
fn master_passphrase_changes_once_per_boot() {
    let harness = open(single(SecurityState::Disabled));
    let mut guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    guard.set_master_passphrase(&dimm, "factory", "master").unwrap();
    rejected_with(guard.set_master_passphrase(&dimm, "master", "again"), FwStatus::InvalidSecurityState);

    harness.platform.reset();
    guard.notify_platform_reset();
    guard.refresh_security_state(&dimm).unwrap();
    guard.set_master_passphrase(&dimm, "master", "again").unwrap();
}

#[test]
fn erase_disables_security() {
    let harness = open(single(SecurityState::Unlocked));
    let mut guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    assert!(matches!(guard.erase(&dimm, None), Err(NvmError::InvalidParameter(_))));
    guard.erase(&dimm, Some("secret")).unwrap();
    assert_eq!(guard.security_state(&dimm).unwrap(), SecurityState::Disabled);
}

#[test]
fn unmanageable_devices_are_refused() {
    let mut platform = description("dimm", &[(0, 32 * GIB), (0, 32 * GIB)]);
    platform.devices[1].manageability = nvm_sdk::device::ManageabilityState::InvalidConfig;
    let harness = open(platform);
    let mut guard = harness.session.acquire();

    assert_eq!(guard.devices().len(), 2);
    assert_eq!(guard.freeze_lock(&uid("dimm-0-1")), Err(NvmError::DeviceNotManageable(uid("dimm-0-1"))));
    assert_eq!(guard.unlock(&uid("dimm-7-0"), "secret"), Err(NvmError::DeviceNotFound(uid("dimm-7-0"))));
    assert!(harness.platform.commands().is_empty());
}
