//! Session exclusivity, discovery and raw command pass-through.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::sync::Arc;

use nvm_core::{NvmSession, PlatformServices, SimulatedPlatform};
use nvm_sdk::config::NvmConfiguration;
use nvm_sdk::error::NvmError;
use nvm_sdk::goal::GoalInput;
use nvm_sdk::mailbox::{decode_security_state, opcode, sub_opcode};
use nvm_sdk::security::{SecurityState, SecurityStatus};

use crate::nvm_core_integration::common::{self, description, open, open_yaml, uid, GIB};

#[test]
fn only_one_caller_holds_the_session() {
    let harness = open_yaml(common::TWO_DIMMS);
    let session = &harness.session;

    let guard = session.acquire();
    std::thread::scope(|scope| {
        let contender = scope.spawn(|| session.try_acquire().is_none());
        assert!(contender.join().unwrap());
    });
    drop(guard);

    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| session.acquire().devices().len());
        assert_eq!(waiter.join().unwrap(), 2);
    });
}

#[test]
fn failed_operations_release_the_session() {
    let harness = open(description("dimm", &[(0, 32 * GIB)]));
    {
        let mut guard = harness.session.acquire();
        assert!(guard.create_goal(&GoalInput { volatile_percent: 150, ..Default::default() }, &[]).is_err());
    }
    assert!(harness.session.try_acquire().is_some());
}

#[test]
fn discovery_reports_every_device() {
    let mut platform = description("dimm", &[(1, 32 * GIB), (0, 32 * GIB)]);
    platform.devices[0].manageability = nvm_sdk::device::ManageabilityState::NonFunctional;
    let harness = open(platform);
    let mut guard = harness.session.acquire();

    let uids: Vec<_> = guard.devices().iter().map(|device| device.uid.clone()).collect();
    assert_eq!(uids, vec![uid("dimm-0-0"), uid("dimm-1-0")]);
    assert!(guard.capabilities().platform.bios_config_support);
    assert!(guard.capabilities().sku.app_direct_sku);
    assert!(guard.interleave_sets().unwrap().is_empty());
    assert!(guard.jobs().unwrap().is_empty());

    guard.rediscover().unwrap();
    assert_eq!(guard.devices().len(), 2);
    assert_eq!(guard.security_state(&uid("dimm-0-0")).unwrap(), SecurityState::Disabled);
    assert_eq!(guard.security_state(&uid("dimm-1-0")), Err(NvmError::DeviceNotManageable(uid("dimm-1-0"))));
}

#[test]
fn raw_commands_cannot_alias_validated_operations() {
    let harness = open(description("dimm", &[(0, 32 * GIB)]));
    let guard = harness.session.acquire();
    let dimm = uid("dimm-0-0");

    for (op, sub) in [
        (opcode::SET_SECURITY_INFO, sub_opcode::SET_PASSPHRASE),
        (opcode::SET_SECURITY_INFO, sub_opcode::SECURE_ERASE),
        (opcode::SET_ADMIN_FEATURES, sub_opcode::PLATFORM_CONFIG_DATA),
    ] {
        assert!(matches!(guard.pass_through(&dimm, op, sub, &[]), Err(NvmError::NotSupported(_))));
    }
    assert!(harness.platform.commands().is_empty());

    let response = guard.pass_through(&dimm, opcode::GET_SECURITY_INFO, sub_opcode::GET_SECURITY_STATE, &[]).unwrap();
    assert_eq!(decode_security_state(&response).unwrap(), SecurityStatus::empty());
    assert_eq!(guard.pass_through(&uid("dimm-5-5"), 0x01, 0x00, &[]), Err(NvmError::DeviceNotFound(uid("dimm-5-5"))));
}

#[test]
fn events_can_be_switched_off() {
    let platform = Arc::new(SimulatedPlatform::new(description("dimm", &[(0, 32 * GIB)])));
    let config = NvmConfiguration::from_yaml("record_events: false\n").unwrap();
    let session = NvmSession::open(PlatformServices::from_platform(platform.clone()), config).unwrap();
    let mut guard = session.acquire();

    assert!(guard.unlock(&uid("dimm-0-0"), "secret").is_err());
    assert!(platform.events().is_empty());
}
