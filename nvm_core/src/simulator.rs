//! Simulated Platform
//!
//! An in-memory platform implementing every collaborator service, used by the integration tests and by `nvmctl`. It
//! is described by a YAML [PlatformDescription] and models the device behavior the session depends on:
//!
//! - Security state, passphrases and the passphrase attempt limit, enforced the way device firmware enforces them.
//! - Platform configuration data areas holding one staged goal per DIMM.
//! - [SimulatedPlatform::reset], which unfreezes every device and locks every secured one.
//! - [Fault] injection for firmware rejections and transport failures, with or without the command taking effect.
//!
//! ```yaml
//! devices:
//!   - uid: "8089-a2-1837-00000001"
//!     handle: { socket_id: 0, channel_id: 0 }
//!     capacity: 137438953472
//!     security_capabilities: PASSPHRASE | UNLOCK_DEVICE | ERASE_CRYPTO
//!     device_capabilities: APP_DIRECT | MEMORY_MODE
//!     lock_state: disabled
//!     manageability: valid_config
//! capabilities:
//!   bios_config_support: true
//!   app_direct_mode: { supported: true, interleave_alignment_size: 30, interleave_formats: [] }
//! ```
//!
//! ## Logging
//!
//! Simulated commands are logged using the `nvm_simulator` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::collections::{BTreeMap, BTreeSet};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use nvm_sdk::capabilities::PlatformCapabilities;
use nvm_sdk::device::{Device, Uid};
use nvm_sdk::error::{NvmError, Result};
use nvm_sdk::event::Event;
use nvm_sdk::interleave::InterleaveSet;
use nvm_sdk::job::Job;
use nvm_sdk::mailbox::{encode_security_state, opcode, split_passphrase_payload, sub_opcode, FirmwareError, FwStatus};
use nvm_sdk::security::{SecurityState, SecurityStatus};
use nvm_sdk::service::{DeviceEnumerator, EventSink, FirmwareMailbox, NamespaceInventory, PassThrough};

use nvm_goal::staging::action;

const fn default_attempts() -> u8 {
    3
}

/// Static description of a simulated platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformDescription {
    pub devices: Vec<Device>,
    pub capabilities: PlatformCapabilities,
    pub interleave_sets: Vec<InterleaveSet>,
    pub jobs: Vec<Job>,
    /// Devices with namespaces carved from their capacity.
    pub namespaces: Vec<Uid>,
    /// User passphrases of devices whose security is enabled at start.
    pub passphrases: BTreeMap<Uid, String>,
    /// Master passphrases. A device without one accepts any current master passphrase.
    pub master_passphrases: BTreeMap<Uid, String>,
    /// Wrong passphrases a device tolerates before reaching its attempt limit.
    #[serde(default = "default_attempts")]
    pub passphrase_attempts: u8,
}

impl PlatformDescription {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|err| NvmError::Parse(format!("platform description: {err}")))
    }
}

/// A scripted failure for the next matching command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub uid: Uid,
    pub opcode: u8,
    /// Matches any sub-opcode when `None`.
    pub sub_opcode: Option<u8>,
    pub error: FirmwareError,
    /// Whether the device acts on the command before the failure is reported.
    pub applied: bool,
}

impl Fault {
    /// The command is lost before reaching the device.
    pub fn lost(uid: &Uid, opcode: u8, sub_opcode: u8) -> Self {
        Self {
            uid: uid.clone(),
            opcode,
            sub_opcode: Some(sub_opcode),
            error: FirmwareError::Transport("injected transport failure".into()),
            applied: false,
        }
    }

    /// The device acts on the command but the response is lost.
    pub fn response_lost(uid: &Uid, opcode: u8, sub_opcode: u8) -> Self {
        Self { applied: true, ..Self::lost(uid, opcode, sub_opcode) }
    }

    /// The device rejects the command with `status`.
    pub fn rejected(uid: &Uid, opcode: u8, sub_opcode: Option<u8>, status: FwStatus) -> Self {
        Self { uid: uid.clone(), opcode, sub_opcode, error: FirmwareError::Status(status), applied: false }
    }

    fn matches(&self, uid: &Uid, opcode: u8, sub_opcode: u8) -> bool {
        self.uid == *uid && self.opcode == opcode && self.sub_opcode.map_or(true, |sub| sub == sub_opcode)
    }
}

#[derive(Debug, Clone)]
struct SimDimm {
    status: SecurityStatus,
    passphrase: Option<Vec<u8>>,
    master_passphrase: Option<Vec<u8>>,
    attempt_limit: u8,
    attempts_left: u8,
    master_attempts_left: u8,
    staged: Vec<u8>,
}

impl SimDimm {
    fn new(device: &Device, description: &PlatformDescription) -> Self {
        let mut status = match device.lock_state {
            SecurityState::Unknown | SecurityState::Disabled => SecurityStatus::empty(),
            SecurityState::Unlocked => SecurityStatus::ENABLED,
            SecurityState::Locked => SecurityStatus::ENABLED | SecurityStatus::LOCKED,
            SecurityState::Frozen => SecurityStatus::ENABLED | SecurityStatus::FROZEN,
            SecurityState::PassphraseLimit => SecurityStatus::ENABLED | SecurityStatus::COUNT_EXPIRED,
            SecurityState::NotSupported => SecurityStatus::NOT_SUPPORTED,
        };
        if device.master_passphrase_enabled {
            status |= SecurityStatus::MASTER_ENABLED;
        }
        Self {
            status,
            passphrase: description.passphrases.get(&device.uid).map(|p| p.as_bytes().to_vec()),
            master_passphrase: description.master_passphrases.get(&device.uid).map(|p| p.as_bytes().to_vec()),
            attempt_limit: description.passphrase_attempts,
            attempts_left: description.passphrase_attempts,
            master_attempts_left: description.passphrase_attempts,
            staged: Vec::new(),
        }
    }

    fn enabled(&self) -> bool {
        self.status.contains(SecurityStatus::ENABLED)
    }

    /// Checks a user passphrase, consuming an attempt when it is wrong.
    fn check_passphrase(&mut self, candidate: &[u8]) -> core::result::Result<(), FwStatus> {
        if self.passphrase.as_deref() == Some(candidate) {
            self.attempts_left = self.attempt_limit;
            return Ok(());
        }
        self.attempts_left = self.attempts_left.saturating_sub(1);
        if self.attempts_left == 0 {
            self.status |= SecurityStatus::COUNT_EXPIRED;
            return Err(FwStatus::SecurityCountExpired);
        }
        Err(FwStatus::IncorrectPassphrase)
    }

    fn check_master_passphrase(&mut self, candidate: &[u8]) -> core::result::Result<(), FwStatus> {
        match &self.master_passphrase {
            None => Ok(()),
            Some(master) if master.as_slice() == candidate => Ok(()),
            Some(_) => {
                self.master_attempts_left = self.master_attempts_left.saturating_sub(1);
                if self.master_attempts_left == 0 {
                    self.status |= SecurityStatus::MASTER_COUNT_EXPIRED;
                    return Err(FwStatus::SecurityCountExpired);
                }
                Err(FwStatus::IncorrectPassphrase)
            }
        }
    }

    fn security_command(&mut self, sub: u8, payload: &[u8]) -> core::result::Result<Vec<u8>, FwStatus> {
        if self.status.contains(SecurityStatus::NOT_SUPPORTED) {
            return Err(FwStatus::UnsupportedCommand);
        }
        let fields = split_passphrase_payload(payload);
        let field = |index: usize| fields.get(index).copied().unwrap_or_default();

        if sub == sub_opcode::SET_MASTER_PASSPHRASE {
            if self.status.contains(SecurityStatus::MASTER_COUNT_EXPIRED) {
                return Err(FwStatus::SecurityCountExpired);
            }
            if !self.status.contains(SecurityStatus::MASTER_ENABLED)
                || self.enabled()
                || self.status.contains(SecurityStatus::FROZEN)
            {
                return Err(FwStatus::InvalidSecurityState);
            }
            self.check_master_passphrase(field(0))?;
            self.master_passphrase = Some(field(1).to_vec());
            return Ok(Vec::new());
        }

        if self.status.contains(SecurityStatus::COUNT_EXPIRED) {
            return Err(FwStatus::SecurityCountExpired);
        }
        if self.status.contains(SecurityStatus::FROZEN) {
            return Err(FwStatus::InvalidSecurityState);
        }
        let locked = self.status.contains(SecurityStatus::LOCKED);

        match sub {
            sub_opcode::SET_PASSPHRASE => {
                if locked {
                    return Err(FwStatus::InvalidSecurityState);
                }
                if self.enabled() {
                    self.check_passphrase(field(0))?;
                }
                let new = field(1);
                if new.is_empty() {
                    return Err(FwStatus::InvalidParameter);
                }
                self.passphrase = Some(new.to_vec());
                self.status |= SecurityStatus::ENABLED;
            }
            sub_opcode::DISABLE_PASSPHRASE => {
                if !self.enabled() || locked {
                    return Err(FwStatus::InvalidSecurityState);
                }
                self.check_passphrase(field(0))?;
                self.passphrase = None;
                self.status.remove(SecurityStatus::ENABLED);
            }
            sub_opcode::UNLOCK_UNIT => {
                if !locked {
                    return Err(FwStatus::InvalidSecurityState);
                }
                self.check_passphrase(field(0))?;
                self.status.remove(SecurityStatus::LOCKED);
            }
            sub_opcode::FREEZE_LOCK => {
                if !self.enabled() || locked {
                    return Err(FwStatus::InvalidSecurityState);
                }
                self.status |= SecurityStatus::FROZEN;
            }
            sub_opcode::SECURE_ERASE => {
                if self.enabled() {
                    self.check_passphrase(field(0))?;
                }
                self.passphrase = None;
                self.status.remove(SecurityStatus::ENABLED | SecurityStatus::LOCKED);
            }
            _ => return Err(FwStatus::UnsupportedCommand),
        }
        Ok(Vec::new())
    }

    fn admin_command(&mut self, payload: &[u8]) -> core::result::Result<Vec<u8>, FwStatus> {
        match payload.split_first() {
            Some((&action::WRITE_GOAL, goal)) if !goal.is_empty() => self.staged = goal.to_vec(),
            Some((&action::CLEAR_GOAL, [])) => self.staged.clear(),
            _ => return Err(FwStatus::InvalidParameter),
        }
        Ok(Vec::new())
    }

    fn execute(&mut self, op: u8, sub: u8, payload: &[u8]) -> core::result::Result<Vec<u8>, FwStatus> {
        match (op, sub) {
            (opcode::GET_SECURITY_INFO, sub_opcode::GET_SECURITY_STATE) => Ok(encode_security_state(self.status)),
            (opcode::SET_SECURITY_INFO, sub) => self.security_command(sub, payload),
            (opcode::GET_ADMIN_FEATURES, sub_opcode::PLATFORM_CONFIG_DATA) => Ok(self.staged.clone()),
            (opcode::SET_ADMIN_FEATURES, sub_opcode::PLATFORM_CONFIG_DATA) => self.admin_command(payload),
            _ => Err(FwStatus::UnsupportedCommand),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    dimms: BTreeMap<Uid, SimDimm>,
    faults: Vec<Fault>,
    events: Vec<Event>,
    commands: Vec<(Uid, u8, u8)>,
}

/// An in-memory platform.
#[derive(Debug)]
pub struct SimulatedPlatform {
    description: PlatformDescription,
    namespaces: BTreeSet<Uid>,
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    pub fn new(description: PlatformDescription) -> Self {
        let dimms =
            description.devices.iter().map(|device| (device.uid.clone(), SimDimm::new(device, &description))).collect();
        Self {
            namespaces: description.namespaces.iter().cloned().collect(),
            description,
            state: Mutex::new(SimState { dimms, ..Default::default() }),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        PlatformDescription::from_yaml(yaml).map(Self::new)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock()
    }

    /// Queues a failure for the next command matching it.
    pub fn inject(&self, fault: Fault) {
        self.state().faults.push(fault);
    }

    /// Simulates a platform reset: frozen devices thaw and secured devices lock.
    pub fn reset(&self) {
        log::info!(target: "nvm_simulator", "Platform reset");
        for dimm in self.state().dimms.values_mut() {
            dimm.status.remove(SecurityStatus::FROZEN);
            if dimm.enabled() {
                dimm.status |= SecurityStatus::LOCKED;
            }
        }
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Commands that reached a device, in order.
    pub fn commands(&self) -> Vec<(Uid, u8, u8)> {
        self.state().commands.clone()
    }

    /// The raw staged goal payload of a device, empty when nothing is staged.
    pub fn staged_payload(&self, uid: &Uid) -> Vec<u8> {
        self.state().dimms.get(uid).map(|dimm| dimm.staged.clone()).unwrap_or_default()
    }

    /// The security status flags a device would report.
    pub fn security_status(&self, uid: &Uid) -> Option<SecurityStatus> {
        self.state().dimms.get(uid).map(|dimm| dimm.status)
    }

    fn dispatch(
        &self,
        uid: &Uid,
        op: u8,
        sub: u8,
        payload: &[u8],
    ) -> core::result::Result<Vec<u8>, FirmwareError> {
        let mut state = self.state();
        let fault = state
            .faults
            .iter()
            .position(|fault| fault.matches(uid, op, sub))
            .map(|index| state.faults.remove(index));

        if let Some(lost) = fault.as_ref().filter(|fault| !fault.applied) {
            log::debug!(target: "nvm_simulator", "{}: {:#04x}/{:#04x} failed before delivery", uid, op, sub);
            return Err(lost.error.clone());
        }

        state.commands.push((uid.clone(), op, sub));
        let dimm = state
            .dimms
            .get_mut(uid)
            .ok_or_else(|| FirmwareError::Transport(format!("no device {uid}")))?;
        let result = dimm.execute(op, sub, payload).map_err(FirmwareError::Status);
        log::debug!(target: "nvm_simulator", "{}: {:#04x}/{:#04x} -> {:?}", uid, op, sub, result.as_ref().err());

        match fault {
            Some(Fault { error, .. }) => Err(error),
            None => result,
        }
    }
}

impl DeviceEnumerator for SimulatedPlatform {
    fn list_devices(&self) -> Result<Vec<Device>> {
        let state = self.state();
        Ok(self
            .description
            .devices
            .iter()
            .map(|device| {
                let mut device = device.clone();
                if let Some(dimm) = state.dimms.get(&device.uid) {
                    device.lock_state = dimm.status.lock_state();
                    device.master_passphrase_enabled = dimm.status.contains(SecurityStatus::MASTER_ENABLED);
                }
                device
            })
            .collect())
    }

    fn platform_capabilities(&self) -> Result<PlatformCapabilities> {
        Ok(self.description.capabilities.clone())
    }

    fn interleave_sets(&self) -> Result<Vec<InterleaveSet>> {
        Ok(self.description.interleave_sets.clone())
    }

    fn jobs(&self) -> Result<Vec<Job>> {
        Ok(self.description.jobs.clone())
    }
}

impl NamespaceInventory for SimulatedPlatform {
    fn has_namespaces(&self, uid: &Uid) -> Result<bool> {
        Ok(self.namespaces.contains(uid))
    }
}

impl FirmwareMailbox for SimulatedPlatform {
    fn send(
        &self,
        uid: &Uid,
        opcode: u8,
        sub_opcode: u8,
        payload: &[u8],
    ) -> core::result::Result<Vec<u8>, FirmwareError> {
        self.dispatch(uid, opcode, sub_opcode, payload)
    }
}

impl PassThrough for SimulatedPlatform {
    fn send_raw(
        &self,
        uid: &Uid,
        opcode: u8,
        sub_opcode: u8,
        payload: &[u8],
    ) -> core::result::Result<Vec<u8>, FirmwareError> {
        self.dispatch(uid, opcode, sub_opcode, payload)
    }
}

impl EventSink for SimulatedPlatform {
    fn record_event(&self, event: Event) {
        log::info!(target: "nvm_simulator", "Event {:?} {:?}: {}", event.severity, event.code, event.message);
        self.state().events.push(event);
    }
}
