//! Per-device Security State Machine
//!
//! Each operation is checked in a fixed order before any command is sent:
//!
//! 1. An earlier command with an unknown outcome blocks everything until [SecurityMachine::refresh].
//! 2. The device must advertise the capability the operation needs.
//! 3. A device at its passphrase attempt limit accepts nothing.
//! 4. A device frozen this boot accepts nothing until [SecurityMachine::platform_reset].
//! 5. The current lock state must be one the operation is valid from.
//! 6. Passphrases must be 1 to 32 bytes.
//!
//! After a command succeeds the machine reads the security state back from the device and adopts it. Transitions are
//! never inferred.
//!
//! ## Logging
//!
//! State changes are logged using the `nvm_security` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use nvm_sdk::device::{Device, SecurityCapabilities, Uid};
use nvm_sdk::error::{NvmError, Result};
use nvm_sdk::mailbox::{decode_security_state, opcode, sub_opcode, FirmwareError, FwStatus};
use nvm_sdk::security::{SecurityState, SecurityStatus};
use nvm_sdk::service::FirmwareMailbox;

use crate::passphrase::{Passphrase, SecretPayload};

/// Security operations, used for capability gating and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityOperation {
    SetPassphrase,
    RemovePassphrase,
    Unlock,
    FreezeLock,
    Erase,
    SetMasterPassphrase,
}

impl SecurityOperation {
    fn capability(&self) -> SecurityCapabilities {
        match self {
            SecurityOperation::SetPassphrase | SecurityOperation::RemovePassphrase | SecurityOperation::FreezeLock => {
                SecurityCapabilities::PASSPHRASE
            }
            SecurityOperation::Unlock => SecurityCapabilities::UNLOCK_DEVICE,
            SecurityOperation::Erase => SecurityCapabilities::ERASE_CRYPTO,
            SecurityOperation::SetMasterPassphrase => SecurityCapabilities::MASTER_PASSPHRASE,
        }
    }

    fn valid_from(&self, state: SecurityState) -> bool {
        match self {
            SecurityOperation::SetPassphrase => matches!(state, SecurityState::Disabled | SecurityState::Unlocked),
            SecurityOperation::RemovePassphrase => matches!(state, SecurityState::Unlocked | SecurityState::Locked),
            SecurityOperation::Unlock => state == SecurityState::Locked,
            SecurityOperation::FreezeLock => state == SecurityState::Unlocked,
            SecurityOperation::Erase => {
                matches!(state, SecurityState::Disabled | SecurityState::Unlocked | SecurityState::Locked)
            }
            SecurityOperation::SetMasterPassphrase => state == SecurityState::Disabled,
        }
    }
}

impl fmt::Display for SecurityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityOperation::SetPassphrase => "set passphrase",
            SecurityOperation::RemovePassphrase => "remove passphrase",
            SecurityOperation::Unlock => "unlock",
            SecurityOperation::FreezeLock => "freeze lock",
            SecurityOperation::Erase => "secure erase",
            SecurityOperation::SetMasterPassphrase => "set master passphrase",
        };
        f.write_str(name)
    }
}

/// Tracks the security state of one device across operations within a boot.
#[derive(Debug, Clone)]
pub struct SecurityMachine {
    uid: Uid,
    capabilities: SecurityCapabilities,
    state: SecurityState,
    master_enabled: bool,
    master_limit: bool,
    /// Set when frozen is observed or requested. Only a platform reset clears it.
    frozen: bool,
    master_changed: bool,
    outcome_unknown: bool,
}

impl SecurityMachine {
    /// Starts from the lock state the device reported at discovery.
    pub fn new(device: &Device) -> Self {
        Self {
            uid: device.uid.clone(),
            capabilities: device.security_capabilities,
            state: device.lock_state,
            master_enabled: device.master_passphrase_enabled,
            master_limit: false,
            frozen: device.lock_state == SecurityState::Frozen,
            master_changed: false,
            outcome_unknown: false,
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// The last confirmed state, or [SecurityState::Unknown] while an outcome is unknown.
    pub fn state(&self) -> SecurityState {
        if self.outcome_unknown {
            SecurityState::Unknown
        } else {
            self.state
        }
    }

    /// True if state changes are blocked until the next platform reset.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// True if the last command's outcome is unknown and the state must be refreshed.
    pub fn needs_refresh(&self) -> bool {
        self.outcome_unknown || self.state == SecurityState::Unknown
    }

    /// Reads the security state from the device and adopts it.
    pub fn refresh(&mut self, mailbox: &dyn FirmwareMailbox) -> Result<SecurityState> {
        let response = match mailbox.send(&self.uid, opcode::GET_SECURITY_INFO, sub_opcode::GET_SECURITY_STATE, &[]) {
            Ok(response) => response,
            Err(err) => {
                if err.is_ambiguous() {
                    self.outcome_unknown = true;
                }
                return Err(err.for_device(&self.uid));
            }
        };
        let status = decode_security_state(&response)
            .map_err(|err| NvmError::Parse(format!("security state of {}: {err}", self.uid)))?;
        self.adopt(status);
        Ok(self.state)
    }

    fn adopt(&mut self, status: SecurityStatus) {
        let state = status.lock_state();
        if state != self.state {
            log::info!(target: "nvm_security", "{}: {} -> {}", self.uid, self.state, state);
        }
        self.state = state;
        self.frozen |= state == SecurityState::Frozen;
        self.master_enabled = status.contains(SecurityStatus::MASTER_ENABLED);
        self.master_limit = status.contains(SecurityStatus::MASTER_COUNT_EXPIRED);
        self.outcome_unknown = false;
    }

    /// Forgets everything scoped to the current boot. The state must be refreshed before the next operation.
    pub fn platform_reset(&mut self) {
        log::debug!(target: "nvm_security", "{}: platform reset", self.uid);
        self.frozen = false;
        self.master_changed = false;
        self.outcome_unknown = true;
    }

    fn admit(&self, operation: SecurityOperation) -> Result<()> {
        if self.needs_refresh() {
            return Err(NvmError::UnknownState(self.uid.clone()));
        }
        if !self.capabilities.contains(operation.capability()) || self.state == SecurityState::NotSupported {
            return Err(NvmError::NotSupported("security operation not supported by the device"));
        }
        let limit = match operation {
            SecurityOperation::SetMasterPassphrase => self.master_limit || self.state == SecurityState::PassphraseLimit,
            _ => self.state == SecurityState::PassphraseLimit,
        };
        if limit {
            return Err(self.rejected(FwStatus::SecurityCountExpired));
        }
        if self.frozen || !operation.valid_from(self.state) {
            log::warn!(target: "nvm_security", "{}: {} not allowed while {}", self.uid, operation, self.state);
            return Err(self.rejected(FwStatus::InvalidSecurityState));
        }
        if operation == SecurityOperation::SetMasterPassphrase && (!self.master_enabled || self.master_changed) {
            return Err(self.rejected(FwStatus::InvalidSecurityState));
        }
        Ok(())
    }

    fn rejected(&self, status: FwStatus) -> NvmError {
        NvmError::FirmwareRejected { uid: self.uid.clone(), status }
    }

    fn execute(
        &mut self,
        mailbox: &dyn FirmwareMailbox,
        operation: SecurityOperation,
        sub_opcode: u8,
        payload: SecretPayload,
    ) -> Result<()> {
        log::debug!(target: "nvm_security", "{}: {}", self.uid, operation);
        match mailbox.send(&self.uid, opcode::SET_SECURITY_INFO, sub_opcode, payload.as_bytes()) {
            Ok(_) => match self.refresh(mailbox) {
                Ok(_) => Ok(()),
                Err(err) => {
                    // The command took effect but its resulting state is not known.
                    log::error!(
                        target: "nvm_security",
                        "{}: {} acknowledged, read-back failed: {}",
                        self.uid,
                        operation,
                        err
                    );
                    self.outcome_unknown = true;
                    Err(NvmError::UnknownState(self.uid.clone()))
                }
            },
            Err(FirmwareError::Status(FwStatus::SecurityCountExpired)) => {
                log::error!(target: "nvm_security", "{}: passphrase attempt limit reached", self.uid);
                if operation == SecurityOperation::SetMasterPassphrase {
                    self.master_limit = true;
                } else {
                    self.state = SecurityState::PassphraseLimit;
                }
                Err(self.rejected(FwStatus::SecurityCountExpired))
            }
            Err(err) => {
                if err.is_ambiguous() {
                    log::error!(target: "nvm_security", "{}: outcome of {} unknown: {}", self.uid, operation, err);
                    self.outcome_unknown = true;
                } else {
                    log::warn!(target: "nvm_security", "{}: {} failed: {}", self.uid, operation, err);
                }
                Err(err.for_device(&self.uid))
            }
        }
    }

    /// Enables security with `new`, or rotates the passphrase when security is already enabled.
    pub fn set_passphrase(&mut self, mailbox: &dyn FirmwareMailbox, current: Option<&[u8]>, new: &[u8]) -> Result<()> {
        let operation = SecurityOperation::SetPassphrase;
        self.admit(operation)?;
        let current = match (self.state, current) {
            (SecurityState::Unlocked, None) => {
                return Err(NvmError::InvalidParameter("current passphrase required to rotate"));
            }
            (SecurityState::Unlocked, Some(current)) => Some(Passphrase::new(current)?),
            _ => None,
        };
        let new = Passphrase::new(new)?;
        let payload = SecretPayload::new(current.as_ref(), Some(&new))?;
        self.execute(mailbox, operation, sub_opcode::SET_PASSPHRASE, payload)
    }

    /// Disables security, unlocking the device first if it is locked.
    pub fn remove_passphrase(&mut self, mailbox: &dyn FirmwareMailbox, current: &[u8]) -> Result<()> {
        let operation = SecurityOperation::RemovePassphrase;
        self.admit(operation)?;
        let current = Passphrase::new(current)?;
        if self.state == SecurityState::Locked {
            self.admit(SecurityOperation::Unlock)?;
            let payload = SecretPayload::new(Some(&current), None)?;
            self.execute(mailbox, SecurityOperation::Unlock, sub_opcode::UNLOCK_UNIT, payload)?;
            self.admit(operation)?;
        }
        let payload = SecretPayload::new(Some(&current), None)?;
        self.execute(mailbox, operation, sub_opcode::DISABLE_PASSPHRASE, payload)
    }

    pub fn unlock(&mut self, mailbox: &dyn FirmwareMailbox, current: &[u8]) -> Result<()> {
        let operation = SecurityOperation::Unlock;
        self.admit(operation)?;
        let payload = SecretPayload::new(Some(&Passphrase::new(current)?), None)?;
        self.execute(mailbox, operation, sub_opcode::UNLOCK_UNIT, payload)
    }

    /// Blocks security state changes until the next platform reset.
    pub fn freeze_lock(&mut self, mailbox: &dyn FirmwareMailbox) -> Result<()> {
        let operation = SecurityOperation::FreezeLock;
        self.admit(operation)?;
        let result = self.execute(mailbox, operation, sub_opcode::FREEZE_LOCK, SecretPayload::empty());
        if matches!(result, Ok(()) | Err(NvmError::UnknownState(_))) {
            self.frozen = true;
        }
        result
    }

    /// Cryptographically erases the device. A passphrase is required unless security is disabled.
    pub fn erase(&mut self, mailbox: &dyn FirmwareMailbox, current: Option<&[u8]>) -> Result<()> {
        let operation = SecurityOperation::Erase;
        self.admit(operation)?;
        let current = match (self.state, current) {
            (SecurityState::Disabled, _) => None,
            (_, Some(current)) => Some(Passphrase::new(current)?),
            (_, None) => return Err(NvmError::InvalidParameter("passphrase required to erase a secured device")),
        };
        let payload = SecretPayload::new(current.as_ref(), None)?;
        self.execute(mailbox, operation, sub_opcode::SECURE_ERASE, payload)
    }

    /// Changes the master passphrase. Allowed once per boot while security is disabled.
    pub fn set_master_passphrase(&mut self, mailbox: &dyn FirmwareMailbox, current: &[u8], new: &[u8]) -> Result<()> {
        let operation = SecurityOperation::SetMasterPassphrase;
        self.admit(operation)?;
        let current = Passphrase::new(current)?;
        let new = Passphrase::new(new)?;
        let payload = SecretPayload::new(Some(&current), Some(&new))?;
        let result = self.execute(mailbox, operation, sub_opcode::SET_MASTER_PASSPHRASE, payload);
        if result.is_ok() || self.outcome_unknown {
            self.master_changed = true;
        }
        result
    }
}
