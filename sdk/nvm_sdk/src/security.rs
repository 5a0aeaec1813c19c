//! Data-at-rest Security States
//!
//! Lock states as reported by device firmware, and the security status flags they are decoded from.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// The data-at-rest security posture of a device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityState {
    #[default]
    Unknown,
    /// Security is not enabled.
    Disabled,
    /// Security is enabled and the device is unlocked.
    Unlocked,
    /// Security is enabled and the device is locked.
    Locked,
    /// Security state changes are blocked until the next platform reset.
    Frozen,
    /// The passphrase attempt limit was reached. Recovery requires a power cycle or factory reset.
    PassphraseLimit,
    /// The device does not support data-at-rest security.
    NotSupported,
}

impl SecurityState {
    /// Returns true if a user passphrase is set on the device.
    pub fn is_enabled(&self) -> bool {
        matches!(self, SecurityState::Unlocked | SecurityState::Locked | SecurityState::Frozen)
    }
}

impl fmt::Display for SecurityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityState::Unknown => "Unknown",
            SecurityState::Disabled => "Disabled",
            SecurityState::Unlocked => "Unlocked",
            SecurityState::Locked => "Locked",
            SecurityState::Frozen => "Frozen",
            SecurityState::PassphraseLimit => "Exceeded",
            SecurityState::NotSupported => "Not Supported",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Security status flags returned by the get security state command.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SecurityStatus: u32 {
        const ENABLED = 1 << 1;
        const LOCKED = 1 << 2;
        const FROZEN = 1 << 3;
        const COUNT_EXPIRED = 1 << 4;
        const NOT_SUPPORTED = 1 << 5;
        const MASTER_ENABLED = 1 << 8;
        const MASTER_COUNT_EXPIRED = 1 << 9;
    }
}

impl SecurityStatus {
    /// Reduces the status flags to a single lock state.
    ///
    /// Exclusive conditions win in the order: not supported, count expired, frozen, locked, unlocked.
    pub fn lock_state(&self) -> SecurityState {
        if self.contains(SecurityStatus::NOT_SUPPORTED) {
            SecurityState::NotSupported
        } else if self.contains(SecurityStatus::COUNT_EXPIRED) {
            SecurityState::PassphraseLimit
        } else if self.contains(SecurityStatus::FROZEN) {
            SecurityState::Frozen
        } else if !self.contains(SecurityStatus::ENABLED) {
            SecurityState::Disabled
        } else if self.contains(SecurityStatus::LOCKED) {
            SecurityState::Locked
        } else {
            SecurityState::Unlocked
        }
    }
}
