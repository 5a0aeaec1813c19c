//! Interleave Geometry
//!
//! Interleave sizes, ways and formats, and the interleave set record shared by discovery (current configuration) and
//! the goal planner (planned configuration).
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::device::{Device, SecurityCapabilities, Uid};

/// Interleave granularity at the memory controller or channel level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InterleaveSize {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "64B")]
    Size64B,
    #[serde(rename = "128B")]
    Size128B,
    #[serde(rename = "256B")]
    Size256B,
    #[serde(rename = "4KB")]
    Size4KB,
    #[serde(rename = "1GB")]
    Size1GB,
}

impl InterleaveSize {
    /// Encoded value used by platform capability tables.
    pub const fn raw(&self) -> u8 {
        match self {
            InterleaveSize::None => 0x00,
            InterleaveSize::Size64B => 0x01,
            InterleaveSize::Size128B => 0x02,
            InterleaveSize::Size256B => 0x04,
            InterleaveSize::Size4KB => 0x40,
            InterleaveSize::Size1GB => 0x80,
        }
    }

    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(InterleaveSize::None),
            0x01 => Some(InterleaveSize::Size64B),
            0x02 => Some(InterleaveSize::Size128B),
            0x04 => Some(InterleaveSize::Size256B),
            0x40 => Some(InterleaveSize::Size4KB),
            0x80 => Some(InterleaveSize::Size1GB),
            _ => None,
        }
    }
}

/// Number of DIMMs striped together in an interleave set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum InterleaveWays {
    #[default]
    Ways1,
    Ways2,
    Ways3,
    Ways4,
    Ways6,
    Ways8,
    Ways12,
    Ways16,
    Ways24,
}

impl InterleaveWays {
    const ALL: [InterleaveWays; 9] = [
        InterleaveWays::Ways1,
        InterleaveWays::Ways2,
        InterleaveWays::Ways3,
        InterleaveWays::Ways4,
        InterleaveWays::Ways6,
        InterleaveWays::Ways8,
        InterleaveWays::Ways12,
        InterleaveWays::Ways16,
        InterleaveWays::Ways24,
    ];

    /// Number of DIMMs in the set.
    pub const fn count(&self) -> usize {
        match self {
            InterleaveWays::Ways1 => 1,
            InterleaveWays::Ways2 => 2,
            InterleaveWays::Ways3 => 3,
            InterleaveWays::Ways4 => 4,
            InterleaveWays::Ways6 => 6,
            InterleaveWays::Ways8 => 8,
            InterleaveWays::Ways12 => 12,
            InterleaveWays::Ways16 => 16,
            InterleaveWays::Ways24 => 24,
        }
    }

    /// Returns the ways value matching a DIMM count, if the hardware supports that width.
    pub fn from_count(count: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|ways| ways.count() == count)
    }

    /// Encoded bitmask value used by platform capability tables.
    pub const fn raw(&self) -> u16 {
        match self {
            InterleaveWays::Ways1 => 0x001,
            InterleaveWays::Ways2 => 0x002,
            InterleaveWays::Ways3 => 0x004,
            InterleaveWays::Ways4 => 0x008,
            InterleaveWays::Ways6 => 0x010,
            InterleaveWays::Ways8 => 0x020,
            InterleaveWays::Ways12 => 0x040,
            InterleaveWays::Ways16 => 0x080,
            InterleaveWays::Ways24 => 0x100,
        }
    }

    pub fn from_raw(raw: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|ways| ways.raw() == raw)
    }
}

impl TryFrom<u8> for InterleaveWays {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        InterleaveWays::from_count(value as usize).ok_or_else(|| format!("unsupported interleave ways {value}"))
    }
}

impl From<InterleaveWays> for u8 {
    fn from(value: InterleaveWays) -> Self {
        value.count() as u8
    }
}

/// One interleave geometry a platform supports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterleaveFormat {
    pub channel: InterleaveSize,
    pub imc: InterleaveSize,
    pub ways: InterleaveWays,
    /// The BIOS recommends this format.
    #[serde(default)]
    pub recommended: bool,
}

/// How an App Direct region is laid out across DIMMs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterleaveType {
    #[default]
    Default,
    Interleaved,
    NotInterleaved,
    Mirrored,
}

impl InterleaveType {
    pub const fn raw(&self) -> u8 {
        match self {
            InterleaveType::Default => 0,
            InterleaveType::Interleaved => 1,
            InterleaveType::NotInterleaved => 2,
            InterleaveType::Mirrored => 3,
        }
    }

    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(InterleaveType::Default),
            1 => Some(InterleaveType::Interleaved),
            2 => Some(InterleaveType::NotInterleaved),
            3 => Some(InterleaveType::Mirrored),
            _ => None,
        }
    }
}

/// Health of an interleave set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterleaveSetHealth {
    #[default]
    Unknown,
    Normal,
    Degraded,
    Failed,
}

/// Encryption status of an interleave set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionStatus {
    #[default]
    Off,
    On,
    Ignore,
}

/// A group of DIMMs on one socket whose capacity is striped into a single physical address range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleaveSet {
    pub set_index: u32,
    pub socket_id: u16,
    /// Physical footprint across all members in bytes.
    pub size: u64,
    /// Usable capacity in bytes. Half of `size` when mirrored.
    pub available_size: u64,
    pub format: InterleaveFormat,
    pub dimms: Vec<Uid>,
    #[serde(default)]
    pub mirrored: bool,
    #[serde(default)]
    pub health: InterleaveSetHealth,
    #[serde(default)]
    pub encryption: EncryptionStatus,
    #[serde(default)]
    pub erase_capable: bool,
}

impl InterleaveSet {
    /// Returns true if the set stripes capacity of the given device.
    pub fn contains(&self, uid: &Uid) -> bool {
        self.dimms.iter().any(|member| member == uid)
    }

    /// Encryption is on iff every member has a passphrase enabled.
    pub fn encryption_for<'a>(members: impl IntoIterator<Item = &'a Device>) -> EncryptionStatus {
        let mut members = members.into_iter().peekable();
        if members.peek().is_none() {
            return EncryptionStatus::Off;
        }
        if members.all(|device| device.lock_state.is_enabled()) {
            EncryptionStatus::On
        } else {
            EncryptionStatus::Off
        }
    }

    /// Crypto erase is possible iff every member supports it.
    pub fn erase_capable_for<'a>(members: impl IntoIterator<Item = &'a Device>) -> bool {
        let mut members = members.into_iter().peekable();
        members.peek().is_some()
            && members.all(|device| device.security_capabilities.contains(SecurityCapabilities::ERASE_CRYPTO))
    }
}

impl fmt::Display for InterleaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-way imc={:?} channel={:?}", self.ways.count(), self.imc, self.channel)
    }
}
