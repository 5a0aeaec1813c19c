//! Device Data Model
//!
//! The record a discovery collaborator produces for every persistent memory module installed in the platform. Device
//! records are immutable for the duration of a management session; re-discovery replaces the whole catalog.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::NvmError;
use crate::security::SecurityState;
use crate::NVM_MAX_UID_LEN;

/// Opaque unique identifier of a device.
///
/// Unique ids are platform specific and never written into portable goal files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Returns the unique id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Uid {
    type Error = NvmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() || value.len() > NVM_MAX_UID_LEN {
            return Err(NvmError::InvalidParameter("device uid must be 1 to 22 characters"));
        }
        Ok(Uid(value))
    }
}

impl FromStr for Uid {
    type Err = NvmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uid::try_from(s.to_string())
    }
}

impl From<Uid> for String {
    fn from(value: Uid) -> Self {
        value.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Topology coordinates of a device.
///
/// Mirrors the packed NFIT device handle: bits 3:0 hold the DIMM number within the channel, bits 7:4 the channel,
/// bits 11:8 the memory controller, bits 15:12 the socket and bits 27:16 the node controller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceHandle {
    pub node_controller_id: u16,
    pub socket_id: u16,
    pub memory_controller_id: u16,
    pub channel_id: u16,
    pub channel_pos: u16,
}

impl DeviceHandle {
    /// Decodes a packed NFIT device handle.
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            channel_pos: (raw & 0xF) as u16,
            channel_id: ((raw >> 4) & 0xF) as u16,
            memory_controller_id: ((raw >> 8) & 0xF) as u16,
            socket_id: ((raw >> 12) & 0xF) as u16,
            node_controller_id: ((raw >> 16) & 0xFFF) as u16,
        }
    }

    /// Packs the coordinates into an NFIT device handle.
    pub const fn raw(&self) -> u32 {
        (self.channel_pos as u32 & 0xF)
            | ((self.channel_id as u32 & 0xF) << 4)
            | ((self.memory_controller_id as u32 & 0xF) << 8)
            | ((self.socket_id as u32 & 0xF) << 12)
            | ((self.node_controller_id as u32 & 0xFFF) << 16)
    }
}

bitflags! {
    /// Security features a device firmware supports.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SecurityCapabilities: u8 {
        /// The device supports enabling a user passphrase.
        const PASSPHRASE = 1 << 0;
        /// The device supports unlocking and freeze-locking.
        const UNLOCK_DEVICE = 1 << 1;
        /// The device supports cryptographic erase.
        const ERASE_CRYPTO = 1 << 2;
        /// The device supports a master passphrase.
        const MASTER_PASSPHRASE = 1 << 3;
    }
}

bitflags! {
    /// Capacity modes and RAS features a device SKU supports.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DeviceCapabilities: u8 {
        /// Capacity may be mapped as volatile Memory Mode.
        const MEMORY_MODE = 1 << 0;
        /// Capacity may be mapped as persistent App Direct.
        const APP_DIRECT = 1 << 1;
        /// The device supports package sparing.
        const PACKAGE_SPARING = 1 << 2;
    }
}

/// Device manageability as determined at discovery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManageabilityState {
    #[default]
    Unknown,
    /// The device is running a supported firmware and interface and can be managed.
    ValidConfig,
    /// The device firmware or interface revision is not supported.
    InvalidConfig,
    /// The device failed to respond.
    NonFunctional,
}

/// Capacity currently mapped by the BIOS for a device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappedCapacity {
    pub volatile: u64,
    pub app_direct: u64,
}

/// A discovered persistent memory module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub uid: Uid,
    pub handle: DeviceHandle,
    /// SMBIOS physical id.
    #[serde(default)]
    pub physical_id: u16,
    /// Raw capacity in bytes.
    pub capacity: u64,
    /// SKU identifier used to decide interleave compatibility.
    #[serde(default)]
    pub dimm_sku: u32,
    #[serde(default)]
    pub security_capabilities: SecurityCapabilities,
    #[serde(default)]
    pub device_capabilities: DeviceCapabilities,
    #[serde(default)]
    pub lock_state: SecurityState,
    #[serde(default)]
    pub manageability: ManageabilityState,
    #[serde(default)]
    pub master_passphrase_enabled: bool,
    #[serde(default)]
    pub mapped: MappedCapacity,
}

impl Device {
    /// Returns true if the device can be targeted by management operations.
    pub fn is_manageable(&self) -> bool {
        self.manageability == ManageabilityState::ValidConfig
    }

    pub fn socket_id(&self) -> u16 {
        self.handle.socket_id
    }

    /// Returns true if the device's currently mapped capacity uses a mode its SKU does not allow.
    pub fn has_sku_violation(&self) -> bool {
        (self.mapped.volatile > 0 && !self.device_capabilities.contains(DeviceCapabilities::MEMORY_MODE))
            || (self.mapped.app_direct > 0 && !self.device_capabilities.contains(DeviceCapabilities::APP_DIRECT))
    }

    /// Orders devices by socket, memory controller, channel, channel position and finally uid.
    pub fn topology_cmp(&self, other: &Device) -> Ordering {
        let key = |d: &Device| {
            (d.handle.socket_id, d.handle.memory_controller_id, d.handle.channel_id, d.handle.channel_pos)
        };
        key(self).cmp(&key(other)).then_with(|| self.uid.cmp(&other.uid))
    }
}
