//! Device Catalog
//!
//! A read-only snapshot of the devices discovered in the platform, kept in topology order. The catalog is built once
//! per session and replaced as a whole on re-discovery; it is never patched in place.
//!
//! ## Logging
//!
//! Discovery results are logged using the `nvm_inventory` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::collections::{BTreeMap, BTreeSet};

use nvm_sdk::device::{Device, Uid};
use nvm_sdk::error::{NvmError, Result};
use nvm_sdk::service::DeviceEnumerator;

/// Platform independent identity of a device: its socket and its index among the socket's manageable devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortableKey {
    pub socket_id: u16,
    pub dimm_index: u16,
}

/// Snapshot of discovered devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    devices: Vec<Device>,
    index: BTreeMap<Uid, usize>,
}

impl DeviceCatalog {
    /// Builds a catalog from the devices the enumerator reports.
    pub fn discover(enumerator: &dyn DeviceEnumerator) -> Result<Self> {
        let catalog = Self::from_devices(enumerator.list_devices()?)?;
        log::info!(
            target: "nvm_inventory",
            "Discovered {} devices, {} manageable",
            catalog.len(),
            catalog.manageable().count()
        );
        Ok(catalog)
    }

    /// Builds a catalog from device records, sorting them into topology order.
    pub fn from_devices(mut devices: Vec<Device>) -> Result<Self> {
        devices.sort_by(|a, b| a.topology_cmp(b));
        let mut index = BTreeMap::new();
        for (position, device) in devices.iter().enumerate() {
            if index.insert(device.uid.clone(), position).is_some() {
                log::error!(target: "nvm_inventory", "Device {} reported more than once", device.uid);
                return Err(NvmError::Parse(format!("duplicate device uid {}", device.uid)));
            }
            log::debug!(
                target: "nvm_inventory",
                "Device {} handle {:#x} capacity {:#x} {:?}",
                device.uid,
                device.handle.raw(),
                device.capacity,
                device.manageability
            );
        }
        Ok(Self { devices, index })
    }

    /// All devices in topology order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, uid: &Uid) -> Option<&Device> {
        self.index.get(uid).map(|position| &self.devices[*position])
    }

    /// Looks up a device, failing if it was not discovered.
    pub fn device(&self, uid: &Uid) -> Result<&Device> {
        self.get(uid).ok_or_else(|| NvmError::DeviceNotFound(uid.clone()))
    }

    /// Looks up a device, failing if it was not discovered or cannot be managed.
    pub fn manageable_device(&self, uid: &Uid) -> Result<&Device> {
        let device = self.device(uid)?;
        if !device.is_manageable() {
            return Err(NvmError::DeviceNotManageable(uid.clone()));
        }
        Ok(device)
    }

    /// Manageable devices in topology order.
    pub fn manageable(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|device| device.is_manageable())
    }

    /// Sockets with at least one manageable device.
    pub fn sockets(&self) -> BTreeSet<u16> {
        self.manageable().map(Device::socket_id).collect()
    }

    /// Manageable devices of one socket in topology order.
    pub fn socket_devices(&self, socket_id: u16) -> impl Iterator<Item = &Device> {
        self.manageable().filter(move |device| device.socket_id() == socket_id)
    }

    /// Resolves caller supplied ids into manageable devices in topology order.
    ///
    /// An empty id list selects every manageable device. Any unknown or unmanageable id fails the whole resolution.
    pub fn resolve_targets(&self, uids: &[Uid]) -> Result<Vec<&Device>> {
        if uids.is_empty() {
            let all: Vec<&Device> = self.manageable().collect();
            if all.is_empty() {
                return Err(NvmError::NotSupported("no manageable devices"));
            }
            return Ok(all);
        }

        let mut seen = BTreeSet::new();
        let mut targets = Vec::with_capacity(uids.len());
        for uid in uids {
            if !seen.insert(uid) {
                return Err(NvmError::InvalidParameter("device listed more than once"));
            }
            targets.push(self.manageable_device(uid)?);
        }
        targets.sort_by(|a, b| a.topology_cmp(b));
        Ok(targets)
    }

    /// Returns the portable key of a manageable device.
    pub fn portable_key(&self, uid: &Uid) -> Option<PortableKey> {
        let device = self.get(uid).filter(|device| device.is_manageable())?;
        let dimm_index = self.socket_devices(device.socket_id()).position(|other| other.uid == *uid)?;
        Some(PortableKey { socket_id: device.socket_id(), dimm_index: u16::try_from(dimm_index).ok()? })
    }

    /// Finds the manageable device a portable key refers to on this platform.
    pub fn by_portable_key(&self, key: PortableKey) -> Option<&Device> {
        self.socket_devices(key.socket_id).nth(key.dimm_index as usize)
    }
}
