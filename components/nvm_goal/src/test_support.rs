//! Shared fixtures for unit tests.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use nvm_inventory::DeviceCatalog;
use nvm_sdk::capabilities::{MemoryCapabilities, NvmCapabilities, PlatformCapabilities, SkuCapabilities};
use nvm_sdk::device::{
    Device, DeviceCapabilities, DeviceHandle, ManageabilityState, MappedCapacity, SecurityCapabilities, Uid,
};
use nvm_sdk::goal::GoalSlot;
use nvm_sdk::interleave::{InterleaveFormat, InterleaveSize, InterleaveType, InterleaveWays};
use nvm_sdk::security::SecurityState;

pub(crate) fn uid(s: &str) -> Uid {
    s.parse().unwrap()
}

/// A manageable DIMM named `dimm-<socket>-<channel>`.
pub(crate) fn device(socket: u16, channel: u16, capacity: u64) -> Device {
    Device {
        uid: uid(&format!("dimm-{socket}-{channel}")),
        handle: DeviceHandle { socket_id: socket, channel_id: channel, ..Default::default() },
        physical_id: socket * 0x10 + channel,
        capacity,
        dimm_sku: 0x1,
        security_capabilities: SecurityCapabilities::all(),
        device_capabilities: DeviceCapabilities::MEMORY_MODE | DeviceCapabilities::APP_DIRECT,
        lock_state: SecurityState::Disabled,
        manageability: ManageabilityState::ValidConfig,
        master_passphrase_enabled: true,
        mapped: MappedCapacity::default(),
    }
}

/// Builds a catalog from `(socket, capacity)` pairs; channels are numbered per socket in order.
pub(crate) fn catalog(layout: &[(u16, u64)]) -> DeviceCatalog {
    DeviceCatalog::from_devices(devices(layout)).unwrap()
}

pub(crate) fn devices(layout: &[(u16, u64)]) -> Vec<Device> {
    let mut devices: Vec<Device> = Vec::new();
    for (socket, capacity) in layout {
        let channel = devices.iter().filter(|d| d.socket_id() == *socket).count() as u16;
        devices.push(device(*socket, channel, *capacity));
    }
    devices
}

fn format(ways: InterleaveWays, imc: InterleaveSize, channel: InterleaveSize) -> InterleaveFormat {
    InterleaveFormat { channel, imc, ways, recommended: false }
}

/// A platform supporting Memory Mode, mirroring and 1, 2, 3, 4 and 6-way App Direct with 1 GiB alignment.
pub(crate) fn capabilities() -> NvmCapabilities {
    let mut formats = Vec::new();
    for ways in [InterleaveWays::Ways1, InterleaveWays::Ways2, InterleaveWays::Ways3, InterleaveWays::Ways4] {
        formats.push(format(ways, InterleaveSize::Size4KB, InterleaveSize::Size256B));
        formats.push(format(ways, InterleaveSize::Size4KB, InterleaveSize::Size4KB));
    }
    formats.push(format(InterleaveWays::Ways6, InterleaveSize::Size256B, InterleaveSize::Size256B));
    NvmCapabilities {
        platform: PlatformCapabilities {
            bios_config_support: true,
            bios_runtime_support: true,
            memory_mirror_supported: true,
            memory_mode: MemoryCapabilities { supported: true, interleave_alignment_size: 30, interleave_formats: vec![] },
            app_direct_mode: MemoryCapabilities {
                supported: true,
                interleave_alignment_size: 30,
                interleave_formats: formats,
            },
            ..Default::default()
        },
        sku: SkuCapabilities { mixed_sku: false, sku_violation: false, memory_sku: true, app_direct_sku: true },
    }
}

pub(crate) fn slot(appdirect_index: u8, appdirect_size: u64, ways: InterleaveWays) -> GoalSlot {
    GoalSlot {
        interleave_type: if ways == InterleaveWays::Ways1 {
            InterleaveType::NotInterleaved
        } else {
            InterleaveType::Interleaved
        },
        appdirect_size,
        imc: InterleaveSize::Size4KB,
        channel: InterleaveSize::Size4KB,
        ways,
        appdirect_index,
    }
}
