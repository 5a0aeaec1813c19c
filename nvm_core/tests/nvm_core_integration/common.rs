//! Common fixtures for the integration tests.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::sync::{Arc, Once};

use nvm_core::{NvmSession, PlatformDescription, PlatformServices, SimulatedPlatform};
use nvm_sdk::capabilities::{MemoryCapabilities, PlatformCapabilities};
use nvm_sdk::config::NvmConfiguration;
use nvm_sdk::device::{
    Device, DeviceCapabilities, DeviceHandle, ManageabilityState, MappedCapacity, SecurityCapabilities, Uid,
};
use nvm_sdk::interleave::{InterleaveFormat, InterleaveSize, InterleaveWays};
use nvm_sdk::security::SecurityState;

pub const GIB: u64 = 1 << 30;
pub const MIB: u64 = 1 << 20;

/// Two 100.5 GiB DIMMs on socket 0 with security disabled.
pub const TWO_DIMMS: &str = r#"
devices:
  - uid: "dimm-0-0"
    handle: { socket_id: 0, channel_id: 0 }
    capacity: 107911053312
    dimm_sku: 1
    security_capabilities: PASSPHRASE | UNLOCK_DEVICE | ERASE_CRYPTO | MASTER_PASSPHRASE
    device_capabilities: MEMORY_MODE | APP_DIRECT
    lock_state: disabled
    manageability: valid_config
  - uid: "dimm-0-1"
    handle: { socket_id: 0, channel_id: 1 }
    capacity: 107911053312
    dimm_sku: 1
    security_capabilities: PASSPHRASE | UNLOCK_DEVICE | ERASE_CRYPTO | MASTER_PASSPHRASE
    device_capabilities: MEMORY_MODE | APP_DIRECT
    lock_state: disabled
    manageability: valid_config
capabilities:
  bios_config_support: true
  bios_runtime_support: true
  memory_mode: { supported: true, interleave_alignment_size: 30 }
  app_direct_mode:
    supported: true
    interleave_alignment_size: 30
    interleave_formats:
      - { channel: 4KB, imc: 4KB, ways: 1 }
      - { channel: 256B, imc: 4KB, ways: 2 }
      - { channel: 4KB, imc: 4KB, ways: 2 }
"#;

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        // Default to no logging unless RUST_LOG environment variable is set
        let mut builder = env_logger::Builder::from_default_env();

        // If RUST_LOG is not set, default to Off (no logging)
        if std::env::var("RUST_LOG").is_err() {
            builder.filter_level(log::LevelFilter::Off);
        }

        builder.is_test(true).init();
    });
}

pub fn uid(s: &str) -> Uid {
    s.parse().unwrap()
}

/// A manageable DIMM supporting every mode and security operation.
pub fn device(name: &str, socket: u16, channel: u16, capacity: u64) -> Device {
    Device {
        uid: uid(name),
        handle: DeviceHandle { socket_id: socket, channel_id: channel, ..Default::default() },
        physical_id: socket * 0x10 + channel,
        capacity,
        dimm_sku: 1,
        security_capabilities: SecurityCapabilities::all(),
        device_capabilities: DeviceCapabilities::MEMORY_MODE | DeviceCapabilities::APP_DIRECT,
        lock_state: SecurityState::Disabled,
        manageability: ManageabilityState::ValidConfig,
        master_passphrase_enabled: false,
        mapped: MappedCapacity::default(),
    }
}

/// Memory Mode plus 1 to 4-way App Direct with 1 GiB alignment.
pub fn capabilities() -> PlatformCapabilities {
    let ways = [InterleaveWays::Ways1, InterleaveWays::Ways2, InterleaveWays::Ways3, InterleaveWays::Ways4];
    let interleave_formats = ways
        .into_iter()
        .map(|ways| InterleaveFormat {
            channel: InterleaveSize::Size4KB,
            imc: InterleaveSize::Size4KB,
            ways,
            recommended: false,
        })
        .collect();
    PlatformCapabilities {
        bios_config_support: true,
        bios_runtime_support: true,
        memory_mirror_supported: true,
        memory_mode: MemoryCapabilities { supported: true, interleave_alignment_size: 30, interleave_formats: vec![] },
        app_direct_mode: MemoryCapabilities { supported: true, interleave_alignment_size: 30, interleave_formats },
        ..Default::default()
    }
}

/// Describes DIMMs named `<prefix>-<socket>-<channel>` from `(socket, capacity)` pairs.
pub fn description(prefix: &str, layout: &[(u16, u64)]) -> PlatformDescription {
    let mut devices: Vec<Device> = Vec::new();
    for (socket, capacity) in layout {
        let channel = devices.iter().filter(|d| d.socket_id() == *socket).count() as u16;
        devices.push(device(&format!("{prefix}-{socket}-{channel}"), *socket, channel, *capacity));
    }
    PlatformDescription { devices, capabilities: capabilities(), passphrase_attempts: 3, ..Default::default() }
}

/// A simulated platform and a session opened over it.
pub struct Harness {
    pub platform: Arc<SimulatedPlatform>,
    pub session: NvmSession,
}

pub fn open(description: PlatformDescription) -> Harness {
    init_logger();
    let platform = Arc::new(SimulatedPlatform::new(description));
    let session = NvmSession::open(PlatformServices::from_platform(platform.clone()), NvmConfiguration::default())
        .expect("session should open over the simulated platform");
    Harness { platform, session }
}

pub fn open_yaml(yaml: &str) -> Harness {
    open(PlatformDescription::from_yaml(yaml).expect("platform description should parse"))
}
