//! Device Enumeration Service Trait
//!
//! Produced by the platform layer that parses firmware tables (NFIT, PCAT, SMBIOS) and driver state.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use crate::capabilities::PlatformCapabilities;
use crate::device::Device;
use crate::error::Result;
use crate::interleave::InterleaveSet;
use crate::job::Job;

/// Device Enumeration Service
///
/// Source of the device records a management session is built from.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait DeviceEnumerator: Send + Sync {
    /// Lists every persistent memory module installed in the platform, manageable or not.
    fn list_devices(&self) -> Result<Vec<Device>>;

    /// Returns the capabilities reported by the BIOS.
    fn platform_capabilities(&self) -> Result<PlatformCapabilities>;

    /// Returns the interleave sets currently mapped by the BIOS.
    fn interleave_sets(&self) -> Result<Vec<InterleaveSet>>;

    /// Returns the polled state of background device jobs.
    fn jobs(&self) -> Result<Vec<Job>>;
}
