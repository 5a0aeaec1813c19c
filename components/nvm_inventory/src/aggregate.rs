//! Capability Aggregation
//!
//! Reduces the device catalog and the BIOS reported capabilities into the platform-wide view the goal planner
//! validates requests against.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::collections::BTreeSet;

use nvm_sdk::capabilities::{NvmCapabilities, PlatformCapabilities, SkuCapabilities};
use nvm_sdk::device::DeviceCapabilities;
use nvm_sdk::error::Result;
use nvm_sdk::service::DeviceEnumerator;
use nvm_sdk::NVM_INTERLEAVE_FORMATS;

use crate::catalog::DeviceCatalog;

/// Derives SKU flags from the manageable devices of a catalog.
pub fn sku_capabilities(catalog: &DeviceCatalog) -> SkuCapabilities {
    let skus: BTreeSet<u32> = catalog.manageable().map(|device| device.dimm_sku).collect();
    SkuCapabilities {
        mixed_sku: skus.len() > 1,
        sku_violation: catalog.manageable().any(|device| device.has_sku_violation()),
        memory_sku: catalog
            .manageable()
            .any(|device| device.device_capabilities.contains(DeviceCapabilities::MEMORY_MODE)),
        app_direct_sku: catalog
            .manageable()
            .any(|device| device.device_capabilities.contains(DeviceCapabilities::APP_DIRECT)),
    }
}

/// Combines BIOS capabilities with the catalog's SKU flags.
///
/// Interleave format lists longer than the platform maximum are truncated to it.
pub fn aggregate(catalog: &DeviceCatalog, mut platform: PlatformCapabilities) -> NvmCapabilities {
    for mode in [&mut platform.one_lm_mode, &mut platform.memory_mode, &mut platform.app_direct_mode] {
        if mode.interleave_formats.len() > NVM_INTERLEAVE_FORMATS {
            log::warn!(
                target: "nvm_inventory",
                "Platform reports {} interleave formats, keeping the first {}",
                mode.interleave_formats.len(),
                NVM_INTERLEAVE_FORMATS
            );
            mode.interleave_formats.truncate(NVM_INTERLEAVE_FORMATS);
        }
    }

    let sku = sku_capabilities(catalog);
    if sku.mixed_sku {
        log::warn!(target: "nvm_inventory", "Mixed DIMM SKUs installed");
    }
    if sku.sku_violation {
        log::warn!(target: "nvm_inventory", "A DIMM is configured in a mode its SKU does not support");
    }
    NvmCapabilities { platform, sku }
}

/// Queries the BIOS capabilities and aggregates them with the catalog.
pub fn discover_capabilities(enumerator: &dyn DeviceEnumerator, catalog: &DeviceCatalog) -> Result<NvmCapabilities> {
    let capabilities = aggregate(catalog, enumerator.platform_capabilities()?);
    log::debug!(target: "nvm_inventory", "Platform capabilities: {:?}", capabilities);
    Ok(capabilities)
}
