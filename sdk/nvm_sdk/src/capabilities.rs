//! Platform Capabilities
//!
//! Capabilities the BIOS reports for each memory mode, and the platform-wide view derived from combining them with
//! the installed DIMM SKUs.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use serde::{Deserialize, Serialize};

use crate::interleave::InterleaveFormat;

/// Capabilities of one memory mode (1LM, Memory Mode or App Direct).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCapabilities {
    pub supported: bool,
    /// Alignment exponent: regions are aligned to `2^n` bytes. Zero means the BIOS did not report one.
    #[serde(default)]
    pub interleave_alignment_size: u16,
    #[serde(default)]
    pub interleave_formats: Vec<InterleaveFormat>,
}

impl MemoryCapabilities {
    /// Returns the alignment in bytes, if the BIOS reported a usable one.
    pub fn alignment(&self) -> Option<u64> {
        match self.interleave_alignment_size {
            0 => None,
            n if n < 64 => Some(1u64 << n),
            _ => None,
        }
    }
}

/// Volatile mode the platform booted in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatileMode {
    OneLm,
    Memory,
    #[default]
    Unknown,
}

/// App Direct mode the platform booted in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppDirectMode {
    Disabled,
    Enabled,
    #[default]
    Unknown,
}

/// Capabilities reported by the BIOS.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCapabilities {
    /// The BIOS accepts configuration goals.
    pub bios_config_support: bool,
    /// The BIOS validates configuration changes at runtime.
    pub bios_runtime_support: bool,
    pub memory_mirror_supported: bool,
    pub memory_spare_supported: bool,
    pub memory_migration_supported: bool,
    pub one_lm_mode: MemoryCapabilities,
    pub memory_mode: MemoryCapabilities,
    pub app_direct_mode: MemoryCapabilities,
    pub current_volatile_mode: VolatileMode,
    pub current_app_direct_mode: AppDirectMode,
}

/// SKU-derived platform flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkuCapabilities {
    /// More than one DIMM SKU is installed.
    pub mixed_sku: bool,
    /// A DIMM is configured in a mode its SKU does not allow.
    pub sku_violation: bool,
    /// At least one DIMM SKU allows Memory Mode.
    pub memory_sku: bool,
    /// At least one DIMM SKU allows App Direct.
    pub app_direct_sku: bool,
}

/// Platform-wide capabilities consumed by the goal planner.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvmCapabilities {
    pub platform: PlatformCapabilities,
    pub sku: SkuCapabilities,
}

impl NvmCapabilities {
    /// Memory Mode is usable when the BIOS supports it and an installed SKU allows it.
    pub fn memory_mode_usable(&self) -> bool {
        self.platform.memory_mode.supported && self.sku.memory_sku
    }

    /// App Direct is usable when the BIOS supports it and an installed SKU allows it.
    pub fn app_direct_usable(&self) -> bool {
        self.platform.app_direct_mode.supported && self.sku.app_direct_sku
    }

    pub fn app_direct_formats(&self) -> &[InterleaveFormat] {
        &self.platform.app_direct_mode.interleave_formats
    }
}
