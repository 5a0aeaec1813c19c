//! NVM Management Configuration
//!
//! Settings a management session is opened with. Every field has a default so a configuration file only needs the
//! values it overrides.
//!
//! ## Example
//!
//! ```yaml
//! volatile_alignment: 0x40000000
//! record_events: false
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use serde::{Deserialize, Serialize};

use crate::error::{NvmError, Result};
use crate::goal::{GoalInput, LabelVersion};

/// Default region alignment (1 GiB) used when the BIOS does not report one.
pub const DEFAULT_ALIGNMENT: u64 = 1 << 30;

/// Management session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NvmConfiguration {
    /// Memory Mode alignment used when the platform reports none.
    pub volatile_alignment: u64,
    /// App Direct alignment used when the platform reports none.
    pub app_direct_alignment: u64,
    /// Forward planner and security failures to the event sink.
    pub record_events: bool,
    /// Label version assumed by tools that do not ask for one.
    pub default_label_version: LabelVersion,
}

impl Default for NvmConfiguration {
    fn default() -> Self {
        NvmConfiguration {
            volatile_alignment: DEFAULT_ALIGNMENT,
            app_direct_alignment: DEFAULT_ALIGNMENT,
            record_events: true,
            default_label_version: LabelVersion::V1_2,
        }
    }
}

impl NvmConfiguration {
    /// Parses a YAML configuration document.
    pub fn from_yaml(document: &str) -> Result<Self> {
        let config: NvmConfiguration =
            serde_yaml::from_str(document).map_err(|err| NvmError::Parse(format!("configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// A goal input carrying the configured defaults, for callers to fill in.
    pub fn goal_input(&self) -> GoalInput {
        GoalInput { label_version: self.default_label_version, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.volatile_alignment.is_power_of_two() || !self.app_direct_alignment.is_power_of_two() {
            return Err(NvmError::InvalidParameter("alignment must be a power of two"));
        }
        if !self.default_label_version.is_supported() {
            return Err(NvmError::InvalidParameter("namespace label version must be 1.1 or 1.2"));
        }
        Ok(())
    }
}
