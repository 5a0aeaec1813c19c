//! Long Running Jobs
//!
//! Sanitize, address range scrub and firmware update run in the background on the device. Their progress is reported
//! as polled state; nothing in the management core waits on them.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use serde::{Deserialize, Serialize};

use crate::device::Uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sanitize,
    AddressRangeScrub,
    FirmwareUpdate,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    NotStarted,
    Running,
    Complete,
}

/// Polled state of a device job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub uid: Uid,
    pub kind: JobKind,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub percent_complete: u8,
}

impl Job {
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Running
    }
}
