//! Raw Command Pass-through Service Trait
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use crate::device::Uid;
use crate::mailbox::FirmwareError;

/// Raw Command Pass-through Service
///
/// Sends an arbitrary vendor command with no validation. Implementations must refuse commands that would change
/// state owned by the goal or security paths.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait PassThrough: Send + Sync {
    fn send_raw(&self, uid: &Uid, opcode: u8, sub_opcode: u8, payload: &[u8]) -> Result<Vec<u8>, FirmwareError>;
}
