//! Firmware Mailbox Service Trait
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

/// Firmware Mailbox Service
///
/// Executes one mailbox transaction against a device. Transactions are synchronous and may take tens of
/// milliseconds.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait FirmwareMailbox: Send + Sync {
    /// Sends a command to the device and returns the response payload.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<u8>)`: the command completed successfully.
    /// - `Err(FirmwareError::Status)`: the firmware completed the command with a failure status.
    /// - `Err(FirmwareError::Transport)`: the transaction did not complete; the outcome is unknown.
    fn send(&self, uid: &Uid, opcode: u8, sub_opcode: u8, payload: &[u8]) -> Result<Vec<u8>, FirmwareError>;
}
