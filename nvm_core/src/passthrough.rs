//! Raw Command Pass-through
//!
//! Raw commands bypass every check the session performs, so they are kept away from the validated paths: commands
//! that change security state or staged goals are refused here and must go through the session instead.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use nvm_sdk::device::Uid;
use nvm_sdk::error::{NvmError, Result};
use nvm_sdk::mailbox::opcode;
use nvm_sdk::service::PassThrough;

/// Opcodes only the validated session paths may send.
const RESERVED_OPCODES: [u8; 2] = [opcode::SET_SECURITY_INFO, opcode::SET_ADMIN_FEATURES];

/// Returns true if raw commands with `opcode` are refused.
pub fn is_reserved(opcode: u8) -> bool {
    RESERVED_OPCODES.contains(&opcode)
}

/// Forwards raw commands that cannot alias a validated operation.
pub struct RawCommandGate<'a> {
    inner: &'a dyn PassThrough,
}

impl<'a> RawCommandGate<'a> {
    pub fn new(inner: &'a dyn PassThrough) -> Self {
        Self { inner }
    }

    pub fn send(&self, uid: &Uid, opcode: u8, sub_opcode: u8, payload: &[u8]) -> Result<Vec<u8>> {
        if is_reserved(opcode) {
            log::warn!(target: "nvm_session", "Refused raw opcode {:#04x}/{:#04x} for {}", opcode, sub_opcode, uid);
            return Err(NvmError::NotSupported("raw command aliases a validated operation"));
        }
        self.inner.send_raw(uid, opcode, sub_opcode, payload).map_err(|err| err.for_device(uid))
    }
}
