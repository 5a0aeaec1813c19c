//! Passphrases
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use nvm_sdk::error::{NvmError, Result};
use nvm_sdk::mailbox;
use nvm_sdk::NVM_PASSPHRASE_LEN;

/// A validated passphrase of 1 to 32 bytes.
///
/// The bytes are never printed and are cleared when the value is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(Vec<u8>);

impl Passphrase {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > NVM_PASSPHRASE_LEN {
            return Err(NvmError::InvalidParameter("passphrase must be 1 to 32 bytes"));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(..)")
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

/// A mailbox payload carrying passphrase material, cleared on drop.
pub(crate) struct SecretPayload(Vec<u8>);

impl SecretPayload {
    pub(crate) fn empty() -> Self {
        Self(Vec::new())
    }

    /// Builds the fixed-width payload for one or two passphrases. An absent first passphrase is sent as zeros.
    pub(crate) fn new(first: Option<&Passphrase>, second: Option<&Passphrase>) -> Result<Self> {
        mailbox::passphrase_payload(first.map(Passphrase::as_bytes).unwrap_or_default(), second.map(Passphrase::as_bytes))
            .map(Self)
            .map_err(|_| NvmError::InvalidParameter("passphrase must be 1 to 32 bytes"))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for SecretPayload {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}
