//! Firmware Mailbox Commands
//!
//! Opcodes, completion statuses and payload helpers for the device firmware mailbox. The layout of the payloads is
//! owned by this crate's encoders; the transport below [crate::service::FirmwareMailbox] only moves bytes.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use scroll::{Pread, Pwrite, LE};

use crate::device::Uid;
use crate::error::NvmError;
use crate::security::SecurityStatus;
use crate::NVM_PASSPHRASE_LEN;

/// Mailbox opcodes.
pub mod opcode {
    pub const GET_SECURITY_INFO: u8 = 0x02;
    pub const SET_SECURITY_INFO: u8 = 0x03;
    pub const GET_ADMIN_FEATURES: u8 = 0x06;
    pub const SET_ADMIN_FEATURES: u8 = 0x07;
}

/// Mailbox sub-opcodes.
pub mod sub_opcode {
    /// [super::opcode::GET_SECURITY_INFO]
    pub const GET_SECURITY_STATE: u8 = 0x00;
    /// [super::opcode::SET_SECURITY_INFO]
    pub const SET_MASTER_PASSPHRASE: u8 = 0xF0;
    pub const SET_PASSPHRASE: u8 = 0xF1;
    pub const DISABLE_PASSPHRASE: u8 = 0xF2;
    pub const UNLOCK_UNIT: u8 = 0xF3;
    pub const SECURE_ERASE: u8 = 0xF5;
    pub const FREEZE_LOCK: u8 = 0xF6;
    /// [super::opcode::GET_ADMIN_FEATURES] and [super::opcode::SET_ADMIN_FEATURES]
    pub const PLATFORM_CONFIG_DATA: u8 = 0x01;
}

/// Failure status reported by device firmware on command completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FwStatus {
    InvalidParameter,
    DataTransferError,
    InternalDeviceError,
    UnsupportedCommand,
    DeviceBusy,
    IncorrectPassphrase,
    SecurityCheckFailure,
    InvalidSecurityState,
    ConfigLocked,
    InvalidAlignment,
    /// The passphrase attempt count is exhausted.
    SecurityCountExpired,
    Other(u8),
}

impl FwStatus {
    pub const fn raw(&self) -> u8 {
        match self {
            FwStatus::InvalidParameter => 0x01,
            FwStatus::DataTransferError => 0x02,
            FwStatus::InternalDeviceError => 0x03,
            FwStatus::UnsupportedCommand => 0x04,
            FwStatus::DeviceBusy => 0x05,
            FwStatus::IncorrectPassphrase => 0x06,
            FwStatus::SecurityCheckFailure => 0x07,
            FwStatus::InvalidSecurityState => 0x08,
            FwStatus::ConfigLocked => 0x0F,
            FwStatus::InvalidAlignment => 0x10,
            FwStatus::SecurityCountExpired => 0x13,
            FwStatus::Other(raw) => *raw,
        }
    }

    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0x01 => FwStatus::InvalidParameter,
            0x02 => FwStatus::DataTransferError,
            0x03 => FwStatus::InternalDeviceError,
            0x04 => FwStatus::UnsupportedCommand,
            0x05 => FwStatus::DeviceBusy,
            0x06 => FwStatus::IncorrectPassphrase,
            0x07 => FwStatus::SecurityCheckFailure,
            0x08 => FwStatus::InvalidSecurityState,
            0x0F => FwStatus::ConfigLocked,
            0x10 => FwStatus::InvalidAlignment,
            0x13 => FwStatus::SecurityCountExpired,
            other => FwStatus::Other(other),
        }
    }
}

impl fmt::Display for FwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FwStatus::InvalidParameter => write!(f, "invalid command parameter"),
            FwStatus::DataTransferError => write!(f, "data transfer error"),
            FwStatus::InternalDeviceError => write!(f, "internal device error"),
            FwStatus::UnsupportedCommand => write!(f, "unsupported command"),
            FwStatus::DeviceBusy => write!(f, "device busy"),
            FwStatus::IncorrectPassphrase => write!(f, "incorrect passphrase"),
            FwStatus::SecurityCheckFailure => write!(f, "security check failure"),
            FwStatus::InvalidSecurityState => write!(f, "invalid security state"),
            FwStatus::ConfigLocked => write!(f, "configuration locked"),
            FwStatus::InvalidAlignment => write!(f, "invalid alignment"),
            FwStatus::SecurityCountExpired => write!(f, "passphrase attempt limit reached"),
            FwStatus::Other(raw) => write!(f, "firmware status {raw:#04x}"),
        }
    }
}

/// Result of a mailbox transaction that did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareError {
    /// Firmware completed the command and reported a failure. The device did not act on the command.
    Status(FwStatus),
    /// The transaction did not complete. The device may or may not have acted on the command.
    Transport(String),
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareError::Status(status) => write!(f, "firmware rejected the command: {status}"),
            FirmwareError::Transport(detail) => write!(f, "mailbox transport failure: {detail}"),
        }
    }
}

impl core::error::Error for FirmwareError {}

impl FirmwareError {
    /// Attributes the failure to a device.
    pub fn for_device(self, uid: &Uid) -> NvmError {
        match self {
            FirmwareError::Status(status) => NvmError::FirmwareRejected { uid: uid.clone(), status },
            FirmwareError::Transport(detail) => NvmError::TransportFailure { uid: uid.clone(), detail },
        }
    }

    /// True if the device may have acted on the command.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, FirmwareError::Transport(_))
    }
}

/// Size of the get security state response.
pub const SECURITY_STATE_LEN: usize = 4;

/// Encodes a security state response.
pub fn encode_security_state(status: SecurityStatus) -> Vec<u8> {
    status.bits().to_le_bytes().to_vec()
}

/// Decodes a get security state response.
pub fn decode_security_state(payload: &[u8]) -> Result<SecurityStatus, scroll::Error> {
    let raw: u32 = payload.pread_with(0, LE)?;
    Ok(SecurityStatus::from_bits_truncate(raw))
}

/// Builds a payload carrying up to two fixed-width, zero padded passphrases.
///
/// Passphrase length is validated by callers; longer input is rejected here rather than truncated.
pub fn passphrase_payload(first: &[u8], second: Option<&[u8]>) -> Result<Vec<u8>, scroll::Error> {
    let fields = if second.is_some() { 2 } else { 1 };
    let mut payload = vec![0u8; NVM_PASSPHRASE_LEN * fields];
    for (index, field) in [Some(first), second].into_iter().flatten().enumerate() {
        if field.len() > NVM_PASSPHRASE_LEN {
            return Err(scroll::Error::TooBig { size: field.len(), len: NVM_PASSPHRASE_LEN });
        }
        payload.pwrite_with(field, index * NVM_PASSPHRASE_LEN, ())?;
    }
    Ok(payload)
}

/// Splits a passphrase payload into its trimmed fields.
pub fn split_passphrase_payload(payload: &[u8]) -> Vec<&[u8]> {
    payload
        .chunks(NVM_PASSPHRASE_LEN)
        .map(|field| {
            let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
            &field[..end]
        })
        .collect()
}
