//! NVM Management Error Types
//!
//! A single error taxonomy shared by every management component. Each variant tells the caller how to recover:
//!
//! - [NvmError::InvalidParameter] and [NvmError::ValidationFailed] are recoverable by retrying with corrected input.
//!   No hardware was modified.
//! - [NvmError::FirmwareRejected] is authoritative hardware state and is never retried automatically.
//! - [NvmError::TransportFailure] leaves the device in an unknown state. Its state must be re-queried before any
//!   further mutating call on it, and until then those calls fail with [NvmError::UnknownState].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use crate::device::Uid;
use crate::mailbox::FwStatus;

/// Result type used across the NVM management crates.
pub type Result<T> = core::result::Result<T, NvmError>;

/// Planner or loader constraint violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Namespaces are carved from the device's capacity.
    NamespacesPresent(Uid),
    /// A current interleave set spans the device and a DIMM that is not a target.
    GoalAffectsUnspecifiedDimm(Uid),
    /// Reserving a DIMM needs at least two target DIMMs on the socket.
    ReserveDimmRequiresTwoDimms { socket_id: u16 },
    /// One or more per-DIMM goals were rejected. Per-DIMM statuses accompany the error.
    GoalRejected,
    /// The goal allocates more than the device's capacity.
    CapacityExceeded(Uid),
    /// The goal places the device in more interleave sets than supported.
    TooManyInterleaveSets(Uid),
    /// An interleave set spans more DIMMs than supported.
    TooManyDimmsInSet { socket_id: u16 },
    /// A multi-DIMM interleave set is not fully described.
    IncompleteInterleaveSet { socket_id: u16, appdirect_index: u8 },
    /// Two goals target the same DIMM.
    DuplicateGoal(Uid),
    /// A goal file entry has no matching DIMM on the target platform.
    MissingTargetDimm { socket_id: u16, dimm_index: u16 },
    /// A target DIMM is smaller than the DIMM the goal was recorded from.
    TargetCapacityTooSmall { uid: Uid, required: u64, available: u64 },
    /// The goal file schema version is not supported.
    UnsupportedFileVersion(u32),
    /// There is no staged goal to operate on.
    NoGoalStaged,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NamespacesPresent(uid) => write!(f, "namespaces exist on {uid}"),
            Violation::GoalAffectsUnspecifiedDimm(uid) => {
                write!(f, "an interleave set on {uid} includes a DIMM that is not targeted")
            }
            Violation::ReserveDimmRequiresTwoDimms { socket_id } => {
                write!(f, "reserving a DIMM requires at least two DIMMs on socket {socket_id}")
            }
            Violation::GoalRejected => write!(f, "one or more goals were rejected"),
            Violation::CapacityExceeded(uid) => write!(f, "goal exceeds the capacity of {uid}"),
            Violation::TooManyInterleaveSets(uid) => write!(f, "too many interleave sets on {uid}"),
            Violation::TooManyDimmsInSet { socket_id } => {
                write!(f, "too many DIMMs in an interleave set on socket {socket_id}")
            }
            Violation::IncompleteInterleaveSet { socket_id, appdirect_index } => {
                write!(f, "interleave set {appdirect_index} on socket {socket_id} is incomplete")
            }
            Violation::DuplicateGoal(uid) => write!(f, "more than one goal for {uid}"),
            Violation::MissingTargetDimm { socket_id, dimm_index } => {
                write!(f, "no DIMM {dimm_index} on socket {socket_id}")
            }
            Violation::TargetCapacityTooSmall { uid, required, available } => {
                write!(f, "{uid} has {available:#x} bytes but the goal requires {required:#x}")
            }
            Violation::UnsupportedFileVersion(version) => write!(f, "unsupported goal file version {version}"),
            Violation::NoGoalStaged => write!(f, "no goal is staged"),
        }
    }
}

/// NVM management errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NvmError {
    /// Malformed or out of range caller input.
    InvalidParameter(&'static str),
    DeviceNotFound(Uid),
    DeviceNotManageable(Uid),
    ValidationFailed(Violation),
    /// Firmware returned a definitive failure for the command.
    FirmwareRejected { uid: Uid, status: FwStatus },
    /// Communication failed before a definitive response. The outcome is unknown.
    TransportFailure { uid: Uid, detail: String },
    /// A previous transport failure left the device state unknown; it must be re-queried first.
    UnknownState(Uid),
    /// A capability is absent on the device or platform.
    NotSupported(&'static str),
    /// Insufficient interleavable capacity or staging resources.
    ResourceExhausted(&'static str),
    /// Reading or writing an external file failed.
    Io(String),
    /// An external representation could not be parsed.
    Parse(String),
}

impl NvmError {
    /// True if the caller may retry with corrected input and nothing was changed on hardware.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, NvmError::InvalidParameter(_) | NvmError::ValidationFailed(_))
    }

    /// Maps the error onto the management library return code numbering.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            NvmError::InvalidParameter(_) => ReturnCode::InvalidParameter,
            NvmError::DeviceNotFound(_) => ReturnCode::DimmNotFound,
            NvmError::DeviceNotManageable(_) => ReturnCode::ManageableDimmNotFound,
            NvmError::ValidationFailed(violation) => match violation {
                Violation::NamespacesPresent(_) => ReturnCode::RegionGoalNamespaceExists,
                Violation::GoalAffectsUnspecifiedDimm(_) => ReturnCode::RegionGoalConfAffectsUnspecDimm,
                Violation::ReserveDimmRequiresTwoDimms { .. } => ReturnCode::ReserveDimmRequiresAtLeastTwoDimms,
                Violation::IncompleteInterleaveSet { .. } => ReturnCode::PersMemMustBeAppliedToAllDimms,
                Violation::MissingTargetDimm { .. } => ReturnCode::LoadDimmCountMismatch,
                Violation::TargetCapacityTooSmall { .. } => ReturnCode::LoadImproperConfig,
                Violation::UnsupportedFileVersion(_) => ReturnCode::LoadVersion,
                Violation::DuplicateGoal(_) => ReturnCode::LoadInvalidDataInFile,
                Violation::NoGoalStaged => ReturnCode::DumpNoConfiguredDimms,
                Violation::GoalRejected
                | Violation::CapacityExceeded(_)
                | Violation::TooManyInterleaveSets(_)
                | Violation::TooManyDimmsInSet { .. } => ReturnCode::CreateGoalNotAllowed,
            },
            NvmError::FirmwareRejected { status, .. } => match status {
                FwStatus::IncorrectPassphrase => ReturnCode::InvalidPassphrase,
                FwStatus::InvalidSecurityState => ReturnCode::InvalidSecurityState,
                FwStatus::SecurityCountExpired => ReturnCode::SecurityUserPpCountExpired,
                FwStatus::UnsupportedCommand => ReturnCode::ApiNotSupported,
                _ => ReturnCode::DeviceError,
            },
            NvmError::TransportFailure { .. } => ReturnCode::DeviceBusy,
            NvmError::UnknownState(_) => ReturnCode::InvalidSecurityState,
            NvmError::NotSupported(_) => ReturnCode::NotSupported,
            NvmError::ResourceExhausted(_) => ReturnCode::RegionSizeTooSmallForIntSetAlignment,
            NvmError::Io(_) => ReturnCode::DumpFileOperationFailed,
            NvmError::Parse(_) => ReturnCode::LoadInvalidDataInFile,
        }
    }
}

impl fmt::Display for NvmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NvmError::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            NvmError::DeviceNotFound(uid) => write!(f, "Device {uid} not found"),
            NvmError::DeviceNotManageable(uid) => write!(f, "Device {uid} is not manageable"),
            NvmError::ValidationFailed(violation) => write!(f, "Validation failed: {violation}"),
            NvmError::FirmwareRejected { uid, status } => write!(f, "Device {uid} rejected the command: {status}"),
            NvmError::TransportFailure { uid, detail } => {
                write!(f, "Communication with {uid} failed, resulting state unknown: {detail}")
            }
            NvmError::UnknownState(uid) => write!(f, "State of {uid} is unknown and must be re-queried"),
            NvmError::NotSupported(what) => write!(f, "Not supported: {what}"),
            NvmError::ResourceExhausted(what) => write!(f, "Insufficient resources: {what}"),
            NvmError::Io(detail) => write!(f, "File operation failed: {detail}"),
            NvmError::Parse(detail) => write!(f, "Invalid data: {detail}"),
        }
    }
}

impl core::error::Error for NvmError {}

impl From<Violation> for NvmError {
    fn from(value: Violation) -> Self {
        NvmError::ValidationFailed(value)
    }
}

/// Management library return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ReturnCode {
    Success = 0,
    Unknown = 1,
    NotSupported = 3,
    InvalidParameter = 5,
    DeviceError = 7,
    DeviceBusy = 8,
    InvalidPassphrase = 41,
    CreateGoalNotAllowed = 36,
    InvalidSecurityState = 37,
    SecurityUserPpCountExpired = 42,
    DimmNotFound = 73,
    ManageableDimmNotFound = 74,
    WarnGoalCreationSecurityUnlocked = 97,
    RegionGoalConfAffectsUnspecDimm = 106,
    RegionSizeTooSmallForIntSetAlignment = 116,
    ReserveDimmRequiresAtLeastTwoDimms = 123,
    RegionGoalNamespaceExists = 124,
    PersMemMustBeAppliedToAllDimms = 126,
    DumpNoConfiguredDimms = 131,
    DumpFileOperationFailed = 132,
    LoadVersion = 140,
    LoadInvalidDataInFile = 141,
    LoadImproperConfig = 142,
    LoadDimmCountMismatch = 148,
    ApiNotSupported = 266,
}

impl ReturnCode {
    pub const fn code(&self) -> u16 {
        *self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> Uid {
        "8089-a2-1837-00000001".parse().unwrap()
    }

    #[test]
    fn recoverable_errors() {
        assert!(NvmError::InvalidParameter("x").is_recoverable());
        assert!(NvmError::ValidationFailed(Violation::GoalRejected).is_recoverable());
        assert!(!NvmError::TransportFailure { uid: uid(), detail: "timeout".into() }.is_recoverable());
        assert!(!NvmError::FirmwareRejected { uid: uid(), status: FwStatus::IncorrectPassphrase }.is_recoverable());
    }

    #[test]
    fn return_codes() {
        let limit = NvmError::FirmwareRejected { uid: uid(), status: FwStatus::SecurityCountExpired };
        assert_eq!(limit.return_code().code(), 42);
        let ns = NvmError::from(Violation::NamespacesPresent(uid()));
        assert_eq!(ns.return_code(), ReturnCode::RegionGoalNamespaceExists);
        assert_eq!(NvmError::Parse("bad".into()).return_code().code(), 141);
    }

    #[test]
    fn display_names_the_device() {
        let err = NvmError::UnknownState(uid());
        assert_eq!(err.to_string(), "State of 8089-a2-1837-00000001 is unknown and must be re-queried");
    }
}
