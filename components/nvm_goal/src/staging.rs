//! Goal Staging
//!
//! Writes goals to, reads them back from, and clears them from each DIMM's platform configuration data area through
//! the firmware mailbox. The BIOS processes a staged goal on the next boot.
//!
//! A multi-DIMM commit is all-or-nothing. Each target's previously staged goal is captured before anything is written;
//! if a later write fails, every DIMM already written is restored. A DIMM whose write or restore failed in transport
//! is reported as unsettled: its staged goal is unknown until it is read back.
//!
//! ## Logging
//!
//! Staging traffic is logged using the `nvm_goal` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use scroll::{Pread, Pwrite, LE};

use nvm_sdk::device::Uid;
use nvm_sdk::error::{NvmError, Result};
use nvm_sdk::goal::{ConfigGoal, ConfigGoalStatus, GoalSlot};
use nvm_sdk::interleave::{InterleaveSize, InterleaveType, InterleaveWays};
use nvm_sdk::mailbox::{opcode, sub_opcode, FirmwareError};
use nvm_sdk::service::FirmwareMailbox;
use nvm_sdk::MAX_IS_PER_DIMM;

/// Signature at the start of a staged goal payload.
pub const GOAL_SIGNATURE: u16 = u16::from_le_bytes(*b"GL");
/// Current staged goal payload revision.
pub const GOAL_REVISION: u8 = 1;

const HEADER_LEN: usize = 23;
const SLOT_LEN: usize = 14;

/// Leading byte of a set platform configuration data request.
pub mod action {
    pub const WRITE_GOAL: u8 = 0x01;
    pub const CLEAR_GOAL: u8 = 0x02;
}

/// Encodes a goal into its staged representation.
pub fn encode_goal(goal: &ConfigGoal) -> core::result::Result<Vec<u8>, scroll::Error> {
    if goal.slots.len() > MAX_IS_PER_DIMM {
        return Err(scroll::Error::TooBig { size: goal.slots.len(), len: MAX_IS_PER_DIMM });
    }
    let mut buffer = vec![0u8; HEADER_LEN + SLOT_LEN * goal.slots.len()];
    let offset = &mut 0;
    buffer.gwrite_with(GOAL_SIGNATURE, offset, LE)?;
    buffer.gwrite_with(GOAL_REVISION, offset, LE)?;
    buffer.gwrite_with(goal.status.raw(), offset, LE)?;
    buffer.gwrite_with(goal.socket_id, offset, LE)?;
    buffer.gwrite_with(goal.volatile_size, offset, LE)?;
    buffer.gwrite_with(goal.storage_capacity, offset, LE)?;
    buffer.gwrite_with(goal.slots.len() as u8, offset, LE)?;
    for slot in &goal.slots {
        buffer.gwrite_with(slot.interleave_type.raw(), offset, LE)?;
        buffer.gwrite_with(slot.appdirect_size, offset, LE)?;
        buffer.gwrite_with(slot.imc.raw(), offset, LE)?;
        buffer.gwrite_with(slot.channel.raw(), offset, LE)?;
        buffer.gwrite_with(slot.ways.raw(), offset, LE)?;
        buffer.gwrite_with(slot.appdirect_index, offset, LE)?;
    }
    Ok(buffer)
}

/// Decodes a staged goal read back from a DIMM.
pub fn decode_goal(uid: &Uid, payload: &[u8]) -> Result<ConfigGoal> {
    decode_goal_fields(uid, payload).map_err(|err| NvmError::Parse(format!("staged goal on {uid}: {err}")))
}

#[derive(Debug)]
enum DecodeError {
    Scroll(scroll::Error),
    Field(&'static str),
}

impl From<scroll::Error> for DecodeError {
    fn from(value: scroll::Error) -> Self {
        DecodeError::Scroll(value)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Scroll(err) => write!(f, "{err}"),
            DecodeError::Field(field) => write!(f, "invalid {field}"),
        }
    }
}

fn decode_goal_fields(uid: &Uid, payload: &[u8]) -> core::result::Result<ConfigGoal, DecodeError> {
    let offset = &mut 0;
    if payload.gread_with::<u16>(offset, LE)? != GOAL_SIGNATURE {
        return Err(DecodeError::Field("signature"));
    }
    if payload.gread_with::<u8>(offset, LE)? != GOAL_REVISION {
        return Err(DecodeError::Field("revision"));
    }
    let status =
        ConfigGoalStatus::from_raw(payload.gread_with(offset, LE)?).ok_or(DecodeError::Field("goal status"))?;
    let socket_id: u16 = payload.gread_with(offset, LE)?;
    let volatile_size: u64 = payload.gread_with(offset, LE)?;
    let storage_capacity: u64 = payload.gread_with(offset, LE)?;
    let count: u8 = payload.gread_with(offset, LE)?;
    if count as usize > MAX_IS_PER_DIMM {
        return Err(DecodeError::Field("slot count"));
    }

    let mut slots = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let interleave_type =
            InterleaveType::from_raw(payload.gread_with(offset, LE)?).ok_or(DecodeError::Field("interleave type"))?;
        let appdirect_size: u64 = payload.gread_with(offset, LE)?;
        let imc = InterleaveSize::from_raw(payload.gread_with(offset, LE)?).ok_or(DecodeError::Field("imc size"))?;
        let channel =
            InterleaveSize::from_raw(payload.gread_with(offset, LE)?).ok_or(DecodeError::Field("channel size"))?;
        let ways = InterleaveWays::from_raw(payload.gread_with(offset, LE)?).ok_or(DecodeError::Field("ways"))?;
        let appdirect_index: u8 = payload.gread_with(offset, LE)?;
        slots.push(GoalSlot { interleave_type, appdirect_size, imc, channel, ways, appdirect_index });
    }

    Ok(ConfigGoal { uid: uid.clone(), socket_id, volatile_size, storage_capacity, slots, status })
}

/// A commit or clear that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub error: NvmError,
    /// DIMMs whose staged goal is unknown and must be read back before they are written again.
    pub unsettled: Vec<Uid>,
}

impl From<NvmError> for StageFailure {
    fn from(error: NvmError) -> Self {
        StageFailure { error, unsettled: Vec::new() }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if !self.unsettled.is_empty() {
            write!(f, " ({} DIMMs in unknown state)", self.unsettled.len())?;
        }
        Ok(())
    }
}

impl core::error::Error for StageFailure {}

/// Moves goals between the management layer and DIMM staging areas.
pub struct GoalStager<'a> {
    mailbox: &'a dyn FirmwareMailbox,
}

impl<'a> GoalStager<'a> {
    pub fn new(mailbox: &'a dyn FirmwareMailbox) -> Self {
        Self { mailbox }
    }

    fn read_raw(&self, uid: &Uid) -> core::result::Result<Vec<u8>, FirmwareError> {
        self.mailbox.send(uid, opcode::GET_ADMIN_FEATURES, sub_opcode::PLATFORM_CONFIG_DATA, &[])
    }

    fn write_raw(&self, uid: &Uid, staged: &[u8]) -> core::result::Result<(), FirmwareError> {
        let payload = if staged.is_empty() {
            vec![action::CLEAR_GOAL]
        } else {
            let mut payload = Vec::with_capacity(staged.len() + 1);
            payload.push(action::WRITE_GOAL);
            payload.extend_from_slice(staged);
            payload
        };
        self.mailbox.send(uid, opcode::SET_ADMIN_FEATURES, sub_opcode::PLATFORM_CONFIG_DATA, &payload).map(|_| ())
    }

    /// Reads the goal staged on a DIMM, if any.
    pub fn read(&self, uid: &Uid) -> Result<Option<ConfigGoal>> {
        let staged = self.read_raw(uid).map_err(|err| err.for_device(uid))?;
        if staged.is_empty() {
            return Ok(None);
        }
        decode_goal(uid, &staged).map(Some)
    }

    /// Stages every goal, or none of them.
    pub fn commit(&self, goals: &[ConfigGoal]) -> core::result::Result<(), StageFailure> {
        let mut staged = Vec::with_capacity(goals.len());
        for goal in goals {
            let encoded = encode_goal(goal).map_err(|_| NvmError::ResourceExhausted("goal does not fit a staging area"))?;
            staged.push((&goal.uid, encoded));
        }
        self.apply(&staged)
    }

    /// Clears the goals staged on every DIMM, or on none of them.
    pub fn clear(&self, uids: &[Uid]) -> core::result::Result<(), StageFailure> {
        let staged: Vec<(&Uid, Vec<u8>)> = uids.iter().map(|uid| (uid, Vec::new())).collect();
        self.apply(&staged)
    }

    fn apply(&self, staged: &[(&Uid, Vec<u8>)]) -> core::result::Result<(), StageFailure> {
        let mut previous = Vec::with_capacity(staged.len());
        for (uid, _) in staged {
            previous.push(self.read_raw(uid).map_err(|err| err.for_device(uid))?);
        }

        for (position, (uid, payload)) in staged.iter().enumerate() {
            log::debug!(target: "nvm_goal", "Staging {} bytes on {}", payload.len(), uid);
            let Err(err) = self.write_raw(uid, payload) else {
                continue;
            };
            let mut unsettled = Vec::new();
            if err.is_ambiguous() {
                log::error!(target: "nvm_goal", "Staging on {} failed in transport: {}", uid, err);
                unsettled.push((*uid).clone());
            } else {
                log::warn!(target: "nvm_goal", "Staging on {} rejected: {}", uid, err);
            }
            for ((written, _), original) in staged[..position].iter().zip(&previous[..position]).rev() {
                if let Err(rollback) = self.write_raw(written, original) {
                    log::error!(target: "nvm_goal", "Restoring the staged goal on {} failed: {}", written, rollback);
                    unsettled.push((*written).clone());
                }
            }
            return Err(StageFailure { error: err.for_device(uid), unsettled });
        }
        log::info!(target: "nvm_goal", "Staged goals on {} DIMMs", staged.len());
        Ok(())
    }
}
