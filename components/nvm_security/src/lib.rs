//! Persistent Memory Data-at-rest Security
//!
//! A [SecurityMachine] per device gates passphrase, lock, freeze and erase commands on the device's capabilities and
//! its last confirmed lock state, and tracks the conditions firmware enforces but does not report on every query:
//! a freeze that holds until the next platform reset, and a passphrase attempt limit that holds until recovery.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
pub mod machine;
pub mod passphrase;

pub use machine::{SecurityMachine, SecurityOperation};
pub use passphrase::Passphrase;
