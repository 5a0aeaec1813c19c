//! Persistent Memory Module (PMM) Management SDK
//!
//! Shared types for the NVM management components: the device data model, platform capability records, capacity
//! goal structures, security states, the error taxonomy and the collaborator services the core consumes.
//!
//! ## Collaborators
//!
//! The management core never talks to firmware tables, drivers or log storage directly. Those are consumed through
//! the narrow service traits in [service]:
//!
//! - [service::DeviceEnumerator]: produces device records, BIOS platform capabilities and current interleave sets.
//! - [service::NamespaceInventory]: reports whether namespaces are carved from a device's capacity.
//! - [service::FirmwareMailbox]: sends a mailbox command to a device and returns the response payload.
//! - [service::EventSink]: records operator-visible events.
//! - [service::PassThrough]: raw command access kept outside of the validated paths.
//!
//! Every service trait is mockable with `mockall` when the `mockall` feature is enabled.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
pub mod capabilities;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod goal;
pub mod interleave;
pub mod job;
pub mod mailbox;
pub mod security;
pub mod service;

/// Maximum number of interleave sets a single DIMM may participate in.
pub const MAX_IS_PER_DIMM: usize = 2;
/// Maximum number of DIMMs on a socket, and therefore in one interleave set.
pub const NVM_MAX_DEVICES_PER_SOCKET: usize = 24;
/// Maximum length of a security passphrase in bytes.
pub const NVM_PASSPHRASE_LEN: usize = 32;
/// Maximum number of interleave formats a platform may advertise per memory mode.
pub const NVM_INTERLEAVE_FORMATS: usize = 32;
/// Maximum length of a device unique id.
pub const NVM_MAX_UID_LEN: usize = 22;
