//! NVM Management Collaborator Services
//!
//! The narrow interfaces through which the management core consumes discovery, namespace, firmware mailbox and event
//! facilities it does not implement itself.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
pub mod device_enumerator;
pub mod event_sink;
pub mod firmware_mailbox;
pub mod namespace_inventory;
pub mod pass_through;

pub use device_enumerator::DeviceEnumerator;
pub use event_sink::EventSink;
pub use firmware_mailbox::FirmwareMailbox;
pub use namespace_inventory::NamespaceInventory;
pub use pass_through::PassThrough;

#[cfg(any(test, feature = "mockall"))]
pub use device_enumerator::MockDeviceEnumerator;
#[cfg(any(test, feature = "mockall"))]
pub use event_sink::MockEventSink;
#[cfg(any(test, feature = "mockall"))]
pub use firmware_mailbox::MockFirmwareMailbox;
#[cfg(any(test, feature = "mockall"))]
pub use namespace_inventory::MockNamespaceInventory;
#[cfg(any(test, feature = "mockall"))]
pub use pass_through::MockPassThrough;
