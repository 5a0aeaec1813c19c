//! Persistent Memory Device Inventory
//!
//! The leaf of the management stack: a [DeviceCatalog](catalog::DeviceCatalog) snapshot of discovered devices and the
//! [aggregate](aggregate::aggregate) reduction of that snapshot into platform-wide capabilities.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
pub mod aggregate;
pub mod catalog;

pub use catalog::{DeviceCatalog, PortableKey};
