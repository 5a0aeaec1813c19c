//! Namespace Inventory Service Trait
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
use crate::error::Result;

/// Namespace Inventory Service
///
/// Reports whether a device's capacity is in use by namespaces. A goal would destroy the interleave sets those
/// namespaces live on, so planning refuses such devices.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait NamespaceInventory: Send + Sync {
    fn has_namespaces(&self, uid: &Uid) -> Result<bool>;
}
