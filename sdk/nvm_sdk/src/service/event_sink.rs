//! Event Sink Service Trait
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use crate::event::Event;

/// Event Sink Service
///
/// Receives operator-visible events. Storage, filtering and acknowledgement are owned by the sink.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait EventSink: Send + Sync {
    fn record_event(&self, event: Event);
}
