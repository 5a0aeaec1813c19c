//! Operator Events
//!
//! Failures worth operator visibility are handed to an external [crate::service::EventSink]. The core never stores
//! or filters events itself.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use crate::device::Uid;
use crate::error::ReturnCode;

/// Subsystem an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Config,
    Security,
    Management,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Fatal,
}

/// An operator-visible event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: EventType,
    pub severity: Severity,
    pub code: ReturnCode,
    pub uid: Option<Uid>,
    pub message: String,
}

impl Event {
    pub fn new(event_type: EventType, severity: Severity, code: ReturnCode, uid: Option<Uid>, message: String) -> Self {
        Self { event_type, severity, code, uid, message }
    }
}
