//! Session Lock
//!
//! A named mutex guarding all session state that hardware-facing operations touch. The guard releases the lock on
//! every exit path, including unwinding.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;
use core::ops::{Deref, DerefMut};
use parking_lot::{Mutex, MutexGuard};

/// Used to guard session data with a named lock.
pub struct SessionLock<T> {
    name: &'static str,
    data: Mutex<T>,
}

/// Wrapper for guarded data, which can be accessed by Deref or DerefMut on this object.
pub struct SessionLockGuard<'a, T> {
    name: &'static str,
    guard: MutexGuard<'a, T>,
}

impl<T> SessionLock<T> {
    pub fn new(data: T, name: &'static str) -> Self {
        Self { name, data: Mutex::new(data) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Blocks until the lock is available.
    pub fn lock(&self) -> SessionLockGuard<'_, T> {
        let guard = self.data.lock();
        log::trace!(target: "nvm_session", "Acquired {}", self.name);
        SessionLockGuard { name: self.name, guard }
    }

    /// Returns `None` without blocking if the lock is held.
    pub fn try_lock(&self) -> Option<SessionLockGuard<'_, T>> {
        let guard = self.data.try_lock()?;
        log::trace!(target: "nvm_session", "Acquired {}", self.name);
        Some(SessionLockGuard { name: self.name, guard })
    }
}

impl<T> fmt::Debug for SessionLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLock").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<T> Deref for SessionLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SessionLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SessionLockGuard<'_, T> {
    fn drop(&mut self) {
        log::trace!(target: "nvm_session", "Released {}", self.name);
    }
}
