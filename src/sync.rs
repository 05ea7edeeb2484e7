// This file is part of fpgadev, a broker exposing FPGA register windows and DMA buffers to user space through character devices.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// fpgadev is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// fpgadev is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Interruptible semaphore guarding each device record.
//!
//! A [`Semaphore`] is a binary lock whose wait can be cut short by a signal pending on the
//! calling [`Task`]. An interrupted wait returns [`FpgadevError::Interrupted`] without
//! having taken the lock; the caller re-issues the operation. The lock is released when
//! the returned [`SemaphoreGuard`] drops, so every exit path releases it exactly once.

use crate::error::FpgadevError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// How long a waiter sleeps between signal checks.
const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The calling context of a file operation: a thread of some user process.
///
/// Clones share the same pending-signal flag.
#[derive(Debug, Clone, Default)]
pub struct Task {
    name: String,
    signal_pending: Arc<AtomicBool>,
}

impl Task {
    pub fn new(name: &str) -> Task {
        Task {
            name: name.to_owned(),
            signal_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks a signal as pending; interruptible waits by this task give up.
    pub fn send_signal(&self) {
        self.signal_pending.store(true, Ordering::SeqCst);
    }

    /// The signal has been delivered; waits are no longer interrupted.
    pub fn clear_signal(&self) {
        self.signal_pending.store(false, Ordering::SeqCst);
    }

    pub fn signal_pending(&self) -> bool {
        self.signal_pending.load(Ordering::SeqCst)
    }
}

/// Counters for observing lock behaviour.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreStats {
    pub acquired: u64,
    pub released: u64,
    pub interrupted: u64,
}

#[derive(Debug, Default)]
pub struct Semaphore {
    held: Mutex<bool>,
    available: Condvar,
    acquired: AtomicU64,
    released: AtomicU64,
    interrupted: AtomicU64,
}

impl Semaphore {
    pub fn new() -> Semaphore {
        Semaphore::default()
    }

    fn held(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes the lock. A free lock is taken at once; a held one is waited for until it
    /// is released or `task` has a signal pending.
    ///
    /// `what` names the lock in the returned error.
    pub fn down_interruptible(
        &self,
        task: &Task,
        what: &str,
    ) -> Result<SemaphoreGuard<'_>, FpgadevError> {
        let mut held = self.held();
        loop {
            if !*held {
                *held = true;
                self.acquired.fetch_add(1, Ordering::Relaxed);
                return Ok(SemaphoreGuard { semaphore: self });
            }
            if task.signal_pending() {
                self.interrupted.fetch_add(1, Ordering::Relaxed);
                return Err(FpgadevError::Interrupted(what.to_owned()));
            }
            held = self
                .available
                .wait_timeout(held, SIGNAL_POLL_INTERVAL)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    fn up(&self) {
        *self.held() = false;
        self.released.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
    }

    pub fn stats(&self) -> SemaphoreStats {
        SemaphoreStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
#[must_use = "the semaphore is released as soon as the guard is dropped"]
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.up();
    }
}
