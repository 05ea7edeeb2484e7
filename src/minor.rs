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

//! First-fit minor-number allocator.
//!
//! The module reserves a fixed range of minors at load time; [`MinorAllocator`] hands them
//! out to devices. A slot is taken before a device is constructed so that a second
//! construction cannot race onto it, and is given back through the [`MinorReservation`]
//! guard: either when construction fails or when the device is finally torn down.

use crate::error::FpgadevError;
use log::{error, trace};
use std::sync::{Arc, Mutex, MutexGuard};

const BITS_PER_WORD: usize = u64::BITS as usize;

#[derive(Debug)]
pub struct MinorAllocator {
    capacity: usize,
    words: Mutex<Vec<u64>>,
}

impl MinorAllocator {
    pub fn new(capacity: usize) -> Arc<MinorAllocator> {
        Arc::new(MinorAllocator {
            capacity,
            words: Mutex::new(vec![0; capacity.div_ceil(BITS_PER_WORD)]),
        })
    }

    fn words(&self) -> MutexGuard<'_, Vec<u64>> {
        self.words.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes the lowest free minor.
    pub fn allocate(self: &Arc<Self>) -> Result<MinorReservation, FpgadevError> {
        let mut words = self.words();
        let minor = (0..self.capacity)
            .find(|&m| words[m / BITS_PER_WORD] & (1 << (m % BITS_PER_WORD)) == 0)
            .ok_or(FpgadevError::MinorsExhausted(self.capacity))?;
        words[minor / BITS_PER_WORD] |= 1 << (minor % BITS_PER_WORD);
        trace!("minor {minor} reserved");
        Ok(MinorReservation {
            allocator: Arc::clone(self),
            minor: minor as u32,
        })
    }

    /// Clears a slot. Refuses slots that are not in use.
    fn release(&self, minor: u32) -> Result<(), FpgadevError> {
        let minor = minor as usize;
        if minor >= self.capacity {
            return Err(FpgadevError::Internal(format!(
                "minor {minor} is outside the {} reserved minors",
                self.capacity
            )));
        }
        let mut words = self.words();
        let bit = 1 << (minor % BITS_PER_WORD);
        if words[minor / BITS_PER_WORD] & bit == 0 {
            return Err(FpgadevError::Internal(format!(
                "minor {minor} released while not in use"
            )));
        }
        words[minor / BITS_PER_WORD] &= !bit;
        trace!("minor {minor} released");
        Ok(())
    }

    pub fn is_used(&self, minor: u32) -> bool {
        let minor = minor as usize;
        minor < self.capacity
            && self.words()[minor / BITS_PER_WORD] & (1 << (minor % BITS_PER_WORD)) != 0
    }

    /// Minors currently in use, ascending.
    pub fn used(&self) -> Vec<u32> {
        let words = self.words();
        (0..self.capacity)
            .filter(|&m| words[m / BITS_PER_WORD] & (1 << (m % BITS_PER_WORD)) != 0)
            .map(|m| m as u32)
            .collect()
    }
}

/// A minor held by one device. Dropping it gives the minor back.
#[derive(Debug)]
pub struct MinorReservation {
    allocator: Arc<MinorAllocator>,
    minor: u32,
}

impl MinorReservation {
    pub fn minor(&self) -> u32 {
        self.minor
    }
}

impl Drop for MinorReservation {
    fn drop(&mut self) {
        if let Err(e) = self.allocator.release(self.minor) {
            error!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::one(1)]
    #[case::full_word(64)]
    #[case::two_words(100)]
    fn allocates_every_slot_in_order(#[case] capacity: usize) {
        let minors = MinorAllocator::new(capacity);
        let held: Vec<_> = (0..capacity).map(|_| minors.allocate().unwrap()).collect();
        let numbers: Vec<u32> = held.iter().map(MinorReservation::minor).collect();
        expect_that!(numbers, eq(&(0..capacity as u32).collect::<Vec<_>>()));
        expect_that!(
            minors.allocate(),
            err(displays_as(contains_substring("minor numbers are in use")))
        );
    }

    #[gtest]
    fn reuses_lowest_released_minor() {
        let minors = MinorAllocator::new(64);
        let a = minors.allocate().unwrap();
        let b = minors.allocate().unwrap();
        let c = minors.allocate().unwrap();
        drop(b);
        let d = minors.allocate().unwrap();
        expect_that!(d.minor(), eq(1));
        drop(a);
        let e = minors.allocate().unwrap();
        expect_that!(e.minor(), eq(0));
        expect_that!(minors.used(), elements_are![eq(&0), eq(&1), eq(&2)]);
        drop((c, d, e));
        expect_that!(minors.used().is_empty(), eq(true));
    }

    #[gtest]
    fn stale_release_is_refused() {
        let minors = MinorAllocator::new(8);
        let a = minors.allocate().unwrap();
        expect_that!(minors.release(5), err(anything()));
        expect_that!(minors.release(8), err(anything()));
        expect_that!(minors.is_used(a.minor()), eq(true));
    }
}
