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

//! Host kernel services consumed by the driver.
//!
//! Everything the driver needs from the environment it runs in goes through the [`Host`]
//! trait: the character-device region and namespace, device classes and the device-model
//! tree, the iomem resource tree, and DMA-capable memory. Keeping these behind one trait
//! means the lifecycle code in [`crate::devices`], [`crate::driver`] and [`crate::module`]
//! never reaches for global state.
//!
//! [`sim::SimHost`] is the in-process implementation used by the daemon and the tests. It
//! keeps full accounting of every acquisition and release, and can be told to fail any
//! step through a [`sim::FaultPlan`].

pub mod sim;

use crate::devices::MappableDevice;
use crate::error::FpgadevError;
use std::fmt;
use std::sync::{Arc, Weak};

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

pub type PhysAddr = u64;

/// Rounds `value` up to the next page boundary, `None` on overflow.
pub fn page_align_up(value: u64) -> Option<u64> {
    value
        .checked_add(PAGE_SIZE - 1)
        .map(|v| v & !(PAGE_SIZE - 1))
}

/// A character-device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevT {
    pub major: u32,
    pub minor: u32,
}

impl DevT {
    pub fn new(major: u32, minor: u32) -> DevT {
        DevT { major, minor }
    }
}

impl fmt::Display for DevT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// A physical address range: a register window or a bus-window reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub base: PhysAddr,
    pub size: u64,
}

impl Region {
    pub fn new(base: PhysAddr, size: u64) -> Region {
        Region { base, size }
    }

    /// Exclusive end address, `None` when the range wraps the address space.
    pub fn end(&self) -> Option<PhysAddr> {
        self.base.checked_add(self.size)
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        let (Some(end), Some(other_end)) = (self.end(), other.end()) else {
            return true;
        };
        self.base < other_end && other.base < end
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[mem {:#x}-{:#x}]",
            self.base,
            self.base.saturating_add(self.size)
        )
    }
}

/// Direction of a streaming DMA mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    FromDevice,
}

/// Kernel memory suitable for DMA, as returned by [`Host::dma_alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaMemory {
    /// Kernel virtual address of the first byte.
    pub virt_addr: u64,
    /// Page frame backing the first page; the buffer is physically contiguous.
    pub pfn: u64,
    pub size: u64,
}

/// What gets published into the device-model tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub name: String,
    pub class: String,
    pub parent: String,
    pub devt: DevT,
}

pub trait Host: Send + Sync {
    /// Reserves `count` contiguous minors starting at `first_minor` under a new major.
    fn alloc_chrdev_region(
        &self,
        first_minor: u32,
        count: u32,
        name: &str,
    ) -> Result<u32, FpgadevError>;

    fn unregister_chrdev_region(&self, major: u32, first_minor: u32, count: u32);

    fn class_create(&self, name: &str) -> Result<(), FpgadevError>;

    fn class_destroy(&self, name: &str);

    /// Reserves a physical region exclusively for `owner`.
    fn request_mem_region(&self, region: Region, owner: &str) -> Result<(), FpgadevError>;

    fn release_mem_region(&self, region: Region);

    /// Accounts for one heap-allocated record of the given kind.
    fn alloc_record(&self, kind: &'static str) -> Result<(), FpgadevError>;

    fn free_record(&self, kind: &'static str);

    /// Adds a character device; it is openable as soon as this returns.
    fn cdev_add(
        &self,
        devt: DevT,
        device: Weak<dyn MappableDevice>,
    ) -> Result<(), FpgadevError>;

    fn cdev_del(&self, devt: DevT);

    /// Resolves an open() on `devt` to the device behind it.
    fn cdev_lookup(&self, devt: DevT) -> Result<Arc<dyn MappableDevice>, FpgadevError>;

    /// Publishes a device into the device-model tree. The tree keeps `device` alive until
    /// [`Host::device_unregister`].
    fn device_register(
        &self,
        node: DeviceNode,
        device: Arc<dyn MappableDevice>,
    ) -> Result<(), FpgadevError>;

    /// Removes a device from the tree and hands back the tree's reference.
    fn device_unregister(&self, name: &str) -> Option<Arc<dyn MappableDevice>>;

    /// Looks up a published device, as a sysfs reader would.
    fn device_lookup(&self, name: &str) -> Result<Arc<dyn MappableDevice>, FpgadevError>;

    /// Published devices in registration order.
    fn devices(&self) -> Vec<DeviceNode>;

    fn dma_alloc(&self, size: u64) -> Result<DmaMemory, FpgadevError>;

    fn dma_free(&self, memory: &DmaMemory);

    /// Establishes a bus mapping for `memory` and returns its bus address.
    fn dma_map_single(
        &self,
        memory: &DmaMemory,
        direction: DmaDirection,
    ) -> Result<PhysAddr, FpgadevError>;

    fn dma_unmap_single(&self, bus_addr: PhysAddr, size: u64, direction: DmaDirection);
}
