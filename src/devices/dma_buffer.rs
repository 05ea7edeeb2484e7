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

//! DMA receive buffer exposed as a character device.
//!
//! A [`DmaBufferDevice`] owns a physically contiguous buffer of kernel memory, mapped for
//! the device to write and the CPU to read. User space maps it from offset zero; mmap
//! inserts one page frame at a time with default cache attributes.
//!
//! Attributes:
//! - `phys_addr` - bus address of the buffer, hexadecimal
//! - `size` - buffer size in bytes, decimal

use crate::devices::{
    CdevSlot, DeviceContext, MappableDevice, RecordAllocation, publish, unknown_attribute,
};
use crate::error::FpgadevError;
use crate::host::{DevT, DmaDirection, DmaMemory, Host, PAGE_SIZE, PhysAddr};
use crate::minor::MinorReservation;
use crate::sync::{Semaphore, Task};
use crate::vma::{CachePolicy, VmArea};
use log::{debug, error, info};
use std::fmt;
use std::sync::Arc;

const RECORD_KIND: &str = "dma";
const ATTRIBUTES: &[&str] = &["phys_addr", "size"];
const DIRECTION: DmaDirection = DmaDirection::FromDevice;

/// Kernel memory backing the buffer; freed when dropped.
struct DmaAllocation {
    host: Arc<dyn Host>,
    memory: DmaMemory,
}

impl Drop for DmaAllocation {
    fn drop(&mut self) {
        self.host.dma_free(&self.memory);
    }
}

/// The bus mapping of the buffer; unmapped when dropped.
struct DmaMapping {
    host: Arc<dyn Host>,
    bus_addr: PhysAddr,
    size: u64,
}

impl Drop for DmaMapping {
    fn drop(&mut self) {
        self.host
            .dma_unmap_single(self.bus_addr, self.size, DIRECTION);
    }
}

pub struct DmaBufferDevice {
    // Teardown order is field order.
    cdev: CdevSlot,
    mapping: DmaMapping,
    memory: DmaAllocation,
    _minor: MinorReservation,
    _record: RecordAllocation,
    lock: Semaphore,
    name: String,
    devt: DevT,
}

impl DmaBufferDevice {
    /// Allocates a `page_count` page buffer, maps it for DMA, then registers and publishes
    /// the device.
    ///
    /// On error everything acquired so far, including `minor`, has been released in
    /// reverse order.
    ///
    /// # Returns: `Result<Arc<DmaBufferDevice>, FpgadevError>`
    /// * `Ok(Arc<DmaBufferDevice>)` - The published device
    /// * `Err(FpgadevError::Argument)` - `page_count` is zero or too large
    /// * `Err(FpgadevError::NoMemory)` - The record or the buffer could not be allocated
    /// * `Err(FpgadevError::DmaMapping)` - The bus mapping failed
    /// * `Err(FpgadevError::Registration)` - Adding the char device or publishing failed
    pub fn create(
        ctx: &DeviceContext,
        page_count: u64,
        minor: MinorReservation,
    ) -> Result<Arc<DmaBufferDevice>, FpgadevError> {
        let devt = DevT::new(ctx.major, minor.minor());
        debug!("{}: Creating dma as dev {devt}", ctx.parent);

        let size = match page_count.checked_mul(PAGE_SIZE) {
            Some(size) if size > 0 => size,
            _ => {
                return Err(FpgadevError::Argument(format!(
                    "{page_count} pages is not a valid DMA buffer size"
                )));
            }
        };

        let record = RecordAllocation::new(&ctx.host, RECORD_KIND)
            .inspect_err(|_| error!("{}: Can't allocate dev dma struct", ctx.parent))?;

        let memory = ctx
            .host
            .dma_alloc(size)
            .inspect_err(|_| error!("{}: Can't allocate DMA buffer", ctx.parent))?;
        let memory = DmaAllocation {
            host: Arc::clone(&ctx.host),
            memory,
        };

        let bus_addr = ctx
            .host
            .dma_map_single(&memory.memory, DIRECTION)
            .inspect_err(|_| error!("{}: Can't create DMA mapping", ctx.parent))?;
        let mapping = DmaMapping {
            host: Arc::clone(&ctx.host),
            bus_addr,
            size,
        };

        let device = Arc::new(DmaBufferDevice {
            cdev: CdevSlot::default(),
            mapping,
            memory,
            name: format!("dma{}", minor.minor()),
            _minor: minor,
            _record: record,
            lock: Semaphore::new(),
            devt,
        });

        device.cdev.add(&ctx.host, &device)?;
        publish(ctx, &device)?;

        info!("{}: Created", device.name);
        Ok(device)
    }

    pub fn size(&self) -> u64 {
        self.mapping.size
    }

    pub fn bus_addr(&self) -> PhysAddr {
        self.mapping.bus_addr
    }

    /// Frame of the first page of the buffer.
    pub fn base_pfn(&self) -> u64 {
        self.memory.memory.pfn
    }

    pub(crate) fn cdev(&self) -> &CdevSlot {
        &self.cdev
    }
}

impl MappableDevice for DmaBufferDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn devt(&self) -> DevT {
        self.devt
    }

    fn open(&self, task: &Task) -> Result<(), FpgadevError> {
        let _guard = self.lock.down_interruptible(task, &self.name)?;
        debug!("{}: Open", self.name);
        Ok(())
    }

    fn release(&self, task: &Task) -> Result<(), FpgadevError> {
        let _guard = self.lock.down_interruptible(task, &self.name)?;
        debug!("{}: Close", self.name);
        Ok(())
    }

    /// Maps the first `len` bytes of the buffer. `len` must be a whole number of pages
    /// no larger than the buffer. The page offset of the request is ignored.
    fn mmap(&self, task: &Task, vma: &mut VmArea) -> Result<(), FpgadevError> {
        let _guard = self.lock.down_interruptible(task, &self.name)?;
        let vm_size = vma.len();

        debug!("{}: Mmaping {vm_size} Bi", self.name);

        if vm_size > self.size() || vm_size % PAGE_SIZE != 0 {
            return Err(FpgadevError::Argument(format!(
                "{}: can't map {vm_size} bytes of a {} byte buffer in whole pages",
                self.name,
                self.size()
            )));
        }

        let mut pfn = self.base_pfn();
        for offset in (0..vm_size).step_by(PAGE_SIZE as usize) {
            if let Err(e) = vma.insert_pfn(vma.start() + offset, pfn, CachePolicy::Default) {
                vma.zap();
                return Err(e);
            }
            pfn += 1;
        }
        Ok(())
    }

    fn attribute_names(&self) -> &'static [&'static str] {
        ATTRIBUTES
    }

    fn show_attribute(&self, attribute: &str) -> Result<String, FpgadevError> {
        match attribute {
            "phys_addr" => Ok(format!("{:#x}\n", self.bus_addr())),
            "size" => Ok(format!("{}\n", self.size())),
            _ => Err(unknown_attribute(&self.name, attribute)),
        }
    }

    fn lock(&self) -> &Semaphore {
        &self.lock
    }
}

impl fmt::Debug for DmaBufferDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaBufferDevice")
            .field("name", &self.name)
            .field("devt", &self.devt)
            .field("bus_addr", &self.mapping.bus_addr)
            .field("size", &self.mapping.size)
            .finish()
    }
}
