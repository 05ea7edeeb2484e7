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

//! Physical register windows exposed as character devices.
//!
//! A [`WindowDevice`] wraps a physical range without copying it: mmap installs the range
//! straight into the caller's address space. The same component serves two device
//! families, selected by [`WindowKind`]:
//! - `io_space<minor>` - the FPGA register space
//! - `h2f_loop<minor>` - the HPS-to-FPGA loopback bridge window
//!
//! Both are mapped write-combined. Attributes:
//! - `io_base` - physical base, hexadecimal (`0xff200000`)
//! - `io_size` - window size in bytes, decimal

use crate::devices::{
    CdevSlot, DeviceContext, MappableDevice, RecordAllocation, publish, unknown_attribute,
};
use crate::error::FpgadevError;
use crate::host::{DevT, PAGE_SHIFT, Region};
use crate::minor::MinorReservation;
use crate::sync::{Semaphore, Task};
use crate::vma::{CachePolicy, VmArea};
use log::{debug, error, info};
use std::fmt;
use std::sync::Arc;

/// Which family a window device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    IoSpace,
    H2fLoop,
}

impl WindowKind {
    /// Device names are this prefix followed by the minor.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            WindowKind::IoSpace => "io_space",
            WindowKind::H2fLoop => "h2f_loop",
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::WriteCombine
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_prefix())
    }
}

const ATTRIBUTES: &[&str] = &["io_base", "io_size"];

pub struct WindowDevice {
    // Teardown order is field order.
    cdev: CdevSlot,
    _minor: MinorReservation,
    _record: RecordAllocation,
    lock: Semaphore,
    kind: WindowKind,
    name: String,
    devt: DevT,
    region: Region,
}

impl WindowDevice {
    /// Builds, registers and publishes a window over `region`.
    ///
    /// The device is openable from the moment its character device is added, and visible
    /// in the device-model tree once this returns. On error everything acquired so far,
    /// including `minor`, has been released.
    ///
    /// # Returns: `Result<Arc<WindowDevice>, FpgadevError>`
    /// * `Ok(Arc<WindowDevice>)` - The published device
    /// * `Err(FpgadevError::NoMemory)` - The record could not be allocated
    /// * `Err(FpgadevError::Registration)` - Adding the char device or publishing failed
    pub fn create(
        ctx: &DeviceContext,
        kind: WindowKind,
        region: Region,
        minor: MinorReservation,
    ) -> Result<Arc<WindowDevice>, FpgadevError> {
        let devt = DevT::new(ctx.major, minor.minor());
        debug!(
            "{}: Creating {kind} {region} as dev {devt}",
            ctx.parent
        );

        let record = RecordAllocation::new(&ctx.host, kind.name_prefix())
            .inspect_err(|_| error!("{}: Can't allocate dev {kind} struct", ctx.parent))?;

        let device = Arc::new(WindowDevice {
            cdev: CdevSlot::default(),
            name: format!("{}{}", kind.name_prefix(), minor.minor()),
            _minor: minor,
            _record: record,
            lock: Semaphore::new(),
            kind,
            devt,
            region,
        });

        device.cdev.add(&ctx.host, &device)?;
        publish(ctx, &device)?;

        info!("{}: Created", device.name);
        Ok(device)
    }

    pub(crate) fn cdev(&self) -> &CdevSlot {
        &self.cdev
    }
}

impl MappableDevice for WindowDevice {
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

    /// Maps `[offset, offset + len)` of the window, where the offset comes from the
    /// request's page offset. Fails unless the whole range lies inside the window.
    fn mmap(&self, task: &Task, vma: &mut VmArea) -> Result<(), FpgadevError> {
        let _guard = self.lock.down_interruptible(task, &self.name)?;
        let vm_size = vma.len();
        let io_offset = vma.offset().ok_or_else(|| {
            FpgadevError::Argument(format!(
                "{}: page offset {:#x} overflows",
                self.name,
                vma.pgoff()
            ))
        })?;
        let io_start = self.region.base.wrapping_add(io_offset);

        debug!(
            "{}: Mmaping {io_start:#x} into {:#x} ({vm_size})",
            self.name,
            vma.start()
        );

        let fits = io_offset
            .checked_add(vm_size)
            .is_some_and(|end| end <= self.region.size);
        if !fits {
            return Err(FpgadevError::Argument(format!(
                "{}: {vm_size} bytes at offset {io_offset:#x} exceed the {} byte window",
                self.name, self.region.size
            )));
        }

        vma.io_remap_pfn_range(
            vma.start(),
            io_start >> PAGE_SHIFT,
            vm_size,
            self.kind.cache_policy(),
        )
    }

    fn attribute_names(&self) -> &'static [&'static str] {
        ATTRIBUTES
    }

    fn show_attribute(&self, attribute: &str) -> Result<String, FpgadevError> {
        match attribute {
            "io_base" => Ok(format!("{:#x}\n", self.region.base)),
            "io_size" => Ok(format!("{}\n", self.region.size)),
            _ => Err(unknown_attribute(&self.name, attribute)),
        }
    }

    fn lock(&self) -> &Semaphore {
        &self.lock
    }
}

impl fmt::Debug for WindowDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowDevice")
            .field("name", &self.name)
            .field("devt", &self.devt)
            .field("region", &self.region)
            .finish()
    }
}
