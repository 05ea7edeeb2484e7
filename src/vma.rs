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

//! A user mapping request and the page mappings installed into it.
//!
//! [`VmArea`] stands for the virtual range a process asked to mmap: its start, its length
//! and the page offset it passed. The two mapping primitives a device can use are
//! [`VmArea::io_remap_pfn_range`] (a whole physical range, page granular) and
//! [`VmArea::insert_pfn`] (one page at a time). Installed pages are kept as
//! [`PageMapping`]s so the result can be inspected.

use crate::error::FpgadevError;
use crate::host::{PAGE_SHIFT, PAGE_SIZE, PhysAddr, page_align_up};
use std::fmt;

/// Cache attribute of an installed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// The protection the process asked for, unchanged.
    Default,
    /// Writes are batched before reaching the hardware.
    WriteCombine,
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Default => write!(f, "default"),
            CachePolicy::WriteCombine => write!(f, "write-combine"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMapping {
    pub virt: u64,
    pub pfn: u64,
    pub cache: CachePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmArea {
    vm_start: u64,
    vm_end: u64,
    vm_pgoff: u64,
    pages: Vec<PageMapping>,
}

impl VmArea {
    /// A request to map `length` bytes at `vm_start`, `vm_pgoff` pages into the device.
    pub fn new(vm_start: u64, length: u64, vm_pgoff: u64) -> Result<VmArea, FpgadevError> {
        if vm_start % PAGE_SIZE != 0 {
            return Err(FpgadevError::Argument(format!(
                "Mapping start {vm_start:#x} is not page aligned"
            )));
        }
        if length == 0 {
            return Err(FpgadevError::Argument("Mapping length is zero".into()));
        }
        let vm_end = vm_start.checked_add(length).ok_or_else(|| {
            FpgadevError::Argument(format!(
                "Mapping {length} bytes at {vm_start:#x} overflows the address space"
            ))
        })?;
        Ok(VmArea {
            vm_start,
            vm_end,
            vm_pgoff,
            pages: Vec::new(),
        })
    }

    pub fn start(&self) -> u64 {
        self.vm_start
    }

    pub fn len(&self) -> u64 {
        self.vm_end - self.vm_start
    }

    pub fn is_empty(&self) -> bool {
        self.vm_end == self.vm_start
    }

    pub fn pgoff(&self) -> u64 {
        self.vm_pgoff
    }

    /// Byte offset into the device requested by the page offset.
    pub fn offset(&self) -> Option<u64> {
        self.vm_pgoff.checked_mul(PAGE_SIZE)
    }

    pub fn pages(&self) -> &[PageMapping] {
        &self.pages
    }

    pub fn is_mapped(&self) -> bool {
        !self.pages.is_empty()
    }

    /// Physical start of the first installed page.
    pub fn phys_start(&self) -> Option<PhysAddr> {
        self.pages.first().map(|p| p.pfn << PAGE_SHIFT)
    }

    /// The mapped pages form one physically contiguous run.
    pub fn is_contiguous(&self) -> bool {
        self.pages
            .windows(2)
            .all(|w| w[1].pfn == w[0].pfn + 1 && w[1].virt == w[0].virt + PAGE_SIZE)
    }

    fn check_span(&self, addr: u64, size: u64) -> Result<u64, FpgadevError> {
        let span = page_align_up(size)
            .ok_or_else(|| FpgadevError::Argument(format!("Size {size} overflows")))?;
        let in_range = addr >= self.vm_start
            && addr % PAGE_SIZE == 0
            && addr
                .checked_add(size)
                .is_some_and(|end| end <= self.vm_end);
        if !in_range {
            return Err(FpgadevError::Argument(format!(
                "{size} bytes at {addr:#x} fall outside [{:#x}, {:#x})",
                self.vm_start, self.vm_end
            )));
        }
        Ok(span / PAGE_SIZE)
    }

    fn is_page_mapped(&self, virt: u64) -> bool {
        self.pages.iter().any(|p| p.virt == virt)
    }

    /// Maps `size` bytes of physical memory starting at frame `pfn` to `addr`.
    ///
    /// The range is rounded up to whole pages. Nothing is installed unless the whole range
    /// fits.
    pub fn io_remap_pfn_range(
        &mut self,
        addr: u64,
        pfn: u64,
        size: u64,
        cache: CachePolicy,
    ) -> Result<(), FpgadevError> {
        let count = self.check_span(addr, size)?;
        if (0..count).any(|i| self.is_page_mapped(addr + i * PAGE_SIZE)) {
            return Err(FpgadevError::Argument(format!(
                "Range at {addr:#x} is already mapped"
            )));
        }
        if pfn.checked_add(count).is_none() {
            return Err(FpgadevError::Argument(format!(
                "Frame range starting at {pfn:#x} overflows"
            )));
        }
        self.pages.extend((0..count).map(|i| PageMapping {
            virt: addr + i * PAGE_SIZE,
            pfn: pfn + i,
            cache,
        }));
        Ok(())
    }

    /// Maps the single frame `pfn` to the page at `addr`.
    pub fn insert_pfn(
        &mut self,
        addr: u64,
        pfn: u64,
        cache: CachePolicy,
    ) -> Result<(), FpgadevError> {
        self.check_span(addr, PAGE_SIZE)?;
        if self.is_page_mapped(addr) {
            return Err(FpgadevError::Argument(format!(
                "Page at {addr:#x} is already mapped"
            )));
        }
        self.pages.push(PageMapping {
            virt: addr,
            pfn,
            cache,
        });
        Ok(())
    }

    /// Removes every installed page.
    pub fn zap(&mut self) {
        self.pages.clear();
    }
}
