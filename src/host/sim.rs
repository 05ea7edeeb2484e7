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

//! In-process host used by the daemon and by the tests.
//!
//! [`SimHost`] keeps the same tables a kernel would (chrdev regions, the character-device
//! namespace, classes, the device-model tree, iomem reservations, DMA memory) and counts
//! every acquisition and release, so teardown can be checked for leaks and double frees.
//! Any step can be made to fail through the [`FaultPlan`] installed with
//! [`SimHost::set_faults`].
//!
//! DMA memory is carved out of a bump-allocated physical pool starting at
//! [`DMA_POOL_BASE`]; kernel virtual addresses are the linear map of that pool at
//! [`PAGE_OFFSET`]. Bus addresses are identical to physical addresses (no IOMMU).

use crate::devices::MappableDevice;
use crate::error::{EBUSY, EEXIST, FpgadevError};
use crate::host::{
    DevT, DeviceNode, DmaDirection, DmaMemory, Host, PAGE_SHIFT, PhysAddr, Region, page_align_up,
};
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub const PAGE_OFFSET: u64 = 0xc000_0000;
pub const DMA_POOL_BASE: PhysAddr = 0x2000_0000;
pub const FIRST_DYNAMIC_MAJOR: u32 = 240;

/// Steps a [`SimHost`] should refuse.
///
/// Counters are "fail the n-th call from now" with `1` meaning the next call; `0` never
/// fails. Set-based fields fail every matching call.
#[derive(Debug, Default, Clone)]
pub struct FaultPlan {
    pub alloc_chrdev_region: bool,
    pub class_create: Vec<String>,
    pub alloc_record: u32,
    pub cdev_add: Vec<DevT>,
    pub device_register: Vec<String>,
    pub dma_alloc: u32,
    pub dma_map: u32,
}

/// Running totals of everything acquired and released.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostStats {
    pub records_allocated: u32,
    pub records_freed: u32,
    pub cdevs_added: u32,
    pub cdevs_deleted: u32,
    pub devices_registered: u32,
    pub devices_unregistered: u32,
    pub regions_requested: u32,
    pub regions_released: u32,
    pub dma_allocated: u32,
    pub dma_freed: u32,
    pub dma_mapped: u32,
    pub dma_unmapped: u32,
}

impl HostStats {
    /// Everything acquired has been released exactly once.
    pub fn is_balanced(&self) -> bool {
        self.records_allocated == self.records_freed
            && self.cdevs_added == self.cdevs_deleted
            && self.devices_registered == self.devices_unregistered
            && self.regions_requested == self.regions_released
            && self.dma_allocated == self.dma_freed
            && self.dma_mapped == self.dma_unmapped
    }
}

struct PublishedDevice {
    node: DeviceNode,
    device: Arc<dyn MappableDevice>,
}

#[derive(Default)]
struct State {
    faults: FaultPlan,
    stats: HostStats,
    next_major: u32,
    chrdev_regions: HashMap<u32, (u32, u32, String)>,
    classes: Vec<String>,
    iomem: Vec<(Region, String)>,
    cdevs: BTreeMap<DevT, Weak<dyn MappableDevice>>,
    published: Vec<PublishedDevice>,
    live_records: HashMap<&'static str, u32>,
    dma_next: PhysAddr,
    dma_live: Vec<DmaMemory>,
    dma_mappings: Vec<(PhysAddr, u64, DmaDirection)>,
}

fn countdown(counter: &mut u32) -> bool {
    match *counter {
        0 => false,
        1 => {
            *counter = 0;
            true
        }
        _ => {
            *counter -= 1;
            false
        }
    }
}

#[derive(Default)]
pub struct SimHost {
    state: Mutex<State>,
}

impl SimHost {
    pub fn new() -> SimHost {
        SimHost {
            state: Mutex::new(State {
                next_major: FIRST_DYNAMIC_MAJOR,
                dma_next: DMA_POOL_BASE,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain bookkeeping behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_faults(&self, faults: FaultPlan) {
        self.state().faults = faults;
    }

    pub fn stats(&self) -> HostStats {
        self.state().stats.clone()
    }

    pub fn classes(&self) -> Vec<String> {
        self.state().classes.clone()
    }

    pub fn reserved_regions(&self) -> Vec<(Region, String)> {
        self.state().iomem.clone()
    }

    pub fn has_cdev(&self, devt: DevT) -> bool {
        self.state().cdevs.contains_key(&devt)
    }

    /// Records of `kind` that have been allocated and not yet freed.
    pub fn live_records(&self, kind: &str) -> u32 {
        self.state()
            .live_records
            .get(kind)
            .copied()
            .unwrap_or_default()
    }

    pub fn chrdev_region_count(&self) -> usize {
        self.state().chrdev_regions.len()
    }
}

impl Host for SimHost {
    fn alloc_chrdev_region(
        &self,
        first_minor: u32,
        count: u32,
        name: &str,
    ) -> Result<u32, FpgadevError> {
        let mut state = self.state();
        if state.faults.alloc_chrdev_region {
            return Err(FpgadevError::Registration {
                what: format!("chrdev region for {name}"),
                errno: EBUSY,
            });
        }
        let major = state.next_major;
        state.next_major += 1;
        state
            .chrdev_regions
            .insert(major, (first_minor, count, name.to_owned()));
        trace!("chrdev region {major}:{first_minor}+{count} allocated for {name}");
        Ok(major)
    }

    fn unregister_chrdev_region(&self, major: u32, first_minor: u32, count: u32) {
        let mut state = self.state();
        match state.chrdev_regions.remove(&major) {
            Some((first, n, _)) if first == first_minor && n == count => {}
            Some(_) => warn!("chrdev region {major} released with mismatched bounds"),
            None => warn!("chrdev region {major} released but never allocated"),
        }
    }

    fn class_create(&self, name: &str) -> Result<(), FpgadevError> {
        let mut state = self.state();
        if state.faults.class_create.iter().any(|c| c == name)
            || state.classes.iter().any(|c| c == name)
        {
            return Err(FpgadevError::Registration {
                what: format!("class '{name}'"),
                errno: EEXIST,
            });
        }
        state.classes.push(name.to_owned());
        Ok(())
    }

    fn class_destroy(&self, name: &str) {
        self.state().classes.retain(|c| c != name);
    }

    fn request_mem_region(&self, region: Region, owner: &str) -> Result<(), FpgadevError> {
        let mut state = self.state();
        if region.size == 0 || region.end().is_none() {
            return Err(FpgadevError::Argument(format!(
                "{region} is not a valid memory region"
            )));
        }
        if let Some((taken, by)) = state.iomem.iter().find(|(r, _)| r.overlaps(&region)) {
            return Err(FpgadevError::RegionConflict(format!(
                "{region} overlaps {taken} already reserved by {by}"
            )));
        }
        state.iomem.push((region, owner.to_owned()));
        state.stats.regions_requested += 1;
        Ok(())
    }

    fn release_mem_region(&self, region: Region) {
        let mut state = self.state();
        let before = state.iomem.len();
        state.iomem.retain(|(r, _)| *r != region);
        if state.iomem.len() == before {
            warn!("Releasing {region} which was not reserved");
            return;
        }
        state.stats.regions_released += 1;
    }

    fn alloc_record(&self, kind: &'static str) -> Result<(), FpgadevError> {
        let mut state = self.state();
        if countdown(&mut state.faults.alloc_record) {
            return Err(FpgadevError::NoMemory(format!("{kind} record")));
        }
        *state.live_records.entry(kind).or_default() += 1;
        state.stats.records_allocated += 1;
        Ok(())
    }

    fn free_record(&self, kind: &'static str) {
        let mut state = self.state();
        match state.live_records.get_mut(kind) {
            Some(live) if *live > 0 => *live -= 1,
            _ => {
                warn!("Freeing a {kind} record that was never allocated");
                return;
            }
        }
        state.stats.records_freed += 1;
    }

    fn cdev_add(
        &self,
        devt: DevT,
        device: Weak<dyn MappableDevice>,
    ) -> Result<(), FpgadevError> {
        let mut state = self.state();
        if state.faults.cdev_add.contains(&devt) || state.cdevs.contains_key(&devt) {
            return Err(FpgadevError::Registration {
                what: format!("char device {devt}"),
                errno: EBUSY,
            });
        }
        state.cdevs.insert(devt, device);
        state.stats.cdevs_added += 1;
        Ok(())
    }

    fn cdev_del(&self, devt: DevT) {
        let mut state = self.state();
        if state.cdevs.remove(&devt).is_some() {
            state.stats.cdevs_deleted += 1;
        } else {
            warn!("Deleting char device {devt} which was not added");
        }
    }

    fn cdev_lookup(&self, devt: DevT) -> Result<Arc<dyn MappableDevice>, FpgadevError> {
        self.state()
            .cdevs
            .get(&devt)
            .and_then(Weak::upgrade)
            .ok_or_else(|| FpgadevError::NoDevice(devt.to_string()))
    }

    fn device_register(
        &self,
        node: DeviceNode,
        device: Arc<dyn MappableDevice>,
    ) -> Result<(), FpgadevError> {
        let mut state = self.state();
        if state.faults.device_register.contains(&node.name)
            || state.published.iter().any(|p| p.node.name == node.name)
        {
            return Err(FpgadevError::Registration {
                what: format!("device '{}'", node.name),
                errno: EEXIST,
            });
        }
        if !state.classes.contains(&node.class) {
            return Err(FpgadevError::Argument(format!(
                "Class '{}' does not exist",
                node.class
            )));
        }
        debug!("{}: published in class {}", node.name, node.class);
        state.published.push(PublishedDevice { node, device });
        state.stats.devices_registered += 1;
        Ok(())
    }

    fn device_unregister(&self, name: &str) -> Option<Arc<dyn MappableDevice>> {
        let mut state = self.state();
        let index = state.published.iter().position(|p| p.node.name == name)?;
        let published = state.published.remove(index);
        state.stats.devices_unregistered += 1;
        Some(published.device)
    }

    fn device_lookup(&self, name: &str) -> Result<Arc<dyn MappableDevice>, FpgadevError> {
        self.state()
            .published
            .iter()
            .find(|p| p.node.name == name)
            .map(|p| Arc::clone(&p.device))
            .ok_or_else(|| FpgadevError::NotFound(format!("Device {name} not found.")))
    }

    fn devices(&self) -> Vec<DeviceNode> {
        self.state()
            .published
            .iter()
            .map(|p| p.node.clone())
            .collect()
    }

    fn dma_alloc(&self, size: u64) -> Result<DmaMemory, FpgadevError> {
        let mut state = self.state();
        if countdown(&mut state.faults.dma_alloc) {
            return Err(FpgadevError::NoMemory(format!("{size} bytes of DMA memory")));
        }
        let span = page_align_up(size)
            .ok_or_else(|| FpgadevError::NoMemory(format!("{size} bytes of DMA memory")))?;
        let phys = state.dma_next;
        state.dma_next = phys
            .checked_add(span)
            .ok_or_else(|| FpgadevError::NoMemory("DMA pool exhausted".into()))?;
        let memory = DmaMemory {
            virt_addr: PAGE_OFFSET + phys,
            pfn: phys >> PAGE_SHIFT,
            size,
        };
        state.dma_live.push(memory);
        state.stats.dma_allocated += 1;
        Ok(memory)
    }

    fn dma_free(&self, memory: &DmaMemory) {
        let mut state = self.state();
        let before = state.dma_live.len();
        state.dma_live.retain(|m| m != memory);
        if state.dma_live.len() == before {
            warn!("Freeing DMA memory at {:#x} twice", memory.virt_addr);
            return;
        }
        state.stats.dma_freed += 1;
    }

    fn dma_map_single(
        &self,
        memory: &DmaMemory,
        direction: DmaDirection,
    ) -> Result<PhysAddr, FpgadevError> {
        let mut state = self.state();
        if countdown(&mut state.faults.dma_map) {
            return Err(FpgadevError::DmaMapping(format!(
                "Can't map {:#x} for DMA",
                memory.virt_addr
            )));
        }
        let bus_addr = memory.pfn << PAGE_SHIFT;
        state.dma_mappings.push((bus_addr, memory.size, direction));
        state.stats.dma_mapped += 1;
        Ok(bus_addr)
    }

    fn dma_unmap_single(&self, bus_addr: PhysAddr, size: u64, direction: DmaDirection) {
        let mut state = self.state();
        let before = state.dma_mappings.len();
        state
            .dma_mappings
            .retain(|m| *m != (bus_addr, size, direction));
        if state.dma_mappings.len() == before {
            warn!("Unmapping DMA address {bus_addr:#x} which was not mapped");
            return;
        }
        state.stats.dma_unmapped += 1;
    }
}
