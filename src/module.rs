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

//! Module lifecycle: load, bus attach/detach, and unload.
//!
//! [`Module::load`] reserves the chrdev region, creates the device class, sets up the minor
//! allocator and registers the bridge driver. Every step is held by a guard field, so a
//! failed load releases exactly what it took, in reverse order. Dropping the [`Module`]
//! (or calling [`Module::unload`]) unbinds every attached bridge, newest first, then
//! releases the class and the chrdev region.
//!
//! Bridges arrive through [`Module::attach`], which plays the role of the platform bus:
//! it matches the device against the driver's compatible table and probes it. Attach and
//! detach are serialized, so two concurrent attaches can never race for the same minors.

use crate::config::{FIRST_MINOR, ModuleConfig};
use crate::devices::{MappableDevice, OpenFile};
use crate::driver::{BridgeDriver, BridgeInstance, DriverContext, DriverMatch, PlatformDevice};
use crate::error::FpgadevError;
use crate::host::{DeviceNode, Host, Region};
use crate::minor::MinorAllocator;
use crate::sync::Task;
use crate::vma::VmArea;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// The reserved chrdev region; unregistered when dropped.
struct ChrdevRegion {
    host: Arc<dyn Host>,
    major: u32,
    count: u32,
}

impl ChrdevRegion {
    fn alloc(host: &Arc<dyn Host>, count: u32, name: &str) -> Result<Self, FpgadevError> {
        let major = host.alloc_chrdev_region(FIRST_MINOR, count, name)?;
        debug!("{name}: chrdev region {major}:{FIRST_MINOR}+{count}");
        Ok(ChrdevRegion {
            host: Arc::clone(host),
            major,
            count,
        })
    }
}

impl Drop for ChrdevRegion {
    fn drop(&mut self) {
        self.host
            .unregister_chrdev_region(self.major, FIRST_MINOR, self.count);
    }
}

/// A device class; destroyed when dropped.
struct ClassRegistration {
    host: Arc<dyn Host>,
    name: &'static str,
}

impl ClassRegistration {
    fn create(host: &Arc<dyn Host>, name: &'static str) -> Result<Self, FpgadevError> {
        host.class_create(name)?;
        Ok(ClassRegistration {
            host: Arc::clone(host),
            name,
        })
    }
}

impl Drop for ClassRegistration {
    fn drop(&mut self) {
        self.host.class_destroy(self.name);
    }
}

/// A bound bridge as seen from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusDevice {
    pub name: String,
    pub region: Region,
    pub children: Vec<String>,
}

impl fmt::Display for BusDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.name, self.region, self.children.join(", "))
    }
}

/// What a successful trial mapping installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingReport {
    pub pages: usize,
    pub phys_start: u64,
    pub contiguous: bool,
}

/// Where [`Module::check_mapping`] places its trial mappings.
const TRIAL_MAPPING_BASE: u64 = 0x4000_0000;

pub struct Module {
    // Teardown order is field order, after `Drop::drop` has unbound every bridge.
    bound: Mutex<Vec<BridgeInstance>>,
    driver: BridgeDriver,
    minors: Arc<MinorAllocator>,
    _class: ClassRegistration,
    chrdev: ChrdevRegion,
    host: Arc<dyn Host>,
    name: String,
}

impl Module {
    /// Loads the module into `host`.
    ///
    /// # Returns: `Result<Module, FpgadevError>`
    /// * `Ok(Module)` - The driver is registered and ready for [`Module::attach`]
    /// * `Err(FpgadevError::Argument)` - `config` is invalid
    /// * `Err(FpgadevError::Registration)` - The chrdev region or the class could not be
    ///   registered; nothing is left behind
    pub fn load(host: Arc<dyn Host>, config: &ModuleConfig) -> Result<Module, FpgadevError> {
        config.validate()?;
        info!("{}: Loading with {} profile", config.name, config.profile);

        let chrdev = ChrdevRegion::alloc(&host, config.max_char_devices, &config.name)
            .inspect_err(|e| error!("{}: Can't allocate chrdev region: {e}", config.name))?;
        let class = ClassRegistration::create(&host, config.profile.class_name())
            .inspect_err(|e| error!("{}: Can't create class: {e}", config.name))?;
        let minors = MinorAllocator::new(config.max_char_devices as usize);
        let driver = BridgeDriver::new(config.profile, config.dma_page_count);
        info!(
            "{}: Registered platform driver {} (major {})",
            config.name,
            BridgeDriver::NAME,
            chrdev.major
        );

        Ok(Module {
            bound: Mutex::new(Vec::new()),
            driver,
            minors,
            _class: class,
            chrdev,
            host,
            name: config.name.clone(),
        })
    }

    fn bound(&self) -> MutexGuard<'_, Vec<BridgeInstance>> {
        self.bound.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn major(&self) -> u32 {
        self.chrdev.major
    }

    /// Offers `pdev` to the bridge driver, probing it on a match.
    ///
    /// # Returns: `Result<(), FpgadevError>`
    /// * `Ok(())` - The bridge is bound and its devices are published
    /// * `Err(FpgadevError::NoDevice)` - No entry of the driver's match table fits `pdev`
    /// * `Err(FpgadevError::Argument)` - A device with this name is already bound
    /// * `Err(_)` - The probe failed; nothing is left behind
    pub fn attach(&self, pdev: &PlatformDevice) -> Result<(), FpgadevError> {
        if !BridgeDriver::of_match(&pdev.compatible) {
            return Err(FpgadevError::NoDevice(format!(
                "{} is not compatible with driver {}",
                pdev.name,
                BridgeDriver::NAME
            )));
        }
        let mut bound = self.bound();
        if bound.iter().any(|b| b.name() == pdev.name) {
            return Err(FpgadevError::Argument(format!(
                "{} is already bound",
                pdev.name
            )));
        }
        let ctx = DriverContext {
            host: Arc::clone(&self.host),
            major: self.chrdev.major,
            minors: Arc::clone(&self.minors),
        };
        let instance = self.driver.probe(&ctx, pdev)?;
        bound.push(instance);
        Ok(())
    }

    /// Unbinds the bridge called `name`.
    ///
    /// # Returns: `Result<(), FpgadevError>`
    /// * `Ok(())` - The bridge's devices are unpublished
    /// * `Err(FpgadevError::NotFound)` - No bridge of that name is bound
    pub fn detach(&self, name: &str) -> Result<(), FpgadevError> {
        let instance = {
            let mut bound = self.bound();
            let index = bound
                .iter()
                .position(|b| b.name() == name)
                .ok_or_else(|| FpgadevError::NotFound(format!("{name} is not bound")))?;
            bound.remove(index)
        };
        self.driver.remove(instance);
        Ok(())
    }

    /// Opens the device node called `device`, as `open("/dev/<device>")` would.
    pub fn open(&self, device: &str, task: &Task) -> Result<OpenFile, FpgadevError> {
        let node = self
            .host
            .devices()
            .into_iter()
            .find(|n| n.name == device)
            .ok_or_else(|| FpgadevError::NotFound(format!("Device {device} not found.")))?;
        OpenFile::open(self.host.as_ref(), node.devt, task)
    }

    /// Reads one attribute of a published device.
    pub fn read_attribute(&self, device: &str, attribute: &str) -> Result<String, FpgadevError> {
        self.host.device_lookup(device)?.show_attribute(attribute)
    }

    /// Every attribute of a published device, as `(name, value)` pairs.
    pub fn attributes(&self, device: &str) -> Result<Vec<(String, String)>, FpgadevError> {
        let device = self.host.device_lookup(device)?;
        device
            .attribute_names()
            .iter()
            .map(|name| Ok(((*name).to_owned(), device.show_attribute(name)?)))
            .collect()
    }

    /// Looks up a published device.
    pub fn device(&self, device: &str) -> Result<Arc<dyn MappableDevice>, FpgadevError> {
        self.host.device_lookup(device)
    }

    /// Published device nodes, in registration order.
    pub fn devices(&self) -> Vec<DeviceNode> {
        self.host.devices()
    }

    pub fn bus_devices(&self) -> Vec<BusDevice> {
        self.bound()
            .iter()
            .map(|b| BusDevice {
                name: b.name().to_owned(),
                region: b.region(),
                children: b.devices().iter().map(|d| d.name().to_owned()).collect(),
            })
            .collect()
    }

    /// Minors currently held by live device records.
    pub fn minors_in_use(&self) -> Vec<u32> {
        self.minors.used()
    }

    /// Opens `device`, maps `length` bytes at `page_offset` pages, and closes it again.
    ///
    /// Lets a caller check whether a mapping would be accepted and what it would point
    /// at without keeping anything mapped.
    pub fn check_mapping(
        &self,
        device: &str,
        length: u64,
        page_offset: u64,
        task: &Task,
    ) -> Result<MappingReport, FpgadevError> {
        let file = self.open(device, task)?;
        let mut vma = VmArea::new(TRIAL_MAPPING_BASE, length, page_offset)?;
        let mapped = file.mmap(&mut vma);
        if let Err(e) = file.close() {
            warn!("{device}: close after trial mapping failed: {e}");
        }
        mapped?;
        Ok(MappingReport {
            pages: vma.pages().len(),
            phys_start: vma.phys_start().unwrap_or_default(),
            contiguous: vma.is_contiguous(),
        })
    }

    /// Unbinds every bridge and unregisters the driver.
    pub fn unload(self) {
        drop(self);
    }
}

impl Drop for Module {
    fn drop(&mut self) {
        let mut bound = std::mem::take(&mut *self.bound());
        while let Some(instance) = bound.pop() {
            self.driver.remove(instance);
        }
        info!(
            "{}: Unregistered platform driver {}",
            self.name,
            BridgeDriver::NAME
        );
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("major", &self.chrdev.major)
            .field("driver", &self.driver)
            .field("minors", &self.minors.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverProfile;
    use crate::host::sim::{FaultPlan, SimHost};
    use googletest::prelude::*;

    fn host() -> (Arc<SimHost>, Arc<dyn Host>) {
        let sim = Arc::new(SimHost::new());
        let host: Arc<dyn Host> = sim.clone();
        (sim, host)
    }

    #[gtest]
    fn load_registers_region_and_class() {
        let (sim, host) = host();
        let module = Module::load(host, &ModuleConfig::default()).unwrap();
        expect_that!(sim.chrdev_region_count(), eq(1));
        expect_that!(sim.classes(), elements_are![eq("fpga_device")]);
        module.unload();
        expect_that!(sim.chrdev_region_count(), eq(0));
        expect_that!(sim.classes().is_empty(), eq(true));
    }

    #[gtest]
    fn failed_class_creation_releases_region() {
        let (sim, host) = host();
        sim.set_faults(FaultPlan {
            class_create: vec!["h2f_loop".into()],
            ..FaultPlan::default()
        });
        let config = ModuleConfig {
            profile: DriverProfile::H2fLoop,
            ..ModuleConfig::default()
        };
        expect_that!(Module::load(host, &config), err(anything()));
        expect_that!(sim.chrdev_region_count(), eq(0));
    }

    #[gtest]
    fn failed_region_allocation_leaves_nothing() {
        let (sim, host) = host();
        sim.set_faults(FaultPlan {
            alloc_chrdev_region: true,
            ..FaultPlan::default()
        });
        expect_that!(Module::load(host, &ModuleConfig::default()), err(anything()));
        expect_that!(sim.classes().is_empty(), eq(true));
    }

    #[gtest]
    fn incompatible_device_is_not_probed() {
        let (sim, host) = host();
        let module = Module::load(host, &ModuleConfig::default()).unwrap();
        let pdev = PlatformDevice::new(
            "uart",
            &["ns16550a"],
            &[Region::new(0xffc0_2000, 0x100)],
        );
        expect_that!(
            module.attach(&pdev),
            err(displays_as(contains_substring("not compatible")))
        );
        expect_that!(sim.stats().records_allocated, eq(0));
    }

    #[gtest]
    fn attributes_lists_every_attribute() {
        let (_sim, host) = host();
        let module = Module::load(host, &ModuleConfig::default()).unwrap();
        module
            .attach(&PlatformDevice::new(
                "ff200000.bridge",
                &["altr,bridge-15.0"],
                &[Region::new(0xff20_0000, 0x1000)],
            ))
            .unwrap();
        let attributes = module.attributes("io_space0").unwrap();
        expect_that!(
            attributes,
            elements_are![
                eq(&("io_base".to_string(), "0xff200000\n".to_string())),
                eq(&("io_size".to_string(), "4096\n".to_string())),
            ]
        );
    }
}
