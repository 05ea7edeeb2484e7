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

//! The bridge platform driver.
//!
//! [`BridgeDriver`] binds to platform devices whose compatible list contains one of its
//! match-table entries. Binding (`probe`) reserves the bridge's memory window and creates
//! the child devices of the configured [`DriverProfile`]:
//! - [`DriverProfile::H2fLoop`] - one `h2f_loop<minor>` loopback window
//! - [`DriverProfile::FpgaDevice`] - one `io_space<minor>` register window and one
//!   `dma<minor>` receive buffer
//!
//! Each acquisition in `probe` is a guard, so a failure at any step unwinds everything
//! taken before it in reverse order. Unbinding (`remove`) drops the [`BridgeInstance`],
//! whose fields release the children, the window reservation and the per-device record
//! in that order.

use crate::devices::dma_buffer::DmaBufferDevice;
use crate::devices::window::{WindowDevice, WindowKind};
use crate::devices::{ChildDevice, DeviceContext, RecordAllocation};
use crate::error::FpgadevError;
use crate::host::{Host, Region};
use crate::minor::MinorAllocator;
use fpgadev_macros::bus_driver;
use log::{debug, error, info, trace};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Resource name under which the bridge window is reserved.
pub const REGION_NAME: &str = "h2f_region";

/// Child devices one bridge instance can hold.
pub const MAX_CHILD_DEVICES: usize = 2;

const DRVDATA_RECORD: &str = "h2f_drvdata";

/// Driver identity and match table, generated by [`bus_driver`].
pub trait DriverMatch {
    const NAME: &'static str;
    const OF_MATCH_TABLE: &'static [&'static str];

    /// Whether a device with the given compatible strings binds to this driver.
    ///
    /// # Returns: `bool`
    /// * `true` - At least one of `compatible` is in [`DriverMatch::OF_MATCH_TABLE`]
    /// * `false` - None are
    fn of_match(compatible: &[String]) -> bool {
        let table: HashSet<&str> = Self::OF_MATCH_TABLE.iter().copied().collect();
        trace!("Matching {compatible:?} against {table:?}");
        compatible.iter().any(|c| table.contains(c.as_str()))
    }
}

/// A device on the platform bus, as the firmware describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDevice {
    pub name: String,
    pub compatible: Vec<String>,
    pub resources: Vec<Region>,
}

impl PlatformDevice {
    pub fn new(name: &str, compatible: &[&str], resources: &[Region]) -> PlatformDevice {
        PlatformDevice {
            name: name.to_owned(),
            compatible: compatible.iter().map(|c| (*c).to_owned()).collect(),
            resources: resources.to_vec(),
        }
    }

    /// The `index`-th memory resource.
    pub fn mem_resource(&self, index: usize) -> Option<Region> {
        self.resources.get(index).copied()
    }
}

/// Which family of child devices the driver creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverProfile {
    H2fLoop,
    #[default]
    FpgaDevice,
}

impl DriverProfile {
    /// The device class children are published under.
    pub fn class_name(&self) -> &'static str {
        match self {
            DriverProfile::H2fLoop => "h2f_loop",
            DriverProfile::FpgaDevice => "fpga_device",
        }
    }

    fn children(&self, dma_page_count: u64) -> Vec<ChildSpec> {
        match self {
            DriverProfile::H2fLoop => vec![ChildSpec::LoopbackWindow],
            DriverProfile::FpgaDevice => vec![
                ChildSpec::RegisterWindow,
                ChildSpec::DmaBuffer {
                    page_count: dma_page_count,
                },
            ],
        }
    }
}

impl fmt::Display for DriverProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverProfile::H2fLoop => write!(f, "h2f-loop"),
            DriverProfile::FpgaDevice => write!(f, "fpga-device"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildSpec {
    RegisterWindow,
    LoopbackWindow,
    DmaBuffer { page_count: u64 },
}

impl ChildSpec {
    fn create(
        &self,
        ctx: &DeviceContext,
        region: Region,
        minors: &Arc<MinorAllocator>,
    ) -> Result<ChildDevice, FpgadevError> {
        let minor = minors.allocate().inspect_err(|e| error!("{}: {e}", ctx.parent))?;
        match *self {
            ChildSpec::RegisterWindow => Ok(ChildDevice::RegisterWindow(WindowDevice::create(
                ctx,
                WindowKind::IoSpace,
                region,
                minor,
            )?)),
            ChildSpec::LoopbackWindow => Ok(ChildDevice::LoopbackWindow(WindowDevice::create(
                ctx,
                WindowKind::H2fLoop,
                region,
                minor,
            )?)),
            ChildSpec::DmaBuffer { page_count } => Ok(ChildDevice::DmaBuffer(
                DmaBufferDevice::create(ctx, page_count, minor)?,
            )),
        }
    }
}

/// Everything a probe needs from the loaded module.
#[derive(Clone)]
pub struct DriverContext {
    pub host: Arc<dyn Host>,
    pub major: u32,
    pub minors: Arc<MinorAllocator>,
}

/// An exclusive reservation of a physical window; released when dropped.
pub struct MemRegionReservation {
    host: Arc<dyn Host>,
    region: Region,
}

impl MemRegionReservation {
    pub fn request(
        host: &Arc<dyn Host>,
        region: Region,
        owner: &str,
    ) -> Result<MemRegionReservation, FpgadevError> {
        host.request_mem_region(region, owner)?;
        Ok(MemRegionReservation {
            host: Arc::clone(host),
            region,
        })
    }

    pub fn region(&self) -> Region {
        self.region
    }
}

impl Drop for MemRegionReservation {
    fn drop(&mut self) {
        self.host.release_mem_region(self.region);
    }
}

/// The children of one bridge, destroyed in reverse creation order when dropped.
pub struct DeviceTable {
    host: Arc<dyn Host>,
    devices: Vec<ChildDevice>,
}

impl DeviceTable {
    fn new(host: &Arc<dyn Host>) -> DeviceTable {
        DeviceTable {
            host: Arc::clone(host),
            devices: Vec::with_capacity(MAX_CHILD_DEVICES),
        }
    }

    fn push(&mut self, device: ChildDevice) -> Result<(), FpgadevError> {
        if self.devices.len() >= MAX_CHILD_DEVICES {
            device.destroy(self.host.as_ref());
            return Err(FpgadevError::Internal(format!(
                "A bridge holds at most {MAX_CHILD_DEVICES} devices"
            )));
        }
        self.devices.push(device);
        Ok(())
    }

    pub fn devices(&self) -> &[ChildDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Drop for DeviceTable {
    fn drop(&mut self) {
        while let Some(device) = self.devices.pop() {
            device.destroy(self.host.as_ref());
        }
    }
}

/// Driver state of one bound bridge.
pub struct BridgeInstance {
    // Teardown order is field order.
    devices: DeviceTable,
    reservation: MemRegionReservation,
    _record: RecordAllocation,
    name: String,
}

impl BridgeInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> Region {
        self.reservation.region()
    }

    pub fn devices(&self) -> &[ChildDevice] {
        self.devices.devices()
    }
}

impl fmt::Debug for BridgeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeInstance")
            .field("name", &self.name)
            .field("region", &self.region())
            .field("devices", &self.devices.devices)
            .finish()
    }
}

#[bus_driver(name = "h2f", compatible = "altr,bridge-15.0")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeDriver {
    profile: DriverProfile,
    dma_page_count: u64,
}

impl BridgeDriver {
    pub fn new(profile: DriverProfile, dma_page_count: u64) -> BridgeDriver {
        BridgeDriver {
            profile,
            dma_page_count,
        }
    }

    /// Binds to `pdev`: reserves its first memory resource and creates the children.
    ///
    /// # Returns: `Result<BridgeInstance, FpgadevError>`
    /// * `Ok(BridgeInstance)` - Every child device is published
    /// * `Err(FpgadevError::Argument)` - `pdev` has no memory resource
    /// * `Err(FpgadevError::RegionConflict)` - The window is already reserved
    /// * `Err(FpgadevError::MinorsExhausted)` - No minor left for a child
    /// * `Err(_)` - Any error from creating a child; nothing is left behind
    pub fn probe(
        &self,
        ctx: &DriverContext,
        pdev: &PlatformDevice,
    ) -> Result<BridgeInstance, FpgadevError> {
        debug!("{}: Probing with {} profile", pdev.name, self.profile);

        let record = RecordAllocation::new(&ctx.host, DRVDATA_RECORD)
            .inspect_err(|_| error!("{}: Can't allocate driver data", pdev.name))?;

        let region = pdev.mem_resource(0).ok_or_else(|| {
            error!("{}: No mem resource", pdev.name);
            FpgadevError::Argument(format!("{} has no memory resource", pdev.name))
        })?;
        debug!("{}: Found {region}", pdev.name);

        let reservation = MemRegionReservation::request(&ctx.host, region, REGION_NAME)
            .inspect_err(|_| error!("{}: Can't request mem region {region}", pdev.name))?;

        let device_ctx = DeviceContext {
            host: Arc::clone(&ctx.host),
            major: ctx.major,
            parent: pdev.name.clone(),
            class: self.profile.class_name().to_owned(),
        };
        let mut devices = DeviceTable::new(&ctx.host);
        for child in self.profile.children(self.dma_page_count) {
            devices.push(child.create(&device_ctx, region, &ctx.minors)?)?;
        }

        info!("{}: Bound {} devices", pdev.name, devices.len());
        Ok(BridgeInstance {
            devices,
            reservation,
            _record: record,
            name: pdev.name.clone(),
        })
    }

    /// Unbinds a bridge. Open files keep their device record until they are closed.
    pub fn remove(&self, instance: BridgeInstance) {
        debug!("{}: Removing", instance.name);
        let name = instance.name.clone();
        drop(instance);
        info!("{name}: Removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PAGE_SIZE;
    use crate::host::sim::{FaultPlan, SimHost};
    use googletest::prelude::*;
    use rstest::*;

    const BASE: u64 = 0xff20_0000;

    fn setup(profile: DriverProfile) -> (Arc<SimHost>, DriverContext) {
        let sim = Arc::new(SimHost::new());
        sim.class_create(profile.class_name()).unwrap();
        let host: Arc<dyn Host> = sim.clone();
        let ctx = DriverContext {
            host,
            major: 240,
            minors: MinorAllocator::new(64),
        };
        (sim, ctx)
    }

    fn bridge() -> PlatformDevice {
        PlatformDevice::new(
            "ff200000.bridge",
            &["altr,bridge-15.0"],
            &[Region::new(BASE, 0x20_0000)],
        )
    }

    #[gtest]
    #[rstest]
    #[case::exact(&["altr,bridge-15.0"], true)]
    #[case::second_entry(&["vendor,other", "altr,bridge-15.0"], true)]
    #[case::older_revision(&["altr,bridge-14.0"], false)]
    #[case::empty(&[], false)]
    fn matches_on_compatible(#[case] compatible: &[&str], #[case] expected: bool) {
        let compatible: Vec<String> = compatible.iter().map(|c| c.to_string()).collect();
        expect_that!(BridgeDriver::of_match(&compatible), eq(expected));
    }

    #[gtest]
    fn generated_identity() {
        expect_that!(BridgeDriver::NAME, eq("h2f"));
        expect_that!(BridgeDriver::OF_MATCH_TABLE, eq(&["altr,bridge-15.0"]));
    }

    #[gtest]
    #[rstest]
    #[case::h2f_loop(DriverProfile::H2fLoop, &["h2f_loop0"])]
    #[case::fpga_device(DriverProfile::FpgaDevice, &["io_space0", "dma1"])]
    fn probe_creates_profile_children(
        #[case] profile: DriverProfile,
        #[case] expected: &[&str],
    ) {
        let (sim, ctx) = setup(profile);
        let driver = BridgeDriver::new(profile, 4);
        let instance = driver.probe(&ctx, &bridge()).unwrap();
        let names: Vec<&str> = instance.devices().iter().map(ChildDevice::name).collect();
        expect_that!(names, eq(expected));
        expect_that!(sim.reserved_regions().len(), eq(1));
        expect_that!(sim.reserved_regions()[0].1, eq(REGION_NAME));

        driver.remove(instance);
        expect_that!(sim.stats().is_balanced(), eq(true));
        expect_that!(ctx.minors.used().is_empty(), eq(true));
    }

    #[gtest]
    fn probe_without_resource_fails() {
        let (sim, ctx) = setup(DriverProfile::FpgaDevice);
        let pdev = PlatformDevice::new("bare", &["altr,bridge-15.0"], &[]);
        let result = BridgeDriver::new(DriverProfile::FpgaDevice, 4).probe(&ctx, &pdev);
        expect_that!(result, err(displays_as(contains_substring("no memory resource"))));
        expect_that!(sim.stats().is_balanced(), eq(true));
    }

    #[gtest]
    fn probe_rejects_conflicting_window() {
        let (sim, ctx) = setup(DriverProfile::H2fLoop);
        sim.request_mem_region(Region::new(BASE + PAGE_SIZE, PAGE_SIZE), "other")
            .unwrap();
        let result = BridgeDriver::new(DriverProfile::H2fLoop, 4).probe(&ctx, &bridge());
        expect_that!(result.as_ref().map_err(FpgadevError::errno), err(eq(22)));
        expect_that!(sim.live_records(DRVDATA_RECORD), eq(0));
    }

    #[gtest]
    fn second_child_failure_unwinds_first() {
        let (sim, ctx) = setup(DriverProfile::FpgaDevice);
        sim.set_faults(FaultPlan {
            device_register: vec!["dma1".into()],
            ..FaultPlan::default()
        });
        let result = BridgeDriver::new(DriverProfile::FpgaDevice, 4).probe(&ctx, &bridge());
        expect_that!(result, err(anything()));
        let stats = sim.stats();
        expect_that!(stats.is_balanced(), eq(true));
        expect_that!(stats.devices_registered, eq(1));
        expect_that!(sim.reserved_regions().is_empty(), eq(true));
        expect_that!(ctx.minors.used().is_empty(), eq(true));
    }

    #[gtest]
    fn exhausted_minors_fail_probe() {
        let (sim, mut ctx) = setup(DriverProfile::FpgaDevice);
        ctx.minors = MinorAllocator::new(1);
        let result = BridgeDriver::new(DriverProfile::FpgaDevice, 4).probe(&ctx, &bridge());
        expect_that!(result.map_err(|e| e.errno()), err(eq(&28)));
        expect_that!(sim.stats().is_balanced(), eq(true));
    }
}
