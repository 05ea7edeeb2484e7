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

#![allow(dead_code)]

use fpgadev::config::ModuleConfig;
use fpgadev::driver::{DriverProfile, PlatformDevice};
use fpgadev::host::sim::{HostStats, SimHost};
use fpgadev::host::{Host, Region};
use fpgadev::module::Module;
use std::sync::Arc;

pub const COMPATIBLE: &str = "altr,bridge-15.0";
pub const BRIDGE_BASE: u64 = 0xff20_0000;
pub const BRIDGE_SIZE: u64 = 0x20_0000;
pub const DMA_PAGES: u64 = 8;

pub fn load(profile: DriverProfile) -> (Arc<SimHost>, Module) {
    load_with(ModuleConfig {
        profile,
        dma_page_count: DMA_PAGES,
        ..ModuleConfig::default()
    })
}

pub fn load_with(config: ModuleConfig) -> (Arc<SimHost>, Module) {
    let sim = Arc::new(SimHost::new());
    let host: Arc<dyn Host> = sim.clone();
    let module = Module::load(host, &config).expect("module loads");
    (sim, module)
}

pub fn bridge(name: &str, base: u64, size: u64) -> PlatformDevice {
    PlatformDevice::new(name, &[COMPATIBLE], &[Region::new(base, size)])
}

pub fn default_bridge() -> PlatformDevice {
    bridge("ff200000.bridge", BRIDGE_BASE, BRIDGE_SIZE)
}

/// Acquisitions not yet released, per resource kind.
pub fn outstanding(stats: &HostStats) -> [i64; 6] {
    let diff = |a: u32, b: u32| i64::from(a) - i64::from(b);
    [
        diff(stats.records_allocated, stats.records_freed),
        diff(stats.cdevs_added, stats.cdevs_deleted),
        diff(stats.devices_registered, stats.devices_unregistered),
        diff(stats.regions_requested, stats.regions_released),
        diff(stats.dma_allocated, stats.dma_freed),
        diff(stats.dma_mapped, stats.dma_unmapped),
    ]
}
