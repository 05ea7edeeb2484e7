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

//! fpgadev - character-device broker for FPGA register windows and DMA buffers.
//!
//! The crate models a platform driver that binds to HPS-to-FPGA bridges and exposes them
//! to user space through character devices:
//! - [`driver`] - the bridge platform driver, its match table and probe/remove
//! - [`devices`] - the mappable devices: register windows and DMA receive buffers
//! - [`module`] - module load/unload and the bus attach/detach entry points
//! - [`minor`] - minor-number allocation
//! - [`sync`] - the interruptible per-device lock
//! - [`vma`] - user mapping requests and the page mappings installed into them
//! - [`host`] - the kernel services all of the above consume, and an in-process host
//! - [`config`] - TOML configuration of the module and the daemon
//! - [`comm`] - the D-Bus service exposing status and control to clients
//!
//! Everything is reachable without a daemon:
//!
//! ```rust
//! use fpgadev::config::ModuleConfig;
//! use fpgadev::driver::PlatformDevice;
//! use fpgadev::host::{Host, Region, sim::SimHost};
//! use fpgadev::module::Module;
//! use fpgadev::sync::Task;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), fpgadev::error::FpgadevError> {
//! let host: Arc<dyn Host> = Arc::new(SimHost::new());
//! let module = Module::load(host, &ModuleConfig::default())?;
//! module.attach(&PlatformDevice::new(
//!     "ff200000.bridge",
//!     &["altr,bridge-15.0"],
//!     &[Region::new(0xff20_0000, 0x20_0000)],
//! ))?;
//! let report = module.check_mapping("io_space0", 0x1000, 0, &Task::new("example"))?;
//! assert_eq!(report.phys_start, 0xff20_0000);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod comm;
pub mod config;
pub mod devices;
pub mod driver;
pub mod error;
pub mod host;
pub mod minor;
pub mod module;
pub mod sync;
pub mod system_io;
pub mod vma;
