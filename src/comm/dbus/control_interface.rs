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

use crate::comm::dbus::validate_name;
use crate::driver::PlatformDevice;
use crate::host::Region;
use crate::module::Module;
use crate::sync::Task;
use log::info;
use std::sync::Arc;
use zbus::{fdo, interface};

pub struct ControlInterface {
    pub module: Arc<Module>,
}

#[interface(name = "com.enyx.fpgadev.control")]
impl ControlInterface {
    async fn attach(
        &self,
        name: &str,
        compatible: Vec<String>,
        base: u64,
        size: u64,
    ) -> Result<String, fdo::Error> {
        info!(
            "attach called with name: {name}, compatible: {compatible:?}, base: {base:#x} and \
             size: {size:#x}"
        );
        validate_name(name)?;
        let pdev = PlatformDevice {
            name: name.to_owned(),
            compatible,
            resources: vec![Region::new(base, size)],
        };
        self.module.attach(&pdev)?;
        let children: Vec<String> = self
            .module
            .bus_devices()
            .into_iter()
            .filter(|b| b.name == name)
            .flat_map(|b| b.children)
            .collect();
        Ok(format!("{name} bound with devices: {}", children.join(", ")))
    }

    async fn detach(&self, name: &str) -> Result<String, fdo::Error> {
        info!("detach called with name: {name}");
        validate_name(name)?;
        self.module.detach(name)?;
        Ok(format!("{name} unbound"))
    }

    /// Maps `length` bytes of `device` at `page_offset` and unmaps them again, reporting
    /// what the mapping pointed at.
    async fn check_mapping(
        &self,
        device: &str,
        length: u64,
        page_offset: u64,
    ) -> Result<String, fdo::Error> {
        info!(
            "check_mapping called with device: {device}, length: {length} and page_offset: \
             {page_offset}"
        );
        validate_name(device)?;
        let report = self
            .module
            .check_mapping(device, length, page_offset, &Task::new("dbus"))?;
        Ok(format!(
            "{device}: {} pages from {:#x}{}",
            report.pages,
            report.phys_start,
            if report.contiguous {
                ""
            } else {
                " (not contiguous)"
            }
        ))
    }
}
