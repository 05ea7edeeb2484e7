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
use crate::module::Module;
use log::info;
use std::sync::Arc;
use zbus::{fdo, interface};

pub struct StatusInterface {
    pub module: Arc<Module>,
}

#[interface(name = "com.enyx.fpgadev.status")]
impl StatusInterface {
    /// One line per published device: name, dev number, class and parent bridge.
    async fn list_devices(&self) -> Result<String, fdo::Error> {
        info!("list_devices called");
        Ok(self
            .module
            .devices()
            .iter()
            .map(|n| format!("{} {} {} {}\n", n.name, n.devt, n.class, n.parent))
            .collect())
    }

    async fn read_attribute(&self, device: &str, attribute: &str) -> Result<String, fdo::Error> {
        info!("read_attribute called with device: {device} and attribute: {attribute}");
        validate_name(device)?;
        Ok(self.module.read_attribute(device, attribute)?)
    }

    /// Every attribute of `device`, one `name: value` line each.
    async fn read_attributes(&self, device: &str) -> Result<String, fdo::Error> {
        info!("read_attributes called with device: {device}");
        validate_name(device)?;
        Ok(self
            .module
            .attributes(device)?
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect())
    }

    async fn list_bus_devices(&self) -> Result<String, fdo::Error> {
        info!("list_bus_devices called");
        Ok(self
            .module
            .bus_devices()
            .iter()
            .map(|b| format!("{b}\n"))
            .collect())
    }

    async fn get_minors(&self) -> Result<String, fdo::Error> {
        info!("get_minors called");
        let minors: Vec<String> = self
            .module
            .minors_in_use()
            .iter()
            .map(u32::to_string)
            .collect();
        Ok(format!("{}:{}\n", self.module.major(), minors.join(",")))
    }
}
