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

use zbus::{Result, proxy};

#[proxy(
    default_service = "com.enyx.fpgadev",
    interface = "com.enyx.fpgadev.status",
    default_path = "/com/enyx/fpgadev/status"
)]
pub trait Status {
    async fn list_devices(&self) -> Result<String>;
    async fn read_attribute(&self, device: &str, attribute: &str) -> Result<String>;
    async fn read_attributes(&self, device: &str) -> Result<String>;
    async fn list_bus_devices(&self) -> Result<String>;
    async fn get_minors(&self) -> Result<String>;
}
