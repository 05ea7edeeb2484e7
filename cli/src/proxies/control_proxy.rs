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
    interface = "com.enyx.fpgadev.control",
    default_path = "/com/enyx/fpgadev/control"
)]
pub trait Control {
    async fn attach(
        &self,
        name: &str,
        compatible: Vec<String>,
        base: u64,
        size: u64,
    ) -> Result<String>;
    async fn detach(&self, name: &str) -> Result<String>;
    async fn check_mapping(&self, device: &str, length: u64, page_offset: u64)
    -> Result<String>;
}
