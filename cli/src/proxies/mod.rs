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

//! D-Bus proxy interfaces for the fpgadev daemon.
//!
//! - [`control_proxy`] - bus attach/detach and trial mappings
//! - [`status_proxy`] - read-only device and attribute queries
//!
//! - **Service Name**: `com.enyx.fpgadev`
//! - **Control Interface**: `com.enyx.fpgadev.control` at `/com/enyx/fpgadev/control`
//! - **Status Interface**: `com.enyx.fpgadev.status` at `/com/enyx/fpgadev/status`

pub mod control_proxy;
pub mod status_proxy;
