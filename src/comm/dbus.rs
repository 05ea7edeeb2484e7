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

//! D-Bus service of the fpgadev daemon.
//!
//! - **Service Name**: [`SERVICE_NAME`]
//! - **Status Interface**: [`STATUS_PATH`] - read-only queries of devices and attributes
//! - **Control Interface**: [`CONTROL_PATH`] - bus attach/detach and trial mappings

pub mod control_interface;
pub mod status_interface;

use crate::error::FpgadevError;

pub static SERVICE_NAME: &str = "com.enyx.fpgadev";
pub static STATUS_PATH: &str = "/com/enyx/fpgadev/status";
pub static CONTROL_PATH: &str = "/com/enyx/fpgadev/control";

/// Rejects device and bus names that could not be node names.
pub fn validate_name(name: &str) -> Result<(), FpgadevError> {
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(FpgadevError::Argument(format!(
            "'{name}' is not a valid device name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::plain("io_space0", true)]
    #[case::bus_name("ff200000.bridge", true)]
    #[case::empty("", false)]
    #[case::path("../dma0", false)]
    #[case::space("dma 0", false)]
    fn device_names(#[case] name: &str, #[case] valid: bool) {
        expect_that!(validate_name(name).is_ok(), eq(valid));
    }
}
