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

//! Error wrapping file system helpers.
//!
//! Thin wrappers around `std::fs` that trace what they touch and convert failures into
//! [`FpgadevError::IORead`] carrying the offending path.

use crate::error::FpgadevError;
use log::trace;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, FpgadevError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(FpgadevError::IORead)` - If the file cannot be read (doesn't exist, permissions, etc.)
pub fn fs_read(file_path: &Path) -> Result<String, FpgadevError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(FpgadevError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}
