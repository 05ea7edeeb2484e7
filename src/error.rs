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

use log::error;
use std::path::PathBuf;
use zbus::fdo;

pub const EIO: i32 = 5;
pub const ENXIO: i32 = 6;
pub const ENOENT: i32 = 2;
pub const ENOMEM: i32 = 12;
pub const EBUSY: i32 = 16;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;
/// Kernel-internal "restart the syscall" code returned when a wait was interrupted.
pub const ERESTARTSYS: i32 = 512;

#[derive(Debug, thiserror::Error)]
pub enum FpgadevError {
    #[error("FpgadevError::NoMemory: Allocation failed: {0}")]
    NoMemory(String),
    #[error("FpgadevError::Interrupted: Wait for {0} was interrupted by a signal")]
    Interrupted(String),
    #[error("FpgadevError::Argument: {0}")]
    Argument(String),
    #[error("FpgadevError::RegionConflict: {0}")]
    RegionConflict(String),
    #[error("FpgadevError::Registration: Failed to register {what} (errno {errno})")]
    Registration { what: String, errno: i32 },
    #[error("FpgadevError::DmaMapping: {0}")]
    DmaMapping(String),
    #[error("FpgadevError::MinorsExhausted: All {0} minor numbers are in use")]
    MinorsExhausted(usize),
    #[error("FpgadevError::NoDevice: No character device {0}")]
    NoDevice(String),
    #[error("FpgadevError::NotFound: {0}")]
    NotFound(String),
    #[error("FpgadevError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("FpgadevError::TomlDe: Failed to parse toml string {toml_string:?}: {e}")]
    TomlDe {
        toml_string: String,
        e: toml::de::Error,
    },
    #[error("FpgadevError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl FpgadevError {
    /// The positive errno a syscall failing with this error would report.
    pub fn errno(&self) -> i32 {
        match self {
            FpgadevError::NoMemory(..) | FpgadevError::DmaMapping(..) => ENOMEM,
            FpgadevError::Interrupted(..) => ERESTARTSYS,
            FpgadevError::Argument(..) | FpgadevError::RegionConflict(..) => EINVAL,
            FpgadevError::Registration { errno, .. } => *errno,
            FpgadevError::MinorsExhausted(..) => ENOSPC,
            FpgadevError::NoDevice(..) => ENXIO,
            FpgadevError::NotFound(..) => ENOENT,
            FpgadevError::IORead { .. }
            | FpgadevError::TomlDe { .. }
            | FpgadevError::Internal(..) => EIO,
        }
    }

    /// Whether the caller is expected to simply re-issue the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FpgadevError::Interrupted(..))
    }
}

impl From<FpgadevError> for fdo::Error {
    fn from(err: FpgadevError) -> Self {
        error!("{err}");
        match err {
            FpgadevError::Argument(..) => fdo::Error::InvalidArgs(err.to_string()),
            FpgadevError::RegionConflict(..) => fdo::Error::InvalidArgs(err.to_string()),
            FpgadevError::NotFound(..) => fdo::Error::InvalidArgs(err.to_string()),
            FpgadevError::NoDevice(..) => fdo::Error::InvalidArgs(err.to_string()),
            FpgadevError::NoMemory(..) => fdo::Error::NoMemory(err.to_string()),
            FpgadevError::IORead { .. } => fdo::Error::IOError(err.to_string()),
            _ => fdo::Error::Failed(err.to_string()),
        }
    }
}
