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

//! Module and daemon configuration.
//!
//! Settings come from two optional TOML files: the vendor file at [`VENDOR_CONFIG_PATH`]
//! and the user file at [`USER_CONFIG_PATH`]. User settings override vendor settings, and
//! vendor settings override the hardcoded defaults below. A file that is missing or fails
//! to parse is skipped with a warning.
//!
//! ```toml
//! [module]
//! name = "enyx"
//! max_char_devices = 64
//! profile = "fpga-device"   # or "h2f-loop"
//! dma_page_count = 512
//!
//! [[platform_devices]]
//! name = "ff200000.bridge"
//! compatible = ["altr,bridge-15.0"]
//! base = 0xff200000
//! size = 0x200000
//! ```

pub mod config_files;

use crate::driver::{DriverProfile, PlatformDevice};
use crate::error::FpgadevError;
use config_files::{TomlConfig, config_from_file};
use log::{trace, warn};
use std::path::Path;

pub static VENDOR_CONFIG_PATH: &str = "/usr/lib/fpgadev/config.toml";
pub static USER_CONFIG_PATH: &str = "/etc/fpgadev/config.toml";

// Hardcoded fallbacks used when no config file provides a value.
pub static MODULE_NAME: &str = "enyx";
pub const MAX_CHAR_DEVICES: u32 = 64;
pub const FIRST_MINOR: u32 = 0;
pub const DEFAULT_DMA_PAGE_COUNT: u64 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    /// Name under which the chrdev region is registered.
    pub name: String,
    /// Size of the minor range reserved at load time.
    pub max_char_devices: u32,
    pub profile: DriverProfile,
    /// Size of each DMA buffer, in pages.
    pub dma_page_count: u64,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        ModuleConfig {
            name: MODULE_NAME.to_string(),
            max_char_devices: MAX_CHAR_DEVICES,
            profile: DriverProfile::default(),
            dma_page_count: DEFAULT_DMA_PAGE_COUNT,
        }
    }
}

impl ModuleConfig {
    /// Checks the values a load would otherwise reject halfway through.
    ///
    /// # Returns: `Result<(), FpgadevError>`
    /// * `Ok(())` - The configuration can be loaded
    /// * `Err(FpgadevError::Argument)` - A value is out of range
    pub fn validate(&self) -> Result<(), FpgadevError> {
        if self.name.is_empty() {
            return Err(FpgadevError::Argument("Module name is empty".into()));
        }
        if !(1..=MAX_CHAR_DEVICES).contains(&self.max_char_devices) {
            return Err(FpgadevError::Argument(format!(
                "max_char_devices must be between 1 and {MAX_CHAR_DEVICES}, got {}",
                self.max_char_devices
            )));
        }
        if self.dma_page_count == 0 {
            return Err(FpgadevError::Argument(
                "dma_page_count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Everything the daemon needs at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonConfig {
    pub module: ModuleConfig,
    /// Bridges to attach once the module is loaded.
    pub platform_devices: Vec<PlatformDevice>,
}

fn load_or_skip(path: &Path, which: &str) -> TomlConfig {
    config_from_file(path).unwrap_or_else(|e| {
        warn!("Ignoring {which} config because loading it failed: {e}");
        TomlConfig::default()
    })
}

/// User config overrides vendor config and vendor config overrides hardcoded defaults.
pub fn load_daemon_config() -> Result<DaemonConfig, FpgadevError> {
    load_daemon_config_from(Path::new(USER_CONFIG_PATH), Path::new(VENDOR_CONFIG_PATH))
}

pub fn load_daemon_config_from(
    user_path: &Path,
    vendor_path: &Path,
) -> Result<DaemonConfig, FpgadevError> {
    let vendor_config = load_or_skip(vendor_path, "vendor");
    let user_config = load_or_skip(user_path, "user");
    trace!("Merging user_config: {user_config:?} with vendor_config {vendor_config:?}");
    let config = DaemonConfig::try_from(user_config.merge(vendor_config))?;
    trace!("Resulting config: {config:?}");
    Ok(config)
}
