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

use crate::config::{DaemonConfig, ModuleConfig};
use crate::driver::{DriverProfile, PlatformDevice};
use crate::error::FpgadevError;
use crate::host::Region;
use crate::system_io::fs_read;
use log::trace;
use serde::Deserialize;
use std::path::Path;

/// This is the top level struct which holds all sections
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    module: Option<ModuleSection>,
    platform_devices: Option<Vec<PlatformDeviceEntry>>,
}

/// This is the "module" section struct
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSection {
    name: Option<String>,
    max_char_devices: Option<u32>,
    profile: Option<DriverProfile>,
    dma_page_count: Option<u64>,
}

/// One `[[platform_devices]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformDeviceEntry {
    name: String,
    compatible: Vec<String>,
    base: u64,
    size: u64,
}

impl From<ModuleSection> for ModuleConfig {
    fn from(value: ModuleSection) -> Self {
        trace!("Creating ModuleConfig from {value:?}");
        let defaults = ModuleConfig::default();
        ModuleConfig {
            name: value.name.unwrap_or_else(|| {
                trace!("No module name provided. Using hardcoded value.");
                defaults.name
            }),
            max_char_devices: value.max_char_devices.unwrap_or_else(|| {
                trace!("No max_char_devices provided. Using hardcoded value.");
                defaults.max_char_devices
            }),
            profile: value.profile.unwrap_or(defaults.profile),
            dma_page_count: value.dma_page_count.unwrap_or(defaults.dma_page_count),
        }
    }
}

impl From<PlatformDeviceEntry> for PlatformDevice {
    fn from(value: PlatformDeviceEntry) -> Self {
        PlatformDevice {
            name: value.name,
            compatible: value.compatible,
            resources: vec![Region::new(value.base, value.size)],
        }
    }
}

impl ModuleSection {
    pub(crate) fn merge(self, fallback: ModuleSection) -> ModuleSection {
        ModuleSection {
            name: self.name.or(fallback.name),
            max_char_devices: self.max_char_devices.or(fallback.max_char_devices),
            profile: self.profile.or(fallback.profile),
            dma_page_count: self.dma_page_count.or(fallback.dma_page_count),
        }
    }
}

impl TomlConfig {
    /// Fields set in `self` win; the device list is taken whole from whichever file has one.
    pub(crate) fn merge(self, fallback: TomlConfig) -> TomlConfig {
        let module = match (self.module, fallback.module) {
            (Some(ours), Some(theirs)) => Some(ours.merge(theirs)),
            (ours, theirs) => ours.or(theirs),
        };
        TomlConfig {
            module,
            platform_devices: self.platform_devices.or(fallback.platform_devices),
        }
    }
}

impl TryFrom<TomlConfig> for DaemonConfig {
    type Error = FpgadevError;

    fn try_from(value: TomlConfig) -> Result<Self, Self::Error> {
        let module: ModuleConfig = value.module.unwrap_or_default().into();
        module.validate()?;
        Ok(DaemonConfig {
            module,
            platform_devices: value
                .platform_devices
                .unwrap_or_default()
                .into_iter()
                .map(PlatformDevice::from)
                .collect(),
        })
    }
}

pub(crate) fn toml_str_to_config(toml_string: &str) -> Result<TomlConfig, FpgadevError> {
    let config: TomlConfig = match toml::from_str(toml_string) {
        Ok(config) => config,
        Err(e) => {
            return Err(FpgadevError::TomlDe {
                toml_string: toml_string.into(),
                e,
            });
        }
    };
    Ok(config)
}

pub(crate) fn config_from_file(file_path: &Path) -> Result<TomlConfig, FpgadevError> {
    if !file_path.is_file() {
        return Err(FpgadevError::Internal(format!(
            "Config file not found in {file_path:?}"
        )));
    }
    toml_str_to_config(&fs_read(file_path)?)
}
