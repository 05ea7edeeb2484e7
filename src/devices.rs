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

//! Character devices exposing physical memory to user space.
//!
//! Every device created by the bridge driver implements [`MappableDevice`]: the file
//! operations `open`, `release` and `mmap`, plus its read-only attributes. The concrete
//! devices are:
//! - [`window::WindowDevice`] - a register window (`io_space<minor>`) or a loopback bridge
//!   window (`h2f_loop<minor>`), mapped write-combined with `io_remap_pfn_range`
//! - [`dma_buffer::DmaBufferDevice`] - a DMA receive buffer (`dma<minor>`), mapped page by
//!   page with `insert_pfn`
//!
//! # Lifetime
//!
//! A device record is an `Arc`. The device-model tree holds one reference from
//! registration until the controller destroys the device; every [`OpenFile`] holds
//! another. The character-device namespace only holds a `Weak`, and destroying the device
//! removes that entry so no new open can reach it. The record's fields are acquisition
//! guards released in field order when the last reference drops. Nothing is ever freed
//! while a file handle or attribute reader can still reach it.

pub mod dma_buffer;
pub mod window;

use crate::error::FpgadevError;
use crate::host::{DevT, DeviceNode, Host};
use crate::sync::{Semaphore, Task};
use crate::vma::VmArea;
use log::{debug, error};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use dma_buffer::DmaBufferDevice;
use window::WindowDevice;

/// File operations and attributes shared by every exposed device.
pub trait MappableDevice: Send + Sync {
    /// Device node name, e.g. `io_space0`.
    fn name(&self) -> &str;

    fn devt(&self) -> DevT;

    /// Called when a process opens the node.
    ///
    /// # Returns: `Result<(), FpgadevError>`
    /// * `Ok(())` - The handle may be used
    /// * `Err(FpgadevError::Interrupted)` - A signal arrived while waiting for the device lock
    fn open(&self, task: &Task) -> Result<(), FpgadevError>;

    /// Called when the last reference to an open file goes away.
    fn release(&self, task: &Task) -> Result<(), FpgadevError>;

    /// Installs page mappings for `vma`. On error nothing is left installed.
    ///
    /// # Returns: `Result<(), FpgadevError>`
    /// * `Ok(())` - `vma` now maps the requested range
    /// * `Err(FpgadevError::Argument)` - The range does not fit the device
    /// * `Err(FpgadevError::Interrupted)` - A signal arrived while waiting for the device lock
    fn mmap(&self, task: &Task, vma: &mut VmArea) -> Result<(), FpgadevError>;

    /// Names of the read-only attributes, in display order.
    fn attribute_names(&self) -> &'static [&'static str];

    /// Text of one attribute, newline terminated.
    fn show_attribute(&self, attribute: &str) -> Result<String, FpgadevError>;

    /// The per-device lock every file operation takes.
    fn lock(&self) -> &Semaphore;
}

impl fmt::Debug for dyn MappableDevice + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.devt())
    }
}

pub(crate) fn unknown_attribute(device: &str, attribute: &str) -> FpgadevError {
    FpgadevError::NotFound(format!("{device} has no attribute '{attribute}'"))
}

/// Where a device is created: the host, its chrdev major, its parent and its class.
#[derive(Clone)]
pub struct DeviceContext {
    pub host: Arc<dyn Host>,
    pub major: u32,
    pub parent: String,
    pub class: String,
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("major", &self.major)
            .field("parent", &self.parent)
            .field("class", &self.class)
            .finish()
    }
}

impl DeviceContext {
    pub(crate) fn node(&self, name: &str, devt: DevT) -> DeviceNode {
        DeviceNode {
            name: name.to_owned(),
            class: self.class.clone(),
            parent: self.parent.clone(),
            devt,
        }
    }
}

/// One heap record accounted with the host; freed when dropped.
pub(crate) struct RecordAllocation {
    host: Arc<dyn Host>,
    kind: &'static str,
}

impl RecordAllocation {
    pub(crate) fn new(host: &Arc<dyn Host>, kind: &'static str) -> Result<Self, FpgadevError> {
        host.alloc_record(kind)?;
        Ok(RecordAllocation {
            host: Arc::clone(host),
            kind,
        })
    }
}

impl Drop for RecordAllocation {
    fn drop(&mut self) {
        self.host.free_record(self.kind);
    }
}

/// A live character-device entry; removed from the namespace when dropped.
pub(crate) struct CdevRegistration {
    host: Arc<dyn Host>,
    devt: DevT,
}

impl Drop for CdevRegistration {
    fn drop(&mut self) {
        self.host.cdev_del(self.devt);
    }
}

/// Where a device keeps its character-device entry.
///
/// Emptied when the controller destroys the device, so no new open can reach it, and at
/// the latest when the record itself drops.
#[derive(Default)]
pub(crate) struct CdevSlot(Mutex<Option<CdevRegistration>>);

impl CdevSlot {
    fn lock(&self) -> MutexGuard<'_, Option<CdevRegistration>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds `device` to the character-device namespace. The device is openable once this
    /// returns.
    pub(crate) fn add<D: MappableDevice + 'static>(
        &self,
        host: &Arc<dyn Host>,
        device: &Arc<D>,
    ) -> Result<(), FpgadevError> {
        let devt = device.devt();
        let weak = Arc::downgrade(device);
        if let Err(e) = host.cdev_add(devt, weak) {
            error!(
                "Can't add the child {} char device {devt}: {e}",
                device.name()
            );
            return Err(e);
        }
        let previous = self.lock().replace(CdevRegistration {
            host: Arc::clone(host),
            devt,
        });
        if previous.is_some() {
            return Err(FpgadevError::Internal(format!(
                "{} char device added twice",
                device.name()
            )));
        }
        Ok(())
    }

    pub(crate) fn remove(&self) {
        let registration = self.lock().take();
        drop(registration);
    }
}

/// Publishes `device` into the device-model tree.
///
/// On failure the caller drops its reference, which tears down whatever was built.
pub(crate) fn publish<D: MappableDevice + 'static>(
    ctx: &DeviceContext,
    device: &Arc<D>,
) -> Result<(), FpgadevError> {
    let shared: Arc<dyn MappableDevice> = device.clone();
    ctx.host
        .device_register(ctx.node(device.name(), device.devt()), shared)
        .inspect_err(|e| error!("Can't register the child {} device: {e}", device.name()))
}

/// A device created by the bridge driver.
#[derive(Clone)]
pub enum ChildDevice {
    RegisterWindow(Arc<WindowDevice>),
    LoopbackWindow(Arc<WindowDevice>),
    DmaBuffer(Arc<DmaBufferDevice>),
}

impl ChildDevice {
    pub fn as_mappable(&self) -> &dyn MappableDevice {
        match self {
            ChildDevice::RegisterWindow(d) | ChildDevice::LoopbackWindow(d) => d.as_ref(),
            ChildDevice::DmaBuffer(d) => d.as_ref(),
        }
    }

    pub fn name(&self) -> &str {
        self.as_mappable().name()
    }

    fn cdev(&self) -> &CdevSlot {
        match self {
            ChildDevice::RegisterWindow(d) | ChildDevice::LoopbackWindow(d) => d.cdev(),
            ChildDevice::DmaBuffer(d) => d.cdev(),
        }
    }

    /// Unpublishes the device, removes its character device and drops the controller's
    /// reference.
    ///
    /// The record itself goes away once no open file refers to it any more.
    pub(crate) fn destroy(self, host: &dyn Host) {
        let name = self.name().to_owned();
        match host.device_unregister(&name) {
            Some(_) => debug!("{name}: Unregistered"),
            None => error!("{name}: was not registered"),
        }
        self.cdev().remove();
    }
}

impl fmt::Debug for ChildDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            ChildDevice::RegisterWindow(_) => "RegisterWindow",
            ChildDevice::LoopbackWindow(_) => "LoopbackWindow",
            ChildDevice::DmaBuffer(_) => "DmaBuffer",
        };
        write!(f, "{variant}({})", self.name())
    }
}

/// An open handle on a device node.
///
/// Holds a reference to the device record for as long as it lives.
pub struct OpenFile {
    device: Arc<dyn MappableDevice>,
    task: Task,
}

impl OpenFile {
    /// Opens the character device `devt` on behalf of `task`.
    ///
    /// # Returns: `Result<OpenFile, FpgadevError>`
    /// * `Ok(OpenFile)` - The open handle
    /// * `Err(FpgadevError::NoDevice)` - Nothing is registered at `devt`
    /// * `Err(FpgadevError::Interrupted)` - Retry the open
    pub fn open(host: &dyn Host, devt: DevT, task: &Task) -> Result<OpenFile, FpgadevError> {
        let device = host.cdev_lookup(devt)?;
        device.open(task)?;
        Ok(OpenFile {
            device,
            task: task.clone(),
        })
    }

    pub fn device(&self) -> &dyn MappableDevice {
        self.device.as_ref()
    }

    pub fn mmap(&self, vma: &mut VmArea) -> Result<(), FpgadevError> {
        self.device.mmap(&self.task, vma)
    }

    /// Closes the handle. The reference is dropped whatever the outcome, as the release
    /// result of a closing file cannot be acted upon.
    pub fn close(self) -> Result<(), FpgadevError> {
        self.device.release(&self.task)
    }
}

impl fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFile")
            .field("device", &self.device.name())
            .field("task", &self.task.name())
            .finish()
    }
}
