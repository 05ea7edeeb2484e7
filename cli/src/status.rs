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

use crate::proxies::status_proxy;
use zbus::Connection;

/// Sends the dbus command to list published devices
async fn call_list_devices() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.list_devices().await
}

/// Sends the dbus command to list bound bridges
async fn call_list_bus_devices() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.list_bus_devices().await
}

async fn call_get_minors() -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.get_minors().await
}

async fn call_read_attribute(device: &str, attribute: &str) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.read_attribute(device, attribute).await
}

async fn call_read_attributes(device: &str) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = status_proxy::StatusProxy::new(&connection).await?;
    proxy.read_attributes(device).await
}

/// Turns `name devt class parent` lines into table rows
pub(crate) fn device_rows(list: &str) -> String {
    list.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [name, devt, class, parent] => {
                    Some(format!("| {name} | {devt} | {class} | {parent} |\n"))
                }
                _ => None,
            }
        })
        .collect()
}

/// gets all devices and bridges and returns an ascii table as String
async fn get_full_status_message() -> Result<String, zbus::Error> {
    let mut ret_string = String::from(
        "---- DEVICES ----\n\
    | dev | devt | class | bridge |\n",
    );
    ret_string += &device_rows(&call_list_devices().await?);
    ret_string += "\n---- BRIDGES ----\n";
    ret_string += &call_list_bus_devices().await?;
    ret_string += "\n---- MINORS ----\n";
    ret_string += &call_get_minors().await?;
    Ok(ret_string)
}

/// gets every attribute of one device and returns it as String
async fn get_device_status_message(device: &str) -> Result<String, zbus::Error> {
    Ok(format!(
        "---- {device} ----\n{}",
        call_read_attributes(device).await?
    ))
}

pub async fn status_handler(device: &Option<String>) -> Result<String, zbus::Error> {
    match device {
        Some(device) => get_device_status_message(device).await,
        None => get_full_status_message().await,
    }
}

pub async fn attribute_handler(device: &str, attribute: &str) -> Result<String, zbus::Error> {
    call_read_attribute(device, attribute).await
}
