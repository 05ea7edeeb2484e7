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

//! fpgadev daemon - hosts the bridge driver and serves it over D-Bus.
//!
//! At startup the daemon:
//! 1. Loads the configuration (user file over vendor file over defaults)
//! 2. Loads the module into the in-process host
//! 3. Attaches every configured platform device; one that fails is logged and skipped
//! 4. Connects to the system D-Bus and advertises `com.enyx.fpgadev`
//! 5. Serves requests until interrupted, then unloads the module
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`

use fpgadev::comm::dbus::{
    CONTROL_PATH, SERVICE_NAME, STATUS_PATH, control_interface::ControlInterface,
    status_interface::StatusInterface,
};
use fpgadev::config::load_daemon_config;
use fpgadev::host::{Host, sim::SimHost};
use fpgadev::module::Module;
use log::{info, warn};
use std::error::Error;
use std::sync::Arc;
use zbus::connection;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_daemon_config()?;
    let host: Arc<dyn Host> = Arc::new(SimHost::new());
    let module = Arc::new(Module::load(host, &config.module)?);

    for pdev in &config.platform_devices {
        if let Err(e) = module.attach(pdev) {
            warn!("Skipping {}: {e}", pdev.name);
        }
    }

    let status_interface = StatusInterface {
        module: Arc::clone(&module),
    };
    let control_interface = ControlInterface {
        module: Arc::clone(&module),
    };

    let conn = connection::Builder::system()?
        .name(SERVICE_NAME)?
        .serve_at(STATUS_PATH, status_interface)?
        .serve_at(CONTROL_PATH, control_interface)?
        .build()
        .await?;

    info!("Started {SERVICE_NAME} dbus service");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    // The interfaces hold the other references to the module.
    conn.object_server()
        .remove::<StatusInterface, _>(STATUS_PATH)
        .await?;
    conn.object_server()
        .remove::<ControlInterface, _>(CONTROL_PATH)
        .await?;
    match Arc::try_unwrap(module) {
        Ok(module) => module.unload(),
        Err(_) => warn!("Module still referenced at shutdown; leaving teardown to exit"),
    }

    Ok(())
}
