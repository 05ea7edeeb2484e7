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

//! fpgadev command-line client.
//!
//! Talks to the fpgadev daemon over the system D-Bus:
//! - `status [device]` - tables of devices, bridges and minors, or one device's attributes
//! - `attr <device> <attribute>` - one attribute value
//! - `attach --name --compatible --base --size` - offer a bridge to the driver
//! - `detach <name>` - unbind a bridge
//! - `map <device> --length [--page-offset]` - try a mapping and report where it points
//!
//! Numbers accept decimal or `0x` prefixed hexadecimal.

mod control;
mod proxies;
mod status;

use clap::{Parser, Subcommand, arg, command};
use control::{attach_handler, detach_handler, map_handler};
use log::{debug, error};
use status::{attribute_handler, status_handler};

#[derive(Parser, Debug)]
#[command(name = "fpgadev")]
#[command(bin_name = "fpgadev")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show devices, bridges and minors, or the attributes of one device
    Status { device: Option<String> },
    /// Read one attribute of a device
    Attr { device: String, attribute: String },
    /// Offer a platform device to the bridge driver
    Attach {
        #[arg(long)]
        name: String,
        #[arg(long, required = true, num_args = 1..)]
        compatible: Vec<String>,
        #[arg(long, value_parser = parse_u64)]
        base: u64,
        #[arg(long, value_parser = parse_u64)]
        size: u64,
    },
    /// Unbind a bridge and remove its devices
    Detach { name: String },
    /// Check a mapping of a device without keeping it
    Map {
        device: String,
        #[arg(long, value_parser = parse_u64)]
        length: u64,
        #[arg(long, value_parser = parse_u64, default_value = "0")]
        page_offset: u64,
    },
}

fn parse_u64(value: &str) -> Result<u64, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("'{value}' is not a number: {e}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let result = match &cli.command {
        Commands::Status { device } => status_handler(device).await,
        Commands::Attr { device, attribute } => attribute_handler(device, attribute).await,
        Commands::Attach {
            name,
            compatible,
            base,
            size,
        } => attach_handler(name, compatible, *base, *size).await,
        Commands::Detach { name } => detach_handler(name).await,
        Commands::Map {
            device,
            length,
            page_offset,
        } => map_handler(device, *length, *page_offset).await,
    };
    match result {
        Ok(msg) => {
            print!("{msg}");
            if !msg.ends_with('\n') {
                println!();
            }
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::decimal("4096", 4096)]
    #[case::hex("0xff200000", 0xff20_0000)]
    #[case::upper_hex("0X1000", 0x1000)]
    #[case::separated("0x20_0000", 0x20_0000)]
    fn numbers(#[case] input: &str, #[case] expected: u64) {
        expect_that!(parse_u64(input), ok(eq(&expected)));
    }

    #[gtest]
    fn rejects_garbage() {
        expect_that!(parse_u64("0xzz"), err(displays_as(contains_substring("not a number"))));
    }

    #[gtest]
    fn attach_takes_several_compatibles() {
        let cli = Cli::try_parse_from([
            "fpgadev",
            "attach",
            "--name",
            "ff200000.bridge",
            "--compatible",
            "vendor,other",
            "altr,bridge-15.0",
            "--base",
            "0xff200000",
            "--size",
            "0x200000",
        ])
        .unwrap();
        match cli.command {
            Commands::Attach {
                compatible, base, ..
            } => {
                expect_that!(compatible.len(), eq(2));
                expect_that!(base, eq(0xff20_0000));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
