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

mod common;

use common::*;
use fpgadev::driver::DriverProfile;
use fpgadev::error::EINVAL;
use fpgadev::host::{PAGE_SHIFT, PAGE_SIZE};
use fpgadev::module::MappingReport;
use fpgadev::sync::Task;
use fpgadev::vma::{CachePolicy, VmArea};
use googletest::prelude::*;
use rstest::*;

const MAP_AT: u64 = 0x7f00_0000;
const SMALL_WINDOW_PAGES: u64 = 4;
const DMA_POOL_BASE: u64 = 0x2000_0000;

fn small_window() -> fpgadev::driver::PlatformDevice {
    bridge("small.bridge", BRIDGE_BASE, SMALL_WINDOW_PAGES * PAGE_SIZE)
}

#[gtest]
#[rstest]
#[case::first_page(0, 1, true)]
#[case::whole_window(0, 4, true)]
#[case::last_page(3, 1, true)]
#[case::middle_pair(1, 2, true)]
#[case::runs_past_end(3, 2, false)]
#[case::starts_at_end(4, 1, false)]
#[case::longer_than_window(0, 5, false)]
#[case::huge_offset(u64::MAX >> PAGE_SHIFT, 1, false)]
fn window_mapping_must_fit_inside_window(
    #[case] pgoff: u64,
    #[case] pages: u64,
    #[case] accepted: bool,
) {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&small_window()).unwrap();
    let file = module.open("io_space0", &Task::new("mapper")).unwrap();

    let mut vma = VmArea::new(MAP_AT, pages * PAGE_SIZE, pgoff).unwrap();
    let result = file.mmap(&mut vma);

    if accepted {
        expect_that!(result, ok(anything()));
        expect_that!(vma.pages().len(), eq(pages as usize));
        expect_that!(vma.phys_start(), some(eq(BRIDGE_BASE + pgoff * PAGE_SIZE)));
    } else {
        expect_that!(result.map_err(|e| e.errno()), err(eq(EINVAL)));
        expect_that!(vma.is_mapped(), eq(false));
    }
    file.close().unwrap();
}

#[gtest]
fn full_window_is_write_combined_and_contiguous() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let file = module.open("io_space0", &Task::new("mapper")).unwrap();

    let mut vma = VmArea::new(MAP_AT, BRIDGE_SIZE, 0).unwrap();
    file.mmap(&mut vma).unwrap();

    expect_that!(vma.pages().len(), eq((BRIDGE_SIZE / PAGE_SIZE) as usize));
    expect_that!(vma.phys_start(), some(eq(BRIDGE_BASE)));
    expect_that!(vma.is_contiguous(), eq(true));
    expect_that!(
        vma.pages().iter().all(|p| p.cache == CachePolicy::WriteCombine),
        eq(true)
    );
    expect_that!(
        vma.pages().last().map(|p| p.pfn),
        some(eq((BRIDGE_BASE + BRIDGE_SIZE - PAGE_SIZE) >> PAGE_SHIFT))
    );
    file.close().unwrap();
}

#[gtest]
fn partial_last_page_maps_whole_page() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&small_window()).unwrap();
    let file = module.open("io_space0", &Task::new("mapper")).unwrap();

    let mut vma = VmArea::new(MAP_AT, PAGE_SIZE + 16, 0).unwrap();
    file.mmap(&mut vma).unwrap();

    expect_that!(vma.pages().len(), eq(2));
    file.close().unwrap();
}

#[gtest]
fn loopback_window_maps_like_register_window() {
    let (_sim, module) = load(DriverProfile::H2fLoop);
    module.attach(&default_bridge()).unwrap();
    let file = module.open("h2f_loop0", &Task::new("mapper")).unwrap();

    let mut vma = VmArea::new(MAP_AT, 2 * PAGE_SIZE, 1).unwrap();
    file.mmap(&mut vma).unwrap();

    expect_that!(vma.phys_start(), some(eq(BRIDGE_BASE + PAGE_SIZE)));
    expect_that!(vma.is_contiguous(), eq(true));
    expect_that!(vma.pages()[0].cache, eq(CachePolicy::WriteCombine));
    file.close().unwrap();
}

#[gtest]
#[rstest]
#[case::one_page(1)]
#[case::half(DMA_PAGES / 2)]
#[case::whole_buffer(DMA_PAGES)]
fn dma_mapping_is_one_contiguous_run(#[case] pages: u64) {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let file = module.open("dma1", &Task::new("mapper")).unwrap();

    let mut vma = VmArea::new(MAP_AT, pages * PAGE_SIZE, 0).unwrap();
    file.mmap(&mut vma).unwrap();

    expect_that!(vma.pages().len(), eq(pages as usize));
    expect_that!(vma.phys_start(), some(eq(DMA_POOL_BASE)));
    expect_that!(vma.is_contiguous(), eq(true));
    expect_that!(
        vma.pages().iter().all(|p| p.cache == CachePolicy::Default),
        eq(true)
    );
    file.close().unwrap();
}

#[gtest]
#[rstest]
#[case::not_page_multiple(PAGE_SIZE + 1)]
#[case::sub_page(100)]
#[case::larger_than_buffer((DMA_PAGES + 1) * PAGE_SIZE)]
fn invalid_dma_length_installs_nothing(#[case] length: u64) {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let file = module.open("dma1", &Task::new("mapper")).unwrap();

    let mut vma = VmArea::new(MAP_AT, length, 0).unwrap();
    let result = file.mmap(&mut vma);

    expect_that!(result.map_err(|e| e.errno()), err(eq(EINVAL)));
    expect_that!(vma.is_mapped(), eq(false));
    file.close().unwrap();
}

#[gtest]
fn dma_mapping_ignores_page_offset() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let file = module.open("dma1", &Task::new("mapper")).unwrap();

    let mut vma = VmArea::new(MAP_AT, PAGE_SIZE, 3).unwrap();
    file.mmap(&mut vma).unwrap();

    expect_that!(vma.phys_start(), some(eq(DMA_POOL_BASE)));
    file.close().unwrap();
}

#[gtest]
fn attributes_describe_the_hardware() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();

    expect_that!(
        module.read_attribute("io_space0", "io_base"),
        ok(eq("0xff200000\n"))
    );
    expect_that!(
        module.read_attribute("io_space0", "io_size"),
        ok(eq("2097152\n"))
    );
    expect_that!(
        module.read_attribute("dma1", "phys_addr"),
        ok(eq("0x20000000\n"))
    );
    expect_that!(
        module.read_attribute("dma1", "size"),
        ok(eq(&format!("{}\n", DMA_PAGES * PAGE_SIZE)))
    );
    expect_that!(
        module.read_attribute("dma1", "io_base"),
        err(displays_as(contains_substring("has no attribute")))
    );
    expect_that!(
        module.attributes("dma1"),
        ok(elements_are![
            eq(&("phys_addr".to_owned(), "0x20000000\n".to_owned())),
            eq(&("size".to_owned(), format!("{}\n", DMA_PAGES * PAGE_SIZE)))
        ])
    );
}

#[gtest]
fn check_mapping_reports_and_releases() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let task = Task::new("checker");

    expect_that!(
        module.check_mapping("io_space0", 2 * PAGE_SIZE, 1, &task),
        ok(eq(&MappingReport {
            pages: 2,
            phys_start: BRIDGE_BASE + PAGE_SIZE,
            contiguous: true,
        }))
    );
    expect_that!(
        module.check_mapping("dma1", 3 * PAGE_SIZE + 1, 0, &task),
        err(anything())
    );

    let stats = module.device("dma1").unwrap().lock().stats();
    expect_that!(stats.acquired, eq(stats.released));
    expect_that!(stats.acquired, eq(3));
}
