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
use fpgadev::error::ERESTARTSYS;
use fpgadev::host::PAGE_SIZE;
use fpgadev::module::Module;
use fpgadev::sync::Task;
use fpgadev::vma::VmArea;
use googletest::prelude::*;
use std::thread;
use std::time::Duration;

const THREADS: u64 = 8;
const ROUNDS: u64 = 25;

#[gtest]
fn concurrent_users_balance_the_device_lock() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();

    thread::scope(|s| {
        for t in 0..THREADS {
            let module = &module;
            s.spawn(move || {
                let task = Task::new(&format!("user{t}"));
                for _ in 0..ROUNDS {
                    let file = module.open("io_space0", &task).unwrap();
                    let mut vma = VmArea::new(0x4000_0000, PAGE_SIZE, t % 4).unwrap();
                    file.mmap(&mut vma).unwrap();
                    file.close().unwrap();
                }
            });
        }
    });

    let stats = module.device("io_space0").unwrap().lock().stats();
    expect_that!(stats.acquired, eq(3 * THREADS * ROUNDS));
    expect_that!(stats.released, eq(stats.acquired));
    expect_that!(stats.interrupted, eq(0));
}

/// Runs `op` on another thread while a second task holds the lock of `device`, and
/// signals `task` once the holder has it.
fn while_locked<T: Send>(
    module: &Module,
    device: &str,
    task: &Task,
    op: impl FnOnce() -> T + Send,
) -> T {
    let record = module.device(device).unwrap();
    let holder = Task::new("holder");
    let guard = record.lock().down_interruptible(&holder, device).unwrap();
    let result = thread::scope(|s| {
        let waiter = s.spawn(op);
        thread::sleep(Duration::from_millis(20));
        task.send_signal();
        waiter.join().unwrap()
    });
    drop(guard);
    result
}

#[gtest]
fn signalled_task_takes_a_free_device_lock() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let task = Task::new("signalled");
    task.send_signal();

    let file = module.open("dma1", &task).unwrap();
    let mut vma = VmArea::new(0x4000_0000, PAGE_SIZE, 0).unwrap();
    expect_that!(file.mmap(&mut vma), ok(anything()));
    expect_that!(file.close(), ok(anything()));

    let stats = module.device("dma1").unwrap().lock().stats();
    expect_that!(stats.acquired, eq(3));
    expect_that!(stats.interrupted, eq(0));
}

#[gtest]
fn signal_interrupts_waiting_open_and_retry_succeeds() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let task = Task::new("impatient");

    let interrupted = while_locked(&module, "dma1", &task, || module.open("dma1", &task))
        .unwrap_err();
    expect_that!(interrupted.errno(), eq(ERESTARTSYS));
    expect_that!(interrupted.is_retryable(), eq(true));

    let stats = module.device("dma1").unwrap().lock().stats();
    expect_that!(stats.interrupted, eq(1));
    expect_that!(stats.acquired, eq(1));
    expect_that!(stats.released, eq(1));

    task.clear_signal();
    let file = module.open("dma1", &task).unwrap();
    file.close().unwrap();
    let stats = module.device("dma1").unwrap().lock().stats();
    expect_that!(stats.acquired, eq(3));
    expect_that!(stats.released, eq(3));
}

#[gtest]
fn signal_during_mmap_wait_leaves_nothing_mapped() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let task = Task::new("impatient");
    let file = module.open("dma1", &task).unwrap();

    let (result, mut vma) = while_locked(&module, "dma1", &task, || {
        let mut vma = VmArea::new(0x4000_0000, PAGE_SIZE, 0).unwrap();
        let result = file.mmap(&mut vma).map_err(|e| e.is_retryable());
        (result, vma)
    });
    expect_that!(result, err(eq(true)));
    expect_that!(vma.is_mapped(), eq(false));

    task.clear_signal();
    expect_that!(file.mmap(&mut vma), ok(anything()));
    file.close().unwrap();
}

#[gtest]
fn signal_during_close_wait_keeps_the_lock_balanced() {
    let (_sim, module) = load(DriverProfile::FpgaDevice);
    module.attach(&default_bridge()).unwrap();
    let task = Task::new("closer");
    let file = module.open("io_space0", &task).unwrap();

    let result = while_locked(&module, "io_space0", &task, move || file.close());
    expect_that!(result.map_err(|e| e.is_retryable()), err(eq(true)));

    let stats = module.device("io_space0").unwrap().lock().stats();
    expect_that!(stats.interrupted, eq(1));
    expect_that!(stats.acquired, eq(2));
    expect_that!(stats.released, eq(stats.acquired));

    task.clear_signal();
    let file = module.open("io_space0", &task).unwrap();
    expect_that!(file.close(), ok(anything()));
}

#[gtest]
fn concurrent_attach_hands_out_unique_minors() {
    let (sim, module) = load(DriverProfile::H2fLoop);

    thread::scope(|s| {
        for i in 0..THREADS {
            let module = &module;
            s.spawn(move || {
                let base = 0xc000_0000 + i * 0x10_0000;
                module
                    .attach(&bridge(&format!("{base:x}.bridge"), base, 0x10_0000))
                    .unwrap();
            });
        }
    });

    let expected: Vec<u32> = (0..THREADS as u32).collect();
    expect_that!(module.minors_in_use(), eq(&expected));
    expect_that!(module.bus_devices().len(), eq(THREADS as usize));
    expect_that!(sim.reserved_regions().len(), eq(THREADS as usize));
}

#[gtest]
fn attach_detach_churn_ends_balanced() {
    let (sim, module) = load(DriverProfile::FpgaDevice);

    thread::scope(|s| {
        for i in 0..THREADS {
            let module = &module;
            s.spawn(move || {
                let base = 0xc000_0000 + i * 0x10_0000;
                let name = format!("{base:x}.bridge");
                let task = Task::new(&name);
                for _ in 0..ROUNDS {
                    module.attach(&bridge(&name, base, 0x10_0000)).unwrap();
                    for node in module.devices().iter().filter(|n| n.parent == name) {
                        module.open(&node.name, &task).unwrap().close().unwrap();
                    }
                    module.detach(&name).unwrap();
                }
            });
        }
    });

    expect_that!(sim.stats().is_balanced(), eq(true));
    expect_that!(module.minors_in_use().is_empty(), eq(true));
    expect_that!(module.bus_devices().is_empty(), eq(true));
}
