// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Axon kernel: the virtual-memory core of a small teaching kernel.
//!
//! Two-level page tables with 32-bit entries, a poisoning frame pool,
//! per-process address spaces with a shared kernel template, and a
//! refcounted shared-memory region table. Hardware sits behind the
//! `hal` seams so the whole crate also builds and tests on the host.

#![cfg_attr(not(test), no_std)]
#![forbid(clippy::unwrap_used)]

extern crate alloc;

pub mod diag;
pub mod hal;
pub mod mm;

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod heap;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod panic;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod uart;

pub use diag::log;
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub use heap::init_heap;
pub use mm::{
    copy_out, translate_user, AddressSpace, CopyError, FrameAllocator, FramePool, LoadError,
    MapError, MemoryLayout, PhysAddr, PhysPageNum, PteFlags, RegionKey, RegionTable,
    SegmentSource, ShmError, SpaceError, VirtAddr, PAGE_SIZE,
};
