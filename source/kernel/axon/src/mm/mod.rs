// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Virtual memory: page tables, frames, address spaces, sharing
//! OWNERS: @kernel-mm-team
//! PUBLIC API: re-exports of the building blocks below
//! DEPENDS_ON: alloc, spin, bitflags
//! INVARIANTS: Every frame is owned by exactly one of: an address space,
//!             a shared region, or the free pool

pub mod addr;
pub mod frames;
pub mod layout;
pub mod page_table;
pub mod shm;
pub mod space;
pub mod uaccess;

pub use addr::{PhysAddr, PhysPageNum, VirtAddr, PAGE_SIZE};
pub use frames::{FrameAllocator, FramePool};
pub use layout::MemoryLayout;
pub use page_table::{MapError, PteFlags};
pub use shm::{RegionKey, RegionTable, ShmError, SHM_MAX_PAGES, SHM_REGION_SLOTS, SHM_WINDOW_SLOTS};
pub use space::{AddressSpace, LoadError, SegmentSource, SpaceError};
pub use uaccess::{copy_out, translate_user, CopyError};


#[cfg(test)]
mod tests_prop;
