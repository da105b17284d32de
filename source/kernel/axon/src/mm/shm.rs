// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Refcounted shared-memory regions and the windows that map them
//! OWNERS: @kernel-mm-team
//! PUBLIC API: RegionTable, RegionKey, ShmError, region/window size limits
//! DEPENDS_ON: page_table mapper, frames::FrameAllocator, space::AddressSpace
//! INVARIANTS: A region slot is occupied iff its refcount is nonzero; a
//!             window always names an occupied slot; region frames are owned
//!             by the table, never by any single space

use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

use crate::{log_debug, log_info};

use super::addr::{PhysPageNum, VirtAddr, PAGE_SIZE};
use super::frames::FrameAllocator;
use super::page_table::{self, walk, Pte, PteFlags};
use super::space::AddressSpace;

/// Region slots in the global table.
pub const SHM_REGION_SLOTS: usize = 32;
/// Window slots per address space.
pub const SHM_WINDOW_SLOTS: usize = 32;
/// Largest region size in pages.
pub const SHM_MAX_PAGES: usize = 32;

const PAGE: u32 = PAGE_SIZE as u32;

/// Validated index into the region table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionKey(u8);

impl RegionKey {
    /// Accepts raw keys in `0..SHM_REGION_SLOTS`.
    pub fn new(raw: usize) -> Option<Self> {
        if raw < SHM_REGION_SLOTS {
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attached region as a space sees it: which region, mapped where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShmWindow {
    pub(crate) key: RegionKey,
    pub(crate) base: VirtAddr,
}

struct Region {
    refcount: u32,
    frames: Vec<PhysPageNum>,
}

/// Errors reported by the sharing operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "sharing errors must be handled explicitly"]
pub enum ShmError {
    /// The key is outside `0..SHM_REGION_SLOTS`.
    KeyOutOfRange,
    /// The page count is zero or above `SHM_MAX_PAGES`.
    BadPageCount,
    /// The region already exists with a different page count.
    SizeMismatch,
    /// Every window slot of the space is already in use.
    WindowsExhausted,
    /// The space holds no window for this key.
    NotAttached,
    /// Physical memory ran out while building or mapping the region.
    FrameExhausted,
}

/// Global table of shared regions, keyed by small integers userland picks.
///
/// The one lock in this subsystem. It is taken for the whole of each
/// operation so refcounts, frame lists and the page-table edits they
/// imply always change together.
pub struct RegionTable {
    slots: Mutex<[Option<Region>; SHM_REGION_SLOTS]>,
}

impl RegionTable {
    pub const fn new() -> Self {
        const NO_REGION: Option<Region> = None;
        Self { slots: Mutex::new([NO_REGION; SHM_REGION_SLOTS]) }
    }

    /// Attaches the region behind `key` to `space`, creating it on first use.
    ///
    /// A fresh region gets `pages` zero-filled frames; later callers must
    /// ask for the same count. The window lands one page below the lowest
    /// existing window, starting one page under the kernel half, and the
    /// same key may be attached more than once. Returns the window base.
    pub fn acquire<A: FrameAllocator + ?Sized>(
        &self,
        pool: &mut A,
        space: &mut AddressSpace,
        key: usize,
        pages: usize,
    ) -> Result<VirtAddr, ShmError> {
        let key = match RegionKey::new(key) {
            Some(key) => key,
            None => return Err(ShmError::KeyOutOfRange),
        };
        if pages == 0 || pages > SHM_MAX_PAGES {
            return Err(ShmError::BadPageCount);
        }
        let window_slot = match space.free_window_slot() {
            Some(slot) => slot,
            None => return Err(ShmError::WindowsExhausted),
        };

        let mut slots = self.slots.lock();
        let (mut region, created) = match slots[key.as_index()].take() {
            Some(region) => {
                if region.frames.len() != pages {
                    slots[key.as_index()] = Some(region);
                    return Err(ShmError::SizeMismatch);
                }
                (region, false)
            }
            None => {
                let mut frames = Vec::with_capacity(pages);
                for _ in 0..pages {
                    match pool.allocate() {
                        Some(frame) => {
                            pool.bytes_mut(frame).fill(0);
                            frames.push(frame);
                        }
                        None => {
                            for frame in frames {
                                pool.free(frame);
                            }
                            return Err(ShmError::FrameExhausted);
                        }
                    }
                }
                (Region { refcount: 0, frames }, true)
            }
        };

        // Window placement: one guard page below the kernel half, then
        // strictly downward below the lowest window already attached.
        let mut top = space.layout().kern_base - PAGE;
        for window in space.windows().iter().flatten() {
            top = top.min(window.base.raw());
        }
        let base = top - pages as u32 * PAGE;

        let flags = PteFlags::WRITABLE | PteFlags::USER;
        for (page, frame) in region.frames.iter().enumerate() {
            let va = VirtAddr::new(base + page as u32 * PAGE);
            if page_table::map_range(pool, space.root_ppn(), va, PAGE, frame.base(), flags)
                .is_err()
            {
                detach_pages(pool, space, base, page);
                if created {
                    for frame in region.frames {
                        pool.free(frame);
                    }
                } else {
                    slots[key.as_index()] = Some(region);
                }
                return Err(ShmError::FrameExhausted);
            }
        }

        region.refcount += 1;
        if created {
            log_info!(target: "mm", "shm: region {} created, {} pages", key, pages);
        }
        log_debug!(target: "mm", "shm: region {} attached at {:#x}", key, base);
        slots[key.as_index()] = Some(region);
        space.set_window(window_slot, ShmWindow { key, base: VirtAddr::new(base) });
        Ok(VirtAddr::new(base))
    }

    /// Remaps every window of `parent` into `child` at the same addresses.
    ///
    /// Used on fork so both processes see the same frames. Each propagated
    /// window counts as one more holder. On exhaustion the child is left
    /// with no windows at all.
    pub fn propagate<A: FrameAllocator + ?Sized>(
        &self,
        pool: &mut A,
        parent: &AddressSpace,
        child: &mut AddressSpace,
    ) -> Result<(), ShmError> {
        let mut slots = self.slots.lock();
        let flags = PteFlags::WRITABLE | PteFlags::USER;
        for index in 0..SHM_WINDOW_SLOTS {
            let window = match parent.windows()[index] {
                Some(window) => window,
                None => continue,
            };
            let frames = {
                let region = region_mut(&mut slots, window.key);
                region.refcount += 1;
                region.frames.clone()
            };

            let mut mapped = 0;
            let mut failed = false;
            for (page, frame) in frames.iter().enumerate() {
                let va = VirtAddr::new(window.base.raw() + page as u32 * PAGE);
                if page_table::map_range(pool, child.root_ppn(), va, PAGE, frame.base(), flags)
                    .is_err()
                {
                    failed = true;
                    break;
                }
                mapped = page + 1;
            }
            if failed {
                detach_pages(pool, child, window.base.raw(), mapped);
                region_mut(&mut slots, window.key).refcount -= 1;
                for earlier in 0..index {
                    if let Some(done) = parent.windows()[earlier] {
                        let pages = region_mut(&mut slots, done.key).frames.len();
                        detach_pages(pool, child, done.base.raw(), pages);
                        region_mut(&mut slots, done.key).refcount -= 1;
                        child.take_window(done.key);
                    }
                }
                return Err(ShmError::FrameExhausted);
            }
            child.set_window(index, window);
        }
        Ok(())
    }

    /// Detaches the window for `key` from `space` and drops one holder.
    ///
    /// The last holder frees the region's frames and empties the slot. A
    /// window whose pages are no longer mapped means the page table and
    /// the window list disagree, and that halts the kernel.
    pub fn release<A: FrameAllocator + ?Sized>(
        &self,
        pool: &mut A,
        space: &mut AddressSpace,
        key: usize,
    ) -> Result<(), ShmError> {
        let key = match RegionKey::new(key) {
            Some(key) => key,
            None => return Err(ShmError::KeyOutOfRange),
        };
        let window = match space.take_window(key) {
            Some(window) => window,
            None => return Err(ShmError::NotAttached),
        };

        let mut slots = self.slots.lock();
        let pages = region_mut(&mut slots, key).frames.len();
        for page in 0..pages {
            let va = VirtAddr::new(window.base.raw() + page as u32 * PAGE);
            let slot = match walk(pool, space.root_ppn(), va) {
                Some(slot) => slot,
                None => panic!("shm release: no table at va {:#x}", va.raw()),
            };
            if !slot.get(pool).is_present() {
                panic!("shm release: page not mapped at va {:#x}", va.raw());
            }
            slot.set(pool, Pte::EMPTY);
        }

        let last = {
            let region = region_mut(&mut slots, key);
            region.refcount -= 1;
            region.refcount == 0
        };
        if last {
            if let Some(region) = slots[key.as_index()].take() {
                for frame in region.frames {
                    pool.free(frame);
                }
            }
            log_info!(target: "mm", "shm: region {} destroyed", key);
        } else {
            log_debug!(target: "mm", "shm: region {} detached", key);
        }
        Ok(())
    }

    /// Whether `ppn` currently belongs to any live region.
    ///
    /// Teardown paths ask this before freeing a frame they found mapped.
    pub fn is_shared_frame(&self, ppn: PhysPageNum) -> bool {
        let slots = self.slots.lock();
        slots.iter().flatten().any(|region| region.frames.contains(&ppn))
    }

    #[cfg(test)]
    pub(crate) fn refcount(&self, key: usize) -> Option<u32> {
        let slots = self.slots.lock();
        slots[key].as_ref().map(|region| region.refcount)
    }
}

impl Default for RegionTable {
    fn default() -> Self {
        Self::new()
    }
}

fn region_mut(
    slots: &mut [Option<Region>; SHM_REGION_SLOTS],
    key: RegionKey,
) -> &mut Region {
    match slots[key.as_index()].as_mut() {
        Some(region) => region,
        None => panic!("shm: no region behind key {}", key),
    }
}

/// Clears `pages` window entries starting at `base` without freeing frames.
///
/// The frames belong to the region table. Only entries this subsystem
/// wrote can be cleared here, so a missing one is fatal.
fn detach_pages<A: FrameAllocator + ?Sized>(
    pool: &mut A,
    space: &AddressSpace,
    base: u32,
    pages: usize,
) {
    for page in 0..pages {
        let va = VirtAddr::new(base + page as u32 * PAGE);
        match walk(pool, space.root_ppn(), va) {
            Some(slot) => slot.set(pool, Pte::EMPTY),
            None => panic!("shm: mapped window lost at va {:#x}", va.raw()),
        }
    }
}
