// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Physical page-frame arena and the allocator seam above it
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FrameAllocator, FramePool, POISON_BYTE
//! INVARIANTS: Frame contents are reachable only through an allocated frame's
//!             index; freeing or touching an unowned frame halts the kernel

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::addr::{PhysAddr, PhysPageNum, PAGE_SIZE};
use super::layout::MemoryLayout;

/// Pattern written into every freshly allocated frame.
///
/// Callers that need zeroed memory must clear the frame themselves; the
/// poison makes a missed clear visible instead of accidentally correct.
pub const POISON_BYTE: u8 = 0xA5;

/// Source of physical page frames.
///
/// The memory manager consumes frames through this trait and never owns
/// backing storage itself. Frame contents are addressed by index, so a
/// frame is only touchable while the allocator considers it live.
pub trait FrameAllocator {
    /// Hands out one poison-filled frame, or `None` when memory is exhausted.
    fn allocate(&mut self) -> Option<PhysPageNum>;

    /// Returns a frame to the allocator.
    ///
    /// Panics if the frame is not currently allocated; a stray free means
    /// page-table state and frame ownership have diverged.
    fn free(&mut self, ppn: PhysPageNum);

    /// Read access to the contents of an allocated frame.
    fn bytes(&self, ppn: PhysPageNum) -> &[u8; PAGE_SIZE];

    /// Write access to the contents of an allocated frame.
    fn bytes_mut(&mut self, ppn: PhysPageNum) -> &mut [u8; PAGE_SIZE];

    /// Copies the full contents of `src` into `dst`.
    fn copy_frame(&mut self, src: PhysPageNum, dst: PhysPageNum) {
        let data: [u8; PAGE_SIZE] = *self.bytes(src);
        self.bytes_mut(dst).copy_from_slice(&data);
    }
}

/// Fixed-capacity frame arena covering the allocatable RAM of one machine.
///
/// Storage for each live frame is owned by the pool; the rest of the
/// kernel holds only `PhysPageNum` indices into it.
pub struct FramePool {
    base: PhysPageNum,
    slots: Vec<Option<Box<[u8; PAGE_SIZE]>>>,
    recycled: Vec<u32>,
    cursor: usize,
    allocated: usize,
    #[cfg(feature = "failpoints")]
    deny_remaining: usize,
}

impl FramePool {
    /// Builds a pool over the allocatable range of `layout`, which is the
    /// RAM between the end of the kernel image and the top of memory.
    pub fn new(layout: &MemoryLayout) -> Self {
        let start = PhysAddr::new(layout.kernel_end).page_round_up();
        let end = PhysAddr::new(layout.phys_stop).page_round_down();
        assert!(start.raw() < end.raw(), "frame pool: empty range");
        let capacity = ((end.raw() - start.raw()) as usize) / PAGE_SIZE;
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            base: start.ppn(),
            slots,
            recycled: Vec::new(),
            cursor: 0,
            allocated: 0,
            #[cfg(feature = "failpoints")]
            deny_remaining: 0,
        }
    }

    /// Total number of frames the pool manages.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames currently handed out.
    pub fn allocated_frames(&self) -> usize {
        self.allocated
    }

    /// Number of frames still available.
    pub fn free_frames(&self) -> usize {
        self.capacity() - self.allocated
    }

    /// Forces the next `count` allocations to fail.
    #[cfg(feature = "failpoints")]
    pub fn deny_next_allocations(&mut self, count: usize) {
        self.deny_remaining = count;
    }

    fn index_of(&self, ppn: PhysPageNum) -> Option<usize> {
        let raw = ppn.as_raw().checked_sub(self.base.as_raw())? as usize;
        (raw < self.slots.len()).then_some(raw)
    }

    fn slot(&self, ppn: PhysPageNum) -> &Option<Box<[u8; PAGE_SIZE]>> {
        let index = self
            .index_of(ppn)
            .unwrap_or_else(|| panic!("frame pool: ppn {} outside managed range", ppn));
        &self.slots[index]
    }
}

impl FrameAllocator for FramePool {
    fn allocate(&mut self) -> Option<PhysPageNum> {
        #[cfg(feature = "failpoints")]
        if self.deny_remaining > 0 {
            self.deny_remaining -= 1;
            return None;
        }
        let index = match self.recycled.pop() {
            Some(index) => index as usize,
            None => {
                if self.cursor >= self.slots.len() {
                    return None;
                }
                let index = self.cursor;
                self.cursor += 1;
                index
            }
        };
        self.slots[index] = Some(Box::new([POISON_BYTE; PAGE_SIZE]));
        self.allocated += 1;
        Some(PhysPageNum::from_raw(self.base.as_raw() + index as u32))
    }

    fn free(&mut self, ppn: PhysPageNum) {
        let index = self
            .index_of(ppn)
            .unwrap_or_else(|| panic!("frame pool: free of ppn {} outside managed range", ppn));
        if self.slots[index].take().is_none() {
            panic!("frame pool: free of unowned frame {}", ppn);
        }
        self.allocated -= 1;
        self.recycled.push(index as u32);
    }

    fn bytes(&self, ppn: PhysPageNum) -> &[u8; PAGE_SIZE] {
        self.slot(ppn)
            .as_deref()
            .unwrap_or_else(|| panic!("frame pool: access to unowned frame {}", ppn))
    }

    fn bytes_mut(&mut self, ppn: PhysPageNum) -> &mut [u8; PAGE_SIZE] {
        let index = self
            .index_of(ppn)
            .unwrap_or_else(|| panic!("frame pool: ppn {} outside managed range", ppn));
        self.slots[index]
            .as_deref_mut()
            .unwrap_or_else(|| panic!("frame pool: access to unowned frame {}", ppn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_layout(frames: u32) -> MemoryLayout {
        MemoryLayout {
            kernel_end: 0x0020_0000,
            phys_stop: 0x0020_0000 + frames * PAGE_SIZE as u32,
            ..MemoryLayout::DEFAULT
        }
    }

    #[test]
    fn allocation_poisons_and_accounts() {
        let mut pool = FramePool::new(&tiny_layout(4));
        assert_eq!(pool.capacity(), 4);
        let frame = pool.allocate().expect("frame");
        assert!(pool.bytes(frame).iter().all(|&b| b == POISON_BYTE));
        assert_eq!(pool.allocated_frames(), 1);
        assert_eq!(pool.free_frames(), 3);
    }

    #[test]
    fn exhaustion_reports_none_and_free_recovers() {
        let mut pool = FramePool::new(&tiny_layout(2));
        let a = pool.allocate().expect("first");
        let _b = pool.allocate().expect("second");
        assert_eq!(pool.allocate(), None);
        pool.free(a);
        assert_eq!(pool.allocate(), Some(a));
    }

    #[test]
    fn frames_live_in_the_managed_range() {
        let layout = tiny_layout(2);
        let mut pool = FramePool::new(&layout);
        let frame = pool.allocate().expect("frame");
        assert!(frame.base().raw() >= layout.kernel_end);
        assert!(frame.base().raw() < layout.phys_stop);
    }

    #[test]
    #[should_panic(expected = "free of unowned frame")]
    fn double_free_halts() {
        let mut pool = FramePool::new(&tiny_layout(2));
        let frame = pool.allocate().expect("frame");
        pool.free(frame);
        pool.free(frame);
    }

    #[test]
    #[should_panic(expected = "outside managed range")]
    fn foreign_frame_free_halts() {
        let mut pool = FramePool::new(&tiny_layout(2));
        pool.free(PhysPageNum::from_raw(1));
    }

    #[test]
    #[should_panic(expected = "access to unowned frame")]
    fn reading_a_freed_frame_halts() {
        let mut pool = FramePool::new(&tiny_layout(2));
        let frame = pool.allocate().expect("frame");
        pool.free(frame);
        let _ = pool.bytes(frame);
    }

    #[test]
    fn copy_frame_duplicates_contents() {
        let mut pool = FramePool::new(&tiny_layout(2));
        let src = pool.allocate().expect("src");
        let dst = pool.allocate().expect("dst");
        pool.bytes_mut(src)[123] = 0x42;
        pool.copy_frame(src, dst);
        assert_eq!(pool.bytes(dst)[123], 0x42);
        assert_eq!(pool.bytes(dst)[124], POISON_BYTE);
    }

    #[cfg(feature = "failpoints")]
    #[test]
    fn failpoint_denies_exactly_the_requested_allocations() {
        let mut pool = FramePool::new(&tiny_layout(3));
        pool.deny_next_allocations(2);
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.allocate(), None);
        assert!(pool.allocate().is_some());
    }
}
