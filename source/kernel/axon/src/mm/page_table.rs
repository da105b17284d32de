// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Two-level page tables walked in software over the frame arena
//! OWNERS: @kernel-mm-team
//! PUBLIC API: PteFlags, Pte, PteSlot, walk, walk_create, map_range, MapError
//! DEPENDS_ON: frames::FrameAllocator
//! INVARIANTS: A directory entry is never a leaf; leaf permissions narrow the
//!             directory's; mapping over a present leaf entry halts the kernel

use bitflags::bitflags;

use super::addr::{PhysAddr, PhysPageNum, VirtAddr, PAGE_SIZE};
use super::frames::FrameAllocator;

const PAGE: u32 = PAGE_SIZE as u32;
const ENTRY_BYTES: usize = core::mem::size_of::<u32>();

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Permission bits stored in directory and leaf entries.
    pub struct PteFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
    }
}

/// Error returned when manipulating page tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapError {
    /// No frame was available for a missing leaf table.
    FrameExhausted,
}

/// One page-table entry: a frame address in the high bits, flags in the low.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Pte(u32);

impl Pte {
    pub const EMPTY: Self = Self(0);

    /// Builds an entry pointing at `pa` with the given flags.
    #[inline]
    pub const fn new(pa: PhysAddr, flags: PteFlags) -> Self {
        Self(pa.raw() | flags.bits())
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Frame address the entry points at.
    #[inline]
    pub const fn addr(self) -> PhysAddr {
        PhysAddr::new(self.0 & !(PAGE - 1))
    }

    #[inline]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    #[inline]
    pub const fn is_present(self) -> bool {
        self.0 & PteFlags::PRESENT.bits() != 0
    }
}

/// Location of one entry inside a table frame.
///
/// The slot stays valid as long as the table frame it names is allocated;
/// reads and writes go through the frame allocator, never through raw
/// pointers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PteSlot {
    table: PhysPageNum,
    index: usize,
}

impl PteSlot {
    pub(crate) const fn new(table: PhysPageNum, index: usize) -> Self {
        Self { table, index }
    }

    /// Reads the entry stored in this slot.
    pub fn get<A: FrameAllocator + ?Sized>(self, pool: &A) -> Pte {
        let offset = self.index * ENTRY_BYTES;
        let bytes = pool.bytes(self.table);
        Pte(u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]))
    }

    /// Overwrites the entry stored in this slot.
    pub fn set<A: FrameAllocator + ?Sized>(self, pool: &mut A, pte: Pte) {
        let offset = self.index * ENTRY_BYTES;
        pool.bytes_mut(self.table)[offset..offset + ENTRY_BYTES]
            .copy_from_slice(&pte.raw().to_le_bytes());
    }
}

/// Finds the leaf slot for `va` without allocating anything.
///
/// Returns `None` when the covering leaf table does not exist. The slot
/// itself may still hold an empty entry; callers check `is_present`.
pub fn walk<A: FrameAllocator + ?Sized>(
    pool: &A,
    root: PhysPageNum,
    va: VirtAddr,
) -> Option<PteSlot> {
    let dir = PteSlot::new(root, va.dir_index());
    let pde = dir.get(pool);
    if !pde.is_present() {
        return None;
    }
    Some(PteSlot::new(pde.addr().ppn(), va.table_index()))
}

/// Finds the leaf slot for `va`, allocating the leaf table if missing.
///
/// A fresh leaf table is zero-filled and its directory entry carries the
/// widest permissions; leaf entries narrow them afterwards.
pub fn walk_create<A: FrameAllocator + ?Sized>(
    pool: &mut A,
    root: PhysPageNum,
    va: VirtAddr,
) -> Result<PteSlot, MapError> {
    let dir = PteSlot::new(root, va.dir_index());
    let pde = dir.get(pool);
    let table = if pde.is_present() {
        pde.addr().ppn()
    } else {
        let frame = pool.allocate().ok_or(MapError::FrameExhausted)?;
        pool.bytes_mut(frame).fill(0);
        let flags = PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER;
        dir.set(pool, Pte::new(frame.base(), flags));
        frame
    };
    Ok(PteSlot::new(table, va.table_index()))
}

/// Maps `[va, va + len)` onto the frames starting at `pa`.
///
/// Both ends are rounded to page boundaries, so a partial first or last
/// page still maps its whole page. `PRESENT` is added to `flags` for every
/// entry. Mapping a page that is already present halts the kernel: the
/// caller tracked the address space wrongly and nothing can be trusted.
pub fn map_range<A: FrameAllocator + ?Sized>(
    pool: &mut A,
    root: PhysPageNum,
    va: VirtAddr,
    len: u32,
    pa: PhysAddr,
    flags: PteFlags,
) -> Result<(), MapError> {
    assert!(len > 0, "map_range: empty range");
    debug_assert!(pa.is_page_aligned());
    let mut a = va.page_round_down();
    let last = VirtAddr::new(va.raw().wrapping_add(len - 1)).page_round_down();
    let mut pa = pa;
    loop {
        let slot = walk_create(pool, root, a)?;
        if slot.get(pool).is_present() {
            panic!("map_range: remap at va {:#x}", a.raw());
        }
        slot.set(pool, Pte::new(pa, flags | PteFlags::PRESENT));
        if a == last {
            break;
        }
        a = VirtAddr::new(a.raw().wrapping_add(PAGE));
        pa = PhysAddr::new(pa.raw().wrapping_add(PAGE));
    }
    Ok(())
}
