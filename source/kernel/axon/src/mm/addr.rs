// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Address newtypes for the 32-bit two-level paging model
//! OWNERS: @kernel-mm-team
//! PUBLIC API: VirtAddr, PhysAddr, PhysPageNum, PAGE_SIZE, ENTRIES_PER_TABLE
//! INVARIANTS: Page rounding uses the C unsigned wrap rules; indices are in 0..1024
//!
//! ## Newtype Rationale
//!
//! Virtual and physical addresses share the same 32-bit width, which makes
//! them trivially easy to swap at a call site. Dedicated newtypes keep the
//! walker, the frame pool and the translation helpers honest about which
//! side of the mapping an address lives on.

use core::fmt;

/// Size of a page and of a page frame in bytes.
pub const PAGE_SIZE: usize = 4096;
/// Number of entries in a page directory or a leaf page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

const PAGE_MASK: u32 = PAGE_SIZE as u32 - 1;
const INDEX_MASK: u32 = ENTRIES_PER_TABLE as u32 - 1;

static_assertions::const_assert_eq!(PAGE_SIZE, ENTRIES_PER_TABLE * core::mem::size_of::<u32>());
static_assertions::const_assert_eq!(PAGE_SIZE & (PAGE_SIZE - 1), 0);

/// Address in some virtual address space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VirtAddr(u32);

impl VirtAddr {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into the page directory for this address (bits 31:22).
    #[inline]
    pub const fn dir_index(self) -> usize {
        ((self.0 >> 22) & INDEX_MASK) as usize
    }

    /// Index into the leaf page table for this address (bits 21:12).
    #[inline]
    pub const fn table_index(self) -> usize {
        ((self.0 >> 12) & INDEX_MASK) as usize
    }

    /// Byte offset of this address within its page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        (self.0 & PAGE_MASK) as usize
    }

    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Largest page boundary at or below this address.
    #[inline]
    pub const fn page_round_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Smallest page boundary at or above this address, wrapping like
    /// unsigned arithmetic does.
    #[inline]
    pub const fn page_round_up(self) -> Self {
        Self(self.0.wrapping_add(PAGE_MASK) & !PAGE_MASK)
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Address of a byte in physical memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysAddr(u32);

impl PhysAddr {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Number of the frame containing this address.
    #[inline]
    pub const fn ppn(self) -> PhysPageNum {
        PhysPageNum(self.0 >> 12)
    }

    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    #[inline]
    pub const fn page_round_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    #[inline]
    pub const fn page_round_up(self) -> Self {
        Self(self.0.wrapping_add(PAGE_MASK) & !PAGE_MASK)
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Index of a physical page frame.
///
/// **Ownership**: only the frame pool hands these out; everything else
/// refers to frames through this index and never through raw storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysPageNum(u32);

impl PhysPageNum {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Physical address of the first byte of this frame.
    #[inline]
    pub const fn base(self) -> PhysAddr {
        PhysAddr(self.0 << 12)
    }
}

impl fmt::Display for PhysPageNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
