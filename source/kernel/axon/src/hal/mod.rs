// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hardware seams the memory manager drives. Boards supply the real
//! implementations; host tests substitute recorders.

use crate::mm::addr::PhysAddr;

/// Translation hardware as the memory manager sees it.
///
/// Switching address spaces means handing the new root directory to the
/// MMU. Everything above this trait stays independent of how a given
/// board spells that register write.
pub trait Mmu {
    /// Points address translation at the directory rooted at `root`.
    fn load_root(&self, root: PhysAddr);
}

/// Discards root loads. Stands in before paging is switched on.
pub struct NullMmu;

impl Mmu for NullMmu {
    fn load_root(&self, _root: PhysAddr) {}
}
