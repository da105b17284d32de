// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel-side access to user memory through a space's own page table.
//! Syscalls hand over raw user addresses; nothing here trusts them.

use super::addr::{VirtAddr, PAGE_SIZE};
use super::frames::FrameAllocator;
use super::page_table::{walk, PteFlags};
use super::space::AddressSpace;

/// Errors reported when a user-supplied address cannot be honored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyError {
    /// The destination is not a mapped, user-visible page.
    BadAddress,
}

/// Resolves the user page holding `va` into its kernel-half alias.
///
/// The alias points at the page base, not at `va` itself; callers re-add
/// whatever offset they need. Unmapped pages and pages the user cannot
/// see resolve to `None`, so a malicious address can never alias kernel
/// memory.
pub fn translate_user<A: FrameAllocator + ?Sized>(
    pool: &A,
    space: &AddressSpace,
    va: VirtAddr,
) -> Option<VirtAddr> {
    let slot = walk(pool, space.root_ppn(), va)?;
    let pte = slot.get(pool);
    if !pte.is_present() || !pte.flags().contains(PteFlags::USER) {
        return None;
    }
    Some(space.layout().phys_to_kernel(pte.addr()))
}

/// Copies `bytes` into the space's memory at `dst`, page by page.
///
/// Stops at the first page that fails to translate; bytes copied into
/// earlier pages stay where they are. An empty slice succeeds without
/// touching the page table.
pub fn copy_out<A: FrameAllocator + ?Sized>(
    pool: &mut A,
    space: &AddressSpace,
    dst: VirtAddr,
    bytes: &[u8],
) -> Result<(), CopyError> {
    let mut written = 0usize;
    let mut va = dst;
    while written < bytes.len() {
        let va0 = va.page_round_down();
        let ka = match translate_user(pool, space, va0) {
            Some(ka) => ka,
            None => return Err(CopyError::BadAddress),
        };
        let frame = space.layout().kernel_to_phys(ka).ppn();
        let offset = va.page_offset() as usize;
        let n = (PAGE_SIZE - offset).min(bytes.len() - written);
        pool.bytes_mut(frame)[offset..offset + n].copy_from_slice(&bytes[written..written + n]);
        written += n;
        va = VirtAddr::new(va0.raw() + PAGE_SIZE as u32);
    }
    Ok(())
}
