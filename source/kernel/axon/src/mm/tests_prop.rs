// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Property tests: mapping round-trips, accounting stability and the
//! region-table refcount invariant under random operation sequences.

use proptest::prelude::*;

use super::addr::{VirtAddr, PAGE_SIZE};
use super::frames::{FrameAllocator, FramePool};
use super::layout::MemoryLayout;
use super::page_table::{self, walk, PteFlags};
use super::shm::{RegionTable, ShmError, SHM_WINDOW_SLOTS};
use super::space::AddressSpace;

const PAGE: u32 = PAGE_SIZE as u32;

fn test_layout() -> MemoryLayout {
    MemoryLayout { phys_stop: 0x0080_0000, ..MemoryLayout::DEFAULT }
}

proptest! {
    #[test]
    fn mapped_pages_read_back(
        pages in prop::collection::btree_set(0u32..2048, 1..48),
        writable in any::<bool>(),
    ) {
        let layout = test_layout();
        let mut pool = FramePool::new(&layout);
        let root = pool.allocate().expect("root");
        pool.bytes_mut(root).fill(0);

        let mut flags = PteFlags::USER;
        if writable {
            flags |= PteFlags::WRITABLE;
        }

        let mut placed = Vec::new();
        for &page in &pages {
            let frame = pool.allocate().expect("frame");
            page_table::map_range(
                &mut pool,
                root,
                VirtAddr::new(page * PAGE),
                PAGE,
                frame.base(),
                flags,
            )
            .expect("map");
            placed.push((page, frame));
        }

        for (page, frame) in placed {
            let pte = walk(&pool, root, VirtAddr::new(page * PAGE)).expect("table").get(&pool);
            prop_assert!(pte.is_present());
            prop_assert_eq!(pte.addr(), frame.base());
            prop_assert_eq!(pte.flags(), flags | PteFlags::PRESENT);
        }

        // Pages outside the set must not have appeared.
        for probe in (0u32..2048).filter(|probe| !pages.contains(probe)).take(8) {
            if let Some(slot) = walk(&pool, root, VirtAddr::new(probe * PAGE)) {
                prop_assert!(!slot.get(&pool).is_present());
            }
        }
    }

    #[test]
    fn grow_shrink_sequences_keep_accounting_consistent(
        targets in prop::collection::vec(0u32..64, 1..24),
    ) {
        let layout = test_layout();
        let mut pool = FramePool::new(&layout);
        let regions = RegionTable::new();
        let baseline = pool.allocated_frames();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");

        for target in targets {
            let bytes = target * PAGE;
            if bytes >= space.size() {
                space.grow(&mut pool, bytes).expect("grow");
                prop_assert_eq!(space.size(), bytes);
            } else {
                prop_assert_eq!(space.shrink(&mut pool, &regions, bytes), bytes);
            }

            // Exactly the pages below the boundary are mapped.
            let mapped = (0u32..64)
                .filter(|page| {
                    walk(&pool, space.root_ppn(), VirtAddr::new(page * PAGE))
                        .map_or(false, |slot| slot.get(&pool).is_present())
                })
                .count() as u32;
            prop_assert_eq!(mapped, (space.size() + PAGE - 1) / PAGE);
        }

        space.destroy(&mut pool, &regions);
        prop_assert_eq!(pool.allocated_frames(), baseline);
    }

    #[test]
    fn region_table_tracks_holders(
        ops in prop::collection::vec((0usize..4, 1usize..4, any::<bool>()), 1..40),
    ) {
        let layout = test_layout();
        let mut pool = FramePool::new(&layout);
        let table = RegionTable::new();
        let baseline = pool.allocated_frames();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");

        // Live page count per key, and how many windows this space holds.
        let mut region_pages: [Option<usize>; 4] = [None; 4];
        let mut held: [u32; 4] = [0; 4];

        for (key, pages, attach) in ops {
            if attach {
                if space.windows().iter().flatten().count() == SHM_WINDOW_SLOTS {
                    prop_assert_eq!(
                        table.acquire(&mut pool, &mut space, key, pages),
                        Err(ShmError::WindowsExhausted)
                    );
                    continue;
                }
                match region_pages[key] {
                    Some(existing) if existing != pages => {
                        prop_assert_eq!(
                            table.acquire(&mut pool, &mut space, key, pages),
                            Err(ShmError::SizeMismatch)
                        );
                    }
                    _ => {
                        table.acquire(&mut pool, &mut space, key, pages).expect("attach");
                        region_pages[key] = Some(pages);
                        held[key] += 1;
                    }
                }
            } else if held[key] > 0 {
                table.release(&mut pool, &mut space, key).expect("release");
                held[key] -= 1;
                if held[key] == 0 {
                    region_pages[key] = None;
                }
            } else {
                prop_assert_eq!(
                    table.release(&mut pool, &mut space, key),
                    Err(ShmError::NotAttached)
                );
            }

            // A slot is occupied exactly while someone holds it.
            for k in 0..4 {
                let expected = if held[k] > 0 { Some(held[k]) } else { None };
                prop_assert_eq!(table.refcount(k), expected);
            }
        }

        for k in 0..4 {
            while held[k] > 0 {
                table.release(&mut pool, &mut space, k).expect("drain");
                held[k] -= 1;
            }
        }
        space.destroy(&mut pool, &table);
        prop_assert_eq!(pool.allocated_frames(), baseline);
    }
}
