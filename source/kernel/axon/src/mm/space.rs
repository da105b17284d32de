// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-process address spaces and their whole-life operations
//! OWNERS: @kernel-mm-team
//! PUBLIC API: AddressSpace, SpaceError, LoadError, SegmentSource
//! DEPENDS_ON: page_table walker/mapper, frames::FrameAllocator, shm::RegionTable
//! INVARIANTS: User pages live in [0, size); the kernel template is identical in
//!             every space; a space is torn down exactly once (enforced by move)

use crate::hal::Mmu;
use crate::log_warn;

use super::addr::{PhysPageNum, VirtAddr, ENTRIES_PER_TABLE, PAGE_SIZE};
use super::frames::FrameAllocator;
use super::layout::MemoryLayout;
use super::page_table::{self, MapError, Pte, PteFlags, PteSlot};
use super::shm::{RegionKey, RegionTable, ShmWindow, SHM_WINDOW_SLOTS};

const PAGE: u32 = PAGE_SIZE as u32;

/// Errors reported while managing an address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceError {
    /// Physical memory ran out part-way through; the space was rolled back.
    FrameExhausted,
    /// The requested size would reach the kernel half of the space.
    BeyondUserLimit,
}

impl From<MapError> for SpaceError {
    fn from(value: MapError) -> Self {
        match value {
            MapError::FrameExhausted => Self::FrameExhausted,
        }
    }
}

/// Errors reported while loading a program segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The backing source produced fewer bytes than the segment needs.
    ShortRead,
}

/// Byte-range reader backing `load_segment`, typically an on-disk inode.
pub trait SegmentSource {
    /// Reads bytes starting at `offset` into `buf`; returns how many were read.
    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> usize;
}

/// In-memory images, such as the embedded first user program.
impl SegmentSource for &[u8] {
    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> usize {
        let start = (offset as usize).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        n
    }
}

/// One user address space.
///
/// Owns the root directory frame, the user heap boundary and the window
/// slots where shared-memory regions are mapped. Exactly one mutator can
/// exist at a time; concurrent access is a compile error, not a lock.
pub struct AddressSpace {
    root: PhysPageNum,
    size: u32,
    layout: MemoryLayout,
    windows: [Option<ShmWindow>; SHM_WINDOW_SLOTS],
}

impl AddressSpace {
    /// Creates an empty space containing only the kernel template.
    ///
    /// Every allocation made on the way is returned to the pool if a later
    /// one fails. Panics if `layout` itself is invalid.
    pub fn new<A: FrameAllocator + ?Sized>(
        pool: &mut A,
        layout: &MemoryLayout,
    ) -> Result<Self, SpaceError> {
        let template = layout.kernel_template();
        let root = match pool.allocate() {
            Some(root) => root,
            None => return Err(SpaceError::FrameExhausted),
        };
        pool.bytes_mut(root).fill(0);
        const NO_WINDOW: Option<ShmWindow> = None;
        let space =
            Self { root, size: 0, layout: *layout, windows: [NO_WINDOW; SHM_WINDOW_SLOTS] };
        for range in template {
            if let Err(err) =
                page_table::map_range(pool, root, range.virt, range.len, range.phys, range.flags)
            {
                log_warn!(target: "mm", "space: template ran out of frames at {:#x}", range.virt.raw());
                space.dismantle(pool, None);
                return Err(err.into());
            }
        }
        Ok(space)
    }

    /// Frame number of the root page directory.
    pub fn root_ppn(&self) -> PhysPageNum {
        self.root
    }

    /// Current user heap boundary in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Layout this space was built for.
    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Hands the root directory to the translation hardware.
    pub fn activate<M: Mmu + ?Sized>(&self, mmu: &M) {
        mmu.load_root(self.root.base());
    }

    /// Installs `image` as the initial one-page user program at address 0.
    ///
    /// Panics if the image does not fit in a single page; the boot image is
    /// assembled to fit and anything larger is a build failure.
    pub fn install_initial_image<A: FrameAllocator + ?Sized>(
        &mut self,
        pool: &mut A,
        image: &[u8],
    ) -> Result<(), SpaceError> {
        if image.len() > PAGE_SIZE {
            panic!("initial image: more than a page");
        }
        let frame = match pool.allocate() {
            Some(frame) => frame,
            None => return Err(SpaceError::FrameExhausted),
        };
        let bytes = pool.bytes_mut(frame);
        bytes.fill(0);
        bytes[..image.len()].copy_from_slice(image);
        let flags = PteFlags::WRITABLE | PteFlags::USER;
        if let Err(err) =
            page_table::map_range(pool, self.root, VirtAddr::new(0), PAGE, frame.base(), flags)
        {
            pool.free(frame);
            return Err(err.into());
        }
        self.size = PAGE;
        Ok(())
    }

    /// Grows the user heap to `new_size` bytes, zero-filling new pages.
    ///
    /// Requests that do not grow return the current size unchanged. On
    /// exhaustion every page this call mapped is released again and the
    /// size stays where it was.
    pub fn grow<A: FrameAllocator + ?Sized>(
        &mut self,
        pool: &mut A,
        new_size: u32,
    ) -> Result<u32, SpaceError> {
        if new_size >= self.layout.kern_base {
            return Err(SpaceError::BeyondUserLimit);
        }
        if new_size < self.size {
            return Ok(self.size);
        }
        let old_size = self.size;
        let mut a = VirtAddr::new(old_size).page_round_up().raw();
        while a < new_size {
            let frame = match pool.allocate() {
                Some(frame) => frame,
                None => {
                    log_warn!(target: "mm", "grow: out of frames at {:#x}", a);
                    release_range(pool, self.root, old_size, a, None);
                    return Err(SpaceError::FrameExhausted);
                }
            };
            pool.bytes_mut(frame).fill(0);
            let flags = PteFlags::WRITABLE | PteFlags::USER;
            if let Err(err) =
                page_table::map_range(pool, self.root, VirtAddr::new(a), PAGE, frame.base(), flags)
            {
                log_warn!(target: "mm", "grow: no frame for leaf table at {:#x}", a);
                pool.free(frame);
                release_range(pool, self.root, old_size, a, None);
                return Err(err.into());
            }
            a += PAGE;
        }
        self.size = new_size;
        Ok(new_size)
    }

    /// Shrinks the user heap to `new_size` bytes and releases the frames.
    ///
    /// Frames still owned by a valid shared region are unmapped but kept
    /// allocated; the region table continues to own them. Returns the new
    /// size, which is the old one when nothing shrank.
    pub fn shrink<A: FrameAllocator + ?Sized>(
        &mut self,
        pool: &mut A,
        regions: &RegionTable,
        new_size: u32,
    ) -> u32 {
        if new_size >= self.size {
            return self.size;
        }
        release_range(pool, self.root, new_size, self.size, Some(regions));
        self.size = new_size;
        new_size
    }

    /// Copies `len` bytes from `source` at `offset` into pages starting at `va`.
    ///
    /// The destination pages must already be mapped and `va` page aligned;
    /// both are caller preconditions and violating them halts the kernel.
    /// A source that runs dry is an I/O problem and reported as an error.
    pub fn load_segment<A, S>(
        &mut self,
        pool: &mut A,
        source: &mut S,
        va: VirtAddr,
        offset: u32,
        len: u32,
    ) -> Result<(), LoadError>
    where
        A: FrameAllocator + ?Sized,
        S: SegmentSource + ?Sized,
    {
        if !va.is_page_aligned() {
            panic!("load_segment: va {:#x} not page aligned", va.raw());
        }
        let mut copied = 0u32;
        while copied < len {
            let page_va = VirtAddr::new(va.raw() + copied);
            let present = page_table::walk(pool, self.root, page_va)
                .map(|slot| slot.get(pool))
                .filter(|pte| pte.is_present());
            let pte = match present {
                Some(pte) => pte,
                None => panic!("load_segment: page not mapped at va {:#x}", page_va.raw()),
            };
            let frame = pte.addr().ppn();
            let chunk = (len - copied).min(PAGE) as usize;
            let n = source.read_at(offset.saturating_add(copied), &mut pool.bytes_mut(frame)[..chunk]);
            if n != chunk {
                return Err(LoadError::ShortRead);
            }
            copied += chunk as u32;
        }
        Ok(())
    }

    /// Builds a child space with a private copy of every user page.
    ///
    /// The child gets its own template, fresh frames and the parent's page
    /// permissions. Shared-memory windows are not duplicated here; the
    /// region manager propagates those so refcounts stay honest. A hole
    /// below `size` means the bookkeeping lied, which is fatal.
    pub fn duplicate<A: FrameAllocator + ?Sized>(
        &self,
        pool: &mut A,
    ) -> Result<Self, SpaceError> {
        let mut child = Self::new(pool, &self.layout)?;
        let mut a = 0u32;
        while a < self.size {
            let va = VirtAddr::new(a);
            let slot = match page_table::walk(pool, self.root, va) {
                Some(slot) => slot,
                None => panic!("duplicate: no leaf table at va {:#x}", a),
            };
            let pte = slot.get(pool);
            if !pte.is_present() {
                panic!("duplicate: page not present at va {:#x}", a);
            }
            let flags = pte.flags();
            let src = pte.addr().ppn();
            let dst = match pool.allocate() {
                Some(dst) => dst,
                None => {
                    log_warn!(target: "mm", "duplicate: out of frames at {:#x}", a);
                    child.dismantle(pool, None);
                    return Err(SpaceError::FrameExhausted);
                }
            };
            pool.copy_frame(src, dst);
            if let Err(err) = page_table::map_range(pool, child.root, va, PAGE, dst.base(), flags)
            {
                pool.free(dst);
                child.dismantle(pool, None);
                return Err(err.into());
            }
            a += PAGE;
        }
        child.size = self.size;
        Ok(child)
    }

    /// Tears the space down and returns every private frame to the pool.
    ///
    /// Frames of still-attached shared regions survive; other holders keep
    /// using them and the region table keeps owning them.
    pub fn destroy<A: FrameAllocator + ?Sized>(self, pool: &mut A, regions: &RegionTable) {
        self.dismantle(pool, Some(regions));
    }

    fn dismantle<A: FrameAllocator + ?Sized>(self, pool: &mut A, regions: Option<&RegionTable>) {
        release_range(pool, self.root, 0, self.layout.kern_base, regions);
        for index in 0..ENTRIES_PER_TABLE {
            let pde = PteSlot::new(self.root, index).get(pool);
            if pde.is_present() {
                pool.free(pde.addr().ppn());
            }
        }
        pool.free(self.root);
    }

    pub(crate) fn windows(&self) -> &[Option<ShmWindow>; SHM_WINDOW_SLOTS] {
        &self.windows
    }

    pub(crate) fn set_window(&mut self, index: usize, window: ShmWindow) {
        self.windows[index] = Some(window);
    }

    pub(crate) fn free_window_slot(&self) -> Option<usize> {
        self.windows.iter().position(|slot| slot.is_none())
    }

    pub(crate) fn take_window(&mut self, key: RegionKey) -> Option<ShmWindow> {
        let slot = self
            .windows
            .iter_mut()
            .find(|slot| slot.map_or(false, |window| window.key == key))?;
        slot.take()
    }
}

/// Unmaps every present page in `[round_up(from), to)` and frees the frames.
///
/// A frame still owned by a valid shared region is left allocated. Where a
/// whole leaf table is missing the scan jumps to the next directory slot.
fn release_range<A: FrameAllocator + ?Sized>(
    pool: &mut A,
    root: PhysPageNum,
    from: u32,
    to: u32,
    regions: Option<&RegionTable>,
) {
    let mut a = VirtAddr::new(from).page_round_up().raw();
    while a < to {
        let slot = match page_table::walk(pool, root, VirtAddr::new(a)) {
            Some(slot) => slot,
            None => {
                a = next_directory_boundary(a);
                continue;
            }
        };
        let pte = slot.get(pool);
        if pte.is_present() {
            let frame = pte.addr().ppn();
            let shared = regions.map_or(false, |table| table.is_shared_frame(frame));
            if !shared {
                pool.free(frame);
            }
            slot.set(pool, Pte::EMPTY);
        }
        a += PAGE;
    }
}

fn next_directory_boundary(a: u32) -> u32 {
    const DIR_SPAN: u32 = ENTRIES_PER_TABLE as u32 * PAGE;
    (a & !(DIR_SPAN - 1)).saturating_add(DIR_SPAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::frames::FramePool;
    use crate::mm::page_table::walk;

    fn test_layout() -> MemoryLayout {
        MemoryLayout { phys_stop: 0x0080_0000, ..MemoryLayout::DEFAULT }
    }

    fn setup() -> (MemoryLayout, FramePool) {
        let layout = test_layout();
        let pool = FramePool::new(&layout);
        (layout, pool)
    }

    #[test]
    fn fresh_space_carries_the_kernel_template() {
        let (layout, mut pool) = setup();
        let space = AddressSpace::new(&mut pool, &layout).expect("space");

        // Kernel text is mapped read-only, kernel data writable.
        let text = VirtAddr::new(layout.kern_base + layout.ext_mem);
        let text_pte = walk(&pool, space.root_ppn(), text).expect("text table").get(&pool);
        assert!(text_pte.is_present());
        assert!(!text_pte.flags().contains(PteFlags::WRITABLE));
        assert!(!text_pte.flags().contains(PteFlags::USER));
        assert_eq!(text_pte.addr().raw(), layout.ext_mem);

        let data = VirtAddr::new(layout.kern_base + layout.kernel_data);
        let data_pte = walk(&pool, space.root_ppn(), data).expect("data table").get(&pool);
        assert!(data_pte.flags().contains(PteFlags::WRITABLE));

        let dev = VirtAddr::new(layout.dev_space);
        let dev_pte = walk(&pool, space.root_ppn(), dev).expect("device table").get(&pool);
        assert_eq!(dev_pte.addr().raw(), layout.dev_space);

        // Nothing is mapped below the kernel half yet.
        assert!(walk(&pool, space.root_ppn(), VirtAddr::new(0)).is_none());
        assert_eq!(space.size(), 0);
    }

    #[test]
    fn destroy_returns_every_frame() {
        let (layout, mut pool) = setup();
        let regions = RegionTable::new();
        let baseline = pool.allocated_frames();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, 5 * PAGE).expect("grow");
        assert!(pool.allocated_frames() > baseline);
        space.destroy(&mut pool, &regions);
        assert_eq!(pool.allocated_frames(), baseline);
    }

    #[test]
    fn grow_zero_fills_and_maps_user_writable() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        assert_eq!(space.grow(&mut pool, 3 * PAGE + 17), Ok(3 * PAGE + 17));
        for page in 0..4u32 {
            let pte = walk(&pool, space.root_ppn(), VirtAddr::new(page * PAGE))
                .expect("table")
                .get(&pool);
            assert!(pte.is_present());
            assert_eq!(pte.flags(), PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER);
            assert!(pool.bytes(pte.addr().ppn()).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn grow_to_current_size_is_identity() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, 2 * PAGE).expect("grow");
        let frames = pool.allocated_frames();
        assert_eq!(space.grow(&mut pool, 2 * PAGE), Ok(2 * PAGE));
        assert_eq!(pool.allocated_frames(), frames);
    }

    #[test]
    fn grow_request_below_current_size_shrinks_nothing() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, 4 * PAGE).expect("grow");
        let frames = pool.allocated_frames();
        assert_eq!(space.grow(&mut pool, PAGE), Ok(4 * PAGE));
        assert_eq!(space.size(), 4 * PAGE);
        assert_eq!(pool.allocated_frames(), frames);
    }

    #[test]
    fn grow_rejects_the_kernel_half() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        assert_eq!(space.grow(&mut pool, layout.kern_base), Err(SpaceError::BeyondUserLimit));
        assert_eq!(space.grow(&mut pool, layout.kern_base + PAGE), Err(SpaceError::BeyondUserLimit));
        assert_eq!(space.size(), 0);
    }

    #[cfg(feature = "failpoints")]
    #[test]
    fn first_page_of_a_fresh_heap_fails_cleanly() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        let frames = pool.allocated_frames();

        pool.deny_next_allocations(1);
        assert_eq!(space.grow(&mut pool, PAGE), Err(SpaceError::FrameExhausted));
        assert_eq!(space.size(), 0);
        assert_eq!(pool.allocated_frames(), frames);

        assert_eq!(space.grow(&mut pool, PAGE), Ok(PAGE));
    }

    #[test]
    fn grow_unwinds_on_exhaustion() {
        let (layout, mut pool) = setup();
        let regions = RegionTable::new();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, 2 * PAGE).expect("grow");

        // Two free frames cannot cover four new pages; the third allocation
        // fails and the first two pages must be rolled back.
        let mut held = Vec::new();
        while pool.free_frames() > 2 {
            held.push(pool.allocate().expect("drain"));
        }
        let frames = pool.allocated_frames();
        assert_eq!(space.grow(&mut pool, 6 * PAGE), Err(SpaceError::FrameExhausted));
        assert_eq!(space.size(), 2 * PAGE);
        assert_eq!(pool.allocated_frames(), frames);

        // The old pages are untouched and the space still works.
        for ppn in held {
            pool.free(ppn);
        }
        assert_eq!(space.grow(&mut pool, 3 * PAGE), Ok(3 * PAGE));
        space.destroy(&mut pool, &regions);
    }

    #[test]
    fn shrink_frees_only_the_tail() {
        let (layout, mut pool) = setup();
        let regions = RegionTable::new();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, 6 * PAGE).expect("grow");
        let frames = pool.allocated_frames();
        assert_eq!(space.shrink(&mut pool, &regions, 2 * PAGE), 2 * PAGE);
        assert_eq!(pool.allocated_frames(), frames - 4);
        let kept = walk(&pool, space.root_ppn(), VirtAddr::new(PAGE)).expect("table").get(&pool);
        assert!(kept.is_present());
        let gone = walk(&pool, space.root_ppn(), VirtAddr::new(3 * PAGE)).expect("table").get(&pool);
        assert!(!gone.is_present());
    }

    #[test]
    fn shrink_to_no_smaller_size_is_identity() {
        let (layout, mut pool) = setup();
        let regions = RegionTable::new();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, 3 * PAGE).expect("grow");
        let frames = pool.allocated_frames();
        assert_eq!(space.shrink(&mut pool, &regions, 3 * PAGE), 3 * PAGE);
        assert_eq!(space.shrink(&mut pool, &regions, 5 * PAGE), 3 * PAGE);
        assert_eq!(pool.allocated_frames(), frames);
    }

    #[test]
    fn initial_image_lands_at_address_zero() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        let image = [0xCBu8; 100];
        space.install_initial_image(&mut pool, &image).expect("install");
        assert_eq!(space.size(), PAGE);
        let pte = walk(&pool, space.root_ppn(), VirtAddr::new(0)).expect("table").get(&pool);
        assert_eq!(pte.flags(), PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER);
        let bytes = pool.bytes(pte.addr().ppn());
        assert_eq!(&bytes[..100], &image[..]);
        assert!(bytes[100..].iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "more than a page")]
    fn oversized_initial_image_halts() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        let image = [0u8; PAGE_SIZE + 1];
        let _ = space.install_initial_image(&mut pool, &image);
    }

    #[test]
    fn load_segment_fills_mapped_pages() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, 2 * PAGE).expect("grow");

        let mut file = vec![0u8; 3 * PAGE_SIZE];
        for (i, byte) in file.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        let mut source: &[u8] = &file;
        space
            .load_segment(&mut pool, &mut source, VirtAddr::new(0), PAGE, PAGE + 100)
            .expect("load");

        let first = walk(&pool, space.root_ppn(), VirtAddr::new(0)).expect("t").get(&pool);
        assert_eq!(pool.bytes(first.addr().ppn())[0], file[PAGE_SIZE]);
        let second = walk(&pool, space.root_ppn(), VirtAddr::new(PAGE)).expect("t").get(&pool);
        assert_eq!(&pool.bytes(second.addr().ppn())[..100], &file[2 * PAGE_SIZE..2 * PAGE_SIZE + 100]);
        // Bytes past the segment keep their grow-time zero fill.
        assert_eq!(pool.bytes(second.addr().ppn())[100], 0);
    }

    #[test]
    fn load_segment_reports_short_reads() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, PAGE).expect("grow");
        let file = [7u8; 64];
        let mut source: &[u8] = &file;
        assert_eq!(
            space.load_segment(&mut pool, &mut source, VirtAddr::new(0), 0, 128),
            Err(LoadError::ShortRead)
        );
    }

    #[test]
    #[should_panic(expected = "not page aligned")]
    fn load_segment_rejects_unaligned_destination() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        space.grow(&mut pool, PAGE).expect("grow");
        let file = [0u8; 16];
        let mut source: &[u8] = &file;
        let _ = space.load_segment(&mut pool, &mut source, VirtAddr::new(12), 0, 8);
    }

    #[test]
    #[should_panic(expected = "page not mapped")]
    fn load_segment_requires_mapped_pages() {
        let (layout, mut pool) = setup();
        let mut space = AddressSpace::new(&mut pool, &layout).expect("space");
        let file = [0u8; 16];
        let mut source: &[u8] = &file;
        let _ = space.load_segment(&mut pool, &mut source, VirtAddr::new(0), 0, 8);
    }

    #[test]
    fn duplicate_copies_bytes_into_fresh_frames() {
        let (layout, mut pool) = setup();
        let regions = RegionTable::new();
        let mut parent = AddressSpace::new(&mut pool, &layout).expect("parent");
        parent.grow(&mut pool, 2 * PAGE).expect("grow");
        let parent_pte = walk(&pool, parent.root_ppn(), VirtAddr::new(0)).expect("t").get(&pool);
        pool.bytes_mut(parent_pte.addr().ppn())[0] = 0x11;

        let child = parent.duplicate(&mut pool).expect("child");
        assert_eq!(child.size(), parent.size());
        let child_pte = walk(&pool, child.root_ppn(), VirtAddr::new(0)).expect("t").get(&pool);
        assert_ne!(child_pte.addr(), parent_pte.addr());
        assert_eq!(child_pte.flags(), parent_pte.flags());
        assert_eq!(pool.bytes(child_pte.addr().ppn())[0], 0x11);

        // Writes to the parent stay invisible to the child.
        pool.bytes_mut(parent_pte.addr().ppn())[0] = 0x22;
        assert_eq!(pool.bytes(child_pte.addr().ppn())[0], 0x11);

        parent.destroy(&mut pool, &regions);
        child.destroy(&mut pool, &regions);
    }

    #[test]
    fn duplicate_unwinds_completely_on_exhaustion() {
        let (layout, mut pool) = setup();
        let regions = RegionTable::new();
        let mut parent = AddressSpace::new(&mut pool, &layout).expect("parent");
        parent.grow(&mut pool, 4 * PAGE).expect("grow");

        // Measure the full cost of a copy, then rerun with one frame less
        // available for every prefix length. Each run must unwind cleanly.
        let before_probe = pool.allocated_frames();
        let probe = parent.duplicate(&mut pool).expect("probe child");
        let child_cost = pool.allocated_frames() - before_probe;
        probe.destroy(&mut pool, &regions);
        assert_eq!(pool.allocated_frames(), before_probe);

        for budget in 0..child_cost {
            let mut held = Vec::new();
            while pool.free_frames() > budget {
                held.push(pool.allocate().expect("drain"));
            }
            let frames = pool.allocated_frames();
            assert_eq!(parent.duplicate(&mut pool).err(), Some(SpaceError::FrameExhausted));
            assert_eq!(pool.allocated_frames(), frames, "leak with budget {}", budget);
            for ppn in held {
                pool.free(ppn);
            }
        }

        parent.destroy(&mut pool, &regions);
    }

    #[test]
    fn activate_hands_the_root_to_the_mmu() {
        use core::cell::Cell;

        struct RecordingMmu {
            loaded: Cell<u32>,
        }
        impl Mmu for RecordingMmu {
            fn load_root(&self, root: crate::mm::addr::PhysAddr) {
                self.loaded.set(root.raw());
            }
        }

        let (layout, mut pool) = setup();
        let space = AddressSpace::new(&mut pool, &layout).expect("space");
        let mmu = RecordingMmu { loaded: Cell::new(0) };
        space.activate(&mmu);
        assert_eq!(mmu.loaded.get(), space.root_ppn().base().raw());
    }
}
