// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel heap: a fixed arena handed to a linked-list allocator at boot.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use linked_list_allocator::Heap;
use spin::Mutex;

const HEAP_BYTES: usize = 0x10_0000;

static mut HEAP_SPACE: [u8; HEAP_BYTES] = [0; HEAP_BYTES];

struct KernelHeap(Mutex<Heap>);

#[global_allocator]
static ALLOCATOR: KernelHeap = KernelHeap(Mutex::new(Heap::empty()));

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.0
            .lock()
            .allocate_first_fit(layout)
            .map_or(ptr::null_mut(), |block| block.as_ptr())
    }

    unsafe fn dealloc(&self, raw: *mut u8, layout: Layout) {
        if let Some(block) = NonNull::new(raw) {
            self.0.lock().deallocate(block, layout);
        }
    }
}

/// Hands the static arena to the allocator.
///
/// # Safety
/// Call exactly once, before the first allocation.
pub unsafe fn init_heap() {
    let start = ptr::addr_of_mut!(HEAP_SPACE) as *mut u8;
    ALLOCATOR.0.lock().init(start, HEAP_BYTES);
}
