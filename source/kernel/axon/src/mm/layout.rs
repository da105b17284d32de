// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Physical and virtual memory layout of the machine.
//!
//! The kernel lives in the upper half of every address space. All of
//! physical RAM is visible there at a fixed offset, so converting between
//! a physical address and its kernel-virtual alias is pure arithmetic.

use super::addr::{PhysAddr, VirtAddr, PAGE_SIZE};
use super::page_table::PteFlags;

/// First virtual address owned by the kernel; user mappings stay below it.
pub const KERN_BASE: u32 = 0x8000_0000;
/// Start of extended physical memory, where the kernel image is loaded.
pub const EXT_MEM: u32 = 0x0010_0000;
/// End of the RAM the kernel manages.
pub const PHYS_STOP: u32 = 0x0E00_0000;
/// Start of the memory-mapped device window (mapped at identical addresses).
pub const DEV_SPACE: u32 = 0xFE00_0000;

static_assertions::const_assert_eq!(KERN_BASE % (PAGE_SIZE as u32), 0);
static_assertions::const_assert_eq!(DEV_SPACE % (PAGE_SIZE as u32), 0);
static_assertions::const_assert!(EXT_MEM < PHYS_STOP);

/// Address-space constants for one machine configuration.
///
/// The defaults describe the stock QEMU-style board the kernel targets;
/// tests instantiate smaller configurations to keep frame pools cheap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Virtual address where the kernel half begins.
    pub kern_base: u32,
    /// Physical load address of the kernel image.
    pub ext_mem: u32,
    /// Physical address where kernel text and read-only data end.
    pub kernel_data: u32,
    /// Physical address just past the kernel image; first allocatable frame.
    pub kernel_end: u32,
    /// Physical end of managed RAM.
    pub phys_stop: u32,
    /// Start of the device MMIO window.
    pub dev_space: u32,
}

impl MemoryLayout {
    pub const DEFAULT: Self = Self {
        kern_base: KERN_BASE,
        ext_mem: EXT_MEM,
        kernel_data: 0x0010_8000,
        kernel_end: 0x0011_6000,
        phys_stop: PHYS_STOP,
        dev_space: DEV_SPACE,
    };

    /// Kernel-virtual alias of a physical address.
    #[inline]
    pub const fn phys_to_kernel(&self, pa: PhysAddr) -> VirtAddr {
        VirtAddr::new(pa.raw().wrapping_add(self.kern_base))
    }

    /// Physical address behind a kernel-virtual alias.
    #[inline]
    pub const fn kernel_to_phys(&self, va: VirtAddr) -> PhysAddr {
        PhysAddr::new(va.raw().wrapping_sub(self.kern_base))
    }

    /// Ranges every address space maps for the kernel half.
    ///
    /// Panics if the configuration is impossible: RAM must fit below the
    /// device window once shifted into the kernel half, and every boundary
    /// must be page aligned. A bad layout cannot be recovered from; it
    /// means the kernel was configured for a machine it is not on.
    pub fn kernel_template(&self) -> [TemplateRange; 4] {
        let boundaries = [
            self.ext_mem,
            self.kernel_data,
            self.kernel_end,
            self.phys_stop,
            self.dev_space,
        ];
        for b in boundaries {
            if b % PAGE_SIZE as u32 != 0 {
                panic!("layout: boundary {:#x} not page aligned", b);
            }
        }
        if self.ext_mem >= self.kernel_data
            || self.kernel_data > self.kernel_end
            || self.kernel_end >= self.phys_stop
        {
            panic!("layout: kernel image boundaries out of order");
        }
        match self.kern_base.checked_add(self.phys_stop) {
            Some(top) if top <= self.dev_space => {}
            _ => panic!("layout: phys_stop too high"),
        }

        let kern_link = self.kern_base + self.ext_mem;
        [
            // Low physical memory: BIOS and legacy I/O structures.
            TemplateRange {
                virt: VirtAddr::new(self.kern_base),
                phys: PhysAddr::new(0),
                len: self.ext_mem,
                flags: PteFlags::WRITABLE,
            },
            // Kernel text and read-only data, mapped without write access.
            TemplateRange {
                virt: VirtAddr::new(kern_link),
                phys: PhysAddr::new(self.ext_mem),
                len: self.kernel_data - self.ext_mem,
                flags: PteFlags::empty(),
            },
            // Kernel data plus the remainder of RAM.
            TemplateRange {
                virt: VirtAddr::new(self.kern_base + self.kernel_data),
                phys: PhysAddr::new(self.kernel_data),
                len: self.phys_stop - self.kernel_data,
                flags: PteFlags::WRITABLE,
            },
            // Device window, identity mapped up to the top of the space.
            TemplateRange {
                virt: VirtAddr::new(self.dev_space),
                phys: PhysAddr::new(self.dev_space),
                len: 0u32.wrapping_sub(self.dev_space),
                flags: PteFlags::WRITABLE,
            },
        ]
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One contiguous kernel mapping applied to every new address space.
#[derive(Copy, Clone, Debug)]
pub struct TemplateRange {
    pub virt: VirtAddr,
    pub phys: PhysAddr,
    pub len: u32,
    pub flags: PteFlags,
}
