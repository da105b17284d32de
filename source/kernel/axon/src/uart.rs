// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! NS16550A console on the `virt` machine, transmit side only.

use core::fmt::{self, Write};

use spin::Mutex;

const UART0_BASE: usize = 0x1000_0000;
const REG_THR: usize = 0x0;
const REG_LSR: usize = 0x5;
const LSR_THR_EMPTY: u8 = 1 << 5;

/// Global console writer used by the log sink.
static UART0: Mutex<KernelUart> = Mutex::new(KernelUart::new(UART0_BASE));

/// Polled transmit-only UART.
pub struct KernelUart {
    base: usize,
}

impl KernelUart {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// Guard for the console singleton.
    pub fn lock() -> spin::MutexGuard<'static, KernelUart> {
        UART0.lock()
    }

    fn put(&self, byte: u8) {
        // SAFETY: base points at the virt machine's UART block. Byte reads
        // of LSR and byte writes of THR are how this device is driven.
        unsafe {
            while core::ptr::read_volatile((self.base + REG_LSR) as *const u8) & LSR_THR_EMPTY == 0
            {
            }
            core::ptr::write_volatile((self.base + REG_THR) as *mut u8, byte);
        }
    }
}

impl Write for KernelUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            if byte == b'\n' {
                self.put(b'\r');
            }
            self.put(byte);
        }
        Ok(())
    }
}

/// Lock-free writer for panic context, where the mutex may already be held.
pub struct RawUart;

impl Write for RawUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let uart = KernelUart::new(UART0_BASE);
        for &byte in s.as_bytes() {
            if byte == b'\n' {
                uart.put(b'\r');
            }
            uart.put(byte);
        }
        Ok(())
    }
}

pub fn raw_writer() -> RawUart {
    RawUart
}
