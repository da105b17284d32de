// Copyright 2025 Axon OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Panic handler emitting deterministic diagnostics over UART
//! OWNERS: @kernel-mm-team
//! PUBLIC API: panic handler (no_std)
//! DEPENDS_ON: uart::raw_writer(), SBI system reset
//! INVARIANTS: Minimal formatting; no allocations; stable output fields

use core::{fmt::Write, panic::PanicInfo};

use sbi_rt as sbi;

use crate::uart;

/// Emits the panic location and message, then stops the machine.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let mut w = uart::raw_writer();

    // CRITICAL: minimal formatting so the report itself cannot panic.
    let _ = w.write_str("\nPANIC: ");
    if let Some(location) = info.location() {
        let _ = w.write_str(location.file());
        let _ = w.write_str(":");
        write_hex(&mut w, location.line() as usize);
        let _ = w.write_str(": ");
    }
    if let Some(msg) = info.message().as_str() {
        let _ = w.write_str(msg);
    } else {
        let _ = w.write_str("<formatted msg>");
    }
    let _ = w.write_str("\n");
    drop(w);

    let _ = sbi::system_reset(sbi::Shutdown, sbi::SystemFailure);
    loop {
        // SAFETY: the reset request was refused; parking the hart is all
        // that is left.
        unsafe { riscv::asm::wfi() };
    }
}

fn write_hex(w: &mut impl Write, value: usize) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut started = false;
    let mut shift = usize::BITS as i32 - 4;
    while shift >= 0 {
        let nibble = (value >> shift) & 0xF;
        if nibble != 0 || started || shift == 0 {
            started = true;
            let _ = w.write_char(DIGITS[nibble] as char);
        }
        shift -= 4;
    }
}
