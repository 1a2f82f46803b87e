// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Self-programming through the SPM instruction.
//!
//! Each SPM must follow the SPMCSR write within four cycles, so every
//! operation is a single asm block. Addresses above 64K select their bank
//! through RAMPZ.

use core::arch::asm;
use core::ptr;

use stkboot_common::{FuseByte, SelfProgram};

/// SPMCSR in data space, for polling.
const SPMCSR_DATA: *const u8 = 0x57 as *const u8;

// SPMCSR bits
const SPMEN: u8 = 1 << 0;
const PGERS: u8 = 1 << 1;
const PGWRT: u8 = 1 << 2;
const BLBSET: u8 = 1 << 3;
const RWWSRE: u8 = 1 << 4;

pub struct Spm;

/// Issue `command` on the page containing `address`.
///
/// # Safety
/// Must run from the boot section with the flash idle.
unsafe fn spm_page(address: u32, command: u8) {
    asm!(
        "out 0x3B, {bank}",
        "out 0x37, {cmd}",
        "spm",
        bank = in(reg) (address >> 16) as u8,
        cmd = in(reg) command,
        in("Z") address as u16,
    );
}

impl SelfProgram for Spm {
    fn page_erase(&mut self, address: u32) {
        unsafe { spm_page(address, PGERS | SPMEN) };
    }

    fn page_fill(&mut self, address: u32, word: u16) {
        let [lo, hi] = word.to_le_bytes();
        // r1:r0 carry the word; r1 is the zero register and is restored.
        unsafe {
            asm!(
                "mov r0, {lo}",
                "mov r1, {hi}",
                "out 0x37, {cmd}",
                "spm",
                "clr r1",
                lo = in(reg) lo,
                hi = in(reg) hi,
                cmd = in(reg) SPMEN,
                in("Z") address as u16,
            );
        }
    }

    fn page_write(&mut self, address: u32) {
        unsafe { spm_page(address, PGWRT | SPMEN) };
    }

    fn wait_ready(&mut self) {
        while unsafe { ptr::read_volatile(SPMCSR_DATA) } & SPMEN != 0 {}
    }

    fn rww_enable(&mut self) {
        unsafe {
            asm!(
                "out 0x37, {cmd}",
                "spm",
                cmd = in(reg) RWWSRE | SPMEN,
            );
        }
    }

    fn read_word(&mut self, address: u32) -> u16 {
        let lo: u8;
        let hi: u8;
        unsafe {
            asm!(
                "out 0x3B, {bank}",
                "elpm {lo}, Z+",
                "elpm {hi}, Z",
                bank = in(reg) (address >> 16) as u8,
                lo = out(reg) lo,
                hi = out(reg) hi,
                inout("Z") address as u16 => _,
            );
        }
        u16::from_le_bytes([lo, hi])
    }

    fn read_fuse(&mut self, fuse: FuseByte) -> u8 {
        let value: u8;
        unsafe {
            asm!(
                "out 0x37, {cmd}",
                "lpm {value}, Z",
                cmd = in(reg) BLBSET | SPMEN,
                value = out(reg) value,
                in("Z") fuse.z_address(),
            );
        }
        value
    }
}
