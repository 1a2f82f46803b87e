// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use core::arch::asm;

use stkboot_common::{Platform, ResetCause};

use crate::pac::{CPU, WDT};

// WDTCSR
const WDE: u8 = 1 << 3;
const WDCE: u8 = 1 << 4;

pub struct Mcu {
    cpu: CPU,
    wdt: WDT,
}

impl Mcu {
    pub fn new(cpu: CPU, wdt: WDT) -> Self {
        Self { cpu, wdt }
    }
}

impl Platform for Mcu {
    fn take_reset_cause(&mut self) -> ResetCause {
        let bits = self.cpu.mcusr.read().bits();
        unsafe { self.cpu.mcusr.write(|w| w.bits(0)) };
        ResetCause::from_bits(bits)
    }

    fn disable_watchdog(&mut self) {
        // WDRF is already clear, otherwise WDE could not be cleared.
        avr_device::asm::wdr();
        unsafe {
            self.wdt.wdtcsr.write(|w| w.bits(WDCE | WDE));
            self.wdt.wdtcsr.write(|w| w.bits(0));
        }
    }

    /// Jump to the reset vector of the application. The reset cause is left
    /// in r2 for the application's startup code.
    fn start_application(&mut self, cause: ResetCause) {
        unsafe {
            asm!(
                "jmp 0",
                in("r2") cause.bits(),
                options(noreturn),
            );
        }
    }
}
