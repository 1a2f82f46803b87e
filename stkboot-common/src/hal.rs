// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Hardware boundary of the protocol engine.
//!
//! The firmware implements these traits on top of the ATmega registers; tests
//! implement them with an in-memory simulation. Every method blocks until the
//! hardware has finished, there is no error path.

/// Polled, unbuffered UART.
pub trait SerialLink {
    /// Configure baud rate and enable receiver and transmitter.
    fn enable(&mut self);

    /// Restore the reset configuration before handing over to the application.
    fn disable(&mut self);

    fn byte_available(&mut self) -> bool;

    /// Block until a byte arrives.
    fn read_byte(&mut self) -> u8;

    /// Block until the byte has left the shift register.
    fn write_byte(&mut self, byte: u8);
}

/// Lock and fuse bytes readable from the boot section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FuseByte {
    Low,
    Lock,
    Extended,
    High,
}

impl FuseByte {
    /// Z-pointer value selecting this byte for an `lpm` after `BLBSET`.
    pub const fn z_address(self) -> u16 {
        match self {
            Self::Low => 0x0000,
            Self::Lock => 0x0001,
            Self::Extended => 0x0002,
            Self::High => 0x0003,
        }
    }
}

/// Self-programming (SPM) access to the device's own flash.
///
/// Addresses are byte addresses. Erase and write only start the operation;
/// callers sequence them with [`SelfProgram::wait_ready`].
pub trait SelfProgram {
    fn page_erase(&mut self, address: u32);

    /// Stage one little-endian word in the temporary page buffer.
    fn page_fill(&mut self, address: u32, word: u16);

    /// Commit the page buffer to the page containing `address`.
    fn page_write(&mut self, address: u32);

    /// Busy-wait until the last erase or write has completed.
    fn wait_ready(&mut self);

    /// Re-enable reads of the application (RWW) section after a write.
    fn rww_enable(&mut self);

    fn read_word(&mut self, address: u32) -> u16;

    fn read_fuse(&mut self, fuse: FuseByte) -> u8;
}

/// Captured MCU status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetCause(u8);

impl ResetCause {
    pub const POWER_ON: u8 = 1 << 0;
    pub const EXTERNAL: u8 = 1 << 1;
    pub const BROWN_OUT: u8 = 1 << 2;
    pub const WATCHDOG: u8 = 1 << 3;
    pub const JTAG: u8 = 1 << 4;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_watchdog(self) -> bool {
        self.0 & Self::WATCHDOG != 0
    }
}

/// System control needed by the boot decision.
pub trait Platform {
    /// Read and clear the reset-cause flags.
    fn take_reset_cause(&mut self) -> ResetCause;

    fn disable_watchdog(&mut self);

    /// Jump to the application at address 0, handing over `cause`.
    ///
    /// Never returns on hardware. Simulations record the call and return.
    fn start_application(&mut self, cause: ResetCause);
}
