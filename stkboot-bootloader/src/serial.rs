// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Polled USART0 driver. Interrupts stay off for the whole bootloader.

use stkboot_common::SerialLink;

use crate::pac::USART0;

pub const CPU_HZ: u32 = 16_000_000;
pub const BAUD: u32 = 115_200;

// UCSR0A
const RXC: u8 = 1 << 7;
const TXC: u8 = 1 << 6;
const U2X: u8 = 1 << 1;
// UCSR0B
const RXEN: u8 = 1 << 4;
const TXEN: u8 = 1 << 3;
// UCSR0C: asynchronous, 8 data bits, no parity, 1 stop bit
const FORMAT_8N1: u8 = 0b0000_0110;

/// Baud divisor in double-speed mode, rounded to nearest.
pub const fn ubrr(cpu_hz: u32, baud: u32) -> u16 {
    ((cpu_hz + baud * 4) / (baud * 8) - 1) as u16
}

const _: () = assert!(ubrr(16_000_000, 115_200) == 16);

pub struct Usart {
    usart: USART0,
}

impl Usart {
    pub fn new(usart: USART0) -> Self {
        Self { usart }
    }

    fn status(&self) -> u8 {
        self.usart.ucsr0a.read().bits()
    }
}

impl SerialLink for Usart {
    fn enable(&mut self) {
        let divisor = ubrr(CPU_HZ, BAUD);
        unsafe {
            self.usart.ubrr0.write(|w| w.bits(divisor));
            self.usart.ucsr0a.write(|w| w.bits(U2X));
            self.usart.ucsr0c.write(|w| w.bits(FORMAT_8N1));
            self.usart.ucsr0b.write(|w| w.bits(RXEN | TXEN));
        }
    }

    fn disable(&mut self) {
        // The application expects the USART in its reset state, U2X included.
        unsafe {
            self.usart.ucsr0b.write(|w| w.bits(0));
            self.usart.ucsr0a.write(|w| w.bits(0));
        }
    }

    fn byte_available(&mut self) -> bool {
        self.status() & RXC != 0
    }

    fn read_byte(&mut self) -> u8 {
        while !self.byte_available() {}
        self.usart.udr0.read().bits()
    }

    fn write_byte(&mut self, byte: u8) {
        unsafe { self.usart.udr0.write(|w| w.bits(byte)) };
        // Wait for the shift register to drain so that disable() never cuts
        // off the last response byte. TXC clears by writing a one to it.
        while self.status() & TXC == 0 {}
        unsafe { self.usart.ucsr0a.write(|w| w.bits(U2X | TXC)) };
    }
}
